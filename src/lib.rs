pub mod composite;
pub mod config;
pub mod expression;
pub mod loader;
pub mod map;
pub mod map_source;
pub mod scheduler;
pub mod store;
pub mod symbols;

#[cfg(test)]
pub(crate) mod testing;

pub use composite::{Composite, CompositePolicy};
pub use config::{Config, ConfigLoadSummary};
pub use expression::{BooleanEngine, Expression, ExpressionEngine, ExpressionError};
pub use loader::{CompositeLoader, CompositeNode, LoadError};
pub use map::{CompositesMap, MapLoadSummary};
pub use map_source::MapSource;
pub use scheduler::Schedule;
pub use store::{CompositeStore, PhaseReport};
pub use symbols::{Metric, SymbolFlags, SymbolRegistry};
