//! Test doubles shared by the unit tests.

use crate::expression::{Expression, ExpressionEngine, ExpressionError};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Once;

/// Expression engine that hands back a pre-scripted atom list per source text.
///
/// Texts without a script are split on whitespace, so `"A & B"` yields
/// `["A", "&", "B"]`. Texts registered with [`ScriptedEngine::fail`] refuse
/// to compile.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: HashMap<String, Vec<String>>,
    failures: HashMap<String, String>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, text: &str, atoms: &[&str]) -> Self {
        self.scripts.insert(
            text.to_string(),
            atoms.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    pub fn fail(mut self, text: &str, message: &str) -> Self {
        self.failures.insert(text.to_string(), message.to_string());
        self
    }
}

struct ScriptedExpression {
    atoms: Vec<String>,
}

impl Expression for ScriptedExpression {
    fn for_each_atom(&self, visitor: &mut dyn FnMut(&str)) {
        for atom in &self.atoms {
            visitor(atom);
        }
    }
}

impl ExpressionEngine for ScriptedEngine {
    fn compile(&self, text: &str) -> Result<Box<dyn Expression>, ExpressionError> {
        if let Some(message) = self.failures.get(text) {
            return Err(ExpressionError::Other(message.clone()));
        }

        let atoms = match self.scripts.get(text) {
            Some(atoms) => atoms.clone(),
            None => text.split_whitespace().map(str::to_string).collect(),
        };
        Ok(Box::new(ScriptedExpression { atoms }))
    }
}

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static INIT: Once = Once::new();

/// Installs the capturing logger (once per process) and clears the records
/// of the calling thread.
pub fn capture_logs() {
    INIT.call_once(|| {
        if log::set_boxed_logger(Box::new(CaptureLogger)).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    RECORDS.with(|records| records.borrow_mut().clear());
}

/// Records logged on the calling thread since the last [`capture_logs`].
pub fn captured() -> Vec<(Level, String)> {
    RECORDS.with(|records| records.borrow().clone())
}

/// Captured records at `level` whose message contains `needle`.
pub fn captured_matching(level: Level, needle: &str) -> usize {
    captured()
        .iter()
        .filter(|(l, msg)| *l == level && msg.contains(needle))
        .count()
}
