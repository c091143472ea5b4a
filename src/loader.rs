//! Builds composites from configuration and registers them as symbols.
//!
//! Every failure is logged here, at the level given by [`LoadError::level`],
//! before it is returned. Callers that only care whether a composite was
//! added can drop the error.

use crate::composite::{Composite, CompositePolicy, UnknownPolicy, DEFAULT_GROUP};
use crate::expression::{ExpressionEngine, ExpressionError};
use crate::store::CompositeStore;
use crate::symbols::SymbolRegistry;
use log::Level;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("composite name must not be empty")]
    EmptyName,
    #[error("composite {name} is disabled")]
    Disabled { name: String },
    #[error("composite {name} is redefined")]
    Duplicate { name: String },
    #[error("composite must have an expression defined in {name}")]
    MissingExpression { name: String },
    #[error("cannot parse composite expression for {name}: {source}")]
    Expression {
        name: String,
        source: ExpressionError,
    },
    #[error("composite {name} has incorrect policy: {policy}")]
    UnknownPolicy { name: String, policy: String },
    #[error("composite {name} must be a mapping or an expression string")]
    InvalidDefinition { name: String },
    #[error("cannot add composite {name}: dependencies were already processed")]
    Finalized { name: String },
}

impl LoadError {
    /// Severity the loader reports this error with.
    pub fn level(&self) -> Level {
        match self {
            LoadError::Duplicate { .. } => Level::Debug,
            LoadError::Disabled { .. } => Level::Info,
            _ => Level::Error,
        }
    }
}

/// One composite definition from structured configuration.
///
/// Fields are looked up leniently: a field of the wrong type is treated the
/// same as a missing one, except for `expression` which is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CompositeNode {
    fields: Mapping,
}

impl CompositeNode {
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn enabled(&self) -> bool {
        match self.get("enabled") {
            None => true,
            Some(Value::Bool(enabled)) => *enabled,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(_) => false,
        }
    }

    pub fn expression(&self) -> Option<&str> {
        self.get("expression").and_then(Value::as_str)
    }

    /// Explicit score; NaN counts as unset.
    pub fn score(&self) -> Option<f64> {
        self.get("score")
            .and_then(Value::as_f64)
            .filter(|score| !score.is_nan())
    }

    /// `group` followed by `groups`, each a string or a list of strings.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        let mut push = |group: &str| {
            if !groups.iter().any(|g| g == group) {
                groups.push(group.to_string());
            }
        };

        for key in ["group", "groups"] {
            match self.get(key) {
                None => {}
                Some(Value::String(group)) => push(group.as_str()),
                Some(Value::Sequence(items)) => {
                    for item in items {
                        match item.as_str() {
                            Some(group) => push(group),
                            None => log::warn!("ignoring non-string entry in composite {key}"),
                        }
                    }
                }
                Some(_) => log::warn!("ignoring composite {key} that is not a string or list"),
            }
        }

        groups
    }

    pub fn description(&self) -> Option<&str> {
        self.get("description").and_then(Value::as_str)
    }

    pub fn policy(&self) -> Result<CompositePolicy, UnknownPolicy> {
        match self.get("policy") {
            None => Ok(CompositePolicy::default()),
            Some(Value::String(policy)) => policy.parse(),
            Some(other) => Err(UnknownPolicy(
                serde_yaml::to_string(other)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            )),
        }
    }

    pub fn priority(&self) -> i32 {
        self.get("priority")
            .and_then(Value::as_i64)
            .and_then(|p| i32::try_from(p).ok())
            .unwrap_or(0)
    }
}

/// Adds composites to a store and registers each one as a scorable symbol.
pub struct CompositeLoader<'a> {
    store: &'a mut CompositeStore,
    registry: &'a mut dyn SymbolRegistry,
    engine: &'a dyn ExpressionEngine,
    unknown_weight: f64,
}

impl<'a> CompositeLoader<'a> {
    pub fn new(
        store: &'a mut CompositeStore,
        registry: &'a mut dyn SymbolRegistry,
        engine: &'a dyn ExpressionEngine,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
            unknown_weight: f64::NAN,
        }
    }

    /// Score for composites that do not set one. NaN means no default.
    pub fn with_unknown_weight(mut self, unknown_weight: f64) -> Self {
        self.unknown_weight = unknown_weight;
        self
    }

    pub fn store(&self) -> &CompositeStore {
        &*self.store
    }

    fn resolve_score(&self, score: Option<f64>) -> f64 {
        match score {
            Some(score) if !score.is_nan() => score,
            _ if !self.unknown_weight.is_nan() => self.unknown_weight,
            _ => 0.0,
        }
    }

    /// A duplicate only stops the load in silent mode.
    fn check_duplicate(&self, name: &str, silent_duplicate: bool) -> Result<(), LoadError> {
        if self.store.contains(name) {
            if silent_duplicate {
                return Err(LoadError::Duplicate {
                    name: name.to_string(),
                });
            }
            log::warn!("composite {name} is redefined");
        }
        Ok(())
    }

    fn check_writable(&self, name: &str) -> Result<(), LoadError> {
        if name.is_empty() {
            return Err(LoadError::EmptyName);
        }
        if self.store.is_finalized() {
            return Err(LoadError::Finalized {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn report<T>(result: Result<T, LoadError>) -> Result<T, LoadError> {
        if let Err(err) = &result {
            log::log!(err.level(), "{err}");
        }
        result
    }

    /// Loads a composite from a structured configuration node.
    ///
    /// An unknown `policy` is only detected after the composite has been
    /// stored and its symbol registered; both stay in place and the call
    /// still fails.
    pub fn add_from_node(
        &mut self,
        name: &str,
        node: &CompositeNode,
        silent_duplicate: bool,
    ) -> Result<&Composite, LoadError> {
        let idx = Self::report(self.try_add_from_node(name, node, silent_duplicate))?;
        Ok(self.store.composite(idx))
    }

    fn try_add_from_node(
        &mut self,
        name: &str,
        node: &CompositeNode,
        silent_duplicate: bool,
    ) -> Result<usize, LoadError> {
        self.check_writable(name)?;

        if !node.enabled() {
            return Err(LoadError::Disabled {
                name: name.to_string(),
            });
        }

        self.check_duplicate(name, silent_duplicate)?;

        let expression_text = node.expression().ok_or_else(|| LoadError::MissingExpression {
            name: name.to_string(),
        })?;
        let expression =
            self.engine
                .compile(expression_text)
                .map_err(|source| LoadError::Expression {
                    name: name.to_string(),
                    source,
                })?;

        let policy = node.policy();
        let mut groups = node.groups();
        if groups.is_empty() {
            groups.push(DEFAULT_GROUP.to_string());
        }
        let score = self.resolve_score(node.score());

        let idx = self.store.insert(Composite::new(
            name,
            expression,
            expression_text,
            score,
            policy.as_ref().copied().unwrap_or_default(),
            groups.clone(),
        ));

        let description = node.description().unwrap_or(expression_text);
        self.registry
            .register(name, score, description, &groups[0], node.priority(), 1);
        for group in &groups[1..] {
            self.registry.add_group(name, group);
        }

        policy.map_err(|UnknownPolicy(policy)| LoadError::UnknownPolicy {
            name: name.to_string(),
            policy,
        })?;

        Ok(idx)
    }

    /// Loads a composite from a bare expression.
    ///
    /// A NaN `score` falls back to the unknown weight, then to zero.
    pub fn add_from_expression(
        &mut self,
        name: &str,
        expression_text: &str,
        silent_duplicate: bool,
        score: f64,
    ) -> Result<&Composite, LoadError> {
        let idx = Self::report(self.try_add_from_expression(
            name,
            expression_text,
            silent_duplicate,
            score,
        ))?;
        Ok(self.store.composite(idx))
    }

    fn try_add_from_expression(
        &mut self,
        name: &str,
        expression_text: &str,
        silent_duplicate: bool,
        score: f64,
    ) -> Result<usize, LoadError> {
        self.check_writable(name)?;
        self.check_duplicate(name, silent_duplicate)?;

        let expression =
            self.engine
                .compile(expression_text)
                .map_err(|source| LoadError::Expression {
                    name: name.to_string(),
                    source,
                })?;

        let score = self.resolve_score(Some(score));
        self.registry
            .register(name, score, expression_text, DEFAULT_GROUP, 0, 1);

        Ok(self.store.insert(Composite::new(
            name,
            expression,
            expression_text,
            score,
            CompositePolicy::default(),
            vec![DEFAULT_GROUP.to_string()],
        )))
    }

    /// Loads a configuration entry that is either a node or a bare
    /// expression string.
    pub fn add_from_value(
        &mut self,
        name: &str,
        value: &Value,
        silent_duplicate: bool,
    ) -> Result<&Composite, LoadError> {
        match value {
            Value::Mapping(fields) => {
                let node = CompositeNode {
                    fields: fields.clone(),
                };
                self.add_from_node(name, &node, silent_duplicate)
            }
            Value::String(expression) => {
                self.add_from_expression(name, expression, silent_duplicate, f64::NAN)
            }
            _ => Self::report(Err(LoadError::InvalidDefinition {
                name: name.to_string(),
            })),
        }
    }
}
