use crate::expression::Expression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Group every composite lands in unless its definition names others.
pub const DEFAULT_GROUP: &str = "composite";

/// What happens to a composite's constituent symbols when the composite matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositePolicy {
    #[default]
    RemoveAll,
    RemoveSymbol,
    RemoveWeight,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown composite policy: {0}")]
pub struct UnknownPolicy(pub String);

impl FromStr for CompositePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remove" | "remove_all" | "default" => Ok(CompositePolicy::RemoveAll),
            "remove_symbol" => Ok(CompositePolicy::RemoveSymbol),
            "remove_weight" => Ok(CompositePolicy::RemoveWeight),
            "leave" | "remove_none" => Ok(CompositePolicy::Leave),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for CompositePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompositePolicy::RemoveAll => "remove_all",
            CompositePolicy::RemoveSymbol => "remove_symbol",
            CompositePolicy::RemoveWeight => "remove_weight",
            CompositePolicy::Leave => "leave",
        };
        f.write_str(name)
    }
}

/// A named meta-rule combining other symbols through a boolean expression.
///
/// Immutable once built by the loader. Whether it runs in the second pass is
/// kept by the store's schedule, not on the composite itself.
pub struct Composite {
    name: String,
    expression: Box<dyn Expression>,
    expression_text: String,
    score: f64,
    policy: CompositePolicy,
    groups: Vec<String>,
}

impl Composite {
    pub(crate) fn new(
        name: &str,
        expression: Box<dyn Expression>,
        expression_text: &str,
        score: f64,
        policy: CompositePolicy,
        groups: Vec<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            expression,
            expression_text: expression_text.to_string(),
            score,
            policy,
            groups,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &dyn Expression {
        self.expression.as_ref()
    }

    pub fn expression_text(&self) -> &str {
        &self.expression_text
    }

    /// Resolved score, never NaN.
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn policy(&self) -> CompositePolicy {
        self.policy
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("name", &self.name)
            .field("expression", &self.expression_text)
            .field("score", &self.score)
            .field("policy", &self.policy)
            .field("groups", &self.groups)
            .finish()
    }
}
