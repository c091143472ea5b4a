use crate::composite::{Composite, CompositePolicy};
use crate::scheduler::{self, Schedule};
use crate::symbols::SymbolRegistry;
use serde::Serialize;
use std::collections::HashMap;

/// Owns every composite of one configuration generation.
///
/// Composites are kept in insertion order. A name lookup resolves to the
/// most recently inserted composite with that name; redefinitions do not
/// evict older entries. Once [`CompositeStore::process_dependencies`] has
/// run the store is finalized and accepts no further composites.
#[derive(Debug, Default)]
pub struct CompositeStore {
    composites: Vec<Composite>,
    by_name: HashMap<String, usize>,
    schedule: Option<Schedule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeSummary {
    pub name: String,
    pub expression: String,
    pub score: f64,
    pub policy: CompositePolicy,
    pub groups: Vec<String>,
}

impl From<&Composite> for CompositeSummary {
    fn from(composite: &Composite) -> Self {
        Self {
            name: composite.name().to_string(),
            expression: composite.expression_text().to_string(),
            score: composite.score(),
            policy: composite.policy(),
            groups: composite.groups().to_vec(),
        }
    }
}

/// Both evaluation phases, in insertion order.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub first_pass: Vec<CompositeSummary>,
    pub second_pass: Vec<CompositeSummary>,
}

impl CompositeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.composites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composites.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn find(&self, name: &str) -> Option<&Composite> {
        self.index_of(name).map(|idx| &self.composites[idx])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, idx: usize) -> Option<&Composite> {
        self.composites.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Composite> {
        self.composites.iter()
    }

    pub fn is_finalized(&self) -> bool {
        self.schedule.is_some()
    }

    /// Callers must check [`CompositeStore::is_finalized`] first.
    pub(crate) fn insert(&mut self, composite: Composite) -> usize {
        let idx = self.composites.len();
        self.by_name.insert(composite.name().to_string(), idx);
        self.composites.push(composite);
        idx
    }

    /// `idx` must come from [`CompositeStore::insert`].
    pub(crate) fn composite(&self, idx: usize) -> &Composite {
        &self.composites[idx]
    }

    /// Splits the composites into first and second pass.
    ///
    /// Must run once, after every composite of the generation is loaded.
    pub fn process_dependencies<R: SymbolRegistry + ?Sized>(&mut self, registry: &R) -> &Schedule {
        if self.schedule.is_some() {
            log::warn!("composite dependencies were already processed, keeping the existing schedule");
        } else {
            self.schedule = Some(scheduler::schedule(self, registry));
        }

        self.schedule.get_or_insert_with(Schedule::default)
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// Empty until dependencies are processed.
    pub fn first_pass(&self) -> impl Iterator<Item = &Composite> {
        self.phase(Schedule::first_pass)
    }

    /// Empty until dependencies are processed.
    pub fn second_pass(&self) -> impl Iterator<Item = &Composite> {
        self.phase(Schedule::second_pass)
    }

    fn phase<'a>(
        &'a self,
        select: fn(&Schedule) -> &[usize],
    ) -> impl Iterator<Item = &'a Composite> {
        self.schedule
            .as_ref()
            .map(select)
            .unwrap_or_default()
            .iter()
            .filter_map(move |&idx| self.composites.get(idx))
    }

    pub fn is_second_pass(&self, name: &str) -> bool {
        match (self.index_of(name), &self.schedule) {
            (Some(idx), Some(schedule)) => schedule.is_second_pass(idx),
            _ => false,
        }
    }

    pub fn report(&self) -> PhaseReport {
        PhaseReport {
            first_pass: self.first_pass().map(CompositeSummary::from).collect(),
            second_pass: self.second_pass().map(CompositeSummary::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionEngine;
    use crate::symbols::{Metric, SymbolFlags};
    use crate::testing::ScriptedEngine;

    fn composite(engine: &ScriptedEngine, name: &str, expr: &str) -> Composite {
        Composite::new(
            name,
            engine.compile(expr).unwrap(),
            expr,
            1.0,
            CompositePolicy::default(),
            vec!["composite".to_string()],
        )
    }

    #[test]
    fn test_lookup_and_order() {
        let engine = ScriptedEngine::new();
        let mut store = CompositeStore::new();
        store.insert(composite(&engine, "A", "X & Y"));
        store.insert(composite(&engine, "B", "A | Z"));

        assert_eq!(store.len(), 2);
        assert!(store.contains("A"));
        assert!(!store.contains("X"));
        assert_eq!(store.find("B").unwrap().expression_text(), "A | Z");
        let names: Vec<_> = store.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_redefinition_keeps_old_entry() {
        let engine = ScriptedEngine::new();
        let mut store = CompositeStore::new();
        store.insert(composite(&engine, "A", "X"));
        store.insert(composite(&engine, "A", "Y"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.find("A").unwrap().expression_text(), "Y");
        assert_eq!(store.get(0).unwrap().expression_text(), "X");
    }

    #[test]
    fn test_phases_empty_before_scheduling() {
        let engine = ScriptedEngine::new();
        let mut store = CompositeStore::new();
        store.insert(composite(&engine, "A", "X"));

        assert!(!store.is_finalized());
        assert_eq!(store.first_pass().count(), 0);
        assert_eq!(store.second_pass().count(), 0);
        assert!(!store.is_second_pass("A"));
    }

    #[test]
    fn test_report_after_scheduling() {
        let engine = ScriptedEngine::new();
        let mut metric = Metric::new();
        metric.declare("BAYES_SPAM", 5.0, SymbolFlags::CLASSIFIER);

        let mut store = CompositeStore::new();
        store.insert(composite(&engine, "PLAIN", "X & Y"));
        store.insert(composite(&engine, "STAT", "BAYES_SPAM & X"));
        store.process_dependencies(&metric);

        assert!(store.is_finalized());
        assert!(store.is_second_pass("STAT"));
        assert!(!store.is_second_pass("PLAIN"));

        let report = store.report();
        assert_eq!(report.first_pass.len(), 1);
        assert_eq!(report.first_pass[0].name, "PLAIN");
        assert_eq!(report.second_pass[0].name, "STAT");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["second_pass"][0]["policy"], "remove_all");
    }

    #[test]
    fn test_second_processing_keeps_schedule() {
        let engine = ScriptedEngine::new();
        let mut metric = Metric::new();
        let mut store = CompositeStore::new();
        store.insert(composite(&engine, "A", "LATE"));
        store.process_dependencies(&metric);
        assert!(!store.is_second_pass("A"));

        // Flags changing afterwards do not reshuffle a finalized store
        metric.declare("LATE", 0.0, SymbolFlags::POSTFILTER);
        store.process_dependencies(&metric);
        assert!(!store.is_second_pass("A"));
    }
}
