//! Two-phase scheduling of composites.
//!
//! A composite that reads a post-filter, classifier or no-stat symbol cannot
//! be evaluated until those symbols exist, so it is deferred to the second
//! pass. Deferral propagates to every composite that references a deferred
//! composite, at any depth.

use crate::expression::is_operator_atom;
use crate::store::CompositeStore;
use crate::symbols::SymbolRegistry;

/// Partition of a store's composites into the two evaluation phases.
///
/// Indices refer to the store's insertion order. Both lists keep that order,
/// are disjoint, and together cover every composite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    deferred: Vec<bool>,
    first_pass: Vec<usize>,
    second_pass: Vec<usize>,
}

impl Schedule {
    pub fn first_pass(&self) -> &[usize] {
        &self.first_pass
    }

    pub fn second_pass(&self) -> &[usize] {
        &self.second_pass
    }

    pub fn is_second_pass(&self, idx: usize) -> bool {
        self.deferred.get(idx).copied().unwrap_or(false)
    }
}

/// Composite reference graph built from expression atoms.
struct DependencyGraph {
    /// Composites each composite references, by store index.
    edges: Vec<Vec<usize>>,
    deferred: Vec<bool>,
}

impl DependencyGraph {
    /// Collects composite references and seeds composites that directly read
    /// a late symbol.
    fn build<R: SymbolRegistry + ?Sized>(store: &CompositeStore, registry: &R) -> Self {
        let mut edges = Vec::with_capacity(store.len());
        let mut deferred = Vec::with_capacity(store.len());

        for composite in store.iter() {
            let mut refs = Vec::new();
            let mut direct = false;

            composite.expression().for_each_atom(&mut |atom| {
                if is_operator_atom(atom) {
                    return;
                }

                if let Some(dep) = store.index_of(atom) {
                    if !refs.contains(&dep) {
                        refs.push(dep);
                    }
                    return;
                }

                if !direct && registry.flags(atom).needs_second_pass() {
                    log::debug!("composite depends on second-pass symbol: {atom}");
                    direct = true;
                }
            });

            if direct {
                log::debug!(
                    "composite '{}' marked for second pass (direct dependency)",
                    composite.name()
                );
            }

            edges.push(refs);
            deferred.push(direct);
        }

        Self { edges, deferred }
    }

    /// Marks every composite that transitively references a deferred one.
    ///
    /// The marked set only grows, so this stops after at most one scan per
    /// composite, cycles included.
    fn close(&mut self, store: &CompositeStore) {
        loop {
            let mut changed = false;

            for (idx, refs) in self.edges.iter().enumerate() {
                if self.deferred[idx] {
                    continue;
                }

                if refs.iter().any(|&dep| self.deferred[dep]) {
                    self.deferred[idx] = true;
                    changed = true;
                    if let Some(composite) = store.get(idx) {
                        log::debug!(
                            "composite '{}' marked for second pass (transitive dependency)",
                            composite.name()
                        );
                    }
                }
            }

            if !changed {
                break;
            }
        }
    }
}

/// Computes the evaluation phases for every composite in `store`.
///
/// The result depends only on the composites and the registry flags; the
/// store itself is not touched.
pub fn schedule<R: SymbolRegistry + ?Sized>(store: &CompositeStore, registry: &R) -> Schedule {
    log::debug!("analyzing composite dependencies for two-phase evaluation");

    let mut graph = DependencyGraph::build(store, registry);
    graph.close(store);

    let (second_pass, first_pass): (Vec<usize>, Vec<usize>) =
        (0..store.len()).partition(|&idx| graph.deferred[idx]);

    log::debug!(
        "composite dependency analysis complete: {} first-pass, {} second-pass composites",
        first_pass.len(),
        second_pass.len()
    );

    Schedule {
        deferred: graph.deferred,
        first_pass,
        second_pass,
    }
}
