//! Triple Store - the semantic side of the dual store
//!
//! Every backend implements [`TripleStore`]: add, delete by pattern and
//! match by pattern. Conjunctive queries over variables are answered by a
//! nested-loop join on top of `matching`, so a backend only has to provide
//! the primitive operations.
//!
//! Backends:
//! - [`MemoryTripleStore`]: indexed in-memory quads, used for tests and as
//!   the default when no triple database is configured
//! - [`crate::storage::SqliteTripleStore`]: persistent quads in SQLite

mod memory;

pub use memory::MemoryTripleStore;

use crate::Result;
use crate::term::{Bindings, QueryPattern, Triple, TriplePattern};

/// Access to an RDF triple store.
///
/// Methods take `&self`; backends use interior mutability.
/// A `context` names the graph a triple is written into. `None` on delete
/// means "in any context".
pub trait TripleStore {
    /// Short backend name for logs and stats
    fn name(&self) -> &'static str;

    /// Add a triple. Adding an existing triple is a no-op.
    fn add(&self, triple: &Triple, context: Option<&str>) -> Result<()>;

    /// Delete every triple matching the pattern, returning how many went away
    fn delete(&self, pattern: &TriplePattern, context: Option<&str>) -> Result<usize>;

    /// All distinct triples matching the pattern, across contexts
    fn matching(&self, pattern: &TriplePattern) -> Result<Vec<Triple>>;

    /// Number of stored triples
    fn len(&self) -> Result<usize>;

    /// Whether the backend keeps named contexts apart
    fn supports_contexts(&self) -> bool {
        false
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn contains(&self, pattern: &TriplePattern) -> Result<bool> {
        Ok(!self.matching(pattern)?.is_empty())
    }

    /// Answer a conjunction of patterns. Each returned binding set satisfies
    /// every pattern; variables shared between patterns join.
    fn query(&self, patterns: &[QueryPattern]) -> Result<Vec<Bindings>> {
        let mut solutions = vec![Bindings::new()];
        for pattern in patterns {
            let mut next = Vec::new();
            for bindings in &solutions {
                let Some(resolved) = pattern.resolve(bindings) else {
                    continue;
                };
                for triple in self.matching(&resolved)? {
                    if let Some(extended) = bind_consistent(pattern, &triple, bindings) {
                        next.push(extended);
                    }
                }
            }
            if next.is_empty() {
                return Ok(next);
            }
            solutions = next;
        }
        Ok(solutions)
    }

    /// Keep only the solutions for which the pattern has no match
    fn filter_not_exists(&self, solutions: Vec<Bindings>, pattern: &QueryPattern) -> Result<Vec<Bindings>> {
        let mut kept = Vec::with_capacity(solutions.len());
        for bindings in solutions {
            let matched = match pattern.resolve(&bindings) {
                Some(resolved) => self.contains(&resolved)?,
                None => false,
            };
            if !matched {
                kept.push(bindings);
            }
        }
        Ok(kept)
    }
}

/// Bind the pattern against a triple, rejecting it when a variable repeated
/// inside the pattern would take two different values.
fn bind_consistent(pattern: &QueryPattern, triple: &Triple, bindings: &Bindings) -> Option<Bindings> {
    let extended = pattern.bind(triple, bindings);
    pattern.resolve(&extended)?.matches(triple).then_some(extended)
}

/// Distinct values bound to one variable, in first-seen order
pub fn distinct_values(solutions: &[Bindings], variable: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    solutions
        .iter()
        .filter_map(|b| b.get(variable))
        .map(|term| term.value().to_string())
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
