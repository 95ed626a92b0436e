//! In-memory triple store
//!
//! Quads are indexed by subject, and URI objects are indexed back to the
//! subjects pointing at them so inverse lookups don't scan the whole graph.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::term::{Term, Triple, TriplePattern};
use crate::{Error, Result};
use super::TripleStore;

/// (predicate, object, context) stored under a subject
type Entry = (String, Term, String);

#[derive(Debug, Default)]
struct Graph {
    /// Statements indexed by subject
    by_subject: HashMap<String, HashSet<Entry>>,
    /// URI object -> subject -> number of statements
    by_object: HashMap<String, HashMap<String, usize>>,
    len: usize,
}

impl Graph {
    fn insert(&mut self, triple: &Triple, context: &str) -> bool {
        let entry = (triple.predicate.clone(), triple.object.clone(), context.to_string());
        let inserted = self
            .by_subject
            .entry(triple.subject.clone())
            .or_default()
            .insert(entry);
        if inserted {
            if let Term::Uri(object) = &triple.object {
                *self
                    .by_object
                    .entry(object.clone())
                    .or_default()
                    .entry(triple.subject.clone())
                    .or_default() += 1;
            }
            self.len += 1;
        }
        inserted
    }

    fn remove(&mut self, subject: &str, entry: &Entry) {
        let Some(entries) = self.by_subject.get_mut(subject) else {
            return;
        };
        if !entries.remove(entry) {
            return;
        }
        if entries.is_empty() {
            self.by_subject.remove(subject);
        }
        if let Term::Uri(object) = &entry.1 {
            if let Some(subjects) = self.by_object.get_mut(object) {
                if let Some(count) = subjects.get_mut(subject) {
                    *count -= 1;
                    if *count == 0 {
                        subjects.remove(subject);
                    }
                }
                if subjects.is_empty() {
                    self.by_object.remove(object);
                }
            }
        }
        self.len -= 1;
    }

    /// Candidate subjects for a pattern, narrowed through the indexes
    fn candidate_subjects(&self, pattern: &TriplePattern) -> Vec<String> {
        match (&pattern.subject, &pattern.object) {
            (Some(subject), _) => vec![subject.clone()],
            (None, Some(Term::Uri(object))) => self
                .by_object
                .get(object)
                .map(|subjects| subjects.keys().cloned().collect())
                .unwrap_or_default(),
            _ => self.by_subject.keys().cloned().collect(),
        }
    }

    fn quads(&self, pattern: &TriplePattern) -> Vec<(Triple, String)> {
        let mut found = Vec::new();
        for subject in self.candidate_subjects(pattern) {
            let Some(entries) = self.by_subject.get(&subject) else {
                continue;
            };
            for (predicate, object, context) in entries {
                let triple = Triple::new(subject.clone(), predicate.clone(), object.clone());
                if pattern.matches(&triple) {
                    found.push((triple, context.clone()));
                }
            }
        }
        found
    }
}

/// Triple store holding everything in process memory
#[derive(Debug, Default)]
pub struct MemoryTripleStore {
    graph: Mutex<Graph>,
}

impl MemoryTripleStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn graph(&self) -> Result<MutexGuard<'_, Graph>> {
        self.graph
            .lock()
            .map_err(|_| Error::TripleStore("memory store lock poisoned".to_string()))
    }
}

impl TripleStore for MemoryTripleStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn add(&self, triple: &Triple, context: Option<&str>) -> Result<()> {
        self.graph()?.insert(triple, context.unwrap_or_default());
        Ok(())
    }

    fn delete(&self, pattern: &TriplePattern, context: Option<&str>) -> Result<usize> {
        let mut graph = self.graph()?;
        let doomed: Vec<(Triple, String)> = graph
            .quads(pattern)
            .into_iter()
            .filter(|(_, ctx)| context.is_none_or(|c| c == ctx.as_str()))
            .collect();
        for (triple, ctx) in &doomed {
            graph.remove(&triple.subject, &(triple.predicate.clone(), triple.object.clone(), ctx.clone()));
        }
        Ok(doomed.len())
    }

    fn matching(&self, pattern: &TriplePattern) -> Result<Vec<Triple>> {
        let graph = self.graph()?;
        let mut seen = HashSet::new();
        let mut triples: Vec<Triple> = graph
            .quads(pattern)
            .into_iter()
            .map(|(triple, _)| triple)
            .filter(|triple| seen.insert(triple.clone()))
            .collect();
        triples.sort_by(|a, b| {
            (&a.subject, &a.predicate, &a.object).cmp(&(&b.subject, &b.predicate, &b.object))
        });
        Ok(triples)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.graph()?.len)
    }

    fn supports_contexts(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: Term) -> Triple {
        Triple::new(s, p, o)
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = MemoryTripleStore::new();
        let t = triple("http://x.org/a", "http://x.org/p", Term::literal("v"));
        store.add(&t, None).unwrap();
        store.add(&t, None).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_matching_by_object() {
        let store = MemoryTripleStore::new();
        store.add(&triple("http://x.org/a", "http://x.org/p", Term::uri("http://x.org/t")), None).unwrap();
        store.add(&triple("http://x.org/b", "http://x.org/q", Term::uri("http://x.org/t")), None).unwrap();
        store.add(&triple("http://x.org/c", "http://x.org/p", Term::literal("http://x.org/t")), None).unwrap();

        let pointing = store.matching(&TriplePattern::pointing_to("http://x.org/t")).unwrap();
        let subjects: Vec<_> = pointing.iter().map(|t| t.subject.as_str()).collect();
        assert_eq!(subjects, vec!["http://x.org/a", "http://x.org/b"]);
    }

    #[test]
    fn test_delete_with_context() {
        let store = MemoryTripleStore::new();
        let t = triple("http://x.org/a", "http://x.org/p", Term::literal("v"));
        store.add(&t, Some("http://x.org/graph1")).unwrap();
        store.add(&t, Some("http://x.org/graph2")).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.matching(&TriplePattern::default()).unwrap().len(), 1);

        let removed = store.delete(&TriplePattern::exact(&t), Some("http://x.org/graph1")).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().unwrap(), 1);

        let removed = store.delete(&TriplePattern::about("http://x.org/a"), None).unwrap();
        assert_eq!(removed, 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_delete_updates_object_index() {
        let store = MemoryTripleStore::new();
        store.add(&triple("http://x.org/a", "http://x.org/p", Term::uri("http://x.org/t")), None).unwrap();
        store.delete(&TriplePattern::about("http://x.org/a"), None).unwrap();
        assert!(store.matching(&TriplePattern::pointing_to("http://x.org/t")).unwrap().is_empty());
    }
}
