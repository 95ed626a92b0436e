//! RDF terms, triples and patterns
//!
//! Everything the triple store sees reduces to three shapes:
//! - `Triple`: a concrete (subject, predicate, object) statement
//! - `TriplePattern`: a triple with optional positions (`None` = wildcard)
//! - `QueryPattern`: a triple with variables, joined by name across patterns

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An RDF node in object position: either a resource URI or a plain literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Term {
    /// A resource, identified by its URI
    Uri(String),
    /// A literal value
    Literal(String),
}

impl Term {
    pub fn uri(value: impl Into<String>) -> Self {
        Term::Uri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(value.into())
    }

    /// The lexical value, regardless of kind
    pub fn value(&self) -> &str {
        match self {
            Term::Uri(v) | Term::Literal(v) => v,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Term::Uri(_))
    }

    /// Short tag used by storage backends
    pub fn kind_str(&self) -> &'static str {
        match self {
            Term::Uri(_) => "uri",
            Term::Literal(_) => "literal",
        }
    }

    pub fn from_parts(kind: &str, value: String) -> Self {
        if kind == "uri" {
            Term::Uri(value)
        } else {
            Term::Literal(value)
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Uri(v) => write!(f, "<{}>", v),
            Term::Literal(v) => write!(f, "{:?}", v),
        }
    }
}

/// A single RDF statement. Subjects and predicates are always URIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}> <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// A triple with optional positions. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub object: Option<Term>,
}

impl TriplePattern {
    pub fn new(subject: Option<String>, predicate: Option<String>, object: Option<Term>) -> Self {
        Self { subject, predicate, object }
    }

    /// All triples for one (subject, predicate) pair
    pub fn subject_predicate(subject: impl Into<String>, predicate: impl Into<String>) -> Self {
        Self::new(Some(subject.into()), Some(predicate.into()), None)
    }

    /// Everything said about a subject
    pub fn about(subject: impl Into<String>) -> Self {
        Self::new(Some(subject.into()), None, None)
    }

    /// Everything pointing at a resource
    pub fn pointing_to(object: impl Into<String>) -> Self {
        Self::new(None, None, Some(Term::Uri(object.into())))
    }

    pub fn exact(triple: &Triple) -> Self {
        Self::new(
            Some(triple.subject.clone()),
            Some(triple.predicate.clone()),
            Some(triple.object.clone()),
        )
    }

    pub fn matches(&self, triple: &Triple) -> bool {
        self.subject.as_ref().is_none_or(|s| *s == triple.subject)
            && self.predicate.as_ref().is_none_or(|p| *p == triple.predicate)
            && self.object.as_ref().is_none_or(|o| *o == triple.object)
    }
}

/// One position of a query pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternNode {
    /// Binds (or must agree with) the named variable
    Var(String),
    /// A fixed term
    Fixed(Term),
    /// Matches anything, binds nothing
    Any,
}

impl PatternNode {
    pub fn var(name: impl Into<String>) -> Self {
        PatternNode::Var(name.into())
    }

    pub fn uri(value: impl Into<String>) -> Self {
        PatternNode::Fixed(Term::Uri(value.into()))
    }

    pub fn literal(value: impl Into<String>) -> Self {
        PatternNode::Fixed(Term::Literal(value.into()))
    }
}

/// A triple pattern with variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPattern {
    pub subject: PatternNode,
    pub predicate: PatternNode,
    pub object: PatternNode,
}

impl QueryPattern {
    pub fn new(subject: PatternNode, predicate: PatternNode, object: PatternNode) -> Self {
        Self { subject, predicate, object }
    }

    /// Resolve the pattern under the given bindings into a plain
    /// `TriplePattern`. Returns `None` if a bound variable cannot take the
    /// required position (a literal bound into subject or predicate).
    pub fn resolve(&self, bindings: &Bindings) -> Option<TriplePattern> {
        let resource = |node: &PatternNode| -> Option<Option<String>> {
            match node {
                PatternNode::Any => Some(None),
                PatternNode::Fixed(Term::Uri(v)) => Some(Some(v.clone())),
                PatternNode::Fixed(Term::Literal(_)) => None,
                PatternNode::Var(name) => match bindings.get(name) {
                    None => Some(None),
                    Some(Term::Uri(v)) => Some(Some(v.clone())),
                    Some(Term::Literal(_)) => None,
                },
            }
        };
        let subject = resource(&self.subject)?;
        let predicate = resource(&self.predicate)?;
        let object = match &self.object {
            PatternNode::Any => None,
            PatternNode::Fixed(term) => Some(term.clone()),
            PatternNode::Var(name) => bindings.get(name).cloned(),
        };
        Some(TriplePattern::new(subject, predicate, object))
    }

    /// Extend the bindings with the variables this pattern binds in `triple`.
    pub fn bind(&self, triple: &Triple, bindings: &Bindings) -> Bindings {
        let mut next = bindings.clone();
        if let PatternNode::Var(name) = &self.subject {
            next.insert(name.clone(), Term::Uri(triple.subject.clone()));
        }
        if let PatternNode::Var(name) = &self.predicate {
            next.insert(name.clone(), Term::Uri(triple.predicate.clone()));
        }
        if let PatternNode::Var(name) = &self.object {
            next.insert(name.clone(), triple.object.clone());
        }
        next
    }
}

/// Variable name → bound term
pub type Bindings = BTreeMap<String, Term>;
