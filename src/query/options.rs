//! Find options and their normalized form
//!
//! `FindOptions` is what callers build; `QuerySpec` is the checked, resolved
//! version the engine executes. Normalization resolves attribute names through
//! the classifier, expands URIs and rejects illegal option combinations before
//! any store is touched.

use std::fmt;

use serde_json::Value;

use crate::classifier::{Attribute, AttributeClassifier};
use crate::record::{ColumnDescriptor, DbValue};
use crate::term::Term;
use crate::uri::{Namespaces, RDF_TYPE, is_uri};
use crate::{Error, Result};

/// Which table a find-through value is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTarget {
    /// The related Source's URI
    Source,
    /// A literal property value
    Property,
}

impl JoinTarget {
    /// Values that look like URIs (contain `:`) match Sources
    pub fn detect(value: &str) -> Self {
        if value.contains(':') {
            JoinTarget::Source
        } else {
            JoinTarget::Property
        }
    }
}

#[derive(Debug, Clone)]
struct ThroughOption {
    predicate: String,
    value: String,
    target: Option<JoinTarget>,
    inverse: bool,
}

/// Options for `find_all` / `find_first` / `count`, built fluently:
///
/// ```ignore
/// let options = FindOptions::new()
///     .type_of("http://ex.org/Book")
///     .where_eq("workflow_state", 3)
///     .limit(10);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    conditions: Vec<(String, Value)>,
    negated: Vec<(String, Value)>,
    raw: Vec<(String, Vec<DbValue>)>,
    type_of: Option<String>,
    through: Vec<ThroughOption>,
    joins: Option<String>,
    order: Option<(String, bool)>,
    limit: Option<usize>,
    offset: Option<usize>,
    force_rdf: bool,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name = value`. Columns are matched relationally, anything else is a
    /// predicate condition answered by the triple store.
    pub fn where_eq(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((name.to_string(), value.into()));
        self
    }

    /// `name != value`, columns only
    pub fn where_not(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.negated.push((name.to_string(), value.into()));
        self
    }

    /// Raw SQL condition over `active_sources`, with `?` placeholders
    pub fn where_sql(mut self, sql: &str, values: Vec<DbValue>) -> Self {
        self.raw.push((sql.to_string(), values));
        self
    }

    /// Sugar for a find-through on `rdf:type`
    pub fn type_of(mut self, type_uri: &str) -> Self {
        self.type_of = Some(type_uri.to_string());
        self
    }

    /// Sources with a `predicate` relation to `value`. Whether `value` is a
    /// Source URI or a literal is guessed from the presence of `:`.
    pub fn find_through(mut self, predicate: &str, value: &str) -> Self {
        self.through.push(ThroughOption {
            predicate: predicate.to_string(),
            value: value.to_string(),
            target: None,
            inverse: false,
        });
        self
    }

    /// Like `find_through`, with the join target given explicitly
    pub fn find_through_as(mut self, predicate: &str, value: &str, target: JoinTarget) -> Self {
        self.through.push(ThroughOption {
            predicate: predicate.to_string(),
            value: value.to_string(),
            target: Some(target),
            inverse: false,
        });
        self
    }

    /// Sources that `subject` points to through `predicate`
    pub fn find_through_inv(mut self, predicate: &str, subject: &str) -> Self {
        self.through.push(ThroughOption {
            predicate: predicate.to_string(),
            value: subject.to_string(),
            target: Some(JoinTarget::Source),
            inverse: true,
        });
        self
    }

    /// Custom SQL join clause. Cannot be combined with find-through or type.
    pub fn joins(mut self, clause: &str) -> Self {
        self.joins = Some(clause.to_string());
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), false));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order = Some((column.to_string(), true));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Answer the whole query from the triple store
    pub fn force_rdf(mut self) -> Self {
        self.force_rdf = true;
        self
    }

    pub fn has_order(&self) -> bool {
        self.order.is_some()
    }
}

/// A column condition after type coercion
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCondition {
    pub column: String,
    pub value: DbValue,
    pub negated: bool,
}

/// A resolved find-through
#[derive(Debug, Clone, PartialEq)]
pub struct Through {
    pub predicate: String,
    /// Source URI for `JoinTarget::Source`, literal otherwise
    pub value: String,
    pub target: JoinTarget,
    pub inverse: bool,
}

impl Through {
    /// The object side as a triple term
    pub fn object_term(&self) -> Term {
        match self.target {
            JoinTarget::Source => Term::uri(self.value.clone()),
            JoinTarget::Property => Term::literal(self.value.clone()),
        }
    }
}

/// How a query spec is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPlan {
    /// SQL only
    Relational,
    /// Predicate conditions on the triple store, the rest in SQL
    Federated,
    /// Everything on the triple store, hydrated through the record store
    Triple,
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryPlan::Relational => "relational",
            QueryPlan::Federated => "federated",
            QueryPlan::Triple => "triple",
        };
        write!(f, "{}", name)
    }
}

/// Normalized, immutable query
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub columns: Vec<ColumnCondition>,
    /// (predicate URI, object) conditions for the triple store
    pub predicates: Vec<(String, Term)>,
    pub through: Vec<Through>,
    pub raw: Vec<(String, Vec<DbValue>)>,
    pub joins: Option<String>,
    /// (column, descending)
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub force_rdf: bool,
}

impl QuerySpec {
    pub fn normalize(options: &FindOptions, classifier: &AttributeClassifier, namespaces: &Namespaces) -> Result<Self> {
        let has_through = options.type_of.is_some() || !options.through.is_empty();
        if options.joins.is_some() && has_through {
            return Err(Error::InvalidQuery(
                "cannot pass custom joins with find_through or type".to_string(),
            ));
        }
        if options.joins.is_some() && options.force_rdf {
            return Err(Error::InvalidQuery("cannot pass custom joins with force_rdf".to_string()));
        }

        let mut columns = Vec::new();
        let mut predicates = Vec::new();
        for (name, value) in &options.conditions {
            match classifier.classify(name) {
                Attribute::Column(column) => columns.push(ColumnCondition {
                    value: coerce(&column, value, namespaces)?,
                    column: column.name,
                    negated: false,
                }),
                Attribute::Registered(predicate) | Attribute::Unregistered(predicate) => {
                    predicates.push((predicate, predicate_term(name, value, namespaces)?));
                }
            }
        }
        for (name, value) in &options.negated {
            let Some(column) = classifier.column(name) else {
                return Err(Error::InvalidQuery(format!(
                    "negative condition on predicate '{}' is not supported",
                    name
                )));
            };
            columns.push(ColumnCondition {
                value: coerce(column, value, namespaces)?,
                column: column.name.clone(),
                negated: true,
            });
        }

        let mut through = Vec::new();
        if let Some(type_uri) = &options.type_of {
            through.push(Through {
                predicate: RDF_TYPE.to_string(),
                value: namespaces.build_query_uri(type_uri)?.to_string(),
                target: JoinTarget::Source,
                inverse: false,
            });
        }
        for option in &options.through {
            let predicate = match classifier.classify(&option.predicate) {
                Attribute::Column(_) => {
                    return Err(Error::InvalidQuery(format!(
                        "'{}' is a column, not a predicate",
                        option.predicate
                    )));
                }
                Attribute::Registered(uri) | Attribute::Unregistered(uri) => uri,
            };
            let target = option.target.unwrap_or_else(|| JoinTarget::detect(&option.value));
            let value = match target {
                JoinTarget::Source => namespaces.build_query_uri(&option.value)?.to_string(),
                JoinTarget::Property => option.value.clone(),
            };
            through.push(Through { predicate, value, target, inverse: option.inverse });
        }

        if let Some((column, _)) = &options.order {
            if !classifier.is_column(column) && column != "id" {
                return Err(Error::InvalidQuery(format!("cannot order by '{}'", column)));
            }
        }

        Ok(Self {
            columns,
            predicates,
            through,
            raw: options.raw.clone(),
            joins: options.joins.clone(),
            order: options.order.clone(),
            limit: options.limit,
            offset: options.offset,
            force_rdf: options.force_rdf,
        })
    }

    pub fn plan(&self) -> QueryPlan {
        if self.force_rdf {
            QueryPlan::Triple
        } else if self.predicates.is_empty() {
            QueryPlan::Relational
        } else {
            QueryPlan::Federated
        }
    }
}

/// Typecast a condition value for its column. `uri` conditions accept bare
/// names and shortcuts.
fn coerce(column: &ColumnDescriptor, value: &Value, namespaces: &Namespaces) -> Result<DbValue> {
    let coerced = DbValue::from_json(column, value).map_err(|e| Error::InvalidQuery(e.to_string()))?;
    match coerced {
        DbValue::Text(uri) if column.name == "uri" => {
            Ok(DbValue::Text(namespaces.build_query_uri(&uri)?.to_string()))
        }
        other => Ok(other),
    }
}

/// Object of a predicate condition: `<uri>` or `{"uri": ..}` is a resource,
/// anything scalar is a literal.
fn predicate_term(name: &str, value: &Value, namespaces: &Namespaces) -> Result<Term> {
    match value {
        Value::String(s) => match s.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
            Some(inner) => Ok(Term::uri(namespaces.build_query_uri(inner)?.to_string())),
            None => Ok(Term::literal(s.clone())),
        },
        Value::Number(n) => Ok(Term::literal(n.to_string())),
        Value::Bool(b) => Ok(Term::literal(b.to_string())),
        Value::Object(map) => match map.get("uri").and_then(Value::as_str) {
            Some(uri) if is_uri(uri) => Ok(Term::uri(uri)),
            Some(uri) => Ok(Term::uri(namespaces.build_query_uri(uri)?.to_string())),
            None => Err(Error::InvalidQuery(format!("unsupported value for '{}': {}", name, value))),
        },
        _ => Err(Error::InvalidQuery(format!("unsupported value for '{}': {}", name, value))),
    }
}
