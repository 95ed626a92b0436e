//! Query engine implementation
//!
//! Turns a normalized [`QuerySpec`] into store calls:
//! - Relational: one SQL statement, find-through conditions as joins against
//!   `semantic_relations`
//! - Federated: predicate conditions answered by the triple store, the
//!   resulting subject URIs fed into the SQL statement as a candidate set
//! - Triple: every condition answered by the triple store, subjects hydrated
//!   through the record store
//!
//! Limit, offset and ordering are always applied by the final SQL statement,
//! so pagination is stable whichever plan runs.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::library::Library;
use crate::record::{DbValue, SourceRecord};
use crate::source::Source;
use crate::term::{PatternNode, QueryPattern};
use crate::triple_store::distinct_values;
use crate::{Error, Result};

use super::options::{ColumnCondition, FindOptions, JoinTarget, QueryPlan, QuerySpec, Through};

/// Variable bound to the subject in triple-store patterns
const SUBJECT: &str = "s";

/// Lower-cased last path segment of the URI
const LOCAL_NAME_LIKE: &str = "LOWER(substr(active_sources.uri, \
    length(rtrim(active_sources.uri, replace(active_sources.uri, '/', ''))) + 1)) LIKE ? ESCAPE '\\'";

const URI_LIKE: &str = "active_sources.uri LIKE ? ESCAPE '\\'";

/// SQL statement under construction. Join placeholders precede condition
/// placeholders in the statement text, so their values are kept apart.
#[derive(Debug, Default)]
struct SqlQuery {
    joins: Vec<String>,
    join_values: Vec<DbValue>,
    conditions: Vec<String>,
    values: Vec<DbValue>,
}

impl SqlQuery {
    /// Everything the record store can answer on its own
    fn relational(spec: &QuerySpec) -> Self {
        let mut sql = Self::default();
        for (n, through) in spec.through.iter().enumerate() {
            sql.add_through(n, through);
        }
        if let Some(joins) = &spec.joins {
            sql.joins.push(joins.clone());
        }
        for condition in &spec.columns {
            sql.add_column(condition);
        }
        sql.add_raw(spec);
        sql
    }

    /// Hydration of triple-store results: only what the triple store
    /// cannot check
    fn hydration(spec: &QuerySpec) -> Self {
        let mut sql = Self::default();
        for condition in spec.columns.iter().filter(|c| c.column == "uri") {
            sql.add_column(condition);
        }
        sql.add_raw(spec);
        sql
    }

    fn add_through(&mut self, n: usize, through: &Through) {
        if through.inverse {
            self.joins.push(format!(
                "JOIN semantic_relations sr{n} ON sr{n}.object_type = 'source' \
                 AND sr{n}.object_id = active_sources.id AND sr{n}.predicate_uri = ?"
            ));
            self.joins.push(format!(
                "JOIN active_sources sub{n} ON sub{n}.id = sr{n}.subject_id AND sub{n}.uri = ?"
            ));
        } else {
            self.joins.push(format!(
                "JOIN semantic_relations sr{n} ON sr{n}.subject_id = active_sources.id \
                 AND sr{n}.predicate_uri = ?"
            ));
            let object_join = match through.target {
                JoinTarget::Source => format!(
                    "JOIN active_sources obj{n} ON sr{n}.object_type = 'source' \
                     AND obj{n}.id = sr{n}.object_id AND obj{n}.uri = ?"
                ),
                JoinTarget::Property => format!(
                    "JOIN semantic_properties prop{n} ON sr{n}.object_type = 'property' \
                     AND prop{n}.id = sr{n}.object_id AND prop{n}.value = ?"
                ),
            };
            self.joins.push(object_join);
        }
        self.join_values.push(DbValue::Text(through.predicate.clone()));
        self.join_values.push(DbValue::Text(through.value.clone()));
    }

    fn add_column(&mut self, condition: &ColumnCondition) {
        let op = if condition.negated { "IS NOT" } else { "IS" };
        self.conditions.push(format!("active_sources.{} {} ?", condition.column, op));
        self.values.push(condition.value.clone());
    }

    fn add_raw(&mut self, spec: &QuerySpec) {
        for (fragment, values) in &spec.raw {
            self.conditions.push(format!("({})", fragment));
            self.values.extend(values.iter().cloned());
        }
    }

    /// Restrict to a candidate URI set, passed as one JSON array
    fn restrict_to(&mut self, uris: &[String]) -> Result<()> {
        self.conditions
            .push("active_sources.uri IN (SELECT value FROM json_each(?))".to_string());
        self.values.push(DbValue::Text(serde_json::to_string(uris)?));
        Ok(())
    }

    fn from_clause(&self) -> String {
        let mut clause = String::from("FROM active_sources");
        for join in &self.joins {
            clause.push(' ');
            clause.push_str(join);
        }
        if !self.conditions.is_empty() {
            clause.push_str(" WHERE ");
            clause.push_str(&self.conditions.join(" AND "));
        }
        clause
    }

    fn params(&self) -> Vec<DbValue> {
        self.join_values.iter().chain(self.values.iter()).cloned().collect()
    }

    fn select(&self, spec: &QuerySpec) -> (String, Vec<DbValue>) {
        let mut sql = format!("SELECT DISTINCT active_sources.* {}", self.from_clause());
        let mut params = self.params();

        // id breaks ties so a fixed limit/offset pair always sees the same rows
        match &spec.order {
            Some((column, descending)) => {
                let direction = if *descending { "DESC" } else { "ASC" };
                sql.push_str(&format!(" ORDER BY active_sources.{} {}", column, direction));
                if column != "id" {
                    sql.push_str(", active_sources.id");
                }
            }
            None => sql.push_str(" ORDER BY active_sources.id"),
        }

        if spec.limit.is_some() || spec.offset.is_some() {
            let limit = spec.limit.map(|l| l as i64).unwrap_or(-1);
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(DbValue::Integer(limit));
            params.push(DbValue::Integer(spec.offset.unwrap_or(0) as i64));
        }
        (sql, params)
    }

    fn count(&self) -> (String, Vec<DbValue>) {
        (
            format!("SELECT COUNT(DISTINCT active_sources.id) {}", self.from_clause()),
            self.params(),
        )
    }
}

/// Query engine for Source finders
pub struct QueryEngine<'a> {
    library: &'a Library,
}

impl<'a> QueryEngine<'a> {
    /// Create a new query engine
    pub fn new(library: &'a Library) -> Self {
        Self { library }
    }

    /// Find one Source by URI. Record store only.
    pub fn find(&self, uri: &str) -> Result<Source> {
        let uri = self.library.namespaces().build_query_uri(uri)?;
        match self.library.records().find_by_uri(uri.as_str())? {
            Some(record) => Source::from_record(record),
            None => Err(Error::SourceNotFound(uri.to_string())),
        }
    }

    /// Find several Sources by URI, in request order. Fails on the first
    /// URI without a record.
    pub fn find_many(&self, uris: &[&str]) -> Result<Vec<Source>> {
        let mut seen = HashSet::new();
        let mut requested = Vec::new();
        for uri in uris {
            let uri = self.library.namespaces().build_query_uri(uri)?.to_string();
            if seen.insert(uri.clone()) {
                requested.push(uri);
            }
        }

        let mut records: BTreeMap<String, SourceRecord> = self
            .library
            .records()
            .find_by_uris(&requested)?
            .into_iter()
            .map(|r| (r.uri.clone(), r))
            .collect();

        requested
            .iter()
            .map(|uri| match records.remove(uri) {
                Some(record) => Source::from_record(record),
                None => Err(Error::SourceNotFound(uri.clone())),
            })
            .collect()
    }

    /// Same as `find_all` with limit 1 and offset 0
    pub fn find_first(&self, options: &FindOptions) -> Result<Option<Source>> {
        let options = options.clone().limit(1).offset(0);
        Ok(self.find_all(&options)?.into_iter().next())
    }

    pub fn find_all(&self, options: &FindOptions) -> Result<Vec<Source>> {
        let spec = self.normalize(options)?;
        self.execute(&spec)
    }

    /// Number of matching Sources, ignoring limit and offset
    pub fn count(&self, options: &FindOptions) -> Result<usize> {
        let spec = self.normalize(options)?;
        let Some(sql) = self.prepare(&spec)? else {
            return Ok(0);
        };
        let (statement, params) = sql.count();
        self.library.records().count_query(&statement, &params)
    }

    pub fn normalize(&self, options: &FindOptions) -> Result<QuerySpec> {
        QuerySpec::normalize(options, self.library.classifier(), self.library.namespaces())
    }

    /// Run a normalized query
    pub fn execute(&self, spec: &QuerySpec) -> Result<Vec<Source>> {
        let Some(sql) = self.prepare(spec)? else {
            return Ok(Vec::new());
        };
        let (statement, params) = sql.select(spec);
        self.library
            .records()
            .query_sources(&statement, &params)?
            .into_iter()
            .map(Source::from_record)
            .collect()
    }

    /// Build the final SQL statement, running the triple-store part of the
    /// plan first. `None` when the triple store already ruled out every
    /// Source.
    fn prepare(&self, spec: &QuerySpec) -> Result<Option<SqlQuery>> {
        let plan = spec.plan();
        debug!(
            "Query plan {} ({} column, {} predicate, {} through conditions)",
            plan,
            spec.columns.len(),
            spec.predicates.len(),
            spec.through.len()
        );

        let (mut sql, candidates) = match plan {
            QueryPlan::Relational => return Ok(Some(SqlQuery::relational(spec))),
            QueryPlan::Federated => (SqlQuery::relational(spec), self.predicate_candidates(spec)?),
            QueryPlan::Triple => (SqlQuery::hydration(spec), self.triple_candidates(spec)?),
        };
        debug!("Triple store matched {} candidate subjects", candidates.len());
        if candidates.is_empty() {
            return Ok(None);
        }
        sql.restrict_to(&candidates)?;
        Ok(Some(sql))
    }

    /// Subjects satisfying every predicate condition
    fn predicate_candidates(&self, spec: &QuerySpec) -> Result<Vec<String>> {
        let patterns: Vec<QueryPattern> = spec
            .predicates
            .iter()
            .map(|(predicate, object)| {
                QueryPattern::new(
                    PatternNode::var(SUBJECT),
                    PatternNode::uri(predicate.clone()),
                    PatternNode::Fixed(object.clone()),
                )
            })
            .collect();
        let solutions = self.library.triples().query(&patterns)?;
        Ok(distinct_values(&solutions, SUBJECT))
    }

    /// Subjects satisfying the whole query on the triple store. Column
    /// conditions are checked against the dupe triples.
    fn triple_candidates(&self, spec: &QuerySpec) -> Result<Vec<String>> {
        let namespaces = self.library.namespaces();
        let subject = || PatternNode::var(SUBJECT);

        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for condition in spec.columns.iter().filter(|c| c.column != "uri") {
            let predicate = PatternNode::uri(namespaces.db_field_predicate(&condition.column));
            // NULL columns have no dupe triple
            let (object, present) = match condition.value.lexical() {
                Some(lexical) => (PatternNode::literal(lexical), !condition.negated),
                None => (PatternNode::Any, condition.negated),
            };
            let pattern = QueryPattern::new(subject(), predicate, object);
            if present {
                positive.push(pattern);
            } else {
                negative.push(pattern);
            }
        }
        for (predicate, object) in &spec.predicates {
            positive.push(QueryPattern::new(
                subject(),
                PatternNode::uri(predicate.clone()),
                PatternNode::Fixed(object.clone()),
            ));
        }
        for through in &spec.through {
            let pattern = if through.inverse {
                QueryPattern::new(
                    PatternNode::uri(through.value.clone()),
                    PatternNode::uri(through.predicate.clone()),
                    subject(),
                )
            } else {
                QueryPattern::new(
                    subject(),
                    PatternNode::uri(through.predicate.clone()),
                    PatternNode::Fixed(through.object_term()),
                )
            };
            positive.push(pattern);
        }
        if positive.is_empty() {
            positive.push(QueryPattern::new(subject(), PatternNode::Any, PatternNode::Any));
        }

        let triples = self.library.triples();
        let mut solutions = triples.query(&positive)?;
        for pattern in &negative {
            solutions = triples.filter_not_exists(solutions, pattern)?;
        }
        Ok(distinct_values(&solutions, SUBJECT))
    }

    // ========== Partial finders ==========

    /// Sources whose local name (the part after the last `/`) contains
    /// `token`, case-insensitively. Ordered by URI unless `options` say
    /// otherwise.
    pub fn find_by_uri_token(&self, token: &str, options: &FindOptions) -> Result<Vec<Source>> {
        let pattern = format!("%{}%", escape_like(&token.to_lowercase()));
        let options = by_uri(options.clone().where_sql(LOCAL_NAME_LIKE, vec![DbValue::Text(pattern)]));
        self.find_all(&options)
    }

    /// Sources in the namespace registered as `prefix` whose local part
    /// starts with `local_part`. Unknown prefixes find nothing.
    pub fn find_by_partial_local(&self, prefix: &str, local_part: &str, options: &FindOptions) -> Result<Vec<Source>> {
        let Some(base) = self.library.namespaces().get(prefix) else {
            return Ok(Vec::new());
        };
        let pattern = format!("{}{}%", escape_like(base), escape_like(local_part));
        let options = by_uri(options.clone().where_sql(URI_LIKE, vec![DbValue::Text(pattern)]));
        self.find_all(&options)
    }

    /// Sources whose URI contains `fragment` anywhere
    pub fn find_by_partial_uri(&self, fragment: &str, options: &FindOptions) -> Result<Vec<Source>> {
        let pattern = format!("%{}%", escape_like(fragment));
        let options = options.clone().where_sql(URI_LIKE, vec![DbValue::Text(pattern)]);
        self.find_all(&options)
    }
}

/// Escape `LIKE` wildcards so user text matches literally
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn by_uri(options: FindOptions) -> FindOptions {
    if options.has_order() {
        options
    } else {
        options.order_by("uri")
    }
}
