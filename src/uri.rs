//! Source URI - Global, immutable identity for every Source
//!
//! Format: `<scheme>:<rest>` with no whitespace anywhere.
//!
//! Examples:
//! - `http://www.example.org/books/moby-dick`
//! - `urn:isbn:0451450523`
//!
//! Names that do not look like URIs are placed in the local namespace
//! (see [`Namespaces::build_query_uri`]).

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
pub const DCNS: &str = "http://purl.org/dc/elements/1.1/";
pub const TALIA: &str = "http://talia.discovery-project.eu/wiki/TaliaInternal#";
pub const TALIA_DB: &str = "http://talia.discovery-project.eu/wiki/DatabaseField#";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

fn uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:\S+$").expect("static URI pattern is valid")
    })
}

/// Checks whether the string has the `scheme:rest` shape of a URI.
pub fn is_uri(candidate: &str) -> bool {
    uri_pattern().is_match(candidate)
}

/// Global, immutable URI of a Source.
///
/// This URI serves as the identity for:
/// - Source records in the record store
/// - Subjects and resource objects in the triple store
/// - Find-by-URI lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceUri(String);

impl SourceUri {
    /// Parse and validate a URI string
    pub fn parse(uri: &str) -> Result<Self> {
        if uri.is_empty() {
            return Err(Error::InvalidUri("URI must not be empty".to_string()));
        }
        if !is_uri(uri) {
            return Err(Error::InvalidUri(format!("<{}> does not look like an uri", uri)));
        }
        Ok(Self(uri.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The local part of the URI: whatever follows the last `#` or `/`.
    ///
    /// Falls back to the part after the scheme for URNs and the like.
    pub fn local_name(&self) -> &str {
        let uri = self.0.as_str();
        let tail = uri.rsplit(['#', '/']).next().unwrap_or(uri);
        if tail.is_empty() || tail.len() == uri.len() {
            uri.rsplit(':').next().unwrap_or(uri)
        } else {
            tail
        }
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for SourceUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for SourceUri {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SourceUri {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SourceUri::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Registry of namespace shortcuts (`prefix` → base URI).
///
/// `local` and `default` are always present; they come from the library
/// configuration.
#[derive(Debug, Clone)]
pub struct Namespaces {
    shortcuts: BTreeMap<String, String>,
}

impl Namespaces {
    pub fn new(local: impl Into<String>, default: impl Into<String>) -> Self {
        let mut shortcuts = BTreeMap::new();
        for (prefix, base) in [
            ("rdf", RDF),
            ("rdfs", RDFS),
            ("owl", OWL),
            ("dcns", DCNS),
            ("talia", TALIA),
            ("talia_db", TALIA_DB),
        ] {
            shortcuts.insert(prefix.to_string(), base.to_string());
        }
        shortcuts.insert("local".to_string(), local.into());
        shortcuts.insert("default".to_string(), default.into());
        Self { shortcuts }
    }

    /// Register (or override) a shortcut
    pub fn register(&mut self, prefix: impl Into<String>, base: impl Into<String>) {
        self.shortcuts.insert(prefix.into(), base.into());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.shortcuts.get(prefix).map(String::as_str)
    }

    pub fn local(&self) -> &str {
        self.get("local").unwrap_or_default()
    }

    pub fn default_namespace(&self) -> &str {
        self.get("default").unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.shortcuts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Expand a `prefix:name` shortcut. Returns `None` if the prefix is not
    /// registered.
    pub fn expand(&self, shortcut: &str) -> Option<String> {
        let (prefix, name) = shortcut.split_once(':')?;
        self.get(prefix).map(|base| format!("{}{}", base, name))
    }

    /// Build the URI for a find/new request.
    ///
    /// Registered shortcuts are expanded, URIs are kept, and any other name
    /// is placed in the local namespace.
    pub fn build_query_uri(&self, name: &str) -> Result<SourceUri> {
        let name = name.trim();
        if let Some(expanded) = self.expand(name) {
            return SourceUri::parse(&expanded);
        }
        if is_uri(name) {
            return SourceUri::parse(name);
        }
        SourceUri::parse(&format!("{}{}", self.local(), name))
    }

    /// The predicate that mirrors a relational column in the triple store
    pub fn db_field_predicate(&self, column: &str) -> String {
        if column == "type" {
            return RDF_TYPE.to_string();
        }
        let base = self.get("talia_db").unwrap_or(TALIA_DB);
        format!("{}{}", base, column)
    }

    /// Shorten a full URI into `prefix:name` if a registered namespace matches.
    ///
    /// The longest matching base wins.
    pub fn shorten(&self, uri: &str) -> Option<String> {
        self.shortcuts
            .iter()
            .filter(|(_, base)| !base.is_empty() && uri.starts_with(base.as_str()))
            .max_by_key(|(_, base)| base.len())
            .map(|(prefix, base)| format!("{}:{}", prefix, &uri[base.len()..]))
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new("http://localnode.org/", "http://default.semlib.org/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_parse() {
        let uri = SourceUri::parse("http://www.test.org/valid").unwrap();
        assert_eq!(uri.as_str(), "http://www.test.org/valid");
        assert_eq!(uri.to_string(), "http://www.test.org/valid");
        assert!(SourceUri::parse("foo:bar").is_ok());
    }

    #[test]
    fn test_invalid_uri() {
        assert!(SourceUri::parse("").is_err());
        assert!(SourceUri::parse("foobar").is_err());
        assert!(SourceUri::parse("foo:bar ").is_err());
        assert!(SourceUri::parse(":nothing").is_err());
        assert!(SourceUri::parse("http://a b").is_err());
    }

    #[test]
    fn test_local_name() {
        assert_eq!(SourceUri::parse("http://talia.org/one").unwrap().local_name(), "one");
        assert_eq!(SourceUri::parse("http://x.org/ns#pred").unwrap().local_name(), "pred");
        assert_eq!(SourceUri::parse("urn:isbn:123").unwrap().local_name(), "123");
    }

    #[test]
    fn test_build_query_uri() {
        let ns = Namespaces::default();
        assert_eq!(
            ns.build_query_uri("home_source").unwrap().as_str(),
            "http://localnode.org/home_source"
        );
        assert_eq!(
            ns.build_query_uri("http://x.org/a").unwrap().as_str(),
            "http://x.org/a"
        );
        assert_eq!(
            ns.build_query_uri("dcns:title").unwrap().as_str(),
            "http://purl.org/dc/elements/1.1/title"
        );
    }

    #[test]
    fn test_db_field_predicate_and_shorten() {
        let ns = Namespaces::default();
        let pred = ns.db_field_predicate("workflow_state");
        assert_eq!(pred, format!("{}workflow_state", TALIA_DB));
        assert_eq!(ns.shorten(&pred).unwrap(), "talia_db:workflow_state");
        assert_eq!(ns.db_field_predicate("type"), RDF_TYPE);
    }

    #[test]
    fn test_serde_as_string() {
        let uri = SourceUri::parse("http://x.org/a").unwrap();
        let json = serde_json::to_string(&uri).unwrap();
        assert_eq!(json, "\"http://x.org/a\"");
        let back: SourceUri = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uri);
        assert!(serde_json::from_str::<SourceUri>("\"nope\"").is_err());
    }
}
