use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::uri::Namespaces;

/// Triple database path that selects the in-memory triple store
pub const MEMORY_TRIPLES: &str = ":memory:";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Record store database (default `.semlib/records.db`)
    pub records: Option<String>,
    /// Triple store database (default `.semlib/triples.db`, `:memory:` for
    /// a throwaway in-memory store)
    pub triples: Option<String>,
    /// Base of URIs built from bare names
    pub local_namespace: String,
    /// Base of predicates given as bare names
    pub default_namespace: String,
    /// Context (named graph) for triple writes, if the store supports it
    pub rdf_context: Option<String>,
    /// Types added to every newly built Source
    pub default_types: Vec<String>,
    /// Extra namespace shortcuts (`prefix = "base uri"`)
    pub namespaces: BTreeMap<String, String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let defaults = Namespaces::default();
        Self {
            records: None,
            triples: None,
            local_namespace: defaults.local().to_string(),
            default_namespace: defaults.default_namespace().to_string(),
            rdf_context: None,
            default_types: Vec::new(),
            namespaces: BTreeMap::new(),
        }
    }
}

impl LibraryConfig {
    /// Namespace registry: built-ins, `local`, `default`, then the
    /// configured shortcuts
    pub fn build_namespaces(&self) -> Namespaces {
        let mut namespaces = Namespaces::new(&self.local_namespace, &self.default_namespace);
        for (prefix, base) in &self.namespaces {
            namespaces.register(prefix, base);
        }
        namespaces
    }

    pub fn records_path_in(&self, base: &Path) -> PathBuf {
        match &self.records {
            Some(path) => base.join(path),
            None => default_records_path_in(base),
        }
    }

    /// `None` means the in-memory triple store
    pub fn triples_path_in(&self, base: &Path) -> Option<PathBuf> {
        match self.triples.as_deref() {
            Some(MEMORY_TRIPLES) => None,
            Some(path) => Some(base.join(path)),
            None => Some(default_triples_path_in(base)),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("semlib.toml")
}

pub fn default_records_path_in(base: &Path) -> PathBuf {
    base.join(".semlib").join("records.db")
}

pub fn default_triples_path_in(base: &Path) -> PathBuf {
    base.join(".semlib").join("triples.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<LibraryConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: LibraryConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &LibraryConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> crate::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn ensure_gitignore(project_root: &Path) -> anyhow::Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let entry = ".semlib/";

    let mut content = String::new();
    if gitignore_path.exists() {
        content = std::fs::read_to_string(&gitignore_path)?;
        if content.lines().any(|line| line.trim() == entry) {
            return Ok(());
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
    }
    content.push_str(entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}
