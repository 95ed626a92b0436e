use crate::{OutputMode, emit_success};
use anyhow::Context;
use owo_colors::OwoColorize;
use semlib::config::{LibraryConfig, ensure_db_dir, ensure_gitignore, load_config, write_config};
use semlib::ui::{
    ImportProgress, Icons, SourceRow, banner, header, info, muted, property, section, sources_table,
    stats_table, status, success, summary_row, uri, warn,
};
use semlib::{Error, FindOptions, Library, Source};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Arguments of `semlib find`
pub struct FindRequest {
    pub type_of: Option<String>,
    pub conditions: Vec<String>,
    pub negated: Vec<String>,
    pub through: Vec<String>,
    pub inverse: Vec<String>,
    pub token: Option<String>,
    pub partial: Option<String>,
    pub order: Option<String>,
    pub desc: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub rdf: bool,
    pub count: bool,
}

fn base_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

fn open_library(config_path: &Path) -> anyhow::Result<Library> {
    let config = match load_config(Some(config_path))? {
        Some(config) => config,
        None => {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            LibraryConfig::default()
        }
    };
    let library = Library::open(&config, base_dir(config_path))
        .with_context(|| format!("opening library for {}", config_path.display()))?;
    Ok(library)
}

fn split_assignment(assignment: &str) -> anyhow::Result<(&str, &str)> {
    assignment
        .split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| anyhow::anyhow!("expected name=value, got '{}'", assignment))
}

/// `name=value` pairs as an attribute map. Repeated names collect into an
/// array.
fn attribute_map(assignments: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut map = Map::new();
    for assignment in assignments {
        let (name, value) = split_assignment(assignment)?;
        let value = Value::String(value.to_string());
        match map.get_mut(name) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(name.to_string(), value);
            }
        }
    }
    Ok(map)
}

fn short(library: &Library, predicate: &str) -> String {
    library
        .namespaces()
        .shorten(predicate)
        .unwrap_or_else(|| predicate.to_string())
}

fn source_json(library: &Library, source: &mut Source) -> anyhow::Result<Value> {
    let columns: Map<String, Value> = source
        .record()
        .columns
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    let properties = source.properties(library)?;
    Ok(serde_json::json!({
        "uri": source.uri(),
        "id": source.id(),
        "columns": columns,
        "properties": properties,
    }))
}

pub fn run_init(config_path: &Path, force: bool, output_mode: OutputMode) -> anyhow::Result<()> {
    let config = LibraryConfig::default();
    write_config(config_path, &config, force)?;

    let base = base_dir(config_path);
    let records = config.records_path_in(base);
    ensure_db_dir(&records)?;
    ensure_gitignore(base)?;

    if output_mode.is_human() {
        banner(&format!("{}", "semlib".bold()), "Library initialized");
        status(Icons::FILE, "Config", &config_path.display().to_string());
        status(Icons::DATABASE, "Records", &records.display().to_string());
    } else {
        emit_success(output_mode, "init", serde_json::json!({
            "config": config_path,
            "records": records,
        }))?;
    }
    Ok(())
}

pub fn run_create(
    config_path: &Path,
    uri_arg: &str,
    types: &[String],
    assignments: &[String],
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let library = open_library(config_path)?;
    if library.exists(uri_arg)? {
        anyhow::bail!("{} already exists", uri_arg);
    }

    let types: Vec<&str> = types.iter().map(String::as_str).collect();
    let mut source = library.new_source(uri_arg, &types)?;
    let attributes = attribute_map(assignments)?;
    match source.update_attributes(&library, &attributes) {
        Err(Error::Validation(errors)) => {
            anyhow::bail!("{} is invalid: {}", source.uri(), errors.full_messages().join(", "))
        }
        other => other?,
    }

    if output_mode.is_human() {
        success(&format!("Created {}", source.uri()));
    } else {
        let data = source_json(&library, &mut source)?;
        emit_success(output_mode, "create", data)?;
    }
    Ok(())
}

pub fn run_show(config_path: &Path, uri_arg: &str, output_mode: OutputMode) -> anyhow::Result<()> {
    let library = open_library(config_path)?;
    let mut source = library.find(uri_arg)?;

    if !output_mode.is_human() {
        let data = source_json(&library, &mut source)?;
        return emit_success(output_mode, "show", data);
    }

    header(&uri(source.uri().as_str()));
    summary_row("label", &source.label(&library, None)?);
    section("Columns");
    for (name, value) in &source.record().columns {
        let rendered = value.lexical().unwrap_or_else(|| muted("null"));
        summary_row(name, &rendered);
    }

    let properties = source.properties(&library)?;
    section("Predicates");
    if properties.is_empty() {
        println!("  {}", muted("none"));
    }
    for (predicate, values) in &properties {
        property(&short(&library, predicate), values);
    }

    let inverse = source.inverse_predicates(&library)?;
    if !inverse.is_empty() {
        section("Referenced through");
        for predicate in inverse {
            summary_row(Icons::LINK, &short(&library, &predicate));
        }
    }
    Ok(())
}

pub fn run_set(
    config_path: &Path,
    uri_arg: &str,
    name: &str,
    values: &[String],
    append: bool,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let library = open_library(config_path)?;
    let mut source = library.find(uri_arg)?;

    if append {
        let collection = source.predicate(&library, name)?;
        collection.append_all(&library, values.iter().map(String::as_str))?;
    } else {
        let value = match values {
            [single] => Value::String(single.clone()),
            many => Value::Array(many.iter().cloned().map(Value::String).collect()),
        };
        source.set_attribute(&library, name, &value)?;
    }
    source.save(&library)?;

    if output_mode.is_human() {
        success(&format!("Updated {} on {}", name, source.uri()));
    } else {
        let data = source_json(&library, &mut source)?;
        emit_success(output_mode, "set", data)?;
    }
    Ok(())
}

fn find_options(request: &FindRequest) -> anyhow::Result<FindOptions> {
    let mut options = FindOptions::new();
    if let Some(type_of) = &request.type_of {
        options = options.type_of(type_of);
    }
    for condition in &request.conditions {
        let (name, value) = split_assignment(condition)?;
        options = options.where_eq(name, value);
    }
    for condition in &request.negated {
        let (name, value) = split_assignment(condition)?;
        options = options.where_not(name, value);
    }
    for through in &request.through {
        let (predicate, value) = split_assignment(through)?;
        options = options.find_through(predicate, value);
    }
    for inverse in &request.inverse {
        let (predicate, subject) = split_assignment(inverse)?;
        options = options.find_through_inv(predicate, subject);
    }
    if let Some(order) = &request.order {
        options = if request.desc {
            options.order_by_desc(order)
        } else {
            options.order_by(order)
        };
    }
    if let Some(limit) = request.limit {
        options = options.limit(limit);
    }
    if let Some(offset) = request.offset {
        options = options.offset(offset);
    }
    if request.rdf {
        options = options.force_rdf();
    }
    Ok(options)
}

pub fn run_find(config_path: &Path, request: &FindRequest, output_mode: OutputMode) -> anyhow::Result<()> {
    let library = open_library(config_path)?;
    let options = find_options(request)?;

    if request.count {
        let count = library.count(&options)?;
        if output_mode.is_human() {
            info("Matches", &count.to_string());
        } else {
            emit_success(output_mode, "count", serde_json::json!({ "count": count }))?;
        }
        return Ok(());
    }

    let mut sources = match (&request.token, &request.partial) {
        (Some(token), _) => library.find_by_uri_token(token, &options)?,
        (None, Some(fragment)) => library.find_by_partial_uri(fragment, &options)?,
        (None, None) => library.find_all(&options)?,
    };

    if !output_mode.is_human() {
        let data = sources
            .iter_mut()
            .map(|source| source_json(&library, source))
            .collect::<anyhow::Result<Vec<_>>>()?;
        return emit_success(output_mode, "find", Value::Array(data));
    }

    if sources.is_empty() {
        println!("{} No sources found.", Icons::CROSS);
        return Ok(());
    }

    let mut rows = Vec::with_capacity(sources.len());
    for source in &mut sources {
        let types: Vec<String> = source
            .types(&library)?
            .iter()
            .map(|t| short(&library, t.as_str()))
            .collect();
        let columns: Vec<String> = source
            .record()
            .columns
            .iter()
            .filter_map(|(name, value)| value.lexical().map(|v| format!("{}={}", name, v)))
            .collect();
        rows.push(SourceRow {
            id: source.id().map(|id| id.to_string()).unwrap_or_default(),
            uri: source.uri().to_string(),
            types: types.join(", "),
            columns: columns.join(" "),
        });
    }
    println!("{}", sources_table(&rows));
    summary_row(Icons::SEARCH, &format!("{} sources", rows.len()));
    Ok(())
}

/// Expand file arguments and glob patterns, keeping order and dropping
/// duplicates
fn import_files(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let mut matched = false;
        for entry in glob::glob(pattern).with_context(|| format!("bad pattern '{}'", pattern))? {
            let path = entry?;
            if path.is_file() && !files.contains(&path) {
                files.push(path);
            }
            matched = true;
        }
        if !matched {
            anyhow::bail!("no files match '{}'", pattern);
        }
    }
    Ok(files)
}

fn import_entry(library: &Library, entry: &Value) -> semlib::Result<String> {
    let Value::Object(map) = entry else {
        return Err(Error::InvalidAttribute(format!("import entries must be objects, got {}", entry)));
    };
    let uri_value = map
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidAttribute("import entry without a uri".to_string()))?;
    let types: Vec<&str> = match map.get("types") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(single)) => vec![single.as_str()],
        _ => Vec::new(),
    };

    let mut attributes = map.clone();
    attributes.remove("uri");
    attributes.remove("types");

    let mut source = if library.exists(uri_value)? {
        let mut existing = library.find(uri_value)?;
        for type_uri in &types {
            existing.predicate_set_uniq(library, "rdf:type", *type_uri)?;
        }
        existing
    } else {
        library.new_source(uri_value, &types)?
    };
    source.update_attributes(library, &attributes)?;
    Ok(source.uri().to_string())
}

pub fn run_import(config_path: &Path, patterns: &[String], output_mode: OutputMode) -> anyhow::Result<()> {
    let library = open_library(config_path)?;
    let files = import_files(patterns)?;

    let mut entries = Vec::new();
    for file in &files {
        let contents = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let value: Value =
            serde_json::from_str(&contents).with_context(|| format!("parsing {}", file.display()))?;
        match value {
            Value::Array(items) => entries.extend(items),
            other => entries.push(other),
        }
    }
    tracing::info!("Importing {} entries from {} files", entries.len(), files.len());

    let started = Instant::now();
    let run = library.import_run();
    let progress = ImportProgress::new(entries.len());
    let mut saved = 0;
    let mut failures = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        match import_entry(run.library(), entry) {
            Ok(imported) => {
                progress.set_message(&imported);
                saved += 1;
            }
            Err(e) => {
                tracing::warn!("Entry {} failed: {}", index, e);
                if output_mode.is_human() {
                    progress.println(&format!("{} entry {}: {}", Icons::CROSS, index, e));
                }
                failures.push(serde_json::json!({ "entry": index, "error": e.to_string() }));
            }
        }
        progress.inc();
    }
    drop(run);

    if output_mode.is_human() {
        progress.finish_with_summary(started.elapsed(), saved, failures.len());
        if !failures.is_empty() {
            warn(&format!("{} entries were not imported", failures.len()));
        }
    } else {
        emit_success(output_mode, "import", serde_json::json!({
            "files": files.len(),
            "saved": saved,
            "failed": failures,
        }))?;
    }
    Ok(())
}

pub fn run_destroy(config_path: &Path, uri_arg: &str, output_mode: OutputMode) -> anyhow::Result<()> {
    let library = open_library(config_path)?;
    let mut source = library.find(uri_arg)?;
    source.destroy(&library)?;

    if output_mode.is_human() {
        success(&format!("Destroyed {}", source.uri()));
    } else {
        emit_success(output_mode, "destroy", serde_json::json!({ "uri": source.uri() }))?;
    }
    Ok(())
}

pub fn run_stats(config_path: &Path, output_mode: OutputMode) -> anyhow::Result<()> {
    let library = open_library(config_path)?;
    let stats = library.stats()?;

    if output_mode.is_human() {
        header("Library statistics");
        println!(
            "{}",
            stats_table(&[
                ("Sources", stats.records.sources.to_string()),
                ("Relations", stats.records.relations.to_string()),
                ("Properties", stats.records.properties.to_string()),
                ("Triples", stats.triples.to_string()),
                ("Triple store", stats.triple_store.to_string()),
            ])
        );
    } else {
        emit_success(output_mode, "stats", serde_json::to_value(&stats)?)?;
    }
    Ok(())
}
