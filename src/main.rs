//! semlib CLI - Command-line interface for the semantic library data layer

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "semlib")]
#[command(version)]
#[command(about = "Semantic digital-library data layer - Sources as relational records and RDF subjects")]
#[command(long_about = r#"
semlib keeps a library of Sources: every Source is a relational record and
an RDF subject at the same time.

Example usage:
  semlib init
  semlib create http://x.org/faust --type http://ex.org/Book --set dcns:title=Faust
  semlib find --type http://ex.org/Book --where workflow_state=3
  semlib import 'data/*.json'
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true, default_value = "semlib.toml")]
    config: PathBuf,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database directory
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Create a Source
    Create {
        /// URI or bare name (placed in the local namespace)
        uri: String,

        /// Types of the new Source
        #[arg(short, long = "type")]
        types: Vec<String>,

        /// Attributes as name=value (columns or predicates)
        #[arg(short, long = "set")]
        attributes: Vec<String>,
    },

    /// Show a Source with its columns and predicates
    Show {
        uri: String,
    },

    /// Set an attribute. Predicates are replaced unless --append is given.
    Set {
        uri: String,

        /// Column or predicate name
        name: String,

        /// One or more values; `<uri>` marks a resource
        #[arg(required = true)]
        values: Vec<String>,

        /// Append predicate values instead of replacing them
        #[arg(short, long)]
        append: bool,
    },

    /// Find Sources
    Find {
        /// Type filter
        #[arg(short, long = "type")]
        type_of: Option<String>,

        /// Conditions as name=value
        #[arg(short = 'w', long = "where")]
        conditions: Vec<String>,

        /// Negated column conditions as name=value
        #[arg(long = "not")]
        negated: Vec<String>,

        /// Find-through conditions as predicate=value
        #[arg(long)]
        through: Vec<String>,

        /// Inverse find-through conditions as predicate=subject
        #[arg(long)]
        inverse: Vec<String>,

        /// Match a token inside the local name
        #[arg(long, conflicts_with = "partial")]
        token: Option<String>,

        /// Match a fragment anywhere in the URI
        #[arg(long)]
        partial: Option<String>,

        /// Order by column
        #[arg(long)]
        order: Option<String>,

        /// Descending order
        #[arg(long, requires = "order")]
        desc: bool,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(short, long)]
        offset: Option<usize>,

        /// Answer the query from the triple store
        #[arg(long)]
        rdf: bool,

        /// Only print the number of matches
        #[arg(long)]
        count: bool,
    },

    /// Import Sources from JSON files (an object or an array of objects)
    Import {
        /// Files or glob patterns
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// Destroy a Source and everything it owns
    Destroy {
        uri: String,
    },

    /// Show statistics about both stores
    Stats,
}

/// Human-readable or JSON output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

/// Print a JSON success envelope (JSON mode only)
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode == OutputMode::Json {
        let envelope = serde_json::json!({
            "ok": true,
            "command": command,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };

    let result = match cli.command {
        Commands::Init { force } => commands::run_init(&cli.config, force, output_mode),
        Commands::Create { uri, types, attributes } => {
            commands::run_create(&cli.config, &uri, &types, &attributes, output_mode)
        }
        Commands::Show { uri } => commands::run_show(&cli.config, &uri, output_mode),
        Commands::Set { uri, name, values, append } => {
            commands::run_set(&cli.config, &uri, &name, &values, append, output_mode)
        }
        Commands::Find {
            type_of,
            conditions,
            negated,
            through,
            inverse,
            token,
            partial,
            order,
            desc,
            limit,
            offset,
            rdf,
            count,
        } => {
            let request = commands::FindRequest {
                type_of,
                conditions,
                negated,
                through,
                inverse,
                token,
                partial,
                order,
                desc,
                limit,
                offset,
                rdf,
                count,
            };
            commands::run_find(&cli.config, &request, output_mode)
        }
        Commands::Import { patterns } => commands::run_import(&cli.config, &patterns, output_mode),
        Commands::Destroy { uri } => commands::run_destroy(&cli.config, &uri, output_mode),
        Commands::Stats => commands::run_stats(&cli.config, output_mode),
    };

    if let Err(e) = &result {
        if output_mode.is_human() {
            semlib::ui::error(&format!("{:#}", e));
        } else {
            let envelope = serde_json::json!({ "ok": false, "error": format!("{:#}", e) });
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        std::process::exit(1);
    }
    Ok(())
}
