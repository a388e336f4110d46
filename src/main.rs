//! Codegraph CLI - maintenance and analysis commands over a code graph database

use clap::{Parser, Subcommand};
use codegraph::config::{self, CodegraphConfig};
use codegraph::indexer::IncrementalIndexer;
use codegraph::storage::{Database, MigrationManager};
use codegraph::QueryEngine;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "codegraph")]
#[command(version)]
#[command(about = "Persistent code knowledge graph - migrations, queries and graph analyses")]
#[command(long_about = r#"
Codegraph keeps a SQLite-backed graph of code entities and their relationships.

Example usage:
  codegraph init
  codegraph migrate
  codegraph callers --name parseConfig
  codegraph blast-radius --file src/config.ts --depth 2
  codegraph dead-code --limit 50
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Apply pending schema migrations
    Migrate,

    /// Roll back the most recently applied migration
    Rollback,

    /// List applied and pending migrations
    Migrations,

    /// Show entity, relationship and file counts
    Stats,

    /// Find entities calling the named entity
    Callers {
        #[arg(short, long)]
        name: String,
    },

    /// Find entities called by the named entity
    Callees {
        #[arg(short, long)]
        name: String,
    },

    /// Entities transitively depending on a file
    BlastRadius {
        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// Maximum traversal depth (defaults to the config)
        #[arg(long)]
        depth: Option<u32>,
    },

    /// Find circular dependencies
    Cycles {
        /// Only search from entities with this name
        #[arg(short, long)]
        entity: Option<String>,

        /// Stop after this many cycles, 0 = unlimited (defaults to the config)
        #[arg(long)]
        max_cycles: Option<usize>,
    },

    /// Find functions, classes and methods nothing references
    DeadCode {
        /// Include entities in test files
        #[arg(long)]
        include_tests: bool,

        /// Maximum number of findings
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Remove files that no longer exist under a directory from the graph
    Prune {
        /// Directory whose indexed files are checked
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let db_path = resolve_database_path(cli.database, &config)?;
    config::ensure_db_dir(&db_path)?;

    match cli.command {
        Commands::Init { force } => {
            let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let written = CodegraphConfig {
                database: Some(db_path.to_string_lossy().into_owned()),
                ..config.clone()
            };
            config::write_config(&config_path, &written, force)?;

            let db = Database::open(&db_path)?;
            let applied = MigrationManager::new(&db).applied()?.len();
            tracing::info!("Wrote {}, database at {}", config_path.display(), db_path.display());
            print_json(&serde_json::json!({
                "config": config_path,
                "database": db_path,
                "migrations": applied,
            }))?;
            db.close()?;
        }

        Commands::Migrate => {
            let db = Database::connect(&db_path)?;
            let applied = MigrationManager::new(&db).run()?;
            tracing::info!("Applied {} migrations to {}", applied, db_path.display());
            print_json(&serde_json::json!({ "applied": applied }))?;
            db.close()?;
        }

        Commands::Rollback => {
            let db = Database::connect(&db_path)?;
            let rolled_back = MigrationManager::new(&db).rollback()?;
            print_json(&serde_json::json!({ "rolledBack": rolled_back }))?;
            db.close()?;
        }

        Commands::Migrations => {
            let db = Database::connect(&db_path)?;
            let manager = MigrationManager::new(&db);
            let pending: Vec<_> = manager
                .pending()?
                .iter()
                .map(|m| serde_json::json!({ "version": m.version, "name": m.name }))
                .collect();
            print_json(&serde_json::json!({
                "applied": manager.applied()?,
                "pending": pending,
            }))?;
        }

        Commands::Stats => {
            let db = Database::open(&db_path)?;
            let stats = QueryEngine::new(&db).stats()?;
            tracing::debug!("\n{}", stats);
            print_json(&stats)?;
        }

        Commands::Callers { name } => {
            let db = Database::open(&db_path)?;
            print_json(&QueryEngine::new(&db).what_calls(&name)?)?;
        }

        Commands::Callees { name } => {
            let db = Database::open(&db_path)?;
            print_json(&QueryEngine::new(&db).what_does_call(&name)?)?;
        }

        Commands::BlastRadius { file, depth } => {
            let db = Database::open(&db_path)?;
            let source = codegraph::indexer::normalize_path(&file);
            let depth = depth.unwrap_or(config.analysis.blast_radius_depth);
            let result = QueryEngine::new(&db).blast_radius(&source.to_string_lossy(), depth)?;
            print_json(&result)?;
        }

        Commands::Cycles { entity, max_cycles } => {
            let db = Database::open(&db_path)?;
            let mut options = config.cycle_options(entity);
            if let Some(max_cycles) = max_cycles {
                options.max_cycles = max_cycles;
            }
            print_json(&QueryEngine::new(&db).find_cycles(&options)?)?;
        }

        Commands::DeadCode { include_tests, limit } => {
            let db = Database::open(&db_path)?;
            let options = config.dead_code_options(include_tests, limit);
            print_json(&QueryEngine::new(&db).find_dead_code(&options)?)?;
        }

        Commands::Prune { path } => {
            let db = Database::open(&db_path)?;
            let indexer = IncrementalIndexer::with_options(&db, config.indexer_options());
            let deleted = indexer.prune(&path)?;
            print_json(&deleted)?;
        }
    }

    Ok(())
}

fn resolve_database_path(cli_database: Option<PathBuf>, config: &CodegraphConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = cli_database {
        return Ok(path);
    }
    if let Some(path) = &config.database {
        return Ok(PathBuf::from(path));
    }
    let cwd = std::env::current_dir()?;
    Ok(config::default_database_path_in(Path::new(&cwd)))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
