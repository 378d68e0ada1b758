//! aggplan CLI - plan and run aggregation queries
//!
//! Usage:
//!   aggplan validate --schema <schema.json>
//!   aggplan explain --schema <schema.json> --query <query.json> [--dialect <dialect>]
//!   aggplan run --schema <schema.json> --query <query.json> --database <file.db>
//!
//! Examples:
//!   aggplan explain --schema games.json --query top_players.json --dialect postgres
//!   RUST_LOG=aggplan=debug aggplan run --schema games.json --query top_players.json --database games.db

use aggplan::config::Settings;
use aggplan::executor::{open_cache, QueryEngine, SqliteConnectionProvider};
use aggplan::sql::Dialect;
use aggplan::{AggregationQuery, CancellationToken, Schema};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aggplan")]
#[command(about = "aggplan - compiles analytic queries over logical tables to multi-dialect SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a schema document (joins, references, grains)
    Validate {
        /// Schema file (.json or .toml)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Print the SQL a query compiles to
    Explain {
        #[arg(short, long)]
        schema: PathBuf,

        /// Query file (JSON)
        #[arg(short, long)]
        query: PathBuf,

        /// SQL dialect to generate (defaults to the configured one)
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },

    /// Execute a query against a SQLite database and print JSON rows
    Run {
        #[arg(short, long)]
        schema: PathBuf,

        #[arg(short, long)]
        query: PathBuf,

        /// SQLite database file
        #[arg(long)]
        database: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Duckdb,
    Postgres,
    Mysql,
    Tsql,
    Snowflake,
    Bigquery,
    Presto,
    Sqlite,
    Oracle,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Tsql => Dialect::TSql,
            DialectArg::Snowflake => Dialect::Snowflake,
            DialectArg::Bigquery => Dialect::BigQuery,
            DialectArg::Presto => Dialect::Presto,
            DialectArg::Sqlite => Dialect::Sqlite,
            DialectArg::Oracle => Dialect::Oracle,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { schema } => cmd_validate(&schema),
        Commands::Explain {
            schema,
            query,
            dialect,
        } => cmd_explain(&schema, &query, dialect),
        Commands::Run {
            schema,
            query,
            database,
        } => cmd_run(&schema, &query, &database),
    }
}

fn load_schema(path: &Path) -> Option<Schema> {
    match Schema::from_file(path) {
        Ok(schema) => Some(schema),
        Err(e) => {
            eprintln!("Error loading schema '{}': {}", path.display(), e);
            None
        }
    }
}

fn load_query(path: &Path) -> Option<AggregationQuery> {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path.display(), e);
            return None;
        }
    };
    match AggregationQuery::from_json_str(&source) {
        Ok(query) => Some(query),
        Err(e) => {
            eprintln!("Error parsing query '{}': {}", path.display(), e);
            None
        }
    }
}

fn load_settings() -> Option<Settings> {
    match Settings::load() {
        Ok(settings) => Some(settings),
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            None
        }
    }
}

fn cmd_validate(schema: &Path) -> ExitCode {
    let Some(schema_doc) = load_schema(schema) else {
        return ExitCode::FAILURE;
    };
    println!(
        "OK: {} is valid ({} tables)",
        schema.display(),
        schema_doc.tables().count()
    );
    ExitCode::SUCCESS
}

fn cmd_explain(schema: &Path, query: &Path, dialect: Option<DialectArg>) -> ExitCode {
    let (Some(schema), Some(query), Some(mut settings)) =
        (load_schema(schema), load_query(query), load_settings())
    else {
        return ExitCode::FAILURE;
    };
    if let Some(dialect) = dialect {
        settings.engine.default_dialect = dialect.into();
        for connection in settings.connections.values_mut() {
            connection.dialect = None;
        }
    }

    let engine = QueryEngine::new(Arc::new(schema), Arc::new(SqliteConnectionProvider::new()))
        .with_settings(settings);
    let explained = engine.begin().explain(&query);
    match explained {
        Ok(statements) => {
            println!("{}", statements.join(";\n\n"));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Planning error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(schema: &Path, query: &Path, database: &Path) -> ExitCode {
    let (Some(schema), Some(query), Some(mut settings)) =
        (load_schema(schema), load_query(query), load_settings())
    else {
        return ExitCode::FAILURE;
    };
    settings.engine.default_dialect = Dialect::Sqlite;
    settings.connections.clear();

    let provider = SqliteConnectionProvider::new().with_database("default", database);
    let mut engine = QueryEngine::new(Arc::new(schema), Arc::new(provider));
    match open_cache(&settings.cache) {
        Ok(Some(cache)) => engine = engine.with_cache(cache),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error opening cache: {}", e);
            return ExitCode::FAILURE;
        }
    }
    let engine = engine.with_settings(settings);

    let outcome = engine.begin().execute(&query, &CancellationToken::new());
    match outcome {
        Ok(result) => {
            let mut output = serde_json::json!({ "rows": result.to_json_records() });
            if let Some(total) = result.page_total {
                output["page_total"] = serde_json::json!(total);
            }
            match serde_json::to_string_pretty(&output) {
                Ok(text) => {
                    println!("{}", text);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error writing result: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            let kind = if e.is_client_error() { "Query error" } else { "Execution error" };
            eprintln!("{}: {}", kind, e);
            ExitCode::FAILURE
        }
    }
}
