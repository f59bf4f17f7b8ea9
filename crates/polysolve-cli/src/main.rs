//! Polysolve CLI
//!
//! The `polysolve` command runs the role-based problem solving pipeline
//! against the HTTP capabilities configured in the environment.
//!
//! ## Commands
//!
//! - `solve`: Identify roles, research, fact check and refine a solution
//! - `config`: Print the effective pipeline configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polysolve_core::capability::http::{
    GenerationEndpoint, HttpSearchProvider, HttpTextGenerator, SearchEndpoint,
};
use polysolve_core::{Pipeline, PipelineConfig, ProblemStatement, RunState, SolveResult};
use polysolve_state::SurrealSessionStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

/// Exit code for a run that ended in `Failed`.
const EXIT_RUN_FAILED: i32 = 2;

#[derive(Parser)]
#[command(name = "polysolve")]
#[command(author = "Polysolve Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-role, evidence-grounded problem solving", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a problem statement
    Solve {
        /// The problem to solve
        problem: String,

        /// Session ID for continuity with earlier runs
        #[arg(short, long)]
        session: Option<String>,

        /// Pipeline configuration file (JSON); defaults come from POLYSOLVE_* variables
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the rendered result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Session store location (only opened with --session)
        #[arg(
            long,
            env = "POLYSOLVE_SESSION_DB",
            default_value = "surrealkv://.polysolve/sessions"
        )]
        session_db: String,
    },

    /// Print the effective pipeline configuration as JSON
    Config {
        /// Pipeline configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    polysolve_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Solve {
            problem,
            session,
            config,
            output,
            session_db,
        } => {
            let state = cmd_solve(
                &problem,
                session.as_deref(),
                config.as_deref(),
                output.as_deref(),
                &session_db,
                cli.json,
            )
            .await?;
            if state == RunState::Failed {
                std::process::exit(EXIT_RUN_FAILED);
            }
            Ok(())
        }
        Commands::Config { config } => cmd_config(config.as_deref()),
    }
}

/// Load the pipeline configuration from `path`, or from the environment
/// when no file is given, and validate it.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            serde_json::from_str::<PipelineConfig>(&raw)
                .with_context(|| format!("Config file is not valid JSON: {:?}", path))?
        }
        None => PipelineConfig::from_env(),
    };
    config.validate().context("Invalid pipeline configuration")?;
    Ok(config)
}

fn build_pipeline(config: PipelineConfig) -> Result<Pipeline> {
    let generator = HttpTextGenerator::new(GenerationEndpoint::from_env())
        .context("Failed to build text generation client")?;
    let search = HttpSearchProvider::new(SearchEndpoint::from_env())
        .context("Failed to build search client")?;
    Ok(Pipeline::new(Arc::new(generator), Arc::new(search), config))
}

fn render(result: &SolveResult, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(result)?)
    } else {
        Ok(result.to_markdown())
    }
}

/// Run the pipeline once and print or write the result.
async fn cmd_solve(
    problem: &str,
    session: Option<&str>,
    config_path: Option<&Path>,
    output: Option<&Path>,
    session_db: &str,
    json: bool,
) -> Result<RunState> {
    let config = load_config(config_path)?;
    let mut pipeline = build_pipeline(config)?;
    let mut statement = ProblemStatement::new(problem);

    if let Some(session_id) = session {
        statement = statement.with_session(session_id);
        // An unreachable store only costs continuity, not the run.
        match SurrealSessionStore::connect(session_db).await {
            Ok(store) => pipeline = pipeline.with_session_store(Arc::new(store)),
            Err(e) => warn!("Session store unavailable ({}): {}", session_db, e),
        }
    }

    info!("Solving problem ({} chars)", problem.len());
    let result = pipeline.run(statement).await;
    let rendered = render(&result, json)?;

    if let Some(path) = output {
        std::fs::write(path, &rendered).with_context(|| format!("Failed to write to {:?}", path))?;
        println!("Wrote result of run {} to {:?}", result.run_id, path);
    } else {
        println!("{}", rendered);
    }

    if let Some(fatal) = result.fatal_diagnostic() {
        eprintln!("Run failed at {}: {}", fatal.stage, fatal.message);
    }
    Ok(result.state)
}

fn cmd_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
