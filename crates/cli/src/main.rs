//! Sieve CLI
//!
//! Validate single submissions, inspect gaps of the persisted dataset, and
//! drive the collection loop with fixture replay agents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sieve_core::agents::ReplayAgent;
use sieve_core::protocol::DataSubmission;
use sieve_core::state::{io, AuditStore};
use sieve_core::{gaps, AcceptedDataset, AgentRegistry, EngineConfig, Orchestrator, OrchestratorCommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Sieve - research data validation and collection orchestration")]
struct Args {
    /// Engine configuration (TOML). Defaults to .sieve/config.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run one submission through the validation pipeline and print the decision
    Validate {
        /// Submission JSON file
        file: PathBuf,
    },
    /// Print the gaps of the persisted accepted dataset
    Gaps {
        /// Audit store to read (default: .sieve/sieve.db)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Run the collection loop with fixture replay agents
    Run {
        /// Directory of agent fixture files (*.json)
        #[arg(short, long)]
        fixtures: PathBuf,
        /// Audit store to write (default: .sieve/sieve.db)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Keep the audit trail in memory only
        #[arg(long)]
        no_store: bool,
        /// Exit with an error when requirements remain unmet
        #[arg(long)]
        strict: bool,
    },
    /// Print the default configuration as TOML
    DefaultConfig,
}

fn open_store(db: Option<PathBuf>) -> Result<AuditStore> {
    match db {
        Some(path) => AuditStore::open_at(path),
        None => AuditStore::open(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn validate(config: EngineConfig, file: PathBuf) -> Result<()> {
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read submission: {:?}", file))?;
    let submission: DataSubmission = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse submission: {:?}", file))?;

    let orchestrator = Orchestrator::new(config, AgentRegistry::default())?;
    let (outcome, decision) = orchestrator.evaluate(&submission);

    print_json(&serde_json::json!({
        "submission_id": submission.id,
        "data_type": submission.data_type(),
        "results": outcome.results,
        "combined_score": outcome.combined_score,
        "short_circuited": outcome.short_circuited,
        "decision": decision
    }))
}

fn show_gaps(config: EngineConfig, db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db)?;
    let dataset = AcceptedDataset::from_records(store.load_accepted()?);

    print_json(&serde_json::json!({
        "records": dataset.len(),
        "completeness": gaps::completeness(&dataset, &config.requirements),
        "gaps": gaps::analyze(&dataset, &config.requirements),
        "latest_report": store.latest_report()?
    }))
}

async fn run(
    config: EngineConfig,
    fixtures: PathBuf,
    db: Option<PathBuf>,
    no_store: bool,
    strict: bool,
) -> Result<()> {
    let mut agents = AgentRegistry::new(config.source.fabrication_markers.clone());
    for agent in ReplayAgent::load_dir(&fixtures)? {
        agents.register(agent);
    }
    if agents.is_empty() {
        anyhow::bail!("No fixture agents found in {:?}", fixtures);
    }

    let store = if no_store {
        AuditStore::open_in_memory()?
    } else {
        io::ensure_runtime_dir().await?;
        open_store(db)?
    };
    let store = Arc::new(store);
    let dataset = AcceptedDataset::from_records(store.load_accepted()?);

    let (command_tx, command_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current iteration");
            let _ = command_tx.send(OrchestratorCommand::Stop).await;
        }
    });

    let mut orchestrator = Orchestrator::new(config, agents)?
        .with_dataset(dataset)
        .with_store(store)
        .with_command_channel(command_rx);

    let outcome = orchestrator.run().await?;
    print_json(&serde_json::json!({
        "status": outcome.status,
        "summary": outcome.summary,
        "report": outcome.report
    }))?;

    for (agent_id, entries) in orchestrator.agents().logs() {
        tracing::debug!(agent = %agent_id, entries = entries.len(), "agent execution log");
    }

    if strict {
        outcome.ensure_complete()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = || io::load_config(args.config.as_deref());

    match args.command {
        CliCommand::Validate { ref file } => validate(config().await?, file.clone()).await,
        CliCommand::Gaps { ref db } => show_gaps(config().await?, db.clone()),
        CliCommand::Run {
            ref fixtures,
            ref db,
            no_store,
            strict,
        } => run(config().await?, fixtures.clone(), db.clone(), no_store, strict).await,
        CliCommand::DefaultConfig => {
            print!("{}", EngineConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}
