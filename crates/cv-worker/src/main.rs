//! cv-worker - Intake pipeline driver
//!
//! Command-line entry point that runs one intake (§6 upload path) through
//! the orchestrator end to end. Structured after the teacher's
//! `video-extract-cli`: a thin `clap` front door around a single core
//! library, `anyhow` at the outermost boundary, `tracing-subscriber` wired
//! from `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cv_common::CorrelationId;
use cv_llm::{BedrockConfig, BedrockLlmClient, LlmClient};
use cv_orchestrator::Orchestrator;
use cv_storage::object_storage::S3Config;
use cv_storage::{ObjectStorage, S3ObjectStorage};
use cv_taxonomy::{AliasEntry, AliasIndex, StaticAliasSource, TaxonomyCategory};

#[derive(Parser)]
#[command(
    name = "cv-worker",
    version,
    about = "Runs a single CV intake through the extraction / structuring / matching pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a CV already present on local disk.
    Process(ProcessArgs),

    /// Download `{bucket, object_key}` from object storage, then process it.
    Intake(IntakeArgs),
}

#[derive(Parser)]
struct ProcessArgs {
    /// Path to the CV file (PDF, DOCX, JPEG or PNG).
    file: PathBuf,

    /// Correlation id to bind to this intake; a fresh one is generated if omitted.
    #[arg(long)]
    correlation_id: Option<Uuid>,
}

#[derive(Parser)]
struct IntakeArgs {
    /// Object storage bucket.
    #[arg(long)]
    bucket: String,

    /// Object key within the bucket, e.g. `uploads/jane-doe.pdf`.
    #[arg(long)]
    object_key: String,

    /// Correlation id bound to this upload at presign time.
    #[arg(long)]
    correlation_id: Option<Uuid>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Process(args) => run_process(args.file, args.correlation_id).await,
        Commands::Intake(args) => run_intake(args).await,
    }
}

async fn run_intake(args: IntakeArgs) -> Result<()> {
    let config = S3Config { bucket: args.bucket.clone(), ..S3Config::default() };
    let storage = S3ObjectStorage::new(config).await.context("connecting to object storage")?;

    let local_path = std::env::temp_dir().join(args.object_key.replace('/', "_"));
    storage
        .retrieve_file_to_path(&args.object_key, &local_path)
        .await
        .with_context(|| format!("downloading {}/{}", args.bucket, args.object_key))?;

    run_process(local_path, args.correlation_id).await
}

async fn run_process(file: PathBuf, correlation_id: Option<Uuid>) -> Result<()> {
    anyhow::ensure!(file.exists(), "no such file: {}", file.display());

    let correlation_id = correlation_id.map_or_else(CorrelationId::new, CorrelationId);
    let llm = build_llm_client();
    let alias_index = Arc::new(build_alias_index());

    let orchestrator = Orchestrator::new(llm, alias_index);
    let graph = orchestrator.build_intake_graph(correlation_id, file.clone());

    info!(%correlation_id, file = %file.display(), "starting intake");
    let graph = orchestrator.execute(graph).await.context("running intake pipeline")?;

    let record = orchestrator
        .status(correlation_id)
        .await
        .context("intake record missing after execution")?;

    if graph.has_failed() {
        warn!(%correlation_id, status = ?record.status, "intake finished with failures");
    } else {
        info!(%correlation_id, candidate_id = ?record.candidate_id, "intake completed");
    }

    let summary = serde_json::json!({
        "correlation_id": correlation_id.0,
        "status": format!("{:?}", record.status),
        "progress": record.status.progress(),
        "candidate_id": record.candidate_id,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if graph.has_failed() {
        anyhow::bail!("intake {correlation_id} failed");
    }
    Ok(())
}

fn build_llm_client() -> Arc<dyn LlmClient> {
    Arc::new(BedrockLlmClient::new(BedrockConfig::default()))
}

/// Seed alias index used until a relational-backed `AliasSource` is wired up
/// (§4.15 open question: production deployments should back this with the
/// taxonomy tables instead of this fixed seed).
fn build_alias_index() -> AliasIndex {
    let mut entries = std::collections::HashMap::new();
    entries.insert(
        TaxonomyCategory::Skill,
        vec![
            AliasEntry { canonical_id: "skill.rust".into(), alias: "rust".into() },
            AliasEntry { canonical_id: "skill.python".into(), alias: "python".into() },
            AliasEntry { canonical_id: "skill.sql".into(), alias: "sql".into() },
        ],
    );
    entries.insert(TaxonomyCategory::Certification, vec![]);
    entries.insert(TaxonomyCategory::Role, vec![]);
    entries.insert(TaxonomyCategory::Software, vec![]);

    AliasIndex::new(Arc::new(StaticAliasSource { entries }))
}
