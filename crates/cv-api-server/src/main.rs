//! API Server Binary Entry Point

use std::collections::HashMap;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cv_api_server::{start_server, ApiState};
use cv_llm::{BedrockConfig, BedrockLlmClient, LlmClient};
use cv_orchestrator::Orchestrator;
use cv_storage::PostgresConfig;
use cv_taxonomy::{AliasEntry, AliasIndex, StaticAliasSource, TaxonomyCategory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cv_api_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("API_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let llm: Arc<dyn LlmClient> = Arc::new(BedrockLlmClient::new(BedrockConfig::default()));
    let alias_index = Arc::new(build_alias_index());
    let orchestrator = Arc::new(Orchestrator::new(llm.clone(), alias_index.clone()));
    let state = ApiState::new(orchestrator, llm, alias_index, PostgresConfig::default());

    tracing::info!("Starting CV Intake API Server");
    start_server(&addr, state).await?;

    Ok(())
}

/// Seed alias index used until a relational-backed `AliasSource` is wired up
/// (§4.15 open question).
fn build_alias_index() -> AliasIndex {
    let mut entries = HashMap::new();
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
