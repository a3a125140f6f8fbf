//! HTTP surface for the intake pipeline (C18, §4.18): health, intake
//! submission, status polling, query, and HR-job polling, wired the way
//! the teacher's `api-server` crate wires its processing routes -- an
//! axum router over a small `Clone`-able state struct, `TraceLayer` and
//! a permissive `CorsLayer`.

mod download;
mod handlers;
mod types;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use cv_llm::LlmClient;
use cv_matching::HrJobStore;
use cv_orchestrator::Orchestrator;
use cv_query::QueryEngine;
use cv_storage::PostgresConfig;
use cv_taxonomy::AliasIndex;

pub use handlers::*;
pub use types::*;

/// API server state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub query_engine: Arc<QueryEngine>,
    pub hr_jobs: Arc<HrJobStore>,
    pub llm: Arc<dyn LlmClient>,
    pub postgres: PostgresConfig,
}

impl ApiState {
    #[must_use]
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        llm: Arc<dyn LlmClient>,
        alias_index: Arc<AliasIndex>,
        postgres: PostgresConfig,
    ) -> Self {
        let query_engine = Arc::new(QueryEngine::new(llm.clone(), alias_index, postgres.clone()));
        Self { orchestrator, query_engine, hr_jobs: Arc::new(HrJobStore::new()), llm, postgres }
    }
}

/// Build the API router with all endpoints.
#[must_use]
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/intake", post(submit_intake))
        .route("/status/{correlation_id}", get(get_status))
        .route("/query", post(run_query))
        .route("/hr/{job_id}", get(get_hr_job))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server.
///
/// # Errors
/// Returns an error if the listener cannot bind to `addr` or the server
/// fails while serving.
pub async fn start_server(addr: &str, state: ApiState) -> anyhow::Result<()> {
    tracing::info!("Starting CV intake API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_llm::FakeLlmClient;
    use cv_taxonomy::{AliasIndex, StaticAliasSource};
    use std::collections::HashMap;

    fn fake_state() -> ApiState {
        let llm: Arc<dyn LlmClient> = Arc::new(FakeLlmClient::new(vec![]));
        let alias_index = Arc::new(AliasIndex::new(Arc::new(StaticAliasSource { entries: HashMap::new() })));
        let orchestrator = Arc::new(Orchestrator::new(llm.clone(), alias_index.clone()));
        ApiState::new(orchestrator, llm, alias_index, PostgresConfig::default())
    }

    #[test]
    fn router_builds_without_panicking() {
        let _router = build_router(fake_state());
    }
}
