//! HTTP request handlers (§4.18).

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{error, info, warn};
use uuid::Uuid;

use cv_common::CorrelationId;
use cv_matching::{extract_requirements, relaxed_match};
use cv_query::QueryRequest;

use crate::download::fetch_intake_object;
use crate::types::{
    HealthResponse, HrJobResponse, IntakeRequest, IntakeResponse, QueryApiResponse, StatusResponse,
};
use crate::ApiState;

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

/// `POST /intake` (§4.18, §6 upload path): downloads the object, kicks off
/// C17 in the background, and returns immediately with the correlation id.
pub async fn submit_intake(
    State(state): State<ApiState>,
    Json(request): Json<IntakeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let correlation_id = match &request.correlation_id {
        Some(raw) => CorrelationId::from_str(raw)
            .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid correlation id: {raw}")))?,
        None => CorrelationId::new(),
    };

    info!(%correlation_id, bucket = %request.bucket, object_key = %request.object_key, "intake submitted");

    let downloaded = fetch_intake_object(&request.bucket, &request.object_key).await.map_err(|e| {
        error!(%correlation_id, error = %e, "failed to download intake object");
        (StatusCode::BAD_REQUEST, format!("failed to download object: {e}"))
    })?;

    let orchestrator = state.orchestrator.clone();
    let input_path = downloaded.path();
    let graph = orchestrator.build_intake_graph(correlation_id, input_path);

    tokio::spawn(async move {
        let _downloaded_guard = downloaded;
        match orchestrator.execute(graph).await {
            Ok(graph) if graph.has_failed() => {
                warn!(%correlation_id, "intake completed with failed tasks");
            }
            Ok(_) => info!(%correlation_id, "intake completed"),
            Err(e) => error!(%correlation_id, error = %e, "intake execution error"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(IntakeResponse { correlation_id: correlation_id.to_string(), status: "pending".to_string() }),
    ))
}

/// `GET /status/:correlation_id` (§4.9).
pub async fn get_status(
    State(state): State<ApiState>,
    Path(correlation_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = CorrelationId::from_str(&correlation_id)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid correlation id: {correlation_id}")))?;

    match state.orchestrator.status(id).await {
        Some(record) => Ok(Json(StatusResponse {
            correlation_id: correlation_id.clone(),
            status: format!("{:?}", record.status),
            progress: record.status.progress(),
            candidate_id: record.candidate_id.map(|c| c.to_string()),
        })),
        None => Err((StatusCode::NOT_FOUND, format!("no intake record for {correlation_id}"))),
    }
}

/// `POST /query` (§4.10-4.14): translate, execute, and optionally fall
/// through to the relaxed matcher and HR analyzer.
pub async fn run_query(
    State(state): State<ApiState>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let include_hr_analysis = request.include_hr_analysis;
    let async_hr = request.async_hr;
    let use_job_matching = request.use_job_matching;
    let original_query = request.query.clone();

    let query_response = state.query_engine.handle(request).await.map_err(|e| {
        error!(error = %e, "query handling failed");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("query failed: {e}"))
    })?;

    let result_is_empty = query_response.result_count.map_or(true, |c| c == 0);

    let job_matches = if use_job_matching && result_is_empty {
        match extract_requirements(state.llm.as_ref(), &original_query).await {
            Ok(requirements) => match relaxed_match(state.llm.as_ref(), &state.postgres, &requirements).await {
                Ok(matches) => Some(matches),
                Err(e) => {
                    warn!(error = %e, "relaxed match failed");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "requirement extraction failed");
                None
            }
        }
    } else {
        None
    };

    let mut hr_job_id = None;
    let mut hr_analysis = None;
    if include_hr_analysis {
        match extract_requirements(state.llm.as_ref(), &original_query).await {
            Ok(requirements) => {
                if async_hr {
                    let job_id = state
                        .hr_jobs
                        .submit(state.llm.clone(), state.postgres.clone(), original_query.clone(), requirements)
                        .await;
                    hr_job_id = Some(job_id.to_string());
                } else {
                    match cv_matching::analyze_sync(state.llm.as_ref(), &state.postgres, &original_query, requirements)
                        .await
                    {
                        Ok(report) => hr_analysis = Some(report),
                        Err(e) => warn!(error = %e, "synchronous hr analysis failed"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "requirement extraction for hr analysis failed"),
        }
    }

    Ok(Json(QueryApiResponse { query: query_response, job_matches, hr_job_id, hr_analysis }))
}

/// `GET /hr/:job_id` (§4.13 async mode).
pub async fn get_hr_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let id = Uuid::parse_str(&job_id).map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid job id: {job_id}")))?;

    match state.hr_jobs.poll(id).await {
        Some(record) => Ok(Json(HrJobResponse {
            job_id,
            status: format!("{:?}", record.status).to_lowercase(),
            hr_analysis: record.hr_analysis,
            error: record.error,
        })),
        None => Err((StatusCode::NOT_FOUND, format!("no hr job for {job_id}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_reports_ok() {
        let response = health_check().await;
        let body = axum::response::IntoResponse::into_response(response);
        assert_eq!(body.status(), StatusCode::OK);
    }
}
