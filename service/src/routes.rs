use axum::{
    Router,
    routing::{get, post},
    response::IntoResponse,
    http::StatusCode,
    extract::{Path, State},
    Json,
};
use crate::models::{CreateRunRequest, DiscoverRequest, ParserSummary, RunRecord, RunStatus};
use crate::storage::{RunStorage, StorageError};
use chrono::Utc;
use dslpipe::{PipelineError, RunOptions, RunOutput};
use std::sync::Arc;
use tracing::{info, debug, error, instrument};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<RunStorage>,
    pub run_defaults: Arc<RunOptions>,
}

type ApiError = (StatusCode, String);

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/parsers", post(discover_parsers))
        .route("/runs", get(list_runs).post(create_run))
        .route("/runs/:id", get(get_run).delete(delete_run))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn pipeline_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::ModuleLoad { .. }
        | PipelineError::InvalidExportName { .. }
        | PipelineError::DuplicateExportName { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn storage_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::InvalidId(_) => StatusCode::BAD_REQUEST,
        StorageError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("Pipeline task failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Pipeline task failed: {}", e))
}

#[instrument(skip(state, request), fields(module = %request.module_path.display()))]
async fn discover_parsers(
    State(state): State<AppState>,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<Vec<ParserSummary>>, ApiError> {
    info!("Received discovery request");
    let options = request.options.apply(&state.run_defaults);
    let module_path = request.module_path;

    let summaries = tokio::task::spawn_blocking(move || {
        dslpipe::load_parsers(&module_path, &options)
            .map(|found| found.iter().map(ParserSummary::from).collect::<Vec<_>>())
    })
    .await
    .map_err(join_error)?
    .map_err(|e| {
        error!("Discovery failed: {}", e);
        (pipeline_status(&e), e.to_string())
    })?;

    info!("Module provides {} parsers", summaries.len());
    Ok(Json(summaries))
}

#[instrument(skip(state, request), fields(module = %request.module_path.display(), records = request.records.len()))]
async fn create_run(
    State(state): State<AppState>,
    Json(request): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<RunRecord>), ApiError> {
    info!("Received run request");

    let run_id = state.storage.create_run().map_err(|e| {
        error!("Failed to create run: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to create run: {}", e))
    })?;
    info!("Created run: {}", run_id);

    let options = request.options.apply(&state.run_defaults);
    debug!("Run options: {:?}", options);
    let module_path = request.module_path.clone();
    let records = request.records;
    let started_at = Utc::now();

    let result: Result<RunOutput, PipelineError> = tokio::task::spawn_blocking(move || {
        dslpipe::run(&module_path, &records, &options)
    })
    .await
    .map_err(join_error)?;

    let (status, run) = match result {
        Ok(output) => (
            StatusCode::OK,
            RunRecord {
                run_id,
                module_path: request.module_path,
                status: RunStatus::Succeeded,
                started_at,
                finished_at: Utc::now(),
                message: None,
                parsers: output.parsers,
                stats: Some(output.stats),
                records: output.records,
            },
        ),
        Err(e) => {
            error!("Run {} failed: {}", run_id, e);
            (
                pipeline_status(&e),
                RunRecord {
                    run_id,
                    module_path: request.module_path,
                    status: RunStatus::Failed,
                    started_at,
                    finished_at: Utc::now(),
                    message: Some(e.to_string()),
                    parsers: Vec::new(),
                    stats: None,
                    records: Vec::new(),
                },
            )
        }
    };

    state.storage.write_run(&run).map_err(|e| {
        error!("Failed to store run {}: {}", run.run_id, e);
        (storage_status(&e), format!("Failed to store run: {}", e))
    })?;

    info!("Stored run {} ({:?})", run.run_id, run.status);
    Ok((status, Json(run)))
}

async fn list_runs(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let runs = state.storage.list_runs()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to list runs: {}", e)))?;

    Ok(Json(runs))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    let run = state.storage.read_run(&run_id)
        .map_err(|e| (storage_status(&e), format!("Run not found: {}", e)))?;

    Ok(Json(run))
}

async fn delete_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.storage.delete_run(&run_id)
        .map_err(|e| (storage_status(&e), format!("Failed to delete: {}", e)))?;

    Ok(StatusCode::NO_CONTENT)
}
