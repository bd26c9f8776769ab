//! `/functions` (spec §6): CRUD plus synchronous execute-with-params.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{executions_repo, functions_repo};
use crate::error::AppResult;
use crate::models::{Execution, ExecutionId, Function, FunctionId};

use super::auth::AuthUser;
use super::{ok, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_one).put(update).delete(remove))
        .route("/:id/execute", post(execute))
}

#[derive(Deserialize)]
struct CreateRequest {
    name: String,
    source: String,
    #[serde(default)]
    secret_refs: Vec<String>,
}

async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<axum::response::Response> {
    let functions = functions_repo::list_for_owner(&state.pool, user.id).await?;
    Ok(ok(functions))
}

async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateRequest>,
) -> AppResult<axum::response::Response> {
    let owner_secrets = state.secrets.list(user.id).await?;
    let owner_secret_names: Vec<String> = owner_secrets.into_iter().map(|s| s.name).collect();

    let now = Utc::now();
    let function = Function {
        id: FunctionId(Uuid::new_v4()),
        owner: user.id,
        name: req.name,
        source: req.source,
        secret_refs: req.secret_refs,
        created_at: now,
        updated_at: now,
    };
    function
        .validate(&owner_secret_names)
        .map_err(|e| crate::error::AppError::new(crate::error::ErrorCode::InvalidParameter, e))?;

    functions_repo::create(&state.pool, &function).await?;
    Ok(super::created(function))
}

async fn get_one(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    let function = functions_repo::get(&state.pool, FunctionId(id)).await?;
    Ok(ok(function))
}

#[derive(Deserialize)]
struct UpdateRequest {
    source: String,
    #[serde(default)]
    secret_refs: Vec<String>,
}

async fn update(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRequest>,
) -> AppResult<axum::response::Response> {
    functions_repo::update_source(&state.pool, FunctionId(id), &req.source, &req.secret_refs).await?;
    let function = functions_repo::get(&state.pool, FunctionId(id)).await?;
    Ok(ok(function))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<axum::response::Response> {
    functions_repo::delete(&state.pool, FunctionId(id)).await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

/// Synchronous execution (spec §6: "POST `/:id/execute` synchronous
/// execution with params"). Runs the same enclave path C10 uses for
/// trigger-driven invocations, but waits for the result instead of going
/// through the invocation queue, and has no `tx_intent` handling -- a
/// direct REST call has no trigger to attribute a gas allocation to.
async fn execute(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(params): Json<serde_json::Value>,
) -> AppResult<axum::response::Response> {
    let function = functions_repo::get(&state.pool, FunctionId(id)).await?;
    let execution_id = ExecutionId(Uuid::new_v4());
    let secrets = state
        .secrets
        .load_for_execution(user.id, &function.secret_refs, execution_id.0)
        .await?;

    let request = crate::enclave::EnclaveRequest {
        source: function.source,
        params_json: params.clone(),
        secrets_map: secrets,
        deadline_ms: 5_000,
        memory_limit_mb: 64,
    };
    let started_at = Utc::now();
    let result = state.enclave.run(execution_id.0, request).await;

    executions_repo::insert(
        &state.pool,
        &Execution {
            id: execution_id,
            function_id: function.id,
            user_id: user.id,
            started_at,
            finished_at: Some(Utc::now()),
            status: map_outcome(result.status),
            duration_ms: result.duration_ms,
            result_json: result.result_json.clone(),
            error_msg: result.error_msg.clone(),
            params_json: params,
        },
    )
    .await?;

    Ok(ok(result))
}

fn map_outcome(outcome: crate::enclave::EnclaveOutcome) -> crate::models::ExecutionStatus {
    use crate::enclave::EnclaveOutcome;
    use crate::models::ExecutionStatus;
    match outcome {
        EnclaveOutcome::Success => ExecutionStatus::Success,
        EnclaveOutcome::Error => ExecutionStatus::Error,
        EnclaveOutcome::Timeout => ExecutionStatus::Timeout,
        EnclaveOutcome::MemoryExceeded => ExecutionStatus::MemoryExceeded,
        EnclaveOutcome::SandboxViolation => ExecutionStatus::SandboxViolation,
    }
}
