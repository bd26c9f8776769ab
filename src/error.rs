//! Unified error taxonomy (spec §7) shared by every component and surfaced
//! verbatim through the REST layer as `{error:{code,message,details,requestId}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Machine-readable error codes from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParameter,
    MissingParameter,
    InvalidFormat,
    InvalidState,
    Unauthorized,
    InvalidCredentials,
    TokenExpired,
    PermissionDenied,
    ResourceNotFound,
    ResourceAlreadyExists,
    ResourceConflict,
    InternalError,
    DatabaseError,
    BlockchainError,
    ServiceUnavailable,
    RateLimitExceeded,
    ExecutionTimeout,
    MemoryExceeded,
    SandboxViolation,
    SecretAccessDenied,
    FunctionCompileError,
    FunctionRuntimeError,
    TxVerificationFailed,
    ContractExecutionFailed,
    InsufficientGas,
    NetworkFeeTooLow,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        use ErrorCode::*;
        match self {
            InvalidParameter | MissingParameter | InvalidFormat | InvalidState => {
                StatusCode::BAD_REQUEST
            }
            Unauthorized | InvalidCredentials | TokenExpired => StatusCode::UNAUTHORIZED,
            PermissionDenied | SecretAccessDenied => StatusCode::FORBIDDEN,
            ResourceNotFound => StatusCode::NOT_FOUND,
            ResourceAlreadyExists | ResourceConflict => StatusCode::CONFLICT,
            RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ExecutionTimeout => StatusCode::REQUEST_TIMEOUT,
            ServiceUnavailable | BlockchainError => StatusCode::SERVICE_UNAVAILABLE,
            MemoryExceeded
            | SandboxViolation
            | FunctionCompileError
            | FunctionRuntimeError
            | TxVerificationFailed
            | ContractExecutionFailed
            | InsufficientGas
            | NetworkFeeTooLow => StatusCode::UNPROCESSABLE_ENTITY,
            InternalError | DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The single error type threaded through every public operation's `Result`.
#[derive(Debug)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
    pub request_id: Uuid,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(ErrorCode::ResourceNotFound, format!("{what} not found"))
    }

    pub fn insufficient_gas(available: i64, requested: i64) -> Self {
        Self::new(ErrorCode::InsufficientGas, "insufficient gas balance").with_details(
            serde_json::json!({ "available": available, "requested": requested }),
        )
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    #[serde(rename = "requestId")]
    request_id: Uuid,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        tracing::warn!(code = ?self.code, request_id = %self.request_id, "request failed: {}", self.message);
        let body = ErrorBody {
            error: ErrorPayload {
                code: self.code,
                message: self.message,
                details: self.details,
                request_id: self.request_id,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::new(ErrorCode::ResourceNotFound, "not found"),
            other => Self::new(ErrorCode::DatabaseError, other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(ErrorCode::BlockchainError, e.to_string())
    }
}

impl From<crate::chain::ChainError> for AppError {
    fn from(e: crate::chain::ChainError) -> Self {
        Self::new(ErrorCode::BlockchainError, e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorCode::InternalError, format!("json encoding failed: {e}"))
    }
}

pub type AppResult<T> = Result<T, AppError>;
