use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use collector::{SyncError, UnitFailure};
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Database(String),
    /// Sync routes are disabled because no GitHub credentials are configured.
    Unavailable(String),
    NoResults(Vec<UnitFailure>),
    Timeout(String),
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<db::DbError> for ApiError {
    fn from(err: db::DbError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NoResults { failures } => Self::NoResults(failures),
            err @ SyncError::TimedOut(_) => Self::Timeout(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<UnitFailure>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, failures) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Vec::new()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Vec::new()),
            ApiError::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, Vec::new()),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, Vec::new()),
            ApiError::NoResults(failures) => (
                StatusCode::BAD_GATEWAY,
                "none of the requested organizations could be synced".to_string(),
                failures,
            ),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg, Vec::new()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, Vec::new()),
        };
        (status, Json(ErrorBody { error, failures })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
