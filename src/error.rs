use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Duration;

/// Failures raised by a [`crate::storage::ClickStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend never became reachable during startup.
    #[error("backend unreachable after {attempts} attempts: {last_error}")]
    Init { attempts: u32, last_error: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("interact error: {0}")]
    Interact(#[from] deadpool_sqlite::InteractError),

    #[error("operation exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("store is closed")]
    Closed,

    #[error("stored timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}

impl StoreError {
    /// Map a pool checkout failure, keeping closed and timed-out pools distinct.
    pub(crate) fn from_pool(err: deadpool_sqlite::PoolError, budget: Duration) -> Self {
        match err {
            deadpool_sqlite::PoolError::Closed => StoreError::Closed,
            deadpool_sqlite::PoolError::Timeout(_) => StoreError::Timeout(budget),
            other => StoreError::Pool(other.to_string()),
        }
    }

    /// Map a statement failure; an interrupt from the deadline handler is a timeout.
    pub(crate) fn from_sqlite(err: rusqlite::Error, budget: Duration) -> Self {
        if err.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted) {
            StoreError::Timeout(budget)
        } else {
            StoreError::Database(err)
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Store(e @ (StoreError::Timeout(_) | StoreError::Closed)) => {
                tracing::warn!(error = %e, "storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service unavailable".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!(error = %e, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// JSON extractor that logs deserialization errors before rejecting them as 400s.
/// Drop-in replacement for `axum::Json<T>`.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let path = req.uri().path().to_string();
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(LoggedJson(value)),
            Err(rejection) => {
                tracing::warn!(
                    path = %path,
                    status = %rejection.status(),
                    error = %rejection,
                    "invalid request body"
                );
                Err(AppError::Validation("invalid request body".to_string()))
            }
        }
    }
}
