use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::types::BannerId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use std::sync::Arc;

/// Parse a banner id path segment. Anything but a base-10 integer is rejected.
pub(crate) fn parse_banner_id(raw: &str) -> AppResult<BannerId> {
    raw.parse::<BannerId>().map_err(|e| {
        tracing::warn!(id = %raw, error = %e, "invalid banner id");
        AppError::Validation("invalid banner ID".to_string())
    })
}

/// POST /counter/{id} - Count one click for the banner in the current minute.
pub async fn increment_clicks(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> AppResult<StatusCode> {
    let banner_id = parse_banner_id(&raw_id)?;
    state.store.record_event(banner_id).await?;
    Ok(StatusCode::OK)
}
