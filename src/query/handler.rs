use crate::app::AppState;
use crate::error::{AppError, AppResult, LoggedJson};
use crate::ingest::handler::parse_banner_id;
use crate::types::{HealthResponse, StatsRequest, StatsResponse};
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

/// POST /stats/{id} - Per-minute click counts for a banner over `[from, to]`.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    LoggedJson(req): LoggedJson<StatsRequest>,
) -> AppResult<Json<StatsResponse>> {
    let banner_id = parse_banner_id(&raw_id)?;

    if req.from > req.to {
        return Err(AppError::Validation(
            "`from` must be before `to`".to_string(),
        ));
    }

    let stats = state.store.query_range(banner_id, req.from, req.to).await?;
    tracing::debug!(banner_id, buckets = stats.len(), "stats served");

    Ok(Json(StatsResponse { stats }))
}

/// GET /health - Health check.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_ok = state.store.ping().await.is_ok();

    Json(HealthResponse {
        status: if db_ok {
            "ok".into()
        } else {
            "degraded".into()
        },
        db_ok,
    })
}
