use axum::Json;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{IdQuery, PostStatus};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubmitReport {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub content: Option<String>,
}

pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<SubmitReport>,
) -> Result<Response, ApiError> {
    state.check_rate_limit(&headers, Some(peer))?;

    let Some(id) = payload.id else {
        return Err(ApiError::Validation("id not provided".to_string()));
    };
    let Some(title) = payload.title else {
        return Err(ApiError::Validation("title not provided".to_string()));
    };
    let Some(content) = payload.content else {
        return Err(ApiError::Validation("content not provided".to_string()));
    };

    if state.store.get_submission(id)?.is_none() {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }

    let report_id = state.store.insert_report(id, title.trim(), content.trim())?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"id": report_id, "status": "OK"})),
    )
        .into_response())
}

pub async fn get_report_state(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ApiError> {
    let Some(id) = query.id else {
        return Err(ApiError::Validation("ID not provided".to_string()));
    };
    let status = match state.store.get_report(id)? {
        None => "Deleted or Not Found",
        Some(r) => match r.status {
            PostStatus::Pass => "Approved",
            PostStatus::Deny => "Rejected",
            PostStatus::Pending => "Pending",
        },
    };
    Ok(Json(json!({"status": status})).into_response())
}
