use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth;
use crate::error::ApiError;
use crate::models::IdPayload;
use crate::state::AppState;

pub async fn get_notices(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let notices = state.store.list_notices()?;
    let body: Vec<_> = notices
        .iter()
        .map(|n| {
            json!({
                "id": n.id,
                "title": n.title,
                "content": n.content,
                "created_at": n.created_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(Json(body).into_response())
}

#[derive(Deserialize)]
pub struct CreateNotice {
    pub title: Option<String>,
    pub content: Option<String>,
}

pub async fn admin_create_notice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateNotice>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let (Some(title), Some(content)) = (payload.title, payload.content) else {
        return Err(ApiError::Validation("Missing title or content".to_string()));
    };
    let title = title.trim();
    let content = content.trim();
    if title.is_empty() || content.is_empty() {
        return Err(ApiError::Validation("Missing title or content".to_string()));
    }

    let id = state.store.insert_notice(title, content)?;
    Ok((StatusCode::CREATED, Json(json!({"id": id, "status": "OK"}))).into_response())
}

pub async fn admin_delete_notice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(id) = payload.id else {
        return Err(ApiError::Validation("Value ID not found".to_string()));
    };
    if !state.store.delete_notice(id)? {
        return Err(ApiError::NotFound("Notice not found".to_string()));
    }
    Ok(Json(json!({"status": "OK"})).into_response())
}
