use axum::Json;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{ANONYMOUS_NICKNAME, Comment, IdQuery, PostStatus};
use crate::state::AppState;

pub(crate) fn comment_json(c: &Comment) -> serde_json::Value {
    json!({
        "id": c.id,
        "nickname": c.nickname,
        "content": c.content,
        "parent_comment_id": c.parent_comment_id,
        "created_at": c.created_at.to_rfc3339(),
    })
}

#[derive(Deserialize)]
pub struct PostComment {
    pub content: Option<String>,
    pub submission_id: Option<i64>,
    pub parent_comment_id: Option<i64>,
    pub nickname: Option<String>,
}

fn fail(status: StatusCode, label: &str) -> Response {
    (status, Json(json!({"id": null, "status": label}))).into_response()
}

pub async fn post_comment(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<PostComment>,
) -> Result<Response, ApiError> {
    state.check_rate_limit(&headers, Some(peer))?;

    let (Some(content), Some(submission_id), Some(parent_comment_id), Some(nickname)) = (
        payload.content,
        payload.submission_id,
        payload.parent_comment_id,
        payload.nickname,
    ) else {
        return Ok(fail(StatusCode::BAD_REQUEST, "Fail"));
    };

    let content = content.trim().to_string();
    let nickname = {
        let trimmed = nickname.trim();
        if trimmed.is_empty() {
            ANONYMOUS_NICKNAME.to_string()
        } else {
            trimmed.to_string()
        }
    };

    if state.store.get_submission(submission_id)?.is_none() {
        return Ok(fail(StatusCode::NOT_FOUND, "Fail"));
    }

    if state.config.current().contains_banned(&content) {
        return Ok(fail(StatusCode::FORBIDDEN, "Deny"));
    }

    // a reply target must be a comment on the same post
    if parent_comment_id != 0 {
        let parent = state.store.get_comment(parent_comment_id)?;
        let valid = parent.map(|p| p.submission_id == submission_id).unwrap_or(false);
        if !valid {
            return Ok(fail(StatusCode::BAD_REQUEST, "Wrong_Reply"));
        }
    }

    let id = state
        .store
        .insert_comment(submission_id, parent_comment_id, &nickname, &content)?;
    Ok(Json(json!({"id": id, "status": "Pass"})).into_response())
}

pub async fn get_comments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ApiError> {
    let Some(id) = query.id else {
        return Err(ApiError::Validation("ID missing".to_string()));
    };
    let submission = state.store.get_submission(id)?;
    if submission.map(|s| s.status != PostStatus::Pass).unwrap_or(true) {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    let comments = state.store.comments_for(id)?;
    let body: Vec<_> = comments.iter().map(comment_json).collect();
    Ok(Json(body).into_response())
}
