use axum::Json;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ApiError;
use crate::media;
use crate::metrics::REQUEST_LATENCY;
use crate::models::{IdPayload, IdQuery, PageQuery, PostStatus, Submission};
use crate::state::AppState;

const POSTS_PER_PAGE: i64 = 10;

pub(crate) fn post_summary(s: &Submission) -> serde_json::Value {
    json!({
        "id": s.id,
        "content": s.content,
        "created_at": s.created_at.to_rfc3339(),
        "updated_at": s.updated_at.to_rfc3339(),
        "status": s.status.as_str(),
    })
}

#[derive(Deserialize)]
pub struct SubmitPost {
    pub content: Option<String>,
}

pub async fn submit_post(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<SubmitPost>,
) -> Result<Response, ApiError> {
    state.check_rate_limit(&headers, Some(peer))?;
    let start_time = Instant::now();

    let Some(content) = payload.content else {
        return Ok((StatusCode::BAD_REQUEST, Json(json!({"error": "Content not found"})))
            .into_response());
    };
    let content = content.trim();
    if content.is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Content should not be null"})),
        )
            .into_response());
    }

    let cfg = state.config.current();
    if cfg.contains_banned(content) {
        return Ok((StatusCode::FORBIDDEN, Json(json!({"status": "Deny"}))).into_response());
    }

    let status = if cfg.need_audit {
        PostStatus::Pending
    } else {
        PostStatus::Pass
    };
    let id = state.store.insert_submission(content, status)?;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    Ok((
        StatusCode::CREATED,
        Json(json!({"id": id, "status": status.as_str()})),
    )
        .into_response())
}

async fn vote(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
    payload: IdPayload,
    up: bool,
) -> Result<Response, ApiError> {
    state.check_rate_limit(headers, Some(peer))?;

    let Some(id) = payload.id else {
        return Err(ApiError::Validation("Value ID not found".to_string()));
    };
    let found = if up {
        state.store.upvote(id)?
    } else {
        state.store.downvote(id)?
    };
    if !found {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    Ok(Json(json!({"status": "OK"})).into_response())
}

pub async fn upvote(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    vote(&state, &headers, peer, payload, true).await
}

pub async fn downvote(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    vote(&state, &headers, peer, payload, false).await
}

pub async fn get_post_state(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ApiError> {
    let Some(id) = query.id else {
        return Err(ApiError::Validation("ID not provided".to_string()));
    };
    let status = match state.store.get_submission(id)? {
        None => "Deleted or Not Found",
        Some(s) => match s.status {
            PostStatus::Pass => "Approved",
            PostStatus::Deny => "Rejected",
            PostStatus::Pending => "Pending",
        },
    };
    Ok(Json(json!({"status": status})).into_response())
}

pub async fn get_post_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<Response, ApiError> {
    let Some(id) = query.id else {
        return Err(ApiError::Validation("ID missing".to_string()));
    };
    let submission = state.store.get_submission(id)?;
    let Some(s) = submission.filter(|s| s.status == PostStatus::Pass) else {
        return Err(ApiError::NotFound("Not found".to_string()));
    };
    // public view omits the moderation status
    Ok(Json(json!({
        "id": s.id,
        "content": s.content,
        "created_at": s.created_at.to_rfc3339(),
        "updated_at": s.updated_at.to_rfc3339(),
        "upvotes": s.upvotes,
        "downvotes": s.downvotes,
    }))
    .into_response())
}

pub async fn get_ten_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let posts = state.store.page_passed(page, POSTS_PER_PAGE)?;
    let body: Vec<_> = posts.iter().map(post_summary).collect();
    Ok(Json(body).into_response())
}

pub async fn get_statics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let posts = state.store.count_submissions()?;
    let comments = state.store.count_comments()?;
    let images = media::count_images(&state.img_dir);
    Ok(Json(json!({"posts": posts, "comments": comments, "images": images})).into_response())
}

pub async fn get_api_info() -> impl IntoResponse {
    Html("<a>Whisper Board API v1.0.0</a>")
}

pub async fn teapot() -> impl IntoResponse {
    StatusCode::IM_A_TEAPOT
}
