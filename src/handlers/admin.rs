use axum::Json;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth;
use crate::backup::{RestoreError, allowed_backup_file};
use crate::error::ApiError;
use crate::handlers::posts::post_summary;
use crate::media::sanitize_filename;
use crate::metrics::{BACKUP_TOTAL, RESTORE_TOTAL};
use crate::models::{ANONYMOUS_NICKNAME, IdPayload, IdQuery, PostStatus};
use crate::state::AppState;
use crate::store::StatusChange;

fn ok() -> Response {
    Json(json!({"status": "OK"})).into_response()
}

// ── moderation: post status transitions ─────────────────────────────────

async fn change_status(
    state: &AppState,
    headers: &HeaderMap,
    payload: IdPayload,
    from: PostStatus,
    to: PostStatus,
) -> Result<Response, ApiError> {
    auth::require_admin(headers, &state.admin_token_digest)?;

    let Some(id) = payload.id else {
        return Err(ApiError::Validation("Value ID not found".to_string()));
    };
    match state.store.change_status(id, from, to)? {
        StatusChange::Changed => Ok(ok()),
        StatusChange::NotFound => Ok(Json(json!({"status": "Fail", "reason": "Post not found"}))
            .into_response()),
        StatusChange::WrongState => Ok(Json(
            json!({"status": "Fail", "reason": "Post in wrong state"}),
        )
        .into_response()),
    }
}

pub async fn admin_approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    change_status(&state, &headers, payload, PostStatus::Pending, PostStatus::Pass).await
}

pub async fn admin_disapprove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    change_status(&state, &headers, payload, PostStatus::Pending, PostStatus::Deny).await
}

pub async fn admin_reaudit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    change_status(&state, &headers, payload, PostStatus::Pass, PostStatus::Pending).await
}

// ── moderation: posts ───────────────────────────────────────────────────

pub async fn admin_del_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(id) = payload.id else {
        return Err(ApiError::Validation("Value ID not found".to_string()));
    };
    // comments cascade with the post
    if !state.store.delete_submission(id)? {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    Ok(ok())
}

#[derive(Deserialize)]
pub struct ModifyPost {
    pub id: Option<i64>,
    pub content: Option<String>,
}

pub async fn admin_modify_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ModifyPost>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let (Some(id), Some(content)) = (payload.id, payload.content) else {
        return Err(ApiError::Validation("Missing id or content".to_string()));
    };
    if !state.store.update_submission_content(id, content.trim())? {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    Ok(ok())
}

pub async fn admin_get_post_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<IdQuery>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(id) = query.id else {
        return Err(ApiError::Validation("ID missing".to_string()));
    };
    let Some(s) = state.store.get_submission(id)? else {
        return Err(ApiError::NotFound("Not found".to_string()));
    };
    Ok(Json(json!({
        "id": s.id,
        "content": s.content,
        "created_at": s.created_at.to_rfc3339(),
        "updated_at": s.updated_at.to_rfc3339(),
        "status": s.status.as_str(),
        "upvotes": s.upvotes,
        "downvotes": s.downvotes,
    }))
    .into_response())
}

pub async fn admin_pending_posts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;
    let posts = state.store.list_by_status(PostStatus::Pending)?;
    let body: Vec<_> = posts.iter().map(post_summary).collect();
    Ok(Json(body).into_response())
}

pub async fn admin_reject_posts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;
    let posts = state.store.list_by_status(PostStatus::Deny)?;
    let body: Vec<_> = posts.iter().map(post_summary).collect();
    Ok(Json(body).into_response())
}

// ── moderation: comments ────────────────────────────────────────────────

pub async fn admin_del_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(id) = payload.id else {
        return Err(ApiError::Validation("Value ID not found".to_string()));
    };
    if !state.store.delete_comment(id)? {
        return Err(ApiError::NotFound("Comment not found".to_string()));
    }
    Ok(ok())
}

#[derive(Deserialize)]
pub struct ModifyComment {
    pub id: Option<i64>,
    pub content: Option<String>,
    pub parent_comment_id: Option<i64>,
    pub nickname: Option<String>,
}

pub async fn admin_modify_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ModifyComment>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let (Some(id), Some(content), Some(parent_id), Some(nickname)) = (
        payload.id,
        payload.content,
        payload.parent_comment_id,
        payload.nickname,
    ) else {
        return Err(ApiError::Validation("Missing required fields".to_string()));
    };

    let Some(comment) = state.store.get_comment(id)? else {
        return Err(ApiError::NotFound("Comment not found".to_string()));
    };

    // same reply-target rule as the public comment endpoint
    if parent_id != 0 {
        let parent = state.store.get_comment(parent_id)?;
        let valid = parent
            .map(|p| p.submission_id == comment.submission_id)
            .unwrap_or(false);
        if !valid {
            return Ok(
                (StatusCode::BAD_REQUEST, Json(json!({"status": "Wrong_Reply"}))).into_response(),
            );
        }
    }

    let nickname = {
        let trimmed = nickname.trim();
        if trimmed.is_empty() {
            ANONYMOUS_NICKNAME.to_string()
        } else {
            trimmed.to_string()
        }
    };
    state
        .store
        .update_comment(id, content.trim(), parent_id, &nickname)?;
    Ok(ok())
}

// ── moderation: reports ─────────────────────────────────────────────────

pub async fn admin_approve_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(id) = payload.id else {
        return Err(ApiError::Validation("Value ID not found".to_string()));
    };
    let Some(report) = state.store.get_report(id)? else {
        return Err(ApiError::NotFound("Report not found".to_string()));
    };

    state.store.set_report_status(id, PostStatus::Pass)?;
    // take the reported post down with its comments, if it still exists
    if let Some(submission_id) = report.submission_id {
        let _ = state.store.delete_submission(submission_id)?;
    }
    Ok(ok())
}

pub async fn admin_reject_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<IdPayload>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(id) = payload.id else {
        return Err(ApiError::Validation("Value ID not found".to_string()));
    };
    if state.store.get_report(id)?.is_none() {
        return Err(ApiError::NotFound("Report not found".to_string()));
    }
    state.store.set_report_status(id, PostStatus::Deny)?;
    Ok(ok())
}

pub async fn admin_pending_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;
    let reports = state.store.pending_reports()?;
    let body: Vec<_> = reports
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "submission_id": r.submission_id,
                "title": r.title,
                "content": r.content,
                "status": r.status.as_str(),
                "created_at": r.created_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(Json(body).into_response())
}

// ── runtime config: audit mode and banned keywords ──────────────────────

#[derive(Deserialize)]
pub struct NeedAudit {
    pub need_audit: Option<serde_json::Value>,
}

pub async fn admin_toggle_audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<NeedAudit>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(value) = payload.need_audit else {
        return Err(ApiError::Validation("value need_audit not found".to_string()));
    };
    let Some(flag) = value.as_bool() else {
        return Err(ApiError::Validation("Not bool".to_string()));
    };
    state.config.update(|c| c.need_audit = flag)?;
    Ok(ok())
}

pub async fn admin_get_need_audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;
    Ok(Json(json!({"status": state.config.current().need_audit})).into_response())
}

#[derive(Deserialize)]
pub struct KeywordPayload {
    pub keyword: Option<String>,
}

pub async fn admin_add_keyword(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<KeywordPayload>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let keyword = payload
        .keyword
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());
    let Some(keyword) = keyword else {
        return Err(ApiError::Validation("value keyword not found".to_string()));
    };
    state.config.update(|c| {
        if !c.banned_keywords.contains(&keyword) {
            c.banned_keywords.push(keyword);
        }
    })?;
    Ok(ok())
}

pub async fn admin_del_keyword(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<KeywordPayload>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(keyword) = payload.keyword.map(|k| k.trim().to_string()) else {
        return Err(ApiError::Validation("value keyword not found".to_string()));
    };
    if !state.config.current().banned_keywords.contains(&keyword) {
        return Err(ApiError::NotFound("Keyword not found".to_string()));
    }
    state
        .config
        .update(|c| c.banned_keywords.retain(|k| *k != keyword))?;
    Ok(ok())
}

pub async fn admin_get_keywords(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;
    Ok(Json(json!({"keywords": state.config.current().banned_keywords})).into_response())
}

// ── backup and restore ──────────────────────────────────────────────────

pub async fn admin_get_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    BACKUP_TOTAL.inc();
    let path = state.backup.create_backup().map_err(|e| {
        tracing::warn!("backup failed: {e:#}");
        ApiError::Internal(e)
    })?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("backup.zip")
        .to_string();
    tracing::info!("backup created: {} ({} bytes)", filename, bytes.len());

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn admin_recover(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;
    RESTORE_TOTAL.inc();

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(name) = field.file_name().map(|n| n.to_string()) else {
            break;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        upload = Some((name, data.to_vec()));
        break;
    }

    let Some((name, data)) = upload else {
        return Err(ApiError::Validation("No file uploaded".to_string()));
    };
    // reject before anything touches the filesystem
    if name.is_empty() || !allowed_backup_file(&name) {
        return Err(ApiError::Validation("Wrong file type".to_string()));
    }
    let safe = sanitize_filename(&name);
    if safe.is_empty() {
        return Err(ApiError::Validation("Wrong file type".to_string()));
    }

    let upload_path = state.backup.backup_dir().join(&safe);
    tokio::fs::create_dir_all(state.backup.backup_dir())
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    tokio::fs::write(&upload_path, &data)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    match state.backup.restore(&upload_path, &state.store, &state.config) {
        Ok(()) => {
            tracing::info!("store restored from {safe}");
            Ok(ok())
        }
        Err(RestoreError::MissingStore) => {
            Err(ApiError::NotFound(RestoreError::MissingStore.to_string()))
        }
        Err(RestoreError::Other(e)) => {
            tracing::warn!("restore failed: {e:#}");
            Err(ApiError::Internal(e))
        }
    }
}
