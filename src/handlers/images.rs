use axum::Json;
use axum::extract::{ConnectInfo, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::auth;
use crate::error::ApiError;
use crate::media;
use crate::models::PageQuery;
use crate::state::AppState;

const PICS_PER_PAGE: usize = 20;

fn upload_fail(label: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"status": label, "url": null}))).into_response()
}

pub async fn upload_pic(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    state.check_rate_limit(&headers, Some(peer))?;

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
        return Ok(upload_fail("Fail"));
    };
    if name.is_empty() {
        return Ok(upload_fail("Fail"));
    }
    if !media::allowed_file(&name) {
        return Ok(upload_fail("Wrong_Format"));
    }
    if data.len() >= media::MAX_FILE_SIZE {
        return Ok(upload_fail("Too_Large"));
    }

    let ext = media::file_extension(&name).expect("allowed_file checked the extension");
    let filename = media::random_name(&ext);
    tokio::fs::create_dir_all(&state.img_dir)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    tokio::fs::write(state.img_dir.join(&filename), &data)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"status": "OK", "url": format!("/img/{filename}")})),
    )
        .into_response())
}

pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Response {
    if !media::allowed_file(&filename) {
        return (StatusCode::FORBIDDEN, "Request not allowed").into_response();
    }
    let safe = media::sanitize_filename(&filename);
    if safe.is_empty() {
        return (StatusCode::FORBIDDEN, "Request not allowed").into_response();
    }
    match tokio::fs::read(state.img_dir.join(&safe)).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, media::content_type_for(&safe))],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
pub struct DeletePic {
    pub filename: Option<String>,
}

pub async fn admin_del_pic(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<DeletePic>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let Some(filename) = payload.filename else {
        return Err(ApiError::Validation("filename not found".to_string()));
    };
    let safe = media::sanitize_filename(&filename);
    if safe.is_empty() {
        return Err(ApiError::Validation("filename not found".to_string()));
    }
    let path = state.img_dir.join(&safe);
    if !path.is_file() {
        return Err(ApiError::NotFound("file not found".to_string()));
    }
    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(Json(json!({"status": "OK"})).into_response())
}

pub async fn admin_get_pic_links(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    auth::require_admin(&headers, &state.admin_token_digest)?;

    let page = query.page.unwrap_or(1).max(1);
    let names = media::list_images_by_mtime(&state.img_dir, page, PICS_PER_PAGE)?;
    let urls: Vec<String> = names.into_iter().map(|n| format!("/img/{n}")).collect();
    Ok(Json(urls).into_response())
}
