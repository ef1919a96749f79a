use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

mod auth;
mod backup;
mod config;
mod error;
mod handlers;
mod media;
mod metrics;
mod models;
mod rate_limit;
mod state;
mod store;

use crate::backup::BackupManager;
use crate::config::{Args, BoardPaths, SharedConfig};
use crate::rate_limit::RateLimiter;
use crate::state::AppState;
use crate::store::Store;

// uploaded restore archives can be large
const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    let paths = BoardPaths::new(args.data_dir.clone());
    std::fs::create_dir_all(paths.img_dir()).expect("create media directory");
    std::fs::create_dir_all(paths.backup_dir()).expect("create backup directory");

    let store = Store::open(paths.db_path()).expect("open database");
    let config =
        SharedConfig::load_or_init(paths.config_path(), args.rate_limit).expect("load config");
    let backup = BackupManager::new(
        paths.db_path(),
        paths.img_dir(),
        paths.config_path(),
        paths.backup_dir(),
    );

    // creating shared state
    let state = Arc::new(AppState {
        store,
        config,
        rate_limiter: RateLimiter::new(Duration::from_secs(args.rate_window)),
        backup,
        img_dir: paths.img_dir(),
        admin_token_digest: auth::token_digest(&args.admin_token),
    });

    // creating the router with routes
    let app = Router::new()
        // public board
        .route("/post", post(handlers::submit_post))
        .route("/up", post(handlers::upvote))
        .route("/down", post(handlers::downvote))
        .route("/comment", post(handlers::post_comment))
        .route("/report", post(handlers::submit_report))
        .route("/upload_pic", post(handlers::upload_pic))
        .route("/img/{filename}", get(handlers::serve_image))
        .route("/get/post_state", get(handlers::get_post_state))
        .route("/get/report_state", get(handlers::get_report_state))
        .route("/get/post_info", get(handlers::get_post_info))
        .route("/get/comment", get(handlers::get_comments))
        .route("/get/10_info", get(handlers::get_ten_info))
        .route("/get/notices", get(handlers::get_notices))
        .route("/get/statics", get(handlers::get_statics))
        .route("/get/api_info", get(handlers::get_api_info))
        .route("/get/teapot", get(handlers::teapot))
        // admin moderation
        .route("/admin/approve", post(handlers::admin_approve))
        .route("/admin/disapprove", post(handlers::admin_disapprove))
        .route("/admin/reaudit", post(handlers::admin_reaudit))
        .route("/admin/del_post", post(handlers::admin_del_post))
        .route("/admin/modify_post", post(handlers::admin_modify_post))
        .route("/admin/del_comment", post(handlers::admin_del_comment))
        .route("/admin/modify_comment", post(handlers::admin_modify_comment))
        .route("/admin/del_pic", post(handlers::admin_del_pic))
        .route("/admin/approve_report", post(handlers::admin_approve_report))
        .route("/admin/reject_report", post(handlers::admin_reject_report))
        .route("/admin/need_audit", post(handlers::admin_toggle_audit))
        .route("/admin/add_keyword", post(handlers::admin_add_keyword))
        .route("/admin/del_keyword", post(handlers::admin_del_keyword))
        .route("/admin/notice", post(handlers::admin_create_notice))
        .route("/admin/del_notice", post(handlers::admin_delete_notice))
        // admin queries
        .route("/admin/get/need_audit", get(handlers::admin_get_need_audit))
        .route("/admin/get/keywords", get(handlers::admin_get_keywords))
        .route("/admin/get/post_info", get(handlers::admin_get_post_info))
        .route("/admin/get/pending_posts", get(handlers::admin_pending_posts))
        .route("/admin/get/reject_posts", get(handlers::admin_reject_posts))
        .route("/admin/get/pending_reports", get(handlers::admin_pending_reports))
        .route("/admin/get/pic_links", get(handlers::admin_get_pic_links))
        // backup and restore
        .route("/admin/get/backup", get(handlers::admin_get_backup))
        .route("/admin/recover", post(handlers::admin_recover))
        // service endpoints
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state.clone());

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("bind address");

    tracing::info!("board running on http://localhost:{}", args.port);
    tracing::info!("data directory: {}", args.data_dir.display());
    tracing::info!(
        "rate limit: {} requests per {} seconds",
        state.config.current().rate_limit,
        args.rate_window
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
