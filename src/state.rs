use axum::http::HeaderMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::backup::BackupManager;
use crate::config::SharedConfig;
use crate::error::ApiError;
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_TOTAL};
use crate::rate_limit::{RateLimiter, client_key};
use crate::store::Store;

// app's shared state
pub struct AppState {
    pub store: Store,
    pub config: SharedConfig,
    pub rate_limiter: RateLimiter,
    pub backup: BackupManager,
    pub img_dir: PathBuf,
    pub admin_token_digest: String,
}

impl AppState {
    // Gate for the public write endpoints: runs before any other validation
    pub fn check_rate_limit(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<(), ApiError> {
        REQUEST_TOTAL.inc();
        let limit = self.config.current().rate_limit;
        let key = client_key(headers, peer);
        if self.rate_limiter.check(&key, limit) {
            Ok(())
        } else {
            RATE_LIMITED_TOTAL.inc();
            Err(ApiError::RateLimited)
        }
    }
}
