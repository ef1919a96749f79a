use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};

use crate::error::ApiError;

// SHA-256 hex digest; the clear-text admin token is never kept in memory
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

// Bearer-token check for the admin endpoints. Missing/non-Bearer header is
// 401, a wrong token is 403, both with reason "Token invalid".
pub fn require_admin(headers: &HeaderMap, expected_digest: &str) -> Result<(), ApiError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return Err(ApiError::Unauthorized);
    };
    if token_digest(token) != expected_digest {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_is_checked_against_digest() {
        let digest = token_digest("hunter2");

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer hunter2".parse().unwrap());
        assert!(require_admin(&headers, &digest).is_ok());

        let mut wrong = HeaderMap::new();
        wrong.insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
        assert!(matches!(
            require_admin(&wrong, &digest),
            Err(ApiError::Forbidden)
        ));

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, "Basic hunter2".parse().unwrap());
        assert!(matches!(
            require_admin(&basic, &digest),
            Err(ApiError::Unauthorized)
        ));

        assert!(matches!(
            require_admin(&HeaderMap::new(), &digest),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn digest_is_stable_hex() {
        let d = token_digest("abc");
        assert_eq!(d.len(), 64);
        assert_eq!(d, token_digest("abc"));
        assert_ne!(d, token_digest("abd"));
    }
}
