use axum::http::HeaderMap;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

// Rate limit entry - tracks requests per hashed client key
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

// Sliding-window limiter: the window rolls forward from the first request
// after expiry, it does not average across the boundary.
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    pub fn check(&self, key: &str, limit: u32) -> bool {
        self.check_at(key, limit, Instant::now())
    }

    // limit == 0 disables limiting entirely
    pub fn check_at(&self, key: &str, limit: u32, now: Instant) -> bool {
        if limit == 0 {
            return true;
        }

        // the entry guard holds the shard lock, so read-check-increment is
        // atomic per key and concurrent requests cannot both slip under the cap
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        // window expired..? reset it
        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 1;
            entry.window_start = now;
            return true;
        }

        entry.count += 1;
        entry.count <= limit
    }
}

// Derive the per-client key: first trusted proxy header, else the socket
// peer, else a fixed fallback; hashed so the map never stores a raw address.
// The headers are client-supplied and spoofable - this is bookkeeping, not
// an access control.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let from_headers = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        });

    let raw = from_headers
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn allows_n_then_rejects() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.check_at("a", 10, now));
        }
        assert!(!limiter.check_at("a", 10, now));
        assert!(!limiter.check_at("a", 10, now));
    }

    #[test]
    fn zero_limit_disables() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..1000 {
            assert!(limiter.check_at("a", 0, now));
        }
    }

    #[test]
    fn window_rolls_forward() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("a", 2, start));
        assert!(limiter.check_at("a", 2, start));
        assert!(!limiter.check_at("a", 2, start));

        // first request past the window resets the count to 1
        let later = start + Duration::from_secs(60);
        assert!(limiter.check_at("a", 2, later));
        assert!(limiter.check_at("a", 2, later));
        assert!(!limiter.check_at("a", 2, later));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check_at("a", 1, now));
        assert!(!limiter.check_at("a", 1, now));
        assert!(limiter.check_at("b", 1, now));
    }

    #[test]
    fn concurrent_checks_allow_exactly_n() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let threads = 8;
        let limit = 5;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    limiter.check("shared", limit)
                })
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(allowed, limit as usize);
    }

    #[test]
    fn header_priority_and_fallback() {
        let peer: SocketAddr = "10.0.0.1:12345".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8".parse().unwrap());
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        let forwarded = client_key(&headers, Some(peer));

        let mut only_real = HeaderMap::new();
        only_real.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        let real = client_key(&only_real, Some(peer));

        let bare = client_key(&HeaderMap::new(), Some(peer));
        let nothing = client_key(&HeaderMap::new(), None);

        // all distinct inputs, all fixed-length digests
        assert_ne!(forwarded, real);
        assert_ne!(real, bare);
        assert_eq!(bare.len(), 64);
        assert_eq!(nothing, client_key(&HeaderMap::new(), None));
        // digest hides the raw address
        assert!(!bare.contains("10.0.0.1"));
    }
}
