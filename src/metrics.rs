use lazy_static::lazy_static;
use prometheus::{Counter, Histogram, register_counter, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("board_requests_total", "Total number of write requests").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter = register_counter!(
        "board_rate_limited_total",
        "Write requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "board_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref BACKUP_TOTAL: Counter =
        register_counter!("board_backups_total", "Backup archives created").unwrap();
    pub static ref RESTORE_TOTAL: Counter =
        register_counter!("board_restores_total", "Restore operations attempted").unwrap();
}
