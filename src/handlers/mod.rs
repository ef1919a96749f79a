mod admin;
mod comments;
mod health;
mod images;
mod metrics;
mod notices;
mod posts;
mod reports;

pub use admin::*;
pub use comments::*;
pub use health::health_handler;
pub use images::*;
pub use metrics::metrics_handler;
pub use notices::*;
pub use posts::*;
pub use reports::*;
