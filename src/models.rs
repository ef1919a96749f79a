use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ANONYMOUS_NICKNAME: &str = "anonymous";

// Moderation state of a post or report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostStatus {
    Pass,
    Pending,
    Deny,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pass => "Pass",
            PostStatus::Pending => "Pending",
            PostStatus::Deny => "Deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pass" => Some(PostStatus::Pass),
            "Pending" => Some(PostStatus::Pending),
            "Deny" => Some(PostStatus::Deny),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub id: i64,
    pub content: String,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub upvotes: i64,
    pub downvotes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub submission_id: i64,
    pub nickname: String,
    pub content: String,
    // 0 means top-level, anything else references another comment on the same post
    pub parent_comment_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: i64,
    pub submission_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// Request bodies shared by several handlers
#[derive(Deserialize)]
pub struct IdPayload {
    pub id: Option<i64>,
}

#[derive(Deserialize)]
pub struct IdQuery {
    pub id: Option<i64>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}
