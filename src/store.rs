use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::{Comment, Notice, PostStatus, Report, Submission};

const SCHEMA: &str = r#"
PRAGMA journal_mode=WAL;
PRAGMA foreign_keys=ON;

CREATE TABLE IF NOT EXISTS submissions (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  content TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'Pending' CHECK (status IN ('Pass','Pending','Deny')),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  upvotes INTEGER NOT NULL DEFAULT 0,
  downvotes INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS comments (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
  nickname TEXT NOT NULL,
  content TEXT NOT NULL,
  parent_comment_id INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_comments_submission ON comments(submission_id);

CREATE TABLE IF NOT EXISTS reports (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  submission_id INTEGER NULL,
  title TEXT NOT NULL,
  content TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'Pending' CHECK (status IN ('Pass','Pending','Deny')),
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notices (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT NOT NULL,
  content TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#;

// Outcome of an admin status transition
#[derive(Debug, PartialEq, Eq)]
pub enum StatusChange {
    Changed,
    NotFound,
    WrongState,
}

// SQLite-backed store. One cached connection behind a mutex; reset() drops it
// so the next call reopens the file (required after a restore replaced it).
pub struct Store {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = open_connection(&path)?;
        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    // Drop the cached connection; the next operation reopens the live file
    pub fn reset(&self) {
        let mut slot = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> anyhow::Result<T> {
        let mut slot = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(open_connection(&self.path)?);
        }
        let conn = slot.as_ref().expect("connection populated above");
        Ok(f(conn)?)
    }

    // ── submissions ─────────────────────────────────────────────────────

    pub fn insert_submission(&self, content: &str, status: PostStatus) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO submissions (content, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![content, status.as_str(), now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_submission(&self, id: i64) -> anyhow::Result<Option<Submission>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, content, status, created_at, updated_at, upvotes, downvotes
                 FROM submissions WHERE id = ?1",
                params![id],
                row_to_submission,
            )
            .optional()
        })
    }

    pub fn change_status(
        &self,
        id: i64,
        from: PostStatus,
        to: PostStatus,
    ) -> anyhow::Result<StatusChange> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM submissions WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            match current {
                None => Ok(StatusChange::NotFound),
                Some(s) if s != from.as_str() => Ok(StatusChange::WrongState),
                Some(_) => {
                    conn.execute(
                        "UPDATE submissions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                        params![to.as_str(), now, id],
                    )?;
                    Ok(StatusChange::Changed)
                }
            }
        })
    }

    pub fn upvote(&self, id: i64) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE submissions SET upvotes = upvotes + 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn downvote(&self, id: i64) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE submissions SET downvotes = downvotes + 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn update_submission_content(&self, id: i64, content: &str) -> anyhow::Result<bool> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE submissions SET content = ?1, updated_at = ?2 WHERE id = ?3",
                params![content, now, id],
            )?;
            Ok(n > 0)
        })
    }

    // Comments go with the post (ON DELETE CASCADE)
    pub fn delete_submission(&self, id: i64) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM submissions WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
    }

    pub fn list_by_status(&self, status: PostStatus) -> anyhow::Result<Vec<Submission>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, status, created_at, updated_at, upvotes, downvotes
                 FROM submissions WHERE status = ?1 ORDER BY id DESC",
            )?;
            let rows = stmt.query_map(params![status.as_str()], row_to_submission)?;
            rows.collect()
        })
    }

    // Newest-first page of approved posts
    pub fn page_passed(&self, page: i64, per_page: i64) -> anyhow::Result<Vec<Submission>> {
        let page = page.max(1);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, status, created_at, updated_at, upvotes, downvotes
                 FROM submissions WHERE status = 'Pass' ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![per_page, (page - 1) * per_page], row_to_submission)?;
            rows.collect()
        })
    }

    pub fn count_submissions(&self) -> anyhow::Result<i64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))
        })
    }

    // ── comments ────────────────────────────────────────────────────────

    pub fn insert_comment(
        &self,
        submission_id: i64,
        parent_comment_id: i64,
        nickname: &str,
        content: &str,
    ) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (submission_id, nickname, content, parent_comment_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![submission_id, nickname, content, parent_comment_id, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_comment(&self, id: i64) -> anyhow::Result<Option<Comment>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, submission_id, nickname, content, parent_comment_id, created_at
                 FROM comments WHERE id = ?1",
                params![id],
                row_to_comment,
            )
            .optional()
        })
    }

    pub fn comments_for(&self, submission_id: i64) -> anyhow::Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, submission_id, nickname, content, parent_comment_id, created_at
                 FROM comments WHERE submission_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![submission_id], row_to_comment)?;
            rows.collect()
        })
    }

    pub fn update_comment(
        &self,
        id: i64,
        content: &str,
        parent_comment_id: i64,
        nickname: &str,
    ) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE comments SET content = ?1, parent_comment_id = ?2, nickname = ?3 WHERE id = ?4",
                params![content, parent_comment_id, nickname, id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn delete_comment(&self, id: i64) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
    }

    pub fn count_comments(&self) -> anyhow::Result<i64> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0)))
    }

    // ── reports ─────────────────────────────────────────────────────────

    pub fn insert_report(
        &self,
        submission_id: i64,
        title: &str,
        content: &str,
    ) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports (submission_id, title, content, status, created_at)
                 VALUES (?1, ?2, ?3, 'Pending', ?4)",
                params![submission_id, title, content, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_report(&self, id: i64) -> anyhow::Result<Option<Report>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, submission_id, title, content, status, created_at
                 FROM reports WHERE id = ?1",
                params![id],
                row_to_report,
            )
            .optional()
        })
    }

    pub fn set_report_status(&self, id: i64, status: PostStatus) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE reports SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn pending_reports(&self) -> anyhow::Result<Vec<Report>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, submission_id, title, content, status, created_at
                 FROM reports WHERE status = 'Pending' ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_report)?;
            rows.collect()
        })
    }

    // ── notices ─────────────────────────────────────────────────────────

    pub fn insert_notice(&self, title: &str, content: &str) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notices (title, content, created_at) VALUES (?1, ?2, ?3)",
                params![title, content, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn delete_notice(&self, id: i64) -> anyhow::Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM notices WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
    }

    pub fn list_notices(&self) -> anyhow::Result<Vec<Notice>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, content, created_at FROM notices ORDER BY id DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Notice {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    created_at: parse_ts(row.get(3)?)?,
                })
            })?;
            rows.collect()
        })
    }
}

fn open_connection(path: &Path) -> anyhow::Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("open db: {}", path.display()))?;
    conn.execute_batch(SCHEMA)
        .with_context(|| format!("init schema: {}", path.display()))?;
    Ok(conn)
}

fn parse_ts(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_status(raw: String) -> rusqlite::Result<PostStatus> {
    PostStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown status: {raw}").into(),
        )
    })
}

fn row_to_submission(row: &Row<'_>) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: row.get(0)?,
        content: row.get(1)?,
        status: parse_status(row.get(2)?)?,
        created_at: parse_ts(row.get(3)?)?,
        updated_at: parse_ts(row.get(4)?)?,
        upvotes: row.get(5)?,
        downvotes: row.get(6)?,
    })
}

fn row_to_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        submission_id: row.get(1)?,
        nickname: row.get(2)?,
        content: row.get(3)?,
        parent_comment_id: row.get(4)?,
        created_at: parse_ts(row.get(5)?)?,
    })
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: row.get(0)?,
        submission_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        status: parse_status(row.get(4)?)?,
        created_at: parse_ts(row.get(5)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("database.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn submission_roundtrip() {
        let (_dir, store) = temp_store();
        let id = store.insert_submission("hello board", PostStatus::Pending).unwrap();
        let s = store.get_submission(id).unwrap().unwrap();
        assert_eq!(s.content, "hello board");
        assert_eq!(s.status, PostStatus::Pending);
        assert_eq!(s.upvotes, 0);

        assert!(store.upvote(id).unwrap());
        assert!(store.downvote(id).unwrap());
        let s = store.get_submission(id).unwrap().unwrap();
        assert_eq!((s.upvotes, s.downvotes), (1, 1));

        assert!(!store.upvote(id + 100).unwrap());
    }

    #[test]
    fn status_transitions() {
        let (_dir, store) = temp_store();
        let id = store.insert_submission("pending post", PostStatus::Pending).unwrap();

        assert_eq!(
            store.change_status(id, PostStatus::Pending, PostStatus::Pass).unwrap(),
            StatusChange::Changed
        );
        // already Pass, approving again is a wrong-state transition
        assert_eq!(
            store.change_status(id, PostStatus::Pending, PostStatus::Pass).unwrap(),
            StatusChange::WrongState
        );
        assert_eq!(
            store.change_status(9999, PostStatus::Pending, PostStatus::Pass).unwrap(),
            StatusChange::NotFound
        );
        // re-audit goes back to Pending
        assert_eq!(
            store.change_status(id, PostStatus::Pass, PostStatus::Pending).unwrap(),
            StatusChange::Changed
        );
    }

    #[test]
    fn comments_cascade_with_post() {
        let (_dir, store) = temp_store();
        let post = store.insert_submission("post", PostStatus::Pass).unwrap();
        let top = store.insert_comment(post, 0, "alice", "first").unwrap();
        store.insert_comment(post, top, "bob", "reply").unwrap();
        assert_eq!(store.comments_for(post).unwrap().len(), 2);

        assert!(store.delete_submission(post).unwrap());
        assert_eq!(store.comments_for(post).unwrap().len(), 0);
        assert!(store.get_comment(top).unwrap().is_none());
    }

    #[test]
    fn passed_page_is_newest_first() {
        let (_dir, store) = temp_store();
        for i in 0..15 {
            let status = if i % 3 == 0 { PostStatus::Pending } else { PostStatus::Pass };
            store.insert_submission(&format!("post {i}"), status).unwrap();
        }
        let page1 = store.page_passed(1, 10).unwrap();
        assert_eq!(page1.len(), 10);
        assert!(page1.windows(2).all(|w| w[0].id > w[1].id));
        assert!(page1.iter().all(|s| s.status == PostStatus::Pass));

        let pending = store.list_by_status(PostStatus::Pending).unwrap();
        assert_eq!(pending.len(), 5);
    }

    #[test]
    fn reports_and_notices() {
        let (_dir, store) = temp_store();
        let post = store.insert_submission("bad post", PostStatus::Pass).unwrap();
        let report = store.insert_report(post, "spam", "this is spam").unwrap();
        assert_eq!(store.pending_reports().unwrap().len(), 1);

        assert!(store.set_report_status(report, PostStatus::Pass).unwrap());
        assert_eq!(store.pending_reports().unwrap().len(), 0);
        assert_eq!(store.get_report(report).unwrap().unwrap().status, PostStatus::Pass);

        let n1 = store.insert_notice("maintenance", "down at noon").unwrap();
        let n2 = store.insert_notice("welcome", "be nice").unwrap();
        let notices = store.list_notices().unwrap();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].id, n2);
        assert!(store.delete_notice(n1).unwrap());
        assert!(!store.delete_notice(n1).unwrap());
    }

    #[test]
    fn reset_reopens_the_file() {
        let (_dir, store) = temp_store();
        let id = store.insert_submission("survives reset", PostStatus::Pass).unwrap();
        store.reset();
        let s = store.get_submission(id).unwrap().unwrap();
        assert_eq!(s.content, "survives reset");
    }
}
