use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "whisper-board")]
#[command(about = "Anonymous posting board API")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    // Data directory (database, images, backups and config live here)
    #[arg(short, long, default_value = "data")]
    pub data_dir: PathBuf,

    // Admin bearer token; only its SHA-256 digest is kept in memory
    #[arg(long)]
    pub admin_token: String,

    // Rate limit max requests per window (0 disables), seeds the config file
    #[arg(long, default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,
}

// Well-known locations inside the data directory
#[derive(Debug, Clone)]
pub struct BoardPaths {
    pub data_dir: PathBuf,
}

impl BoardPaths {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("database.db")
    }

    pub fn img_dir(&self) -> PathBuf {
        self.data_dir.join("img")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("board_config.json")
    }
}

// Runtime-adjustable settings. Kept in a JSON file beside the database so a
// backup archive carries them, and swapped as one immutable value so readers
// never observe a half-updated config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub need_audit: bool,
    pub banned_keywords: Vec<String>,
    pub rate_limit: u32,
}

impl RuntimeConfig {
    pub fn contains_banned(&self, text: &str) -> bool {
        self.banned_keywords
            .iter()
            .any(|k| !k.is_empty() && text.contains(k.as_str()))
    }
}

pub struct SharedConfig {
    path: PathBuf,
    inner: RwLock<Arc<RuntimeConfig>>,
}

impl SharedConfig {
    // Load the config file, creating it with defaults on first start
    pub fn load_or_init(path: PathBuf, default_rate_limit: u32) -> anyhow::Result<Self> {
        let cfg = if path.is_file() {
            read_config(&path)?
        } else {
            let cfg = RuntimeConfig {
                need_audit: false,
                banned_keywords: Vec::new(),
                rate_limit: default_rate_limit,
            };
            write_config(&path, &cfg)?;
            cfg
        };
        Ok(Self {
            path,
            inner: RwLock::new(Arc::new(cfg)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Arc<RuntimeConfig> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // Mutate a copy, persist it, then swap the shared pointer
    pub fn update(&self, f: impl FnOnce(&mut RuntimeConfig)) -> anyhow::Result<()> {
        let mut cfg = (*self.current()).clone();
        f(&mut cfg);
        write_config(&self.path, &cfg)?;
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(cfg);
        Ok(())
    }

    // Re-read the file on disk, e.g. after a restore replaced it
    pub fn reload(&self) -> anyhow::Result<()> {
        let cfg = read_config(&self.path)?;
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(cfg);
        Ok(())
    }
}

fn read_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
}

fn write_config(path: &Path, cfg: &RuntimeConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(cfg)?;
    std::fs::write(path, raw).with_context(|| format!("write config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_defaults_and_reload_sees_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board_config.json");

        let cfg = SharedConfig::load_or_init(path.clone(), 10).unwrap();
        assert!(!cfg.current().need_audit);
        assert_eq!(cfg.current().rate_limit, 10);
        assert!(path.is_file());

        cfg.update(|c| c.need_audit = true).unwrap();
        assert!(cfg.current().need_audit);

        // a second handle reading the same file picks the change up
        let other = SharedConfig::load_or_init(path, 10).unwrap();
        assert!(other.current().need_audit);
    }

    #[test]
    fn reload_swaps_in_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board_config.json");
        let cfg = SharedConfig::load_or_init(path.clone(), 5).unwrap();

        let replacement = RuntimeConfig {
            need_audit: true,
            banned_keywords: vec!["spam".into()],
            rate_limit: 99,
        };
        std::fs::write(&path, serde_json::to_string(&replacement).unwrap()).unwrap();
        cfg.reload().unwrap();

        let current = cfg.current();
        assert!(current.need_audit);
        assert_eq!(current.rate_limit, 99);
        assert_eq!(current.banned_keywords, vec!["spam".to_string()]);
    }

    #[test]
    fn banned_keyword_matching() {
        let cfg = RuntimeConfig {
            need_audit: false,
            banned_keywords: vec!["spam".into(), String::new()],
            rate_limit: 0,
        };
        assert!(cfg.contains_banned("buy spam today"));
        assert!(!cfg.contains_banned("perfectly fine"));
    }
}
