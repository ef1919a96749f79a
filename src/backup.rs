use anyhow::{Context, anyhow};
use chrono::Utc;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::SharedConfig;
use crate::store::Store;

const STORE_EXTENSION: &str = "db";

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    // the archive carries no recognizable database file; nothing live was touched
    #[error("no database file found in archive")]
    MissingStore,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub fn allowed_backup_file(name: &str) -> bool {
    matches!(name.rsplit_once('.'), Some((_, ext)) if ext.eq_ignore_ascii_case("zip"))
}

// Packages the database, the media directory and the config file into a zip,
// and replaces them from a previously produced archive. Restore is staged:
// the upload is extracted into a scratch directory and validated before any
// live file is touched.
pub struct BackupManager {
    db_path: PathBuf,
    media_dir: PathBuf,
    config_path: PathBuf,
    backup_dir: PathBuf,
    // only one restore may run at a time
    restore_lock: Mutex<()>,
}

impl BackupManager {
    pub fn new(db_path: PathBuf, media_dir: PathBuf, config_path: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            db_path,
            media_dir,
            config_path,
            backup_dir,
            restore_lock: Mutex::new(()),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    // Best-effort point-in-time snapshot; the database file is copied without
    // quiescing writers. A failed attempt leaves no partial archive behind.
    pub fn create_backup(&self) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir).context("create backup directory")?;
        let name = format!("backup_{}.zip", Utc::now().format("%y%m%d_%H%M%S"));
        let path = self.backup_dir.join(name);
        match self.write_archive(&path) {
            Ok(()) => Ok(path),
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }

    fn write_archive(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        if self.db_path.is_file() {
            let entry = base_name(&self.db_path)?;
            zip.start_file(entry, options).context("add database entry")?;
            let mut src = File::open(&self.db_path).context("open database for backup")?;
            io::copy(&mut src, &mut zip).context("copy database into archive")?;
        }

        if self.media_dir.is_dir() {
            let prefix = base_name(&self.media_dir)?;
            add_dir_recursive(&mut zip, &self.media_dir, &prefix, options)?;
        }

        if self.config_path.is_file() {
            let entry = base_name(&self.config_path)?;
            zip.start_file(entry, options).context("add config entry")?;
            let mut src = File::open(&self.config_path).context("open config for backup")?;
            io::copy(&mut src, &mut zip).context("copy config into archive")?;
        }

        zip.finish().context("finalize archive")?;
        Ok(())
    }

    // Replace the live store from an uploaded archive. Steps, in order:
    // staged extract, locate the database (abort here if absent), config swap
    // + reload, media swap, stale side-file purge, database copy, connection
    // reset. Scratch and upload are removed whatever the outcome. Steps
    // already applied when a later one fails are not rolled back.
    pub fn restore(
        &self,
        archive_path: &Path,
        store: &Store,
        config: &SharedConfig,
    ) -> Result<(), RestoreError> {
        let _guard = self.restore_lock.lock().unwrap_or_else(|e| e.into_inner());

        let scratch = self
            .backup_dir
            .join(format!("restore_{}", Utc::now().format("%y%m%d_%H%M%S")));
        let result = self.run_restore(archive_path, &scratch, store, config);

        let _ = fs::remove_dir_all(&scratch);
        let _ = fs::remove_file(archive_path);
        result
    }

    fn run_restore(
        &self,
        archive_path: &Path,
        scratch: &Path,
        store: &Store,
        config: &SharedConfig,
    ) -> Result<(), RestoreError> {
        // staged extract, never on top of live files
        let file = File::open(archive_path)
            .with_context(|| format!("open archive {}", archive_path.display()))?;
        let mut archive = ZipArchive::new(file).context("read archive")?;
        fs::create_dir_all(scratch).context("create scratch directory")?;
        archive.extract(scratch).context("extract archive")?;

        // locate the database before any live-side mutation
        let staged_db = self.locate_store(scratch).ok_or(RestoreError::MissingStore)?;

        // config swap, reloaded before data moves
        let staged_config = scratch.join(base_name(&self.config_path)?);
        if staged_config.is_file() {
            fs::copy(&staged_config, config.path()).context("copy config into place")?;
            config.reload().context("reload restored config")?;
        }

        // media swap: remove-then-move; a crash between the two leaves no
        // media directory at all, which is accepted since media is secondary
        let staged_media = scratch.join(base_name(&self.media_dir)?);
        if staged_media.is_dir() {
            if self.media_dir.exists() {
                fs::remove_dir_all(&self.media_dir).context("remove live media directory")?;
            }
            fs::rename(&staged_media, &self.media_dir).context("move staged media into place")?;
        }

        // purge stale side files beside the live store BEFORE the copy, or a
        // leftover log could replay discarded writes against the new file
        for suffix in ["-wal", "-shm"] {
            let side = sibling_with_suffix(&self.db_path, suffix);
            if side.exists() {
                fs::remove_file(&side)
                    .with_context(|| format!("remove stale side file {}", side.display()))?;
            }
        }

        // store swap
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent).context("create database parent directory")?;
        }
        fs::copy(&staged_db, &self.db_path).context("copy restored database into place")?;

        // drop cached handles so the next request opens the restored file
        store.reset();
        Ok(())
    }

    // Expected base name first, then any file with the store extension
    fn locate_store(&self, scratch: &Path) -> Option<PathBuf> {
        if let Ok(name) = base_name(&self.db_path) {
            let candidate = scratch.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        find_by_extension(scratch, STORE_EXTENSION)
    }
}

fn base_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| anyhow!("path has no usable file name: {}", path.display()))
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

fn add_dir_recursive(
    zip: &mut ZipWriter<File>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 file name in {}", dir.display()))?;
        let entry_name = format!("{prefix}/{name}");
        if path.is_dir() {
            add_dir_recursive(zip, &path, &entry_name, options)?;
        } else {
            zip.start_file(&entry_name, options)
                .with_context(|| format!("add {entry_name}"))?;
            let mut src = File::open(&path).with_context(|| format!("open {}", path.display()))?;
            io::copy(&mut src, zip).with_context(|| format!("copy {entry_name}"))?;
        }
    }
    Ok(())
}

fn find_by_extension(dir: &Path, ext: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            if path.extension().and_then(|e| e.to_str()) == Some(ext) {
                return Some(path);
            }
        } else if path.is_dir() {
            subdirs.push(path);
        }
    }
    subdirs.iter().find_map(|d| find_by_extension(d, ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SharedConfig;
    use crate::models::PostStatus;
    use crate::store::Store;
    use sha2::{Digest, Sha256};

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: crate::config::BoardPaths,
        manager: BackupManager,
        store: Store,
        config: SharedConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = crate::config::BoardPaths::new(dir.path().to_path_buf());
        let store = Store::open(paths.db_path()).unwrap();
        let config = SharedConfig::load_or_init(paths.config_path(), 10).unwrap();
        let manager = BackupManager::new(
            paths.db_path(),
            paths.img_dir(),
            paths.config_path(),
            paths.backup_dir(),
        );
        Fixture {
            _dir: dir,
            paths,
            manager,
            store,
            config,
        }
    }

    fn file_digest(path: &Path) -> String {
        let mut hasher = Sha256::new();
        hasher.update(fs::read(path).unwrap());
        format!("{:x}", hasher.finalize())
    }

    #[test]
    fn rejects_non_zip_names() {
        assert!(allowed_backup_file("backup.zip"));
        assert!(allowed_backup_file("BACKUP.ZIP"));
        assert!(!allowed_backup_file("backup.txt"));
        assert!(!allowed_backup_file("zip"));
    }

    #[test]
    fn backup_contains_store_media_and_config() {
        let fx = fixture();
        fx.store.insert_submission("post one", PostStatus::Pass).unwrap();
        fs::create_dir_all(fx.paths.img_dir()).unwrap();
        fs::write(fx.paths.img_dir().join("a.png"), b"png-bytes").unwrap();
        fs::create_dir_all(fx.paths.img_dir().join("thumbs")).unwrap();
        fs::write(fx.paths.img_dir().join("thumbs/b.jpg"), b"jpg-bytes").unwrap();

        let archive_path = fx.manager.create_backup().unwrap();
        let archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"database.db"));
        assert!(names.contains(&"img/a.png"));
        assert!(names.contains(&"img/thumbs/b.jpg"));
        assert!(names.contains(&"board_config.json"));
    }

    #[test]
    fn backup_then_restore_round_trip() {
        let source = fixture();
        source.store.insert_submission("first", PostStatus::Pass).unwrap();
        source.store.insert_submission("second", PostStatus::Pending).unwrap();
        source.config.update(|c| c.need_audit = true).unwrap();
        fs::create_dir_all(source.paths.img_dir()).unwrap();
        fs::write(source.paths.img_dir().join("a.png"), b"aaaa").unwrap();
        fs::write(source.paths.img_dir().join("b.gif"), b"bbbb").unwrap();
        // make sure everything sits in the main db file, not the WAL
        source.store.reset();

        let archive = source.manager.create_backup().unwrap();

        // fresh target with pre-existing content that must be replaced
        let target = fixture();
        target.store.insert_submission("stale", PostStatus::Pass).unwrap();
        target.store.reset();
        let upload = target.manager.backup_dir().join("upload.zip");
        fs::create_dir_all(target.manager.backup_dir()).unwrap();
        fs::copy(&archive, &upload).unwrap();

        target
            .manager
            .restore(&upload, &target.store, &target.config)
            .unwrap();

        let restored: Vec<String> = target
            .store
            .list_by_status(PostStatus::Pass)
            .unwrap()
            .into_iter()
            .map(|s| s.content)
            .collect();
        assert_eq!(restored, vec!["first".to_string()]);
        assert_eq!(target.store.count_submissions().unwrap(), 2);
        assert!(target.config.current().need_audit);
        assert_eq!(fs::read(target.paths.img_dir().join("a.png")).unwrap(), b"aaaa");
        assert_eq!(fs::read(target.paths.img_dir().join("b.gif")).unwrap(), b"bbbb");
        // upload and scratch are cleaned up
        assert!(!upload.exists());
    }

    #[test]
    fn restore_without_store_touches_nothing() {
        let fx = fixture();
        fx.store.insert_submission("precious", PostStatus::Pass).unwrap();
        fx.store.reset();
        let before = file_digest(&fx.paths.db_path());

        // archive with a config entry but no database
        fs::create_dir_all(fx.manager.backup_dir()).unwrap();
        let upload = fx.manager.backup_dir().join("empty.zip");
        let mut zip = ZipWriter::new(File::create(&upload).unwrap());
        zip.start_file("board_config.json", SimpleFileOptions::default()).unwrap();
        io::Write::write_all(&mut zip, b"{\"need_audit\":true,\"banned_keywords\":[],\"rate_limit\":1}")
            .unwrap();
        zip.finish().unwrap();

        let err = fx
            .manager
            .restore(&upload, &fx.store, &fx.config)
            .unwrap_err();
        assert!(matches!(err, RestoreError::MissingStore));

        // live database is byte-identical, config was not swapped either
        assert_eq!(file_digest(&fx.paths.db_path()), before);
        assert!(!fx.config.current().need_audit);
    }

    #[test]
    fn restore_purges_stale_side_files() {
        let source = fixture();
        source.store.insert_submission("kept", PostStatus::Pass).unwrap();
        source.store.reset();
        let archive = source.manager.create_backup().unwrap();

        let target = fixture();
        target.store.insert_submission("discarded", PostStatus::Pass).unwrap();
        target.store.reset();
        let wal = sibling_with_suffix(&target.paths.db_path(), "-wal");
        let shm = sibling_with_suffix(&target.paths.db_path(), "-shm");
        fs::write(&wal, b"stale log").unwrap();
        fs::write(&shm, b"stale index").unwrap();

        fs::create_dir_all(target.manager.backup_dir()).unwrap();
        let upload = target.manager.backup_dir().join("upload.zip");
        fs::copy(&archive, &upload).unwrap();
        target
            .manager
            .restore(&upload, &target.store, &target.config)
            .unwrap();

        assert!(!wal.exists());
        assert!(!shm.exists());
        let contents: Vec<String> = target
            .store
            .list_by_status(PostStatus::Pass)
            .unwrap()
            .into_iter()
            .map(|s| s.content)
            .collect();
        assert_eq!(contents, vec!["kept".to_string()]);
    }

    #[test]
    fn store_located_by_extension_fallback() {
        let fx = fixture();
        fs::create_dir_all(fx.manager.backup_dir()).unwrap();
        let upload = fx.manager.backup_dir().join("renamed.zip");

        // database stored under an unexpected name inside a subdirectory
        let mut zip = ZipWriter::new(File::create(&upload).unwrap());
        zip.add_directory("nested/", SimpleFileOptions::default()).unwrap();
        zip.start_file("nested/old_board.db", SimpleFileOptions::default()).unwrap();
        let source = fixture();
        source.store.insert_submission("renamed db", PostStatus::Pass).unwrap();
        source.store.reset();
        io::Write::write_all(&mut zip, &fs::read(source.paths.db_path()).unwrap()).unwrap();
        zip.finish().unwrap();

        fx.manager.restore(&upload, &fx.store, &fx.config).unwrap();
        assert_eq!(fx.store.count_submissions().unwrap(), 1);
    }

    #[test]
    fn backup_with_nothing_to_archive_is_still_valid() {
        let dir = tempfile::tempdir().unwrap();
        let paths = crate::config::BoardPaths::new(dir.path().to_path_buf());
        let manager = BackupManager::new(
            paths.db_path(),
            paths.img_dir(),
            paths.config_path(),
            paths.backup_dir(),
        );
        let path = manager.create_backup().unwrap();
        assert!(path.is_file());
        let archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
