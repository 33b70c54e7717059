use crate::{
    config::StorageConfig,
    error::{KeyStatsError, Result},
};
use chrono::Local;
use log::{debug, info};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

const BACKUP_EXTENSION: &str = "zip";
const FALLBACK_STEM: &str = "keystats";

/// One compressed snapshot in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Timestamp-named zip snapshots of the data file, pruned to a retention count.
#[derive(Debug, Clone)]
pub struct BackupSet {
    dir: PathBuf,
    stem: String,
    entry_name: String,
    retention: usize,
}

impl BackupSet {
    pub fn new(storage: &StorageConfig) -> Self {
        let stem = storage
            .data_file
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_STEM)
            .to_string();
        let entry_name = storage
            .data_file
            .file_name()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{stem}.json"));

        Self {
            dir: storage.backup_dir(),
            stem,
            entry_name,
            retention: storage.backup_retention.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Compresses `source` into a new snapshot, then prunes old ones.
    ///
    /// Returns `None` when `source` does not exist yet.
    pub fn create(&self, source: &Path) -> Result<Option<PathBuf>> {
        if !source.exists() {
            debug!("No data file at {} yet, skipping backup", source.display());
            return Ok(None);
        }

        fs::create_dir_all(&self.dir).map_err(|e| KeyStatsError::CreateDir {
            path: self.dir.clone(),
            source: e,
        })?;

        let path = self.next_path();
        if let Err(e) = self.write_archive(source, &path) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        info!("Backup created: {}", path.display());

        self.prune()?;
        Ok(Some(path))
    }

    /// Backups sorted newest first by modification time.
    pub fn list(&self) -> Result<Vec<BackupFile>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || !self.owns(&path) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            backups.push(BackupFile { path, modified });
        }

        // Names embed the creation time, so they break mtime ties.
        backups.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.path.file_name().cmp(&a.path.file_name()))
        });
        Ok(backups)
    }

    /// Deletes snapshots beyond the retention count, oldest first.
    pub fn prune(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for old in self.list()?.into_iter().skip(self.retention).rev() {
            fs::remove_file(&old.path)?;
            debug!("Removed old backup: {}", old.path.display());
            removed.push(old.path);
        }
        Ok(removed)
    }

    /// Decompresses `backup` into memory.
    pub fn read(backup: &Path) -> Result<Vec<u8>> {
        let mut archive = open_archive(backup)?;
        let mut entry = archive.by_index(0)?;
        let mut bytes = Vec::new();
        io::copy(&mut entry, &mut bytes).map_err(|e| KeyStatsError::ReadFile {
            path: backup.to_path_buf(),
            source: e,
        })?;
        Ok(bytes)
    }

    /// Decompresses `backup` over `target`, replacing it atomically.
    pub fn extract(backup: &Path, target: &Path) -> Result<()> {
        let mut archive = open_archive(backup)?;
        let mut entry = archive.by_index(0)?;

        let tmp = suffixed(target, "restore.tmp");
        let copied = File::create(&tmp)
            .map_err(|e| KeyStatsError::CreateFile {
                path: tmp.clone(),
                source: e,
            })
            .and_then(|mut out| {
                io::copy(&mut entry, &mut out)
                    .and_then(|_| out.sync_all())
                    .map_err(|e| KeyStatsError::WriteFile {
                        path: tmp.clone(),
                        source: e,
                    })
            });
        if let Err(e) = copied {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            KeyStatsError::Rename {
                from: tmp.clone(),
                to: target.to_path_buf(),
                source: e,
            }
        })
    }

    fn write_archive(&self, source: &Path, path: &Path) -> Result<()> {
        let mut input = File::open(source).map_err(|e| KeyStatsError::ReadFile {
            path: source.to_path_buf(),
            source: e,
        })?;
        let output = File::create(path).map_err(|e| KeyStatsError::CreateFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut writer = ZipWriter::new(output);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(self.entry_name.as_str(), options)?;
        io::copy(&mut input, &mut writer).map_err(|e| KeyStatsError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let output = writer.finish()?;
        output.sync_all().map_err(|e| KeyStatsError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn next_path(&self) -> PathBuf {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
        let mut seq = 0u32;
        loop {
            let candidate = self.dir.join(format!(
                "{}_{timestamp}_{seq:03}.{BACKUP_EXTENSION}",
                self.stem
            ));
            if !candidate.exists() {
                return candidate;
            }
            seq += 1;
        }
    }

    fn owns(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            return false;
        };
        name.starts_with(&format!("{}_", self.stem))
            && path.extension().and_then(|s| s.to_str()) == Some(BACKUP_EXTENSION)
    }
}

fn open_archive(backup: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(backup).map_err(|e| KeyStatsError::ReadFile {
        path: backup.to_path_buf(),
        source: e,
    })?;
    let archive = ZipArchive::new(file)?;
    if archive.is_empty() {
        return Err(KeyStatsError::Corrupt {
            path: backup.to_path_buf(),
            reason: "backup archive is empty".to_string(),
        });
    }
    Ok(archive)
}

/// `path` with `.<suffix>` appended to its full file name, so the result never
/// equals `path` itself.
pub(crate) fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());
    path.with_file_name(format!("{name}.{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_in(temp_dir: &TempDir, retention: usize) -> StorageConfig {
        StorageConfig {
            data_file: temp_dir.path().join("keyboard_log.json"),
            backup_retention: retention,
        }
    }

    #[test]
    fn test_no_source_no_backup() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir, 3);
        let backups = BackupSet::new(&storage);

        assert_eq!(backups.create(&storage.data_file).unwrap(), None);
        assert!(backups.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_and_extract() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir, 3);
        let backups = BackupSet::new(&storage);
        fs::write(&storage.data_file, b"{\"hello\": 1}").unwrap();

        let path = backups.create(&storage.data_file).unwrap().unwrap();
        assert!(path.starts_with(temp_dir.path().join("backup")));
        assert_eq!(path.extension().unwrap(), "zip");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("keyboard_log_"));

        fs::write(&storage.data_file, b"garbage").unwrap();
        BackupSet::extract(&path, &storage.data_file).unwrap();
        assert_eq!(
            fs::read_to_string(&storage.data_file).unwrap(),
            "{\"hello\": 1}"
        );
    }

    #[test]
    fn test_read_backup_into_memory() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir, 3);
        let backups = BackupSet::new(&storage);
        fs::write(&storage.data_file, b"{\"n\": 7}").unwrap();
        let path = backups.create(&storage.data_file).unwrap().unwrap();

        fs::write(&storage.data_file, b"changed").unwrap();
        assert_eq!(BackupSet::read(&path).unwrap(), b"{\"n\": 7}");
        assert_eq!(fs::read_to_string(&storage.data_file).unwrap(), "changed");
    }

    #[test]
    fn test_suffixed_never_returns_the_same_path() {
        let tmp_named = Path::new("/data/keyboard_log.tmp");
        assert_eq!(
            suffixed(tmp_named, "tmp"),
            PathBuf::from("/data/keyboard_log.tmp.tmp")
        );
        assert_eq!(
            suffixed(Path::new("keyboard_log.json"), "restore.tmp"),
            PathBuf::from("keyboard_log.json.restore.tmp")
        );
    }

    #[test]
    fn test_retention_keeps_most_recent() {
        let temp_dir = TempDir::new().unwrap();
        let retention = 3;
        let storage = storage_in(&temp_dir, retention);
        let backups = BackupSet::new(&storage);

        let mut created = Vec::new();
        for i in 0..retention + 3 {
            fs::write(&storage.data_file, format!("{{\"n\": {i}}}")).unwrap();
            created.push(backups.create(&storage.data_file).unwrap().unwrap());
        }

        let remaining: Vec<PathBuf> = backups.list().unwrap().into_iter().map(|b| b.path).collect();
        assert_eq!(remaining.len(), retention);

        let mut expected: Vec<PathBuf> = created[created.len() - retention..].to_vec();
        expected.reverse();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir, 3);
        let backups = BackupSet::new(&storage);
        fs::create_dir_all(backups.dir()).unwrap();
        fs::write(backups.dir().join("notes.txt"), b"x").unwrap();
        fs::write(backups.dir().join("other_20240101.zip"), b"x").unwrap();

        assert!(backups.list().unwrap().is_empty());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let bogus = temp_dir.path().join("keyboard_log_bad.zip");
        fs::write(&bogus, b"definitely not a zip").unwrap();

        let target = temp_dir.path().join("keyboard_log.json");
        fs::write(&target, b"keep me").unwrap();

        let err = BackupSet::extract(&bogus, &target).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(fs::read_to_string(&target).unwrap(), "keep me");
    }
}
