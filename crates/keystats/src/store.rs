//! Owner of the statistics document and of every file it touches.
//!
//! All mutation and all file I/O happen while holding a single mutex, so a
//! save never observes a half-applied keystroke and two saves never race on
//! the temporary file.

use crate::{
    backup::{self, BackupSet},
    config::StorageConfig,
    error::{KeyStatsError, Result},
    export::{self, ExportFormat},
    model::{SequenceKind, StatisticsDocument},
    modifiers,
};
use chrono::{Local, NaiveDate};
use log::{debug, error, info, warn};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

/// How the in-memory document was obtained by [`Store::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No data file existed; started empty.
    Fresh,
    Loaded,
    /// The data file was unusable and was replaced from this backup.
    Restored(PathBuf),
    /// The data file was unusable and no backup could be used; started empty.
    Reset,
}

pub struct Store {
    data_file: PathBuf,
    backups: BackupSet,
    document: Mutex<StatisticsDocument>,
}

impl Store {
    /// Creates the data and backup directories and an empty document.
    pub fn new(storage: &StorageConfig) -> Result<Self> {
        let backups = BackupSet::new(storage);
        for dir in [storage.data_dir(), backups.dir().to_path_buf()] {
            fs::create_dir_all(&dir).map_err(|e| KeyStatsError::CreateDir {
                path: dir.clone(),
                source: e,
            })?;
        }

        debug!(
            "Backups go to {} (keeping {})",
            backups.dir().display(),
            backups.retention()
        );

        Ok(Self {
            data_file: storage.data_file.clone(),
            backups,
            document: Mutex::new(StatisticsDocument::new()),
        })
    }

    /// [`Store::new`] followed by [`Store::load`].
    pub fn open(storage: &StorageConfig) -> Result<Self> {
        let store = Self::new(storage)?;
        match store.load() {
            LoadOutcome::Fresh => info!("No statistics file yet, starting fresh"),
            LoadOutcome::Loaded => info!("Loaded statistics from {}", store.data_file.display()),
            LoadOutcome::Restored(from) => {
                warn!("Statistics restored from backup {}", from.display())
            }
            LoadOutcome::Reset => warn!("Statistics reset to an empty document"),
        }
        Ok(store)
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn backup_dir(&self) -> &Path {
        self.backups.dir()
    }

    fn lock(&self) -> MutexGuard<'_, StatisticsDocument> {
        self.document.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Counts one key press dated today.
    pub fn record_keystroke(
        &self,
        key_code: &str,
        display_name: &str,
        modifiers: &str,
        preceding: Option<&str>,
    ) {
        self.record_keystroke_on(
            Local::now().date_naive(),
            key_code,
            display_name,
            modifiers,
            preceding,
        );
    }

    pub fn record_keystroke_on(
        &self,
        date: NaiveDate,
        key_code: &str,
        display_name: &str,
        modifiers: &str,
        preceding: Option<&str>,
    ) {
        let combination = modifiers::canonicalize(modifiers);
        self.lock()
            .apply_keystroke(date, key_code, display_name, &combination, preceding);
    }

    pub fn record_sequence<S: AsRef<str>>(&self, codes: &[S], kind: SequenceKind) {
        self.lock().apply_sequence(codes, kind);
    }

    /// Clone of the current document.
    pub fn snapshot(&self) -> StatisticsDocument {
        self.lock().clone()
    }

    pub fn total_keystrokes(&self) -> u64 {
        self.lock().totals.total_keystrokes
    }

    pub fn combination_counts(&self) -> BTreeMap<String, u64> {
        self.lock().combination_counts()
    }

    /// Writes the document to disk, replacing the data file atomically.
    ///
    /// With `create_backup`, the file on disk is snapshotted first. A failed
    /// backup is logged and the save proceeds.
    pub fn save(&self, create_backup: bool) -> Result<()> {
        let doc = self.lock();

        if create_backup {
            if let Err(e) = self.backups.create(&self.data_file) {
                error!("Failed to create backup: {e}");
            }
        }

        let tmp = temp_path(&self.data_file);
        match write_document(&doc, &tmp, &self.data_file) {
            Ok(()) => {
                debug!(
                    "Saved {} keystrokes to {}",
                    doc.totals.total_keystrokes,
                    self.data_file.display()
                );
                Ok(())
            }
            Err(e) => {
                if tmp.is_file() {
                    let _ = fs::remove_file(&tmp);
                }
                error!("Failed to save statistics: {e}");
                Err(e)
            }
        }
    }

    /// Replaces the in-memory document with the data file's contents.
    ///
    /// Never fails: an unreadable or invalid file routes to
    /// [`Store::restore_from_backup`].
    pub fn load(&self) -> LoadOutcome {
        let mut doc = self.lock();

        if !self.data_file.exists() {
            *doc = StatisticsDocument::new();
            return LoadOutcome::Fresh;
        }

        match read_document(&self.data_file) {
            Ok(loaded) => {
                *doc = loaded;
                LoadOutcome::Loaded
            }
            Err(e) => {
                if e.is_corruption() {
                    warn!("Statistics file is corrupt: {e}");
                } else {
                    error!("Failed to read statistics file: {e}");
                }
                self.restore_locked(&mut doc)
            }
        }
    }

    /// Restores the newest usable backup over the data file and loads it.
    pub fn restore_from_backup(&self) -> LoadOutcome {
        let mut doc = self.lock();
        self.restore_locked(&mut doc)
    }

    /// Snapshots the data file now. `None` when nothing has been saved yet.
    pub fn create_backup(&self) -> Result<Option<PathBuf>> {
        let _doc = self.lock();
        self.backups.create(&self.data_file)
    }

    /// Writes a snapshot to a timestamped file in `output_dir`.
    pub fn export(&self, output_dir: Option<&Path>, format: ExportFormat) -> Result<PathBuf> {
        let doc = self.snapshot();
        let path = export::export_with_path(&doc, output_dir, format)?;
        info!("Exported statistics as {format} to {}", path.display());
        Ok(path)
    }

    fn restore_locked(&self, doc: &mut StatisticsDocument) -> LoadOutcome {
        let candidates = match self.backups.list() {
            Ok(list) => list,
            Err(e) => {
                error!("Failed to list backups: {e}");
                Vec::new()
            }
        };

        for backup in candidates {
            let restored = BackupSet::extract(&backup.path, &self.data_file)
                .and_then(|()| read_document(&self.data_file));
            match restored {
                Ok(restored) => {
                    *doc = restored;
                    info!("Restored statistics from {}", backup.path.display());
                    return LoadOutcome::Restored(backup.path);
                }
                Err(e) => warn!("Backup {} is unusable: {e}", backup.path.display()),
            }
        }

        warn!("No usable backup found, starting with empty statistics");
        *doc = StatisticsDocument::new();
        LoadOutcome::Reset
    }
}

/// Reads the statistics at `storage` without writing anything.
///
/// Follows the same fallbacks as [`Store::load`], but an unusable data file
/// is recovered from a backup in memory only, leaving the file for the
/// recorder to repair.
pub fn read_snapshot(storage: &StorageConfig) -> (StatisticsDocument, LoadOutcome) {
    let data_file = &storage.data_file;
    if !data_file.exists() {
        return (StatisticsDocument::new(), LoadOutcome::Fresh);
    }

    match read_document(data_file) {
        Ok(doc) => return (doc, LoadOutcome::Loaded),
        Err(e) => warn!("Statistics file is unusable: {e}"),
    }

    let candidates = BackupSet::new(storage).list().unwrap_or_else(|e| {
        error!("Failed to list backups: {e}");
        Vec::new()
    });
    for candidate in candidates {
        let restored =
            BackupSet::read(&candidate.path).and_then(|bytes| parse_document(&bytes, &candidate.path));
        match restored {
            Ok(doc) => {
                info!("Read statistics from backup {}", candidate.path.display());
                return (doc, LoadOutcome::Restored(candidate.path));
            }
            Err(e) => warn!("Backup {} is unusable: {e}", candidate.path.display()),
        }
    }

    (StatisticsDocument::new(), LoadOutcome::Reset)
}

/// Sibling file the data file is written to before the rename.
pub(crate) fn temp_path(data_file: &Path) -> PathBuf {
    backup::suffixed(data_file, "tmp")
}

fn read_document(path: &Path) -> Result<StatisticsDocument> {
    let bytes = fs::read(path).map_err(|e| KeyStatsError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_document(&bytes, path)
}

fn parse_document(bytes: &[u8], path: &Path) -> Result<StatisticsDocument> {
    let doc: StatisticsDocument =
        serde_json::from_slice(bytes).map_err(|e| KeyStatsError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !doc.is_consistent() {
        warn!(
            "{}: total_keystrokes {} does not match per-key sum {}",
            path.display(),
            doc.totals.total_keystrokes,
            doc.key_count_sum()
        );
    }
    Ok(doc)
}

fn write_document(doc: &StatisticsDocument, tmp: &Path, target: &Path) -> Result<()> {
    let file = File::create(tmp).map_err(|e| KeyStatsError::CreateFile {
        path: tmp.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, doc)?;

    let write_err = |e: std::io::Error| KeyStatsError::WriteFile {
        path: tmp.to_path_buf(),
        source: e,
    };
    writer.write_all(b"\n").map_err(write_err)?;
    let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;

    fs::rename(tmp, target).map_err(|e| KeyStatsError::Rename {
        from: tmp.to_path_buf(),
        to: target.to_path_buf(),
        source: e,
    })
}
