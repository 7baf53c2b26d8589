//! Filesystem store for report files.
//!
//! Two directories under the data root: `incoming/` holds one file per open
//! report, `sync/` is the drop-zone downstream pipelines watch. A report
//! enters `sync/` through a single atomic rename, so watchers only ever see
//! complete files. Both directories must live on the same filesystem.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use report_models::{compact_timestamp, ReportMetadata};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("report file already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FileStoreError>;

/// Outcome of finalizing a report file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The file was renamed into the sync directory.
    Synced(PathBuf),
    /// The file was empty and has been removed.
    Discarded,
}

/// An entry of the incoming directory, as seen by crash recovery.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub report_id: String,
    pub path: PathBuf,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

pub struct ReportFileStore {
    incoming_dir: PathBuf,
    sync_dir: PathBuf,
}

impl ReportFileStore {
    /// Create the store under `data_root`, creating `incoming/` and `sync/`
    /// with mode 0700 if missing.
    pub fn new(data_root: &Path) -> Result<Self> {
        let incoming_dir = data_root.join("incoming");
        let sync_dir = data_root.join("sync");
        for dir in [&incoming_dir, &sync_dir] {
            fs::create_dir_all(dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(Self {
            incoming_dir,
            sync_dir,
        })
    }

    pub fn incoming_dir(&self) -> &Path {
        &self.incoming_dir
    }

    pub fn sync_dir(&self) -> &Path {
        &self.sync_dir
    }

    /// Create the empty incoming file for a new report. Fails if a file for
    /// this report id already exists.
    pub fn create(&self, report_id: &str) -> Result<PathBuf> {
        let path = self.incoming_dir.join(format!("{report_id}.json"));
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o640);
        }
        match options.open(&path) {
            Ok(_) => Ok(path),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(FileStoreError::AlreadyExists(path))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Append one newline-terminated serialized entry to an incoming file.
    /// Not fsynced per call; durability is settled on orderly shutdown.
    pub fn append(&self, incoming_path: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(incoming_path)?;
        file.write_all(bytes)?;
        Ok(())
    }

    /// Filename a closed report takes in the sync directory.
    pub fn sync_filename(meta: &ReportMetadata) -> String {
        format!(
            "{}-{}-{}-{}-{}-probe-0.2.0.json",
            compact_timestamp(meta.creation_time),
            meta.test_name,
            meta.report_id,
            meta.probe_asn,
            meta.probe_cc,
        )
    }

    /// Finalize a report file: discard it when empty, otherwise rename it
    /// atomically into the sync directory.
    pub fn finalize(&self, meta: &ReportMetadata) -> Result<FinalizeOutcome> {
        let size = fs::metadata(&meta.incoming_path)?.len();
        if size == 0 {
            fs::remove_file(&meta.incoming_path)?;
            return Ok(FinalizeOutcome::Discarded);
        }
        let sync_path = self.sync_dir.join(Self::sync_filename(meta));
        fs::rename(&meta.incoming_path, &sync_path)?;
        Ok(FinalizeOutcome::Synced(sync_path))
    }

    /// List the incoming directory for crash recovery.
    pub fn list_incoming(&self) -> Result<Vec<IncomingFile>> {
        let mut out = Vec::new();
        for dir_entry in fs::read_dir(&self.incoming_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let report_id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if path.extension().and_then(|e| e.to_str()) == Some("json") => {
                    stem.to_string()
                }
                _ => continue,
            };
            let stat = dir_entry.metadata()?;
            if !stat.is_file() {
                continue;
            }
            let mtime = stat.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            out.push(IncomingFile {
                report_id,
                path,
                size: stat.len(),
                mtime: DateTime::<Utc>::from(mtime),
            });
        }
        out.sort_by(|a, b| a.report_id.cmp(&b.report_id));
        Ok(out)
    }

    /// Unlink an archived file from the sync directory. The caller is
    /// responsible for validating the filename.
    pub fn remove_sync_file(&self, filename: &str) -> Result<()> {
        fs::remove_file(self.sync_dir.join(filename))?;
        Ok(())
    }
}
