//! Report lifecycle engine.
//!
//! Coordinates the metadata store, the report file store and the expiry
//! timers behind a per-report locking discipline. A report is OPEN from
//! `open` until `close` (explicit, one-shot or expiry-triggered) and never
//! leaves CLOSED. Appends serialize per report; distinct reports proceed in
//! parallel.

mod error;
mod hook;
mod lock_table;

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use expiry::TimerSet;
use meta_db::{MetaDb, MetaDbError};
use report_fs::{FinalizeOutcome, ReportFileStore};
use report_models::{ids, validate, BackendExtra, CreateReportRequest, MeasurementEntry, ReportMetadata};

pub use error::{EngineError, Result};
pub use hook::{CloseHook, NoopHook};
pub use lock_table::LockTable;

/// Why a close was requested. Expiry closes swallow not-found and
/// already-closed conditions instead of surfacing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Explicit,
    Expiry,
    OneShot,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            CloseReason::Explicit => "explicit",
            CloseReason::Expiry => "expiry",
            CloseReason::OneShot => "one-shot",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Inactivity window after which an open report is closed automatically.
    pub expiry: Duration,
    /// TTL of metadata records, counted from their last write.
    pub retention: Duration,
    /// Advertised in `/report` responses and stamped into every entry.
    pub backend_version: String,
    /// Reject appends whose `probe_cc` conflicts with the frozen metadata
    /// value instead of silently ignoring them.
    pub strict_probe_cc: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(8 * 3600),
            retention: Duration::from_secs(30 * 24 * 3600),
            backend_version: "2.0.0-alpha".to_string(),
            strict_probe_cc: false,
        }
    }
}

/// What startup recovery found on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryStats {
    /// Open reports whose incoming file is present; timers re-armed.
    pub resumed: usize,
    /// Open records whose incoming file is gone; marked closed, not synced.
    pub lost: usize,
    /// Incoming files without any metadata record; left in place.
    pub orphaned: usize,
    /// Metadata rows past their TTL, deleted.
    pub purged: usize,
}

pub struct ReportEngine {
    meta: MetaDb,
    files: ReportFileStore,
    timers: TimerSet,
    locks: LockTable,
    hook: Arc<dyn CloseHook>,
    backend_version: String,
    strict_probe_cc: bool,
    self_ref: Weak<ReportEngine>,
}

impl ReportEngine {
    /// Build an engine rooted at `data_root` with the default no-op hook.
    pub fn new(data_root: &Path, config: EngineConfig) -> Result<Arc<Self>> {
        Self::with_hook(data_root, config, Arc::new(NoopHook))
    }

    /// Build an engine with a custom post-close hook.
    pub fn with_hook(
        data_root: &Path,
        config: EngineConfig,
        hook: Arc<dyn CloseHook>,
    ) -> Result<Arc<Self>> {
        let files = ReportFileStore::new(data_root)?;
        let meta = MetaDb::open(
            &data_root.join("metadb").join("reports.sqlite"),
            config.retention,
        )?;
        Ok(Arc::new_cyclic(|weak| Self {
            meta,
            files,
            timers: TimerSet::new(config.expiry),
            locks: LockTable::new(),
            hook,
            backend_version: config.backend_version,
            strict_probe_cc: config.strict_probe_cc,
            self_ref: weak.clone(),
        }))
    }

    pub fn backend_version(&self) -> &str {
        &self.backend_version
    }

    /// Open a new report: validate the request, create the incoming file,
    /// persist the metadata and arm the expiry timer.
    pub async fn open(&self, req: &CreateReportRequest) -> Result<String> {
        validate::software_name(&req.software_name)?;
        validate::test_name(&req.test_name)?;
        validate::probe_asn(&req.probe_asn)?;
        if !req.format.is_empty() {
            validate::format(&req.format)?;
        }

        let report_id = ids::new_report_id(&req.probe_asn);
        let now = Utc::now();
        let incoming_path = self.files.create(&report_id)?;
        let meta = ReportMetadata {
            report_id: report_id.clone(),
            test_name: req.test_name.clone(),
            probe_asn: req.probe_asn.clone(),
            probe_cc: String::new(),
            platform: String::new(),
            software_name: req.software_name.clone(),
            software_version: req.software_version.clone(),
            creation_time: now,
            last_update_time: now,
            incoming_path,
            entry_count: 0,
            closed: false,
        };
        // If this fails the incoming file stays behind as an orphan; startup
        // recovery logs it.
        self.meta.put(&meta)?;
        self.arm_expiry(&report_id);
        tracing::info!(
            report_id = %report_id,
            test_name = %meta.test_name,
            probe_asn = %meta.probe_asn,
            "report opened"
        );
        Ok(report_id)
    }

    /// Append one entry to an open report, enriching it with the server-side
    /// `backend_extra` block. Returns the measurement id.
    pub async fn append(&self, report_id: &str, entry: &mut MeasurementEntry) -> Result<String> {
        let lock = self.locks.lock_for(report_id);
        let _guard = lock.lock().await;

        let mut meta = self.load(report_id)?;
        if meta.closed {
            return Err(EngineError::AlreadyClosed);
        }
        if let Err(err) = self.timers.reset(report_id) {
            tracing::warn!(report_id = %report_id, error = %err, "expiry timer missing on append");
        }

        if meta.probe_cc.is_empty() {
            // First entry fixes the report's country and platform; its
            // identifying fields are shape-checked once, here. Later entries
            // are not revalidated against the frozen values.
            validate::probe_cc(&entry.probe_cc)?;
            if !entry.test_name.is_empty() {
                validate::test_name(&entry.test_name)?;
            }
            if !entry.probe_asn.is_empty() {
                validate::probe_asn(&entry.probe_asn)?;
            }
            meta.probe_cc = entry.probe_cc.clone();
        } else if self.strict_probe_cc
            && !entry.probe_cc.is_empty()
            && entry.probe_cc != meta.probe_cc
        {
            return Err(validate::ValidationError::new("probe_cc").into());
        }
        if meta.platform.is_empty() {
            if let Some(platform) = entry.platform_annotation() {
                meta.platform = platform.to_string();
            }
        }

        let now = Utc::now();
        let measurement_id = ids::new_measurement_id();
        entry.backend_version = self.backend_version.clone();
        entry.backend_extra = Some(BackendExtra {
            submission_time: now,
            measurement_id: measurement_id.clone(),
            report_id: meta.report_id.clone(),
        });

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.files.append(&meta.incoming_path, &line)?;

        // A metadata failure past this point leaves the file one entry ahead
        // of the persisted count; consumers read files, the count is
        // advisory.
        meta.entry_count += 1;
        meta.last_update_time = now;
        self.meta.put(&meta)?;

        Ok(measurement_id)
    }

    /// Close a report: cancel its timer, move the file to sync (or discard
    /// it when empty), mark the metadata closed and fire the post-close hook.
    pub async fn close(&self, report_id: &str, reason: CloseReason) -> Result<()> {
        let lock = self.locks.lock_for(report_id);
        let guard = lock.lock().await;

        let mut meta = match self.load(report_id) {
            Ok(meta) => meta,
            Err(EngineError::NotFound) if reason == CloseReason::Expiry => {
                tracing::debug!(report_id = %report_id, "expiry fired for unknown report");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if meta.closed {
            if reason == CloseReason::Expiry {
                tracing::debug!(report_id = %report_id, "expiry fired for closed report");
                return Ok(());
            }
            return Err(EngineError::AlreadyClosed);
        }

        self.timers.cancel(report_id);
        let outcome = self.files.finalize(&meta)?;
        meta.closed = true;
        meta.last_update_time = Utc::now();
        self.meta.put(&meta)?;

        drop(guard);
        self.locks.release(report_id);

        match outcome {
            FinalizeOutcome::Synced(sync_path) => {
                tracing::info!(
                    report_id = %report_id,
                    reason = reason.as_str(),
                    entries = meta.entry_count,
                    path = %sync_path.display(),
                    "report closed"
                );
                let hook = Arc::clone(&self.hook);
                tokio::spawn(async move {
                    hook.on_close(&meta);
                });
            }
            FinalizeOutcome::Discarded => {
                tracing::info!(
                    report_id = %report_id,
                    reason = reason.as_str(),
                    "empty report discarded"
                );
            }
        }
        Ok(())
    }

    /// Submit a single entry in one shot: open a report from the entry's own
    /// fields unless it already names one, append, optionally close.
    pub async fn submit_one(
        &self,
        entry: &mut MeasurementEntry,
        close_after: bool,
    ) -> Result<(String, String)> {
        let mut report_id = entry.report_id.clone();
        if report_id.is_empty() {
            let req = CreateReportRequest {
                software_name: entry.software_name.clone(),
                software_version: entry.software_version.clone(),
                probe_asn: entry.probe_asn.clone(),
                probe_cc: entry.probe_cc.clone(),
                test_name: entry.test_name.clone(),
                test_version: entry.test_version.clone(),
                data_format_version: String::new(),
                format: "json".to_string(),
            };
            report_id = self.open(&req).await?;
            entry.report_id = report_id.clone();
        }
        let measurement_id = self.append(&report_id, entry).await?;
        if close_after {
            self.close(&report_id, CloseReason::OneShot).await?;
        }
        Ok((report_id, measurement_id))
    }

    /// Rebuild in-flight state after a restart: re-arm timers for open
    /// reports whose incoming file survived, write off the ones whose file is
    /// gone, and log orphaned incoming files.
    pub async fn recover(&self) -> Result<RecoveryStats> {
        let mut stats = RecoveryStats {
            purged: self.meta.purge_expired()?,
            ..RecoveryStats::default()
        };

        let open_reports = self.meta.list_open()?;
        for mut meta in open_reports {
            if meta.incoming_path.is_file() {
                // The crash does not shorten the deadline: the full expiry
                // duration starts over.
                self.arm_expiry(&meta.report_id);
                stats.resumed += 1;
            } else {
                meta.closed = true;
                meta.last_update_time = Utc::now();
                self.meta.put(&meta)?;
                tracing::warn!(
                    report_id = %meta.report_id,
                    path = %meta.incoming_path.display(),
                    "incoming file lost, marking report closed"
                );
                stats.lost += 1;
            }
        }

        for file in self.files.list_incoming()? {
            if matches!(self.meta.get(&file.report_id), Err(MetaDbError::NotFound)) {
                tracing::warn!(
                    report_id = %file.report_id,
                    size = file.size,
                    "orphaned incoming file without metadata, leaving in place"
                );
                stats.orphaned += 1;
            }
        }

        tracing::info!(
            resumed = stats.resumed,
            lost = stats.lost,
            orphaned = stats.orphaned,
            purged = stats.purged,
            "report recovery finished"
        );
        Ok(stats)
    }

    /// Delete an archived report file from the sync directory.
    pub fn delete_archived(&self, filename: &str) -> Result<()> {
        validate::filename(filename)?;
        self.files.remove_sync_file(filename)?;
        tracing::info!(filename = %filename, "archived report file deleted");
        Ok(())
    }

    /// Current metadata of a report, from the durable store.
    pub fn metadata(&self, report_id: &str) -> Result<ReportMetadata> {
        self.load(report_id)
    }

    fn load(&self, report_id: &str) -> Result<ReportMetadata> {
        match self.meta.get(report_id) {
            Ok(meta) => Ok(meta),
            Err(MetaDbError::NotFound) => Err(EngineError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    fn arm_expiry(&self, report_id: &str) {
        let engine = self.self_ref.clone();
        let id = report_id.to_string();
        self.timers.arm(report_id, move || {
            let engine = engine.clone();
            let id = id.clone();
            async move {
                let Some(engine) = engine.upgrade() else {
                    return;
                };
                if let Err(err) = engine.close(&id, CloseReason::Expiry).await {
                    tracing::warn!(report_id = %id, error = %err, "expiry close failed");
                }
            }
        });
    }
}
