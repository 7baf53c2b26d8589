//! Canonical data model for the measurement collector.
//!
//! A probe opens a *report*, appends measurement *entries* to it and closes
//! it. `ReportMetadata` is the authoritative server-side description of a
//! report; `MeasurementEntry` is the client-supplied record, mostly opaque to
//! the server except for the identifying fields it reads and the
//! `backend_extra` block it writes.

pub mod ids;
pub mod validate;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use validate::ValidationError;

/// Compact timestamp used in report ids and sync filenames,
/// e.g. `20180601T172750Z`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Render a timestamp in the compact `YYYYMMDDThhmmssZ` form.
pub fn compact_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Authoritative metadata of a report, persisted in the metadata store.
///
/// `probe_cc` and `platform` start empty and are frozen once filled from the
/// first appended entry. `closed` only ever transitions false to true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub report_id: String,
    pub test_name: String,
    pub probe_asn: String,
    #[serde(default)]
    pub probe_cc: String,
    #[serde(default)]
    pub platform: String,
    pub software_name: String,
    pub software_version: String,
    pub creation_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub incoming_path: PathBuf,
    pub entry_count: i64,
    pub closed: bool,
}

/// Server-side enrichment block written into every accepted entry. Whatever
/// the client supplied under `backend_extra` is replaced wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendExtra {
    pub submission_time: DateTime<Utc>,
    pub measurement_id: String,
    pub report_id: String,
}

/// Body of a `POST /report` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateReportRequest {
    #[serde(default)]
    pub software_name: String,
    #[serde(default)]
    pub software_version: String,
    #[serde(default)]
    pub probe_asn: String,
    #[serde(default)]
    pub probe_cc: String,
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub test_version: String,
    #[serde(default)]
    pub data_format_version: String,
    #[serde(default)]
    pub format: String,
}

/// One measurement record as uploaded by a probe.
///
/// Only the fields below are interpreted; everything else the client sends is
/// carried through `extra` untouched so the on-disk line preserves it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub report_id: String,
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub test_version: String,
    #[serde(default)]
    pub probe_asn: String,
    #[serde(default)]
    pub probe_cc: String,
    #[serde(default)]
    pub software_name: String,
    #[serde(default)]
    pub software_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_extra: Option<BackendExtra>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backend_version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MeasurementEntry {
    /// The `annotations.platform` string, if the probe sent one.
    pub fn platform_annotation(&self) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get("platform"))
            .and_then(Value::as_str)
    }
}
