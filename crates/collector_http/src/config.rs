//! Collector configuration from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use report_engine::EngineConfig;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Root of the on-disk layout (`incoming/`, `sync/`, `metadb/`).
    pub data_root: PathBuf,
    /// Bind address of the HTTP adapter.
    pub http_addr: SocketAddr,
    /// Inactivity window before a report is closed automatically.
    pub expiry: Duration,
    /// TTL of metadata records.
    pub retention: Duration,
    /// Version string advertised to probes.
    pub backend_version: String,
    /// Reject appends whose probe_cc conflicts with the frozen value.
    pub strict_probe_cc: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str) -> bool {
    match std::env::var(key) {
        Ok(v) => {
            let v = v.to_lowercase();
            !(v.is_empty() || v == "0" || v == "false" || v == "no")
        }
        Err(_) => false,
    }
}

impl CollectorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let http_addr = env_or("COLLECTOR_HTTP_ADDR", "127.0.0.1:8080")
            .parse()
            .context("invalid COLLECTOR_HTTP_ADDR")?;
        let expiry_secs: u64 = env_or("COLLECTOR_EXPIRY_SECS", "28800")
            .parse()
            .context("invalid COLLECTOR_EXPIRY_SECS")?;
        let retention_days: u64 = env_or("COLLECTOR_RETENTION_DAYS", "30")
            .parse()
            .context("invalid COLLECTOR_RETENTION_DAYS")?;
        Ok(Self {
            data_root: PathBuf::from(env_or("COLLECTOR_DATA_ROOT", "./collector-data")),
            http_addr,
            expiry: Duration::from_secs(expiry_secs),
            retention: Duration::from_secs(retention_days * 24 * 3600),
            backend_version: env_or("COLLECTOR_BACKEND_VERSION", "2.0.0-alpha"),
            strict_probe_cc: env_flag("COLLECTOR_STRICT_PROBE_CC"),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            expiry: self.expiry,
            retention: self.retention,
            backend_version: self.backend_version.clone(),
            strict_probe_cc: self.strict_probe_cc,
        }
    }
}
