//! Shape validation for client-supplied fields.
//!
//! All checks are anchored full-string matches; anything else is rejected
//! with the offending field name.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid \"{field}\" field")]
pub struct ValidationError {
    pub field: &'static str,
}

impl ValidationError {
    pub fn new(field: &'static str) -> Self {
        Self { field }
    }
}

fn software_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Za-z_.+-]+$").unwrap())
}

fn test_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_\- ]+$").unwrap())
}

fn probe_asn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^AS[0-9]{1,10}$").unwrap())
}

fn probe_cc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{2}$").unwrap())
}

pub fn software_name(value: &str) -> Result<(), ValidationError> {
    if software_name_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("software_name"))
    }
}

pub fn test_name(value: &str) -> Result<(), ValidationError> {
    if test_name_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("test_name"))
    }
}

pub fn probe_asn(value: &str) -> Result<(), ValidationError> {
    if probe_asn_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("probe_asn"))
    }
}

pub fn probe_cc(value: &str) -> Result<(), ValidationError> {
    if probe_cc_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("probe_cc"))
    }
}

/// The only supported report format is newline-delimited JSON.
pub fn format(value: &str) -> Result<(), ValidationError> {
    if value == "json" {
        Ok(())
    } else {
        Err(ValidationError::new("format"))
    }
}

/// Archived report filenames share the software_name alphabet; path
/// separators never match.
pub fn filename(value: &str) -> Result<(), ValidationError> {
    if software_name_regex().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("filename"))
    }
}
