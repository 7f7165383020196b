//! Reading line-delimited JSON quiz records into a [`RecordTable`].

use crate::error::{EtlError, Result};
use crate::models::{RawRecord, RecordTable};
use log::{debug, error, info};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// How records missing required keys are treated during extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Drop records lacking `centerpiece`, `options` or `correct_options_idx`,
    /// and fail if none remain.
    #[default]
    Strict,
    /// Keep every parsed record.
    Lenient,
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPolicy::Strict => write!(f, "strict"),
            KeyPolicy::Lenient => write!(f, "lenient"),
        }
    }
}

impl FromStr for KeyPolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(KeyPolicy::Strict),
            "lenient" => Ok(KeyPolicy::Lenient),
            _ => Err(format!("Invalid key policy: {}", s)),
        }
    }
}

/// Parses one line into a record. A key repeated on the line keeps its last value.
fn parse_record(line: &str) -> serde_json::Result<RawRecord> {
    let object: Map<String, Value> = serde_json::from_str(line)?;
    RawRecord::deserialize(Value::Object(object))
}

/// Reads `path` as line-delimited JSON, one record per non-blank line.
pub fn extract_records(path: &Path, policy: KeyPolicy) -> Result<RecordTable> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            error!("File not found: {}", path.display());
            EtlError::InputNotFound(path.to_path_buf())
        } else {
            error!("Failed to open {}: {}", path.display(), e);
            EtlError::Io(e)
        }
    })?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| {
            error!("Failed to read {} at line {}: {}", path.display(), line_number, e);
            EtlError::Io(e)
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record = parse_record(&line).map_err(|e| {
            error!("Invalid JSON in {} at line {}: {}", path.display(), line_number, e);
            EtlError::MalformedInput {
                path: path.to_path_buf(),
                line: line_number,
                source: e,
            }
        })?;

        if policy == KeyPolicy::Strict && !record.has_required_keys() {
            debug!(
                "Dropping record at {}:{} (missing required keys)",
                path.display(),
                line_number
            );
            continue;
        }
        records.push(record);
    }

    if policy == KeyPolicy::Strict && records.is_empty() {
        error!("No valid records in {}", path.display());
        return Err(EtlError::EmptyInput(path.to_path_buf()));
    }

    info!("Extracted {} records from {}", records.len(), path.display());
    Ok(RecordTable::from_records(records))
}
