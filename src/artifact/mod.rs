//! Bounded-capacity storage for uploaded NC programs.
//!
//! # Overview
//!
//! Programs live as plain files in one directory. Only files carrying the
//! configured program extension are considered; anything else in the
//! directory is ignored by listing, usage, and eviction.
//!
//! The summed size of all programs stays at or below the configured
//! capacity after every successful upload. Uploads reserve their size
//! before writing, so concurrent uploads cannot jointly overflow the
//! ceiling. When usage exceeds capacity for other reasons (the ceiling was
//! lowered, files were copied in by hand), an eviction pass deletes the
//! least recently accessed programs until usage fits again.
//!
//! # Module Organization
//!
//! - [`store`] - [`ArtifactStore`] and its operations

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::ArtifactStore;

/// A stored program file.
///
/// Serializes as `{filename, size, atime, mtime}` with times in fractional
/// Unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// File name within the programs directory.
    pub filename: String,

    /// File size in bytes.
    #[serde(rename = "size")]
    pub size_bytes: u64,

    /// Last access time as reported by the file system.
    #[serde(rename = "atime", with = "crate::serde_time::unix_seconds")]
    pub last_accessed: DateTime<Utc>,

    /// Last modification time.
    #[serde(rename = "mtime", with = "crate::serde_time::unix_seconds")]
    pub last_modified: DateTime<Utc>,
}

/// Aggregate usage of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Sum of all program sizes.
    pub total_size_bytes: u64,
    /// Number of programs.
    pub file_count: usize,
    /// Configured capacity.
    pub max_size_bytes: u64,
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    /// Names of the programs deleted, oldest access first.
    pub removed: Vec<String>,
    /// Bytes reclaimed.
    pub freed_bytes: u64,
    /// Usage once the pass finished.
    pub usage_after: u64,
}
