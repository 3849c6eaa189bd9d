//! [`ArtifactStore`] implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Artifact, EvictionReport, UsageReport};
use crate::error::{Result, SimError};

/// Directory of program files under a byte-capacity ceiling.
///
/// # Examples
///
/// ```no_run
/// use cnc_sim::artifact::ArtifactStore;
///
/// # async fn example() -> cnc_sim::Result<()> {
/// let store = ArtifactStore::open("/data/nc", 100 * 1024 * 1024, "nc").await?;
/// let path = store.save("part.nc", b"G0 X0 Y0\nM2\n").await?;
/// assert_eq!(store.total_usage().await?, 12);
/// assert!(store.delete("part.nc").await?);
/// # let _ = path;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    capacity: u64,
    extension: String,
    // Held while usage is measured and a reservation is taken.
    admission: tokio::sync::Mutex<()>,
    // Bytes promised to uploads that are still being written.
    reserved: Mutex<u64>,
}

/// Releases an upload's reserved bytes when dropped.
struct Reservation<'a> {
    reserved: &'a Mutex<u64>,
    bytes: u64,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut reserved = self.reserved.lock();
        *reserved = reserved.saturating_sub(self.bytes);
    }
}

impl ArtifactStore {
    /// Opens the store, creating `dir` if needed.
    ///
    /// `extension` is given without the leading dot and matched
    /// case-insensitively.
    pub async fn open(dir: impl Into<PathBuf>, capacity: u64, extension: &str) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SimError::io(&dir, e))?;
        Ok(Self {
            dir,
            capacity,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            admission: tokio::sync::Mutex::new(()),
            reserved: Mutex::new(0),
        })
    }

    /// The programs directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The configured capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// The program extension, lowercase, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Lists stored programs, most recently modified first.
    pub async fn list(&self) -> Result<Vec<Artifact>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| SimError::io(&self.dir, e))?;

        let mut artifacts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SimError::io(&self.dir, e))?
        {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if !self.has_extension(&filename) {
                continue;
            }
            // The file may vanish between listing and stat.
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let accessed = metadata.accessed().unwrap_or(modified);
            artifacts.push(Artifact {
                filename,
                size_bytes: metadata.len(),
                last_accessed: DateTime::<Utc>::from(accessed),
                last_modified: DateTime::<Utc>::from(modified),
            });
        }

        artifacts.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(artifacts)
    }

    /// Sum of all program sizes, recomputed from the directory listing.
    pub async fn total_usage(&self) -> Result<u64> {
        Ok(self.list().await?.iter().map(|a| a.size_bytes).sum())
    }

    /// Usage summary for reporting.
    pub async fn usage(&self) -> Result<UsageReport> {
        let artifacts = self.list().await?;
        Ok(UsageReport {
            total_size_bytes: artifacts.iter().map(|a| a.size_bytes).sum(),
            file_count: artifacts.len(),
            max_size_bytes: self.capacity,
        })
    }

    /// Stores `contents` as `name` and returns the stored path.
    ///
    /// Fails with [`SimError::CapacityExceeded`] before writing anything if
    /// current usage, plus bytes reserved by in-flight uploads, plus the
    /// upload would exceed capacity. An existing program with the same name
    /// is replaced; its current size still counts toward the check.
    pub async fn save(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        self.validate_name(name)?;
        let incoming = contents.len() as u64;

        let reservation = {
            let _admission = self.admission.lock().await;
            let used = self.total_usage().await?;
            let mut reserved = self.reserved.lock();
            let committed = used.saturating_add(*reserved);
            if committed.saturating_add(incoming) > self.capacity {
                warn!(
                    filename = name,
                    used = committed,
                    incoming,
                    capacity = self.capacity,
                    "upload rejected: capacity exceeded"
                );
                return Err(SimError::CapacityExceeded {
                    used: committed,
                    incoming,
                    capacity: self.capacity,
                });
            }
            *reserved += incoming;
            Reservation {
                reserved: &self.reserved,
                bytes: incoming,
            }
        };

        let path = self.dir.join(name);
        let partial = self.dir.join(format!(".{name}.partial"));
        if let Err(e) = tokio::fs::write(&partial, contents).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SimError::io(&partial, e));
        }
        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SimError::io(&path, e));
        }
        drop(reservation);

        info!(filename = name, bytes = incoming, "program stored");
        Ok(path)
    }

    /// Deletes a program. Returns `false` if it did not exist.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        self.validate_name(name)?;
        let path = self.dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(filename = name, "program deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SimError::io(&path, e)),
        }
    }

    /// Returns the absolute path of an existing program and refreshes its
    /// access time, so eviction treats it as recently used.
    pub async fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.validate_name(name)?;
        let path = self.dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                return Err(SimError::ProgramNotFound {
                    filename: name.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SimError::ProgramNotFound {
                    filename: name.to_string(),
                })
            }
            Err(e) => return Err(SimError::io(&path, e)),
        }

        let touched = path.clone();
        let touch = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let file = std::fs::File::open(&touched)?;
            file.set_times(std::fs::FileTimes::new().set_accessed(SystemTime::now()))
        })
        .await;
        match touch {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(filename = name, error = %e, "could not refresh access time"),
            Err(e) => warn!(filename = name, error = %e, "access time refresh task failed"),
        }

        tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| SimError::io(&path, e))
    }

    /// Deletes programs in ascending access-time order until usage is at
    /// or below capacity, or nothing is left.
    ///
    /// Best effort: a program that cannot be deleted is skipped and the
    /// pass continues with the next one.
    pub async fn evict_least_recently_accessed(&self) -> Result<EvictionReport> {
        let _admission = self.admission.lock().await;
        let mut artifacts = self.list().await?;
        let mut usage: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
        let mut report = EvictionReport {
            usage_after: usage,
            ..EvictionReport::default()
        };
        if usage <= self.capacity {
            return Ok(report);
        }

        artifacts.sort_by(|a, b| a.last_accessed.cmp(&b.last_accessed));
        for artifact in artifacts {
            if usage <= self.capacity {
                break;
            }
            let path = self.dir.join(&artifact.filename);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    usage -= artifact.size_bytes;
                    report.freed_bytes += artifact.size_bytes;
                    debug!(filename = %artifact.filename, bytes = artifact.size_bytes, "evicted program");
                    report.removed.push(artifact.filename);
                }
                Err(e) => {
                    warn!(filename = %artifact.filename, error = %e, "eviction skipped program");
                }
            }
        }

        report.usage_after = usage;
        info!(
            removed = report.removed.len(),
            freed_bytes = report.freed_bytes,
            usage_after = usage,
            "eviction pass complete"
        );
        Ok(report)
    }

    /// Runs an eviction pass every `every` until `shutdown` is cancelled.
    pub fn spawn_cleanup(
        self: Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.evict_least_recently_accessed().await {
                            warn!(error = %e, "background eviction failed");
                        }
                    }
                }
            }
            debug!("background eviction stopped");
        })
    }

    fn has_extension(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(&self.extension))
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        let invalid = |reason: String| SimError::InvalidProgram {
            filename: name.to_string(),
            reason,
        };

        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0'])
        {
            return Err(invalid("must be a plain file name".to_string()));
        }
        if !self.has_extension(name) {
            return Err(invalid(format!("only .{} files are accepted", self.extension)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn store(capacity: u64) -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path(), capacity, "nc").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn ignores_foreign_files() {
        let (dir, store) = store(1_000).await;
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub.nc")).unwrap();
        store.save("part.NC", b"G0").await.unwrap();

        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|a| a.filename).collect();
        assert_eq!(names, vec!["part.NC".to_string()]);
        assert_eq!(store.total_usage().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rejects_unsafe_names() {
        let (_dir, store) = store(1_000).await;
        for name in ["../escape.nc", "sub/part.nc", ".hidden.nc", "part.txt", ""] {
            let err = store.save(name, b"G0").await.unwrap_err();
            assert!(matches!(err, SimError::InvalidProgram { .. }), "{name}");
        }
    }

    #[tokio::test]
    async fn resolve_missing_program() {
        let (_dir, store) = store(1_000).await;
        let err = store.resolve("absent.nc").await.unwrap_err();
        assert!(matches!(err, SimError::ProgramNotFound { .. }));
    }

    #[tokio::test]
    async fn resolve_returns_absolute_path() {
        let (_dir, store) = store(1_000).await;
        store.save("part.nc", b"G0").await.unwrap();
        let path = store.resolve("part.nc").await.unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("part.nc"));
    }

    #[tokio::test]
    async fn delete_reports_absence() {
        let (_dir, store) = store(1_000).await;
        assert!(!store.delete("absent.nc").await.unwrap());
        store.save("part.nc", b"G0").await.unwrap();
        assert!(store.delete("part.nc").await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_partial_files_left_behind() {
        let (dir, store) = store(1_000).await;
        store.save("part.nc", b"G0 X1").await.unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
