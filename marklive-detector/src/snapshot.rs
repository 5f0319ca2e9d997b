//! Size + mtime fingerprint of a file.

use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

use crate::DetectError;

/// What a watcher compares between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub len: u64,
    /// `None` on platforms without mtime support.
    pub modified: Option<SystemTime>,
}

impl Snapshot {
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        }
    }

    /// Baseline stat. Take it before reading the content the baseline
    /// stands for, so a write racing the read shows up on the next tick.
    pub async fn capture(path: &Path) -> Result<Self, DetectError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|source| DetectError::Stat {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_metadata(&meta))
    }

    /// Stat used on every tick. `None` means "no information this tick"
    /// (transient failure, file briefly missing).
    pub async fn poll(path: &Path) -> Option<Self> {
        Self::capture(path).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn capture_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = Snapshot::capture(&dir.path().join("nope.md")).await.unwrap_err();
        assert!(err.to_string().contains("nope.md"));
    }

    #[tokio::test]
    async fn mtime_change_alone_changes_snapshot() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        std::fs::write(&file, "# Hi").unwrap();
        let before = Snapshot::capture(&file).await.unwrap();

        let later = SystemTime::now() + Duration::from_secs(10);
        filetime::set_file_mtime(&file, filetime::FileTime::from_system_time(later)).unwrap();
        let after = Snapshot::capture(&file).await.unwrap();

        assert_eq!(before.len, after.len);
        assert_ne!(before, after);
    }
}
