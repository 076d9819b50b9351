//! Polling source watcher.
//!
//! Compares the modified time and length of every file below a root. A
//! change anywhere sets the slot's dirty flag; the host picks it up on its
//! next frame.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Watches a file or directory tree for changes.
#[derive(Debug)]
pub struct SourceWatcher {
    root: PathBuf,
    stamps: HashMap<PathBuf, (SystemTime, u64)>,
    primed: bool,
}

impl SourceWatcher {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stamps: HashMap::new(),
            primed: false,
        }
    }

    /// The watched path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-read the tree. Returns `true` if any file was added, removed or
    /// changed since the previous scan. The first scan only records the
    /// baseline.
    pub fn scan(&mut self) -> io::Result<bool> {
        let mut current = HashMap::new();
        collect(&self.root, &mut current)?;

        let changed = self.primed && current != self.stamps;
        if changed {
            debug!(root = %self.root.display(), files = current.len(), "source change detected");
        }
        self.stamps = current;
        self.primed = true;
        Ok(changed)
    }

    /// Poll every `interval` on `tokio` and raise `dirty` on change.
    pub fn spawn(
        mut self,
        tokio: &TokioHandle,
        interval: Duration,
        dirty: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio.spawn(async move {
            info!(root = %self.root.display(), interval_ms = interval.as_millis() as u64, "watching sources");
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.scan() {
                    Ok(true) => dirty.store(true, Ordering::SeqCst),
                    Ok(false) => {}
                    Err(err) => warn!(root = %self.root.display(), error = %err, "source scan failed"),
                }
            }
        })
    }
}

fn collect(path: &Path, out: &mut HashMap<PathBuf, (SystemTime, u64)>) -> io::Result<()> {
    let metadata = std::fs::metadata(path)?;
    if metadata.is_dir() {
        for entry in std::fs::read_dir(path)? {
            collect(&entry?.path(), out)?;
        }
    } else {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        out.insert(path.to_path_buf(), (modified, metadata.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("engine-watch-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        dir
    }

    #[test]
    fn test_first_scan_is_baseline() {
        let dir = scratch_dir();
        std::fs::write(dir.join("world.json"), "{}").unwrap();
        let mut watcher = SourceWatcher::new(&dir);
        assert!(!watcher.scan().unwrap());
        assert!(!watcher.scan().unwrap());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_detects_new_and_resized_files() {
        let dir = scratch_dir();
        std::fs::write(dir.join("world.json"), "{}").unwrap();
        let mut watcher = SourceWatcher::new(&dir);
        watcher.scan().unwrap();

        std::fs::write(dir.join("nested").join("extra.json"), "[]").unwrap();
        assert!(watcher.scan().unwrap());
        assert!(!watcher.scan().unwrap());

        std::fs::write(dir.join("world.json"), r#"{"name":"longer"}"#).unwrap();
        assert!(watcher.scan().unwrap());

        std::fs::remove_file(dir.join("nested").join("extra.json")).unwrap();
        assert!(watcher.scan().unwrap());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let mut watcher = SourceWatcher::new(std::env::temp_dir().join("engine-watch-absent-root"));
        assert!(watcher.scan().is_err());
    }
}
