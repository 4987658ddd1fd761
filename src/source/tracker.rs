use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, Metadata};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Every tracker failure is transient: the stored offset is untouched and
    /// the next change notification retries from the same point.
    pub fn is_not_found(&self) -> bool {
        match self {
            TrackerError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
        }
    }
}

/// Last-read byte offset and rotation identity for one monitored source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    pub offset: u64,
    pub identity: u64,
}

/// Tracks read positions for the log files of one lab and returns only newly
/// appended bytes on each change notification.
///
/// Each source has its own lock, so concurrent notifications for different
/// paths proceed independently while notifications for the same path are
/// serialized. The outer map lock is held only long enough to find or create
/// the per-source slot, never across file I/O.
pub struct PositionTracker {
    sources: Mutex<HashMap<PathBuf, Arc<Mutex<SourcePosition>>>>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Restore positions from a checkpoint snapshot.
    pub fn with_positions(positions: HashMap<PathBuf, SourcePosition>) -> Self {
        let sources = positions
            .into_iter()
            .map(|(path, pos)| (path, Arc::new(Mutex::new(pos))))
            .collect();
        Self {
            sources: Mutex::new(sources),
        }
    }

    /// Read all bytes appended to `path` since the last successful read.
    ///
    /// A changed rotation identity, or a file shorter than the stored offset,
    /// is treated as rotation: the offset resets to zero and the file's
    /// current content is delivered in full. On any I/O failure the stored
    /// position is left unchanged so the next notification retries.
    pub fn read_new(&self, path: &Path) -> Result<Vec<u8>, TrackerError> {
        let slot = self.slot(path);
        let mut pos = lock_unpoisoned(&slot);

        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let identity = file_identity(&metadata);

        let start = if identity != pos.identity || metadata.len() < pos.offset {
            0
        } else {
            pos.offset
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        // Commit only after the read fully succeeded
        pos.offset = start + buf.len() as u64;
        pos.identity = identity;

        Ok(buf)
    }

    /// Current position of a source, if it has been read at least once.
    pub fn position(&self, path: &Path) -> Option<SourcePosition> {
        let sources = lock_unpoisoned(&self.sources);
        sources.get(path).map(|slot| lock_unpoisoned(slot).clone())
    }

    /// Snapshot all positions for checkpointing.
    pub fn snapshot(&self) -> HashMap<PathBuf, SourcePosition> {
        let sources = lock_unpoisoned(&self.sources);
        sources
            .iter()
            .map(|(path, slot)| (path.clone(), lock_unpoisoned(slot).clone()))
            .collect()
    }

    fn slot(&self, path: &Path) -> Arc<Mutex<SourcePosition>> {
        let mut sources = lock_unpoisoned(&self.sources);
        sources
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(SourcePosition::default())))
            .clone()
    }
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// Platform-specific stable file identity; paths alone are reused by rotation.
#[cfg(unix)]
fn file_identity(metadata: &Metadata) -> u64 {
    use std::hash::{Hash, Hasher};
    use std::os::unix::fs::MetadataExt;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    metadata.dev().hash(&mut hasher);
    metadata.ino().hash(&mut hasher);
    hasher.finish()
}

#[cfg(not(unix))]
fn file_identity(metadata: &Metadata) -> u64 {
    // No inode available; use creation time as a rotation proxy
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    if let Ok(created) = metadata.created() {
        created.hash(&mut hasher);
    }
    hasher.finish()
}
