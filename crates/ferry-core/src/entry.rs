//! Queue entries and the file handles they reference

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opaque reference to a file payload
///
/// Cloning shares the same allocation; the queue never reads or copies file contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHandle(Arc<Path>);

impl FileHandle {
    /// Create a handle for a path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Arc::from(path.into().into_boxed_path()))
    }

    /// Path the handle refers to
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Identifier of an admitted entry, unique per queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A file offered for admission
#[derive(Debug, Clone, PartialEq)]
pub struct NewFile {
    /// Payload reference
    pub handle: FileHandle,
    /// Name shown to observers and written to the record log
    pub display_name: String,
    /// File size in bytes
    pub size_bytes: u64,
}

impl NewFile {
    /// Create a new file description
    pub fn new(handle: FileHandle, display_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            handle,
            display_name: display_name.into(),
            size_bytes,
        }
    }
}

/// Entry status
///
/// Transitions only move forward: `Pending → Transferring → Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Waiting for its turn
    Pending,
    /// Progress simulator armed for this entry
    Transferring,
    /// Finished; progress fixed at 100
    Completed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Transferring => write!(f, "Transferring"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// One queued, transferring, or completed file
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    /// Entry identifier
    pub id: EntryId,
    /// Payload reference
    pub handle: FileHandle,
    /// Display name
    pub display_name: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Current status
    pub status: EntryStatus,
    /// Entry-local progress (0 to 100)
    pub progress_percent: u8,
    /// Share of aggregate progress, frozen when the entry starts
    pub weight: Option<f64>,
}

impl FileEntry {
    pub(crate) fn pending(id: EntryId, file: NewFile) -> Self {
        Self {
            id,
            handle: file.handle,
            display_name: file.display_name,
            size_bytes: file.size_bytes,
            status: EntryStatus::Pending,
            progress_percent: 0,
            weight: None,
        }
    }

    /// True once the entry has finished
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }
}
