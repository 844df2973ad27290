//! Drag-and-drop adapter
//!
//! Turns drag gestures into queue admissions. The zone keeps track of whether
//! something is hovering over it (for highlighting) and, on drop, reads file
//! metadata and hands the files to [`UploadQueue::enqueue`] untouched. Capacity and
//! ordering decisions stay with the queue.

use crate::entry::{EntryId, FileHandle, NewFile};
use crate::error::Result;
use crate::queue::UploadQueue;
use std::path::{Path, PathBuf};

/// Pointer/file events delivered to a drop zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropEvent {
    /// Pointer carrying files entered the zone (or one of its children)
    DragEnter,
    /// Pointer moved inside the zone
    DragOver,
    /// Pointer left the zone (or one of its children)
    DragLeave,
    /// Files released over the zone
    Drop(Vec<PathBuf>),
}

/// Drop target feeding an upload queue
#[derive(Debug, Default)]
pub struct DropZone {
    depth: u32,
}

impl DropZone {
    /// Create an idle drop zone
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while files hover over the zone
    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.depth > 0
    }

    /// Update hover state and return the dropped paths, if any
    ///
    /// Enter/leave pairs nest because child elements fire their own events.
    pub fn handle(&mut self, event: DropEvent) -> Option<Vec<PathBuf>> {
        match event {
            DropEvent::DragEnter => {
                self.depth += 1;
                None
            }
            DropEvent::DragOver => None,
            DropEvent::DragLeave => {
                self.depth = self.depth.saturating_sub(1);
                None
            }
            DropEvent::Drop(paths) => {
                self.depth = 0;
                Some(paths)
            }
        }
    }

    /// Handle an event and enqueue any dropped files
    ///
    /// Returns the admitted entry ids (empty for non-drop events).
    ///
    /// # Errors
    ///
    /// Returns an error if a dropped path cannot be read, or whatever
    /// [`UploadQueue::enqueue`] returns.
    pub async fn dispatch(
        &mut self,
        event: DropEvent,
        queue: &UploadQueue,
    ) -> Result<Vec<EntryId>> {
        let Some(paths) = self.handle(event) else {
            return Ok(Vec::new());
        };

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(describe(&path).await?);
        }

        tracing::debug!("Dropped {} file(s)", files.len());
        queue.enqueue(files).await
    }
}

/// Build a queue submission from a path on disk
///
/// # Errors
///
/// Returns an error if the file metadata cannot be read.
pub async fn describe(path: &Path) -> Result<NewFile> {
    let metadata = tokio::fs::metadata(path).await?;
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(NewFile::new(
        FileHandle::new(path),
        display_name,
        metadata.len(),
    ))
}
