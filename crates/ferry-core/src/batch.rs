//! Batch state: ordered entries, admission, and weighted aggregate progress.
//!
//! The batch is plain data owned by the queue actor. It never touches timers; it only
//! answers "what runs next", "what window does it cover", and "what is the aggregate".
//!
//! # Weighting
//!
//! Each entry's window is frozen when it starts:
//!
//! ```text
//! start_offset = aggregate reported so far
//! weight       = (100 - start_offset) / entries not yet completed
//! ```
//!
//! For an untouched N-file batch this is `index / N * 100` and `100 / N`. Entries
//! appended mid-flight only share the remainder that has not been reported yet, so
//! the aggregate never moves backwards and the last completion lands on 100.

use crate::entry::{EntryId, EntryStatus, FileEntry, NewFile};
use crate::error::{QueueError, Result};

/// Portion of aggregate progress covered by one entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    /// Aggregate progress when the entry started
    pub start_offset: f64,
    /// Share of aggregate progress the entry contributes
    pub weight: f64,
}

impl ProgressWindow {
    /// Aggregate progress for an entry-local progress value, clamped to 100
    #[must_use]
    pub fn overall(&self, progress: u8) -> f64 {
        (self.start_offset + f64::from(progress.min(100)) * self.weight / 100.0).min(100.0)
    }

    /// Aggregate progress once the entry completes
    #[must_use]
    pub fn end(&self) -> f64 {
        self.overall(100)
    }
}

/// Ordered set of entries sharing one aggregate progress figure
#[derive(Debug)]
pub struct Batch {
    entries: Vec<FileEntry>,
    capacity: usize,
    aggregate: f64,
    active_window: Option<(EntryId, ProgressWindow)>,
    next_id: u64,
}

impl Batch {
    /// Create an empty batch
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            aggregate: 0.0,
            active_window: None,
            next_id: 1,
        }
    }

    /// Admit files in input order, all or nothing
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::CapacityExceeded`] if the files do not fit; the batch is
    /// left unchanged.
    pub fn admit(&mut self, files: Vec<NewFile>) -> Result<Vec<EntryId>> {
        let available = self.available();
        if files.len() > available {
            return Err(QueueError::CapacityExceeded {
                requested: files.len(),
                available,
                capacity: self.capacity,
            });
        }

        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            let id = EntryId(self.next_id);
            self.next_id += 1;
            self.entries.push(FileEntry::pending(id, file));
            ids.push(id);
        }
        Ok(ids)
    }

    /// Free slots
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.entries.len())
    }

    /// Configured capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries, whatever their status
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the batch holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    #[must_use]
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Look up an entry
    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Current aggregate progress (0.0 to 100.0)
    #[must_use]
    pub fn aggregate_progress(&self) -> f64 {
        self.aggregate
    }

    /// Entry currently transferring
    #[must_use]
    pub fn active(&self) -> Option<&FileEntry> {
        self.entries
            .iter()
            .find(|e| e.status == EntryStatus::Transferring)
    }

    /// First pending entry in insertion order
    #[must_use]
    pub fn next_pending(&self) -> Option<EntryId> {
        self.entries
            .iter()
            .find(|e| e.status == EntryStatus::Pending)
            .map(|e| e.id)
    }

    /// Number of entries that have not completed
    #[must_use]
    pub fn uncompleted(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_completed()).count()
    }

    /// Mark a pending entry as transferring and freeze its progress window
    ///
    /// Returns `None` if the entry is unknown or not pending, or if another entry is
    /// already transferring.
    pub fn begin(&mut self, id: EntryId) -> Option<ProgressWindow> {
        if self.active_window.is_some() || self.active().is_some() {
            return None;
        }

        let remaining = self.uncompleted();
        let start_offset = self.aggregate;
        let entry = self.entries.iter_mut().find(|e| e.id == id)?;
        if entry.status != EntryStatus::Pending {
            return None;
        }

        let weight = (100.0 - start_offset).max(0.0) / remaining as f64;
        let window = ProgressWindow {
            start_offset,
            weight,
        };

        entry.status = EntryStatus::Transferring;
        entry.progress_percent = 0;
        entry.weight = Some(weight);
        self.active_window = Some((id, window));

        Some(window)
    }

    /// Apply a progress report for the transferring entry
    ///
    /// Neither the entry's progress nor the aggregate ever decreases. Returns false if
    /// `id` is not the transferring entry.
    pub fn record_progress(&mut self, id: EntryId, progress: u8, overall: f64) -> bool {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.id == id && e.status == EntryStatus::Transferring)
        else {
            return false;
        };

        entry.progress_percent = entry.progress_percent.max(progress.min(100));
        self.aggregate = self.aggregate.max(overall.clamp(0.0, 100.0));
        true
    }

    /// Mark the transferring entry as completed
    ///
    /// Returns a copy of the completed entry, or `None` if `id` is not transferring.
    pub fn complete(&mut self, id: EntryId) -> Option<FileEntry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id && e.status == EntryStatus::Transferring)?;

        entry.status = EntryStatus::Completed;
        entry.progress_percent = 100;
        let completed = entry.clone();

        let window_end = match self.active_window.take() {
            Some((active, window)) if active == id => window.end(),
            _ => self.aggregate,
        };

        self.aggregate = if self.uncompleted() == 0 {
            100.0
        } else {
            self.aggregate.max(window_end)
        };

        Some(completed)
    }

    /// Remove an entry regardless of status
    ///
    /// Emptying the batch resets aggregate progress.
    pub fn remove(&mut self, id: EntryId) -> Option<FileEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        let removed = self.entries.remove(index);

        if matches!(self.active_window, Some((active, _)) if active == id) {
            self.active_window = None;
        }
        if self.entries.is_empty() {
            self.reset_progress();
        }

        Some(removed)
    }

    /// Drop every entry and reset progress
    pub fn clear(&mut self) {
        self.entries.clear();
        self.reset_progress();
    }

    /// Reset aggregate progress to idle
    pub fn reset_progress(&mut self) {
        self.aggregate = 0.0;
        self.active_window = None;
    }
}
