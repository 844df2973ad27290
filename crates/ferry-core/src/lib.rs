//! # FERRY Core
//!
//! Upload queue for the FERRY file drop service.
//!
//! This crate provides:
//! - A bounded batch of files processed strictly in insertion order
//! - Simulated per-file progress with a weighted, monotonic aggregate
//! - Settle delays between files and before returning to idle
//! - An append-only history of completed sends and pickups
//! - A drag-and-drop adapter that feeds dropped paths into the queue
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  enqueue / remove / clear   ┌──────────────────────────┐
//! │  DropZone,   │ ──────────────────────────► │       QueueActor         │
//! │  CLI, tests  │ ◄── watch<QueueSnapshot> ── │  Batch + settle timer    │
//! │              │ ◄── broadcast<QueueEvent> ─ │                          │
//! └──────────────┘                             └───────┬──────────▲───────┘
//!                                                start │          │ Tick / Finished
//!                                                      ▼          │
//!                                              ┌──────────────────┴───────┐
//!                                              │    ProgressSimulator     │
//!                                              └──────────────────────────┘
//!                                  completed file ──► RecordLogger (RecordLog)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use ferry_core::{FileHandle, NewFile, QueueConfig, RecordLog, UploadQueue};
//! use std::sync::Arc;
//!
//! # async fn run() -> ferry_core::Result<()> {
//! let records = Arc::new(RecordLog::in_memory());
//! let queue = UploadQueue::spawn(QueueConfig::default(), records.clone())?;
//!
//! queue
//!     .enqueue(vec![NewFile::new(FileHandle::new("notes.txt"), "notes.txt", 1024)])
//!     .await?;
//!
//! let mut snapshots = queue.watch();
//! snapshots.changed().await.ok();
//! println!("{:.0}%", snapshots.borrow().aggregate_progress);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod drop_zone;
pub mod entry;
pub mod error;
pub mod queue;
pub mod records;
pub mod simulator;

pub use batch::{Batch, ProgressWindow};
pub use config::{QueueConfig, StepPolicy};
pub use drop_zone::{DropEvent, DropZone};
pub use entry::{EntryId, EntryStatus, FileEntry, FileHandle, NewFile};
pub use error::{QueueError, Result};
pub use queue::{BatchId, QueueEvent, QueueSnapshot, SessionStatus, UploadQueue};
pub use records::{RecordKind, RecordLog, RecordLogger, TransferRecord};
pub use simulator::{ProgressSimulator, RunId, SimulatorEvent, SimulatorEventKind};
