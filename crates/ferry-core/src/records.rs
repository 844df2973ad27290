//! Transfer history
//!
//! Completed sends and pickups are appended to a JSON Lines file, one record per
//! line, and cached in memory. Listings come back newest first.
//!
//! The queue only sees the [`RecordLogger`] trait: it reports a completed file and
//! moves on. Persistence failures are logged, never surfaced to the queue.

use crate::error::{QueueError, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

/// Sink for completed transfers
///
/// Called by the queue actor once per completed file, in completion order. Must not
/// block.
pub trait RecordLogger: Send + Sync {
    /// Record that `display_name` finished transferring
    fn append_record(&self, display_name: &str);
}

/// Kind of history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// File sent through the upload queue
    Send,
    /// File picked up by a receiver
    Pickup,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Pickup => write!(f, "pickup"),
        }
    }
}

/// One history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// File display name
    pub file_name: String,
    /// Send or pickup
    pub kind: RecordKind,
    /// When the record was written
    pub timestamp: DateTime<Utc>,
}

impl TransferRecord {
    /// Create a record stamped with the current time
    pub fn now(kind: RecordKind, file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Local wall-clock time, `HH:MM:SS`
    #[must_use]
    pub fn local_time(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string()
    }

    /// True if the record was written on the current local calendar day
    #[must_use]
    pub fn is_today(&self) -> bool {
        self.timestamp.with_timezone(&Local).date_naive() == Local::now().date_naive()
    }
}

enum WriteRequest {
    Append {
        record: TransferRecord,
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Append-only transfer history
///
/// File-backed logs own a writer task; every write goes through it, so lines land
/// in the order they were requested and callers never wait on the disk unless they
/// ask to.
pub struct RecordLog {
    path: Option<PathBuf>,
    records: Mutex<Vec<TransferRecord>>,
    writer: Option<mpsc::UnboundedSender<WriteRequest>>,
}

impl RecordLog {
    /// Open (or create on first append) a log file, loading existing records
    ///
    /// Malformed lines are skipped with a warning. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let records = parse_records(&path, &contents);
        tracing::debug!("Loaded {} records from {}", records.len(), path.display());

        let (writer, requests) = mpsc::unbounded_channel();
        tokio::spawn(write_records(path.clone(), requests));

        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
            writer: Some(writer),
        })
    }

    /// Create a log that is never written to disk
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
            writer: None,
        }
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a record, persisting it before it becomes visible
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written, or
    /// `QueueError::Closed` if the writer task is gone.
    pub async fn append(&self, kind: RecordKind, file_name: &str) -> Result<TransferRecord> {
        let record = TransferRecord::now(kind, file_name);

        if let Some(writer) = &self.writer {
            let (ack, done) = oneshot::channel();
            writer
                .send(WriteRequest::Append {
                    record: record.clone(),
                    ack: Some(ack),
                })
                .map_err(|_| QueueError::Closed)?;
            done.await.map_err(|_| QueueError::Closed)??;
        }

        self.lock().push(record.clone());
        tracing::debug!("Recorded {} of {}", kind, file_name);

        Ok(record)
    }

    /// Wait until every record handed to the writer so far is on disk
    ///
    /// Returns immediately for in-memory logs.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            let (done, flushed) = oneshot::channel();
            if writer.send(WriteRequest::Flush(done)).is_ok() {
                let _ = flushed.await;
            }
        }
    }

    /// Records of one kind, newest first
    #[must_use]
    pub fn records(&self, kind: RecordKind) -> Vec<TransferRecord> {
        self.lock()
            .iter()
            .rev()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    /// Records of one kind written today, newest first
    #[must_use]
    pub fn today(&self, kind: RecordKind) -> Vec<TransferRecord> {
        self.records(kind)
            .into_iter()
            .filter(TransferRecord::is_today)
            .collect()
    }

    /// Total number of records of every kind
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no records exist
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TransferRecord>> {
        // Pushes are atomic, a poisoned Vec is still consistent
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordLogger for RecordLog {
    /// Caches the send record at once and queues the disk write
    fn append_record(&self, display_name: &str) {
        let record = TransferRecord::now(RecordKind::Send, display_name);
        self.lock().push(record.clone());

        if let Some(writer) = &self.writer {
            let request = WriteRequest::Append { record, ack: None };
            if writer.send(request).is_err() {
                tracing::warn!("Record writer stopped, send of {} not persisted", display_name);
            }
        }
    }
}

fn parse_records(path: &Path, contents: &str) -> Vec<TransferRecord> {
    let mut records = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TransferRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                "Skipping malformed record at {}:{}: {}",
                path.display(),
                line_no + 1,
                e
            ),
        }
    }
    records
}

async fn write_records(path: PathBuf, mut requests: mpsc::UnboundedReceiver<WriteRequest>) {
    while let Some(request) = requests.recv().await {
        match request {
            WriteRequest::Append { record, ack } => {
                let result = persist(&path, &record).await;
                match ack {
                    Some(ack) => {
                        let _ = ack.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            tracing::warn!(
                                "Failed to record {} of {}: {}",
                                record.kind,
                                record.file_name,
                                e
                            );
                        }
                    }
                }
            }
            WriteRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::trace!("Record writer for {} stopped", path.display());
}

async fn persist(path: &Path, record: &TransferRecord) -> Result<()> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
