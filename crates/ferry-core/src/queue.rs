//! Upload queue
//!
//! The queue is an actor: one tokio task owns the [`Batch`], the
//! [`ProgressSimulator`], and the settle timer. [`UploadQueue`] is a cheap handle
//! that turns calls into mailbox messages and exposes two read-only views:
//!
//! - a `watch` channel carrying the latest [`QueueSnapshot`]
//! - a `broadcast` channel carrying [`QueueEvent`]s in the order they happen
//!
//! # Lifecycle
//!
//! ```text
//!            enqueue (idle)
//!   Idle ─────────────────────► Active ──┐
//!    ▲                            │      │ tick … tick, Finished
//!    │                            │      ▼
//!    │  settle, no pending        │   FileCompleted ─ settle ─► next file
//!    └────────────────────────────┘
//! ```
//!
//! The actor loop selects over three sources: the mailbox, simulator events, and
//! the armed settle deadline. Commands win ties, so a `clear()` that arrives with a
//! tick already queued always takes effect first; the tick is then rejected as
//! stale.

use crate::batch::Batch;
use crate::config::QueueConfig;
use crate::entry::{EntryId, FileEntry, NewFile};
use crate::error::{QueueError, Result};
use crate::records::RecordLogger;
use crate::simulator::{ProgressSimulator, SimulatorEvent, SimulatorEventKind};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};

/// Identifier of one batch run, increasing per queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// Session-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing transferring, no timer armed
    Idle,
    /// A batch is in flight or settling
    Active,
}

/// Read-only view of the queue for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    /// Session status
    pub status: SessionStatus,
    /// Batch in flight, if any
    pub batch: Option<BatchId>,
    /// Weighted aggregate progress (0.0 to 100.0)
    pub aggregate_progress: f64,
    /// Name of the file currently transferring
    pub displayed_file_name: Option<String>,
    /// Entries in insertion order
    pub entries: Vec<FileEntry>,
}

impl QueueSnapshot {
    fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            batch: None,
            aggregate_progress: 0.0,
            displayed_file_name: None,
            entries: Vec::new(),
        }
    }

    /// True if no batch is in flight
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.status == SessionStatus::Idle
    }
}

/// Lifecycle notification
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// Processing started from idle
    BatchStarted {
        /// New batch
        batch: BatchId,
    },
    /// An entry began transferring
    FileStarted {
        /// Owning batch
        batch: BatchId,
        /// Entry as it started (status `Transferring`, weight frozen)
        entry: FileEntry,
    },
    /// Simulator tick applied
    Progress {
        /// Owning batch
        batch: BatchId,
        /// Entry that advanced
        entry: EntryId,
        /// Entry-local progress
        progress: u8,
        /// Aggregate progress after the tick
        aggregate: f64,
    },
    /// An entry completed and was recorded
    FileCompleted {
        /// Owning batch
        batch: BatchId,
        /// Completed entry
        entry: FileEntry,
    },
    /// An entry was removed by the caller
    FileRemoved {
        /// Entry as it was when removed
        entry: FileEntry,
    },
    /// All entries finished and the settle delay elapsed; progress is back to idle
    BatchFinished {
        /// Finished batch
        batch: BatchId,
    },
    /// Session reset by `clear()` or by removing the last entry
    Reset,
}

enum Command {
    Enqueue {
        files: Vec<NewFile>,
        reply: oneshot::Sender<Result<Vec<EntryId>>>,
    },
    Remove {
        id: EntryId,
        reply: oneshot::Sender<bool>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to an upload queue actor
///
/// Clones share the same queue. The actor stops on [`UploadQueue::shutdown`] or when
/// every handle is dropped.
#[derive(Clone)]
pub struct UploadQueue {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<QueueSnapshot>,
    events: broadcast::Sender<QueueEvent>,
    capacity: usize,
}

impl UploadQueue {
    /// Validate `config` and spawn the queue actor
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if the configuration is invalid.
    pub fn spawn(config: QueueConfig, logger: Arc<dyn RecordLogger>) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (simulator_tx, simulator_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(QueueSnapshot::idle());
        let (events, _) = broadcast::channel(config.event_buffer);
        let capacity = config.capacity;

        let actor = QueueActor {
            batch: Batch::new(config.capacity),
            simulator: ProgressSimulator::new(config.step, config.tick_interval, simulator_tx),
            settle: None,
            current: None,
            next_batch: 1,
            displayed: None,
            logger,
            snapshot: snapshot_tx,
            events: events.clone(),
            config,
        };
        tokio::spawn(actor.run(command_rx, simulator_rx));

        Ok(Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            events,
            capacity,
        })
    }

    /// Admit files to the batch, all or nothing
    ///
    /// Returns the admitted ids in input order. Processing starts after the reply if
    /// the session was idle, so no progress event precedes the return.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::CapacityExceeded`] if the files do not fit, or
    /// [`QueueError::Closed`] if the queue has shut down.
    pub async fn enqueue(&self, files: Vec<NewFile>) -> Result<Vec<EntryId>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Enqueue { files, reply })?;
        response.await.map_err(|_| QueueError::Closed)?
    }

    /// Remove an entry regardless of its status
    ///
    /// Removing the transferring entry cancels its simulator before this returns.
    /// Returns false if no such entry exists.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue has shut down.
    pub async fn remove_file(&self, id: EntryId) -> Result<bool> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Remove { id, reply })?;
        response.await.map_err(|_| QueueError::Closed)
    }

    /// Disarm all timers and drop every entry
    ///
    /// No progress event for the discarded batch is emitted after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue has shut down.
    pub async fn clear(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Clear { reply })?;
        response.await.map_err(|_| QueueError::Closed)
    }

    /// Dispose of the session and stop the actor
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue had already shut down.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        response.await.map_err(|_| QueueError::Closed)
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified whenever the snapshot changes
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to lifecycle events emitted from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Configured batch capacity
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| QueueError::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterSettle {
    /// A file just completed; move on to the next pending entry
    NextFile,
    /// Nothing pending; reset progress and go idle
    Idle,
}

#[derive(Debug, Clone, Copy)]
struct Settle {
    deadline: Instant,
    then: AfterSettle,
}

struct QueueActor {
    config: QueueConfig,
    batch: Batch,
    simulator: ProgressSimulator,
    settle: Option<Settle>,
    current: Option<BatchId>,
    next_batch: u64,
    displayed: Option<String>,
    logger: Arc<dyn RecordLogger>,
    snapshot: watch::Sender<QueueSnapshot>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut simulator_events: mpsc::UnboundedReceiver<SimulatorEvent>,
    ) {
        tracing::debug!(
            "Upload queue started (capacity {}, tick {:?}, settle {:?})",
            self.config.capacity,
            self.config.tick_interval,
            self.config.settle_delay
        );

        loop {
            let settle_at = self.settle.map(|s| s.deadline);
            let settled = sleep_until(settle_at.unwrap_or_else(Instant::now));

            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        self.dispose();
                        break;
                    }
                },
                Some(event) = simulator_events.recv() => self.on_simulator_event(event),
                () = settled, if settle_at.is_some() => self.on_settled(),
            }
        }

        tracing::debug!("Upload queue stopped");
    }

    /// Apply one command; returns false once the actor should stop
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Enqueue { files, reply } => {
                if files.is_empty() {
                    let _ = reply.send(Ok(Vec::new()));
                    return true;
                }

                let result = self.batch.admit(files);
                match &result {
                    Ok(ids) => tracing::info!(
                        "Queued {} file(s) ({} of {} slots used)",
                        ids.len(),
                        self.batch.len(),
                        self.batch.capacity()
                    ),
                    Err(e) => tracing::info!("Rejected enqueue: {}", e),
                }

                let admitted = result.is_ok();
                self.publish();
                let _ = reply.send(result);

                if admitted && self.is_idle() {
                    self.process_next();
                }
            }
            Command::Remove { id, reply } => {
                let removed = self.remove_file(id);
                let _ = reply.send(removed);
            }
            Command::Clear { reply } => {
                self.clear();
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.dispose();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn is_idle(&self) -> bool {
        !self.simulator.is_armed() && self.settle.is_none() && self.batch.active().is_none()
    }

    /// Start the next pending entry, or arm the final settle delay
    fn process_next(&mut self) {
        self.settle = None;

        let Some(id) = self.batch.next_pending() else {
            if self.current.is_some() {
                self.arm_settle(AfterSettle::Idle);
            }
            self.publish();
            return;
        };

        // Entries that arrived after the last file of a batch started have no
        // remainder left to share; they open a new batch
        if self.current.is_some() && self.batch.aggregate_progress() >= 100.0 {
            self.finish_batch();
        }
        let batch = match self.current {
            Some(batch) => batch,
            None => self.open_batch(),
        };

        let Some(window) = self.batch.begin(id) else {
            tracing::warn!("Entry {} could not start", id);
            return;
        };
        self.simulator.start(id, window);

        if let Some(entry) = self.batch.get(id).cloned() {
            tracing::info!(
                "Transferring {} ({}, weight {:.2})",
                entry.display_name,
                id,
                window.weight
            );
            self.displayed = Some(entry.display_name.clone());
            self.emit(QueueEvent::FileStarted { batch, entry });
        }
        self.publish();
    }

    fn on_simulator_event(&mut self, event: SimulatorEvent) {
        if !self.simulator.accept(&event) {
            tracing::trace!("Discarding stale simulator event for {}", event.entry);
            return;
        }

        match event.kind {
            SimulatorEventKind::Tick { progress, overall } => {
                if !self.batch.record_progress(event.entry, progress, overall) {
                    return;
                }
                let aggregate = self.batch.aggregate_progress();
                tracing::trace!(
                    "{} at {}% (aggregate {:.2}%)",
                    event.entry,
                    progress,
                    aggregate
                );
                if let Some(batch) = self.current {
                    self.emit(QueueEvent::Progress {
                        batch,
                        entry: event.entry,
                        progress,
                        aggregate,
                    });
                }
                self.publish();
            }
            SimulatorEventKind::Finished => self.complete(event.entry),
        }
    }

    fn complete(&mut self, id: EntryId) {
        let Some(entry) = self.batch.complete(id) else {
            return;
        };

        tracing::info!(
            "Completed {} ({}, aggregate {:.2}%)",
            entry.display_name,
            id,
            self.batch.aggregate_progress()
        );
        self.logger.append_record(&entry.display_name);

        if let Some(batch) = self.current {
            self.emit(QueueEvent::FileCompleted { batch, entry });
        }
        self.arm_settle(AfterSettle::NextFile);
        self.publish();
    }

    fn on_settled(&mut self) {
        let Some(settle) = self.settle.take() else {
            return;
        };

        match settle.then {
            AfterSettle::NextFile => self.process_next(),
            AfterSettle::Idle => {
                self.finish_batch();
                if self.batch.next_pending().is_some() {
                    self.process_next();
                } else {
                    self.publish();
                }
            }
        }
    }

    fn remove_file(&mut self, id: EntryId) -> bool {
        let was_active = self.simulator.armed_entry() == Some(id);
        let Some(entry) = self.batch.remove(id) else {
            return false;
        };
        if was_active {
            self.simulator.cancel();
        }

        tracing::info!(
            "Removed {} ({}, was {})",
            entry.display_name,
            id,
            entry.status
        );
        self.emit(QueueEvent::FileRemoved { entry });

        if self.batch.is_empty() {
            self.reset();
        } else if was_active {
            self.displayed = None;
            self.process_next();
        } else {
            self.publish();
        }
        true
    }

    fn clear(&mut self) {
        let dropped = self.batch.len();
        self.batch.clear();
        self.reset();
        tracing::info!("Cleared queue ({} entries dropped)", dropped);
    }

    /// Disarm every timer and return to idle without finishing the batch
    fn reset(&mut self) {
        self.disarm();
        self.batch.reset_progress();
        self.displayed = None;
        self.current = None;
        self.emit(QueueEvent::Reset);
        self.publish();
    }

    fn dispose(&mut self) {
        self.disarm();
        self.batch.clear();
        self.displayed = None;
        self.current = None;
        self.publish();
    }

    fn disarm(&mut self) {
        self.simulator.cancel();
        self.settle = None;
    }

    fn open_batch(&mut self) -> BatchId {
        let batch = BatchId(self.next_batch);
        self.next_batch += 1;
        self.current = Some(batch);

        tracing::info!("Starting {} ({} pending)", batch, self.batch.uncompleted());
        self.emit(QueueEvent::BatchStarted { batch });
        batch
    }

    fn finish_batch(&mut self) {
        self.batch.reset_progress();
        self.displayed = None;
        if let Some(batch) = self.current.take() {
            tracing::info!("Finished {}", batch);
            self.emit(QueueEvent::BatchFinished { batch });
        }
    }

    fn arm_settle(&mut self, then: AfterSettle) {
        self.settle = Some(Settle {
            deadline: Instant::now() + self.config.settle_delay,
            then,
        });
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshot.send_replace(QueueSnapshot {
            status: if self.current.is_some() {
                SessionStatus::Active
            } else {
                SessionStatus::Idle
            },
            batch: self.current,
            aggregate_progress: self.batch.aggregate_progress(),
            displayed_file_name: self.displayed.clone(),
            entries: self.batch.entries().to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepPolicy;
    use crate::entry::{EntryStatus, FileHandle};
    use crate::records::{RecordKind, RecordLog};
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    const TICK: Duration = Duration::from_millis(5);

    fn fast_config() -> QueueConfig {
        QueueConfig {
            capacity: 10,
            step: StepPolicy::Fixed(20),
            tick_interval: TICK,
            settle_delay: Duration::from_millis(10),
            event_buffer: 256,
        }
    }

    fn files(names: &[&str]) -> Vec<NewFile> {
        names
            .iter()
            .map(|n| NewFile::new(FileHandle::new(n), *n, 2048))
            .collect()
    }

    fn spawn(config: QueueConfig) -> (UploadQueue, Arc<RecordLog>) {
        let records = Arc::new(RecordLog::in_memory());
        let queue = UploadQueue::spawn(config, records.clone()).unwrap();
        (queue, records)
    }

    async fn next_event(events: &mut broadcast::Receiver<QueueEvent>) -> QueueEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("queue stalled")
            .expect("event stream closed")
    }

    async fn collect_until_finished(
        events: &mut broadcast::Receiver<QueueEvent>,
    ) -> Vec<QueueEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next_event(events).await;
            let done = matches!(event, QueueEvent::BatchFinished { .. });
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    fn completed_names(events: &[QueueEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::FileCompleted { entry, .. } => Some(entry.display_name.clone()),
                _ => None,
            })
            .collect()
    }

    fn aggregates(events: &[QueueEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::Progress { aggregate, .. } => Some(*aggregate),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_two_file_batch() {
        let (queue, records) = spawn(fast_config());
        let mut events = queue.subscribe();

        let ids = queue.enqueue(files(&["a.txt", "b.txt"])).await.unwrap();
        assert_eq!(ids.len(), 2);

        let seen = collect_until_finished(&mut events).await;
        assert!(matches!(seen[0], QueueEvent::BatchStarted { .. }));

        let progress = aggregates(&seen);
        assert_eq!(progress[0], 10.0);
        assert_eq!(progress[4], 50.0);
        assert_eq!(*progress.last().unwrap(), 100.0);

        // Aggregate right after the first file completes
        let first_done = seen
            .iter()
            .position(|e| matches!(e, QueueEvent::FileCompleted { .. }))
            .unwrap();
        let QueueEvent::Progress { aggregate, .. } = seen[first_done - 1] else {
            panic!("expected a progress event before completion");
        };
        assert_eq!(aggregate, 50.0);

        assert_eq!(completed_names(&seen), ["a.txt", "b.txt"]);

        let snapshot = queue.snapshot();
        assert!(snapshot.is_idle());
        assert_eq!(snapshot.aggregate_progress, 0.0);
        assert_eq!(snapshot.displayed_file_name, None);
        assert!(snapshot.entries.iter().all(FileEntry::is_completed));

        let sends: Vec<_> = records
            .records(RecordKind::Send)
            .into_iter()
            .map(|r| r.file_name)
            .collect();
        assert_eq!(sends, ["b.txt", "a.txt"]);

        queue.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_capacity_plus_one_rejected() {
        let (queue, records) = spawn(QueueConfig {
            capacity: 3,
            ..fast_config()
        });
        let mut events = queue.subscribe();

        let err = queue
            .enqueue(files(&["a", "b", "c", "d"]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::CapacityExceeded {
                requested: 4,
                available: 3,
                capacity: 3,
            }
        );

        let snapshot = queue.snapshot();
        assert!(snapshot.entries.is_empty());
        assert!(snapshot.is_idle());

        tokio::time::sleep(TICK * 4).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_completion_order_matches_insertion() {
        let (queue, records) = spawn(fast_config());
        let mut events = queue.subscribe();

        queue.enqueue(files(&["A", "B", "C"])).await.unwrap();
        let seen = collect_until_finished(&mut events).await;

        assert_eq!(completed_names(&seen), ["A", "B", "C"]);
        assert_eq!(records.len(), 3);

        let progress = aggregates(&seen);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_enqueue_returns_before_progress() {
        let (queue, _records) = spawn(QueueConfig {
            tick_interval: Duration::from_millis(200),
            ..fast_config()
        });

        queue.enqueue(files(&["slow.bin"])).await.unwrap();
        let snapshot = queue.snapshot();
        assert_eq!(snapshot.entries[0].progress_percent, 0);
        assert_eq!(snapshot.aggregate_progress, 0.0);

        queue.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_mid_transfer_stops_progress() {
        let (queue, records) = spawn(fast_config());
        let mut events = queue.subscribe();

        queue.enqueue(files(&["big.iso", "next.iso"])).await.unwrap();
        loop {
            if let QueueEvent::Progress { .. } = next_event(&mut events).await {
                break;
            }
        }

        queue.clear().await.unwrap();
        let snapshot = queue.snapshot();
        assert!(snapshot.entries.is_empty());
        assert!(snapshot.is_idle());
        assert_eq!(snapshot.aggregate_progress, 0.0);

        // Drain up to the reset, then nothing else may arrive
        loop {
            if next_event(&mut events).await == QueueEvent::Reset {
                break;
            }
        }
        tokio::time::sleep(TICK * 10).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(queue.snapshot(), snapshot);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_mid_flight_enqueue_keeps_progress_monotonic() {
        let (queue, _records) = spawn(fast_config());
        let mut events = queue.subscribe();

        queue.enqueue(files(&["a", "b"])).await.unwrap();
        let mut seen = Vec::new();
        loop {
            let event = next_event(&mut events).await;
            let first_tick = matches!(event, QueueEvent::Progress { .. });
            seen.push(event);
            if first_tick {
                break;
            }
        }

        queue.enqueue(files(&["c", "d"])).await.unwrap();
        seen.extend(collect_until_finished(&mut events).await);

        let progress = aggregates(&seen);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*progress.last().unwrap(), 100.0);
        assert_eq!(completed_names(&seen), ["a", "b", "c", "d"]);

        let total: f64 = queue
            .snapshot()
            .entries
            .iter()
            .filter_map(|e| e.weight)
            .sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_remove_active_entry_cancels_it() {
        let (queue, records) = spawn(fast_config());
        let mut events = queue.subscribe();

        let ids = queue.enqueue(files(&["first", "second"])).await.unwrap();
        loop {
            if let QueueEvent::Progress { entry, .. } = next_event(&mut events).await {
                assert_eq!(entry, ids[0]);
                break;
            }
        }

        assert!(queue.remove_file(ids[0]).await.unwrap());
        assert!(!queue.remove_file(ids[0]).await.unwrap());

        let seen = collect_until_finished(&mut events).await;
        let after_removal = seen
            .iter()
            .position(|e| matches!(e, QueueEvent::FileRemoved { .. }))
            .unwrap();
        assert!(seen[after_removal..].iter().all(|e| !matches!(
            e,
            QueueEvent::Progress { entry, .. } if *entry == ids[0]
        )));
        assert_eq!(completed_names(&seen), ["second"]);

        let progress = aggregates(&seen);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*progress.last().unwrap(), 100.0);

        let sends = records.records(RecordKind::Send);
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].file_name, "second");
    }

    #[tokio::test]
    async fn test_remove_last_entry_resets_session() {
        let (queue, _records) = spawn(fast_config());
        let mut events = queue.subscribe();

        let ids = queue.enqueue(files(&["only"])).await.unwrap();
        loop {
            if let QueueEvent::Progress { .. } = next_event(&mut events).await {
                break;
            }
        }

        assert!(queue.remove_file(ids[0]).await.unwrap());
        let snapshot = queue.snapshot();
        assert!(snapshot.is_idle());
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.aggregate_progress, 0.0);
        assert_eq!(snapshot.displayed_file_name, None);

        loop {
            if next_event(&mut events).await == QueueEvent::Reset {
                break;
            }
        }
        tokio::time::sleep(TICK * 10).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_remove_pending_entry() {
        let (queue, _records) = spawn(fast_config());
        let mut events = queue.subscribe();

        let ids = queue.enqueue(files(&["a", "b", "c"])).await.unwrap();
        assert!(queue.remove_file(ids[1]).await.unwrap());

        let seen = collect_until_finished(&mut events).await;
        assert_eq!(completed_names(&seen), ["a", "c"]);
    }

    #[tokio::test]
    async fn test_displayed_name_follows_active_file() {
        let (queue, _records) = spawn(fast_config());
        let mut watch = queue.watch();

        queue.enqueue(files(&["shown.txt"])).await.unwrap();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            watch.wait_for(|s| s.displayed_file_name.is_some()),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        assert_eq!(snapshot.displayed_file_name.as_deref(), Some("shown.txt"));
        assert_eq!(snapshot.status, SessionStatus::Active);
        assert_eq!(snapshot.entries[0].status, EntryStatus::Transferring);

        tokio::time::timeout(
            Duration::from_secs(5),
            watch.wait_for(|s| s.is_idle() && s.entries.iter().all(FileEntry::is_completed)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(queue.snapshot().displayed_file_name, None);
    }

    #[tokio::test]
    async fn test_displayed_name_held_through_final_settle() {
        let settle = Duration::from_millis(200);
        let (queue, _records) = spawn(QueueConfig {
            step: StepPolicy::Fixed(50),
            settle_delay: settle,
            ..fast_config()
        });
        let mut events = queue.subscribe();

        queue.enqueue(files(&["last.bin"])).await.unwrap();
        loop {
            if let QueueEvent::FileCompleted { .. } = next_event(&mut events).await {
                break;
            }
        }

        // Past the first settle, inside the one before going idle
        tokio::time::sleep(settle + settle / 2).await;
        let snapshot = queue.snapshot();
        assert!(!snapshot.is_idle());
        assert_eq!(snapshot.aggregate_progress, 100.0);
        assert_eq!(snapshot.displayed_file_name.as_deref(), Some("last.bin"));

        collect_until_finished(&mut events).await;
        let snapshot = queue.snapshot();
        assert!(snapshot.is_idle());
        assert_eq!(snapshot.displayed_file_name, None);
    }

    #[tokio::test]
    async fn test_remove_active_last_entry_clears_name() {
        let (queue, _records) = spawn(fast_config());
        let mut events = queue.subscribe();

        let ids = queue.enqueue(files(&["done", "dropped"])).await.unwrap();
        loop {
            if let QueueEvent::Progress { entry, .. } = next_event(&mut events).await {
                if entry == ids[1] {
                    break;
                }
            }
        }

        assert!(queue.remove_file(ids[1]).await.unwrap());
        let snapshot = queue.snapshot();
        assert!(!snapshot.is_idle());
        assert_eq!(snapshot.displayed_file_name, None);
    }

    #[tokio::test]
    async fn test_new_batch_after_idle() {
        let (queue, _records) = spawn(fast_config());
        let mut events = queue.subscribe();

        queue.enqueue(files(&["one"])).await.unwrap();
        let first = collect_until_finished(&mut events).await;

        queue.enqueue(files(&["two"])).await.unwrap();
        let second = collect_until_finished(&mut events).await;

        let QueueEvent::BatchStarted { batch: a } = first[0] else {
            panic!("expected batch start");
        };
        let QueueEvent::BatchStarted { batch: b } = second[0] else {
            panic!("expected batch start");
        };
        assert!(b > a);

        // The second batch starts from zero again
        assert_eq!(aggregates(&second)[0], 20.0);
        assert_eq!(queue.snapshot().entries.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_enqueue_is_noop() {
        let (queue, _records) = spawn(fast_config());
        let mut events = queue.subscribe();

        assert!(queue.enqueue(Vec::new()).await.unwrap().is_empty());
        tokio::time::sleep(TICK * 4).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(queue.snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let (queue, _records) = spawn(fast_config());
        queue.enqueue(files(&["x"])).await.unwrap();

        queue.shutdown().await.unwrap();
        assert!(queue.snapshot().entries.is_empty());
        assert_eq!(
            queue.enqueue(files(&["y"])).await.unwrap_err(),
            QueueError::Closed
        );
        assert_eq!(queue.clear().await.unwrap_err(), QueueError::Closed);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = UploadQueue::spawn(
            QueueConfig {
                capacity: 0,
                ..fast_config()
            },
            Arc::new(RecordLog::in_memory()),
        );
        assert!(matches!(result, Err(QueueError::InvalidConfig(_))));
    }
}
