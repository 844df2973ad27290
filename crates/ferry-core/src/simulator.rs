//! Simulated per-file progress
//!
//! A [`ProgressSimulator`] drives one entry at a time from 0 to 100 on a repeating
//! tokio interval. Each armed run is a spawned task that reports through an mpsc
//! channel owned by the queue actor:
//!
//! ```text
//! start(entry, window)
//!     |-- Tick { 20, overall } -->
//!     |-- Tick { 40, overall } -->
//!     |-- ...
//!     |-- Tick { 100, overall } -->
//!     |-- Finished ------------->   (interval already dropped)
//! ```
//!
//! Cancelling aborts the task without a `Finished` event. Every event carries the
//! [`RunId`] it was produced under; [`ProgressSimulator::accept`] rejects anything
//! that does not belong to the currently armed run, so a tick already sitting in
//! the channel when a run is cancelled can never be applied.

use crate::batch::ProgressWindow;
use crate::config::StepPolicy;
use crate::entry::EntryId;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Identifier of one simulator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub u64);

/// Report from a simulator run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorEvent {
    /// Run that produced the event
    pub run: RunId,
    /// Entry being driven
    pub entry: EntryId,
    /// What happened
    pub kind: SimulatorEventKind,
}

/// Simulator event payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulatorEventKind {
    /// One step elapsed
    Tick {
        /// Entry-local progress (0 to 100)
        progress: u8,
        /// Aggregate progress for the batch, clamped to 100
        overall: f64,
    },
    /// The entry reached 100; no further events follow for this run
    Finished,
}

struct ArmedRun {
    run: RunId,
    entry: EntryId,
    task: JoinHandle<()>,
}

/// Timer-driven progress source with at most one armed run
pub struct ProgressSimulator {
    step: StepPolicy,
    tick_interval: Duration,
    events: mpsc::UnboundedSender<SimulatorEvent>,
    armed: Option<ArmedRun>,
    next_run: u64,
}

impl ProgressSimulator {
    /// Create a simulator reporting into `events`
    pub fn new(
        step: StepPolicy,
        tick_interval: Duration,
        events: mpsc::UnboundedSender<SimulatorEvent>,
    ) -> Self {
        Self {
            step,
            tick_interval,
            events,
            armed: None,
            next_run: 1,
        }
    }

    /// Arm a run for `entry`, cancelling any run already armed
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, entry: EntryId, window: ProgressWindow) -> RunId {
        self.cancel();

        let run = RunId(self.next_run);
        self.next_run += 1;

        let task = tokio::spawn(drive(
            run,
            entry,
            window,
            self.step,
            self.tick_interval,
            self.events.clone(),
        ));

        tracing::trace!(
            "Armed simulator run {} for entry {} (offset {:.2}, weight {:.2})",
            run.0,
            entry,
            window.start_offset,
            window.weight
        );

        self.armed = Some(ArmedRun { run, entry, task });
        run
    }

    /// Disarm the current run without resolving it
    ///
    /// Returns true if a run was armed. Calling it again is a no-op.
    pub fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.task.abort();
                tracing::trace!("Cancelled simulator run {} ({})", armed.run.0, armed.entry);
                true
            }
            None => false,
        }
    }

    /// True while a run is armed
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Entry driven by the armed run
    #[must_use]
    pub fn armed_entry(&self) -> Option<EntryId> {
        self.armed.as_ref().map(|a| a.entry)
    }

    /// Check an event against the armed run
    ///
    /// Returns false for events from cancelled or superseded runs. A `Finished`
    /// event for the armed run disarms the simulator.
    pub fn accept(&mut self, event: &SimulatorEvent) -> bool {
        match &self.armed {
            Some(armed) if armed.run == event.run && armed.entry == event.entry => {}
            _ => return false,
        }

        if event.kind == SimulatorEventKind::Finished {
            self.armed = None;
        }
        true
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn drive(
    run: RunId,
    entry: EntryId,
    window: ProgressWindow,
    step: StepPolicy,
    period: Duration,
    events: mpsc::UnboundedSender<SimulatorEvent>,
) {
    let mut rng = StdRng::from_entropy();
    let mut progress = 0u8;

    {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while progress < 100 {
            ticker.tick().await;
            progress = step.advance(progress, &mut rng);

            let tick = SimulatorEvent {
                run,
                entry,
                kind: SimulatorEventKind::Tick {
                    progress,
                    overall: window.overall(progress),
                },
            };
            if events.send(tick).is_err() {
                // Receiver gone, nobody left to report to
                return;
            }
        }
    }

    let _ = events.send(SimulatorEvent {
        run,
        entry,
        kind: SimulatorEventKind::Finished,
    });
}
