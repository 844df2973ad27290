//! Integration tests across the drop zone, upload queue, and record log.
//!
//! Each test runs a real queue actor with millisecond timings.

use ferry_core::{
    DropEvent, DropZone, QueueConfig, QueueError, QueueEvent, RecordKind, RecordLog, StepPolicy,
    UploadQueue,
};
use ferry_integration_tests::{
    aggregates, collect_batch, completed_names, fast_config, named_files, next_event,
    wait_for_snapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Drop Zone to Record Log
// ============================================================================

/// Dropped files are sent in order and persisted as send records.
#[tokio::test]
async fn test_drop_send_and_persist() {
    let dir = TempDir::new().unwrap();
    let mut paths = Vec::new();
    for (name, body) in [("report.pdf", "pdf"), ("photo.png", "png!"), ("notes.txt", "hi")] {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        paths.push(path);
    }

    let log_path = dir.path().join("history/records.jsonl");
    let records = Arc::new(RecordLog::open(&log_path).await.unwrap());
    let queue = UploadQueue::spawn(fast_config(10), records.clone()).unwrap();
    let mut events = queue.subscribe();

    let mut zone = DropZone::new();
    zone.dispatch(DropEvent::DragEnter, &queue).await.unwrap();
    assert!(zone.is_dragging());
    let ids = zone.dispatch(DropEvent::Drop(paths), &queue).await.unwrap();
    assert!(!zone.is_dragging());
    assert_eq!(ids.len(), 3);

    let seen = collect_batch(&mut events).await;
    assert_eq!(
        completed_names(&seen),
        ["report.pdf", "photo.png", "notes.txt"]
    );

    let sizes: Vec<u64> = queue.snapshot().entries.iter().map(|e| e.size_bytes).collect();
    assert_eq!(sizes, [3, 4, 2]);
    queue.shutdown().await.unwrap();
    records.flush().await;

    // Reopen from disk: newest first
    let reloaded = RecordLog::open(&log_path).await.unwrap();
    let names: Vec<_> = reloaded
        .records(RecordKind::Send)
        .into_iter()
        .map(|r| r.file_name)
        .collect();
    assert_eq!(names, ["notes.txt", "photo.png", "report.pdf"]);
    assert_eq!(reloaded.today(RecordKind::Send).len(), 3);
    assert!(reloaded.records(RecordKind::Pickup).is_empty());
}

/// Pickups and sends share one log but list separately.
#[tokio::test]
async fn test_pickups_alongside_sends() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("records.jsonl");
    let records = Arc::new(RecordLog::open(&log_path).await.unwrap());

    let queue = UploadQueue::spawn(fast_config(10), records.clone()).unwrap();
    let mut events = queue.subscribe();
    queue.enqueue(named_files(&["sent.bin"])).await.unwrap();
    collect_batch(&mut events).await;

    // Awaited append lands after the queued send
    records.append(RecordKind::Pickup, "fetched.bin").await.unwrap();

    let reloaded = RecordLog::open(&log_path).await.unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.records(RecordKind::Send)[0].file_name, "sent.bin");
    assert_eq!(reloaded.records(RecordKind::Pickup)[0].file_name, "fetched.bin");
}

// ============================================================================
// Batch Lifecycle
// ============================================================================

/// The terminal 100% stays visible for the settle delay before the reset.
#[tokio::test]
async fn test_settle_delay_holds_terminal_progress() {
    let settle = Duration::from_millis(150);
    let queue = UploadQueue::spawn(
        QueueConfig {
            settle_delay: settle,
            ..fast_config(10)
        },
        Arc::new(RecordLog::in_memory()),
    )
    .unwrap();
    let mut watch = queue.watch();

    queue.enqueue(named_files(&["only.txt"])).await.unwrap();

    let done = wait_for_snapshot(&mut watch, |s| {
        s.entries.first().is_some_and(|e| e.is_completed())
    })
    .await;
    assert_eq!(done.aggregate_progress, 100.0);
    assert!(!done.is_idle());

    let started = tokio::time::Instant::now();
    let idle = wait_for_snapshot(&mut watch, |s| s.is_idle()).await;
    assert_eq!(idle.aggregate_progress, 0.0);
    assert_eq!(idle.displayed_file_name, None);

    // Two settle delays: one before looking for the next file, one before idling
    assert!(started.elapsed() >= settle);
}

/// Files enqueued after the last completion open a new batch at zero.
#[tokio::test]
async fn test_enqueue_during_final_settle_rolls_over() {
    let queue = UploadQueue::spawn(
        QueueConfig {
            settle_delay: Duration::from_millis(80),
            ..fast_config(10)
        },
        Arc::new(RecordLog::in_memory()),
    )
    .unwrap();
    let mut events = queue.subscribe();

    queue.enqueue(named_files(&["first"])).await.unwrap();
    loop {
        if let QueueEvent::FileCompleted { .. } = next_event(&mut events).await {
            break;
        }
    }

    queue.enqueue(named_files(&["late"])).await.unwrap();

    let rest = collect_batch(&mut events).await;
    let QueueEvent::BatchFinished { batch: first } = rest[0] else {
        panic!("expected the first batch to finish, got {:?}", rest[0]);
    };

    let second = collect_batch(&mut events).await;
    let QueueEvent::BatchStarted { batch: next } = second[0] else {
        panic!("expected a new batch, got {:?}", second[0]);
    };
    assert!(next > first);
    assert_eq!(aggregates(&second)[0], 20.0);
    assert_eq!(completed_names(&second), ["late"]);
}

/// Completed entries hold their slots until cleared.
#[tokio::test]
async fn test_capacity_counts_completed_entries() {
    let queue = UploadQueue::spawn(fast_config(2), Arc::new(RecordLog::in_memory())).unwrap();
    let mut events = queue.subscribe();

    queue.enqueue(named_files(&["a"])).await.unwrap();
    collect_batch(&mut events).await;

    let err = queue.enqueue(named_files(&["b", "c"])).await.unwrap_err();
    assert_eq!(
        err,
        QueueError::CapacityExceeded {
            requested: 2,
            available: 1,
            capacity: 2,
        }
    );
    assert!(err.is_rejection());

    queue.clear().await.unwrap();
    assert_eq!(queue.enqueue(named_files(&["b", "c"])).await.unwrap().len(), 2);

    let seen = collect_batch(&mut events).await;
    assert_eq!(completed_names(&seen), ["b", "c"]);
}

/// Removing a completed entry frees its slot.
#[tokio::test]
async fn test_remove_completed_entry_frees_slot() {
    let queue = UploadQueue::spawn(fast_config(1), Arc::new(RecordLog::in_memory())).unwrap();
    let mut events = queue.subscribe();

    let ids = queue.enqueue(named_files(&["a"])).await.unwrap();
    collect_batch(&mut events).await;

    assert!(queue.enqueue(named_files(&["b"])).await.is_err());
    assert!(queue.remove_file(ids[0]).await.unwrap());
    assert!(queue.enqueue(named_files(&["b"])).await.is_ok());
}

/// Random steps still produce a monotonic aggregate that ends at 100.
#[tokio::test]
async fn test_random_steps_full_batch() {
    let queue = UploadQueue::spawn(
        QueueConfig {
            step: StepPolicy::Random { min: 1, max: 10 },
            tick_interval: Duration::from_millis(1),
            event_buffer: 1024,
            ..fast_config(10)
        },
        Arc::new(RecordLog::in_memory()),
    )
    .unwrap();
    let mut events = queue.subscribe();

    queue.enqueue(named_files(&["x", "y", "z"])).await.unwrap();
    let seen = collect_batch(&mut events).await;

    let progress = aggregates(&seen);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*progress.last().unwrap(), 100.0);
    assert_eq!(completed_names(&seen), ["x", "y", "z"]);
}

/// Every subscriber observes the same event sequence.
#[tokio::test]
async fn test_subscribers_see_same_events() {
    let queue = UploadQueue::spawn(fast_config(10), Arc::new(RecordLog::in_memory())).unwrap();
    let mut first = queue.subscribe();
    let mut second = queue.clone().subscribe();

    queue.enqueue(named_files(&["a", "b"])).await.unwrap();

    let a = collect_batch(&mut first).await;
    let b = collect_batch(&mut second).await;
    assert_eq!(a, b);
}

/// Shutting down mid-batch drops the remaining work and refuses further calls.
#[tokio::test]
async fn test_shutdown_mid_batch() {
    let records = Arc::new(RecordLog::in_memory());
    let queue = UploadQueue::spawn(fast_config(10), records.clone()).unwrap();
    let mut events = queue.subscribe();

    queue.enqueue(named_files(&["a", "b", "c"])).await.unwrap();
    loop {
        if let QueueEvent::Progress { .. } = next_event(&mut events).await {
            break;
        }
    }

    queue.shutdown().await.unwrap();
    assert!(queue.snapshot().is_idle());
    assert_eq!(queue.shutdown().await.unwrap_err(), QueueError::Closed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(records.is_empty());
}
