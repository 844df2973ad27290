//! FERRY CLI
//!
//! Drop files into a bounded upload queue and keep a history of what was sent.

mod config;
mod progress;

use clap::{Parser, Subcommand, ValueEnum};
use ferry_core::{DropEvent, DropZone, RecordKind, RecordLog, UploadQueue};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::{BatchProgress, format_file_size};

/// FERRY - drop files, watch them go
#[derive(Parser)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue files and send them in order
    Send {
        /// Files to send
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List past transfers, newest first
    History {
        /// Only show one kind of record
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,

        /// Only show records from today
        #[arg(long)]
        today: bool,
    },

    /// Record that a file was picked up
    Pickup {
        /// File name
        #[arg(required = true)]
        name: String,
    },

    /// Show configuration and history summary
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Send,
    Pickup,
}

impl From<KindArg> for RecordKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Send => RecordKind::Send,
            KindArg::Pickup => RecordKind::Pickup,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    // Validate configuration
    config.validate()?;

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Send { files } => {
            send_files(files, &config).await?;
        }
        Commands::History { kind, today } => {
            show_history(kind.map(RecordKind::from), today, &config).await?;
        }
        Commands::Pickup { name } => {
            record_pickup(&name, &config).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
    }

    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over `--verbose`, which wins over `[logging] level`.
fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

/// Queue files through the drop zone and render aggregate progress
async fn send_files(files: Vec<PathBuf>, config: &Config) -> anyhow::Result<()> {
    let records = Arc::new(RecordLog::open(&config.records.path).await?);
    let queue = UploadQueue::spawn(config.to_queue_config(), records.clone())?;

    let mut zone = DropZone::new();
    zone.dispatch(DropEvent::DragEnter, &queue).await?;
    let ids = match zone.dispatch(DropEvent::Drop(files), &queue).await {
        Ok(ids) => ids,
        Err(e) if e.is_rejection() => {
            anyhow::bail!("{e} (at most {} files per batch)", queue.capacity())
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot = queue.snapshot();
    let total_bytes = snapshot.entries.iter().map(|e| e.size_bytes).sum();
    let progress = BatchProgress::new(ids.len(), total_bytes);
    tracing::debug!("Queued {} file(s)", ids.len());

    let mut watch = queue.watch();
    loop {
        tokio::select! {
            changed = watch.changed() => {
                if changed.is_err() {
                    progress.abandon();
                    anyhow::bail!("Upload queue stopped unexpectedly");
                }

                let snapshot = watch.borrow_and_update().clone();
                progress.update(&snapshot);

                let finished = snapshot.is_idle()
                    && !snapshot.entries.is_empty()
                    && snapshot.entries.iter().all(|e| e.is_completed());
                if finished {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                queue.clear().await?;
                progress.abandon();
                queue.shutdown().await?;
                records.flush().await;
                anyhow::bail!("Interrupted, queue cleared");
            }
        }
    }

    progress.finish_with_message(format!(
        "Sent {} file(s), {}",
        ids.len(),
        format_file_size(total_bytes)
    ));
    queue.shutdown().await?;
    records.flush().await;

    if let Some(path) = records.path() {
        println!("History: {}", path.display());
    }

    Ok(())
}

/// Print the record log
async fn show_history(
    kind: Option<RecordKind>,
    today: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let records = RecordLog::open(&config.records.path).await?;
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => vec![RecordKind::Send, RecordKind::Pickup],
    };

    for kind in kinds {
        let entries = if today {
            records.today(kind)
        } else {
            records.records(kind)
        };

        println!("{kind} ({})", entries.len());
        if entries.is_empty() {
            println!("  (none)");
        }
        for record in entries {
            println!("  {}  {}", record.local_time(), record.file_name);
        }
    }

    Ok(())
}

/// Append a pickup record
async fn record_pickup(name: &str, config: &Config) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("File name must not be empty");
    }

    let records = RecordLog::open(&config.records.path).await?;
    let record = records.append(RecordKind::Pickup, name).await?;
    println!("Recorded pickup of {} at {}", record.file_name, record.local_time());

    Ok(())
}

/// Show configuration and history counts
async fn show_status(config: &Config) -> anyhow::Result<()> {
    let queue = config.to_queue_config();
    let records = RecordLog::open(&config.records.path).await?;

    println!("FERRY Status");
    println!();
    println!("Queue:");
    println!("  Capacity: {} files", queue.capacity);
    println!("  Step: {:?}", queue.step);
    println!("  Tick interval: {:?}", queue.tick_interval);
    println!("  Settle delay: {:?}", queue.settle_delay);
    println!();
    println!("Records: {}", config.records.path.display());
    println!(
        "  Sent: {} ({} today)",
        records.records(RecordKind::Send).len(),
        records.today(RecordKind::Send).len()
    );
    println!(
        "  Picked up: {} ({} today)",
        records.records(RecordKind::Pickup).len(),
        records.today(RecordKind::Pickup).len()
    );
    println!();
    println!("Logging: {}", config.logging.level);

    Ok(())
}
