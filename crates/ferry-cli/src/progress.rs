//! Batch progress display with an aggregate progress bar.

use ferry_core::QueueSnapshot;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}%";

/// Aggregate progress bar for one upload batch
pub struct BatchProgress {
    bar: ProgressBar,
}

impl BatchProgress {
    /// Create a new progress bar for `file_count` files totalling `total_bytes`
    #[must_use]
    pub fn new(file_count: usize, total_bytes: u64) -> Self {
        let bar = ProgressBar::new(100);

        bar.set_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .expect("Invalid progress bar template")
                .progress_chars("#>-"),
        );

        bar.set_message(format!(
            "Sending {file_count} file(s), {}",
            format_file_size(total_bytes)
        ));

        Self { bar }
    }

    /// Render a queue snapshot
    pub fn update(&self, snapshot: &QueueSnapshot) {
        self.bar
            .set_position(snapshot.aggregate_progress.round() as u64);

        if let Some(name) = &snapshot.displayed_file_name {
            let done = snapshot
                .entries
                .iter()
                .filter(|e| e.is_completed())
                .count();
            self.bar.set_message(format!(
                "Sending: {name} ({done}/{} done)",
                snapshot.entries.len()
            ));
        }
    }

    /// Finish with custom message
    pub fn finish_with_message(&self, msg: String) {
        self.bar.set_position(100);
        self.bar.finish_with_message(msg);
    }

    /// Abandon the progress bar (for errors)
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Format a file size for display
///
/// Uses 1024-based units up to GB, with at most two decimals and trailing zeros
/// dropped.
///
/// # Example
///
/// ```ignore
/// assert_eq!(format_file_size(0), "0 Bytes");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// ```
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_idx = 0;
    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    let rounded = format!("{size:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit_idx])
}
