use indicatif::{ProgressBar, ProgressStyle};
use listing_recon_core::ProgressReporter;
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Parse phase: spinner (row count unknown until the file is read)
/// - Load phase: progress bar over committed chunks
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(TICK_CHARS),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_ingest_start(&self, run_id: i64, file_path: &str) {
        self.set_bar(Self::spinner(&format!(
            "Run {}: reading {}...",
            run_id, file_path
        )));
    }

    fn on_parse_complete(&self, rows: usize, skipped: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Parse complete: {} rows ({} skipped) in {:.2}s",
            rows, skipped, duration_secs
        );
    }

    fn on_duplicates_detected(&self, skus: usize, rows: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[33m!\x1b[0m Duplicate SKUs: {} SKUs across {} rows, run is waiting for a resolution",
            skus, rows
        );
    }

    fn on_load_start(&self, total_rows: usize) {
        let pb = ProgressBar::new(total_rows as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} Loading [{bar:30.cyan/dim}] {pos}/{len} rows ({eta} remaining)",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars(TICK_CHARS),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_chunk_committed(&self, processed: usize, total: usize) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                if pb.length() != Some(total as u64) {
                    pb.set_length(total as u64);
                }
                pb.set_position(processed as u64);
            }
        }
    }

    fn on_ingest_complete(&self, processed: usize, identifier_changes: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Load complete: {} rows, {} identifier changes in {:.2}s",
            processed, identifier_changes, duration_secs
        );
    }
}
