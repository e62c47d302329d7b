/// Trait for reporting ingestion progress.
///
/// The CLI implements it with indicatif. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_ingest_start(&self, _run_id: i64, _file_path: &str) {}
    fn on_parse_complete(&self, _rows: usize, _skipped: usize, _duration_secs: f64) {}
    fn on_duplicates_detected(&self, _skus: usize, _rows: usize) {}
    fn on_load_start(&self, _total_rows: usize) {}
    fn on_chunk_committed(&self, _processed: usize, _total: usize) {}
    fn on_ingest_complete(&self, _processed: usize, _identifier_changes: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
