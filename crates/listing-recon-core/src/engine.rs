use crate::config::AppConfig;
use crate::duplicates::detect::{detect_duplicates, duplicate_row_count};
use crate::duplicates::gate::GateState;
use crate::duplicates::resolve::{check_complete, resolve_rows, validate_resolution, Resolution};
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;
use crate::reconcile::upsert::{upsert_chunk, ChunkContext};
use crate::report::format::{FormatProfile, ReportFormat};
use crate::report::reader::{read_report, ColumnSet, NormalizeStats, ReportRow};
use crate::report::writer::{resolved_export_path, write_rows};
use crate::storage::models::{DuplicateIssue, IngestionRun, IssueStatus, NewRun, RunCounts, RunStatus};
use crate::storage::Database;
use crate::tracker::StatusTracker;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What the external dispatcher hands the pipeline.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub file_path: PathBuf,
    pub file_id: String,
    pub submitter: Option<String>,
    pub format: ReportFormat,
}

impl IngestRequest {
    pub fn new(file_path: impl Into<PathBuf>, file_id: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            file_id: file_id.into(),
            submitter: None,
            format: ReportFormat::default(),
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub run_id: i64,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub skipped_rows: usize,
    pub soft_errors: usize,
    pub listings_created: usize,
    pub listings_updated: usize,
    pub identifier_changes: usize,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Completed(IngestSummary),
    /// The run is parked until the issue is resolved. Nothing was written to the catalog.
    DuplicatesDetected {
        run_id: i64,
        issue_id: i64,
        duplicate_skus: usize,
        duplicate_rows: usize,
    },
}

impl IngestOutcome {
    pub fn run_id(&self) -> i64 {
        match self {
            IngestOutcome::Completed(summary) => summary.run_id,
            IngestOutcome::DuplicatesDetected { run_id, .. } => *run_id,
        }
    }
}

/// Rows ready for the catalog, with what the normalizer learned about them.
struct LoadInput<'a> {
    run_id: i64,
    file_id: &'a str,
    profile: &'a FormatProfile,
    columns: &'a ColumnSet,
    rows: &'a [ReportRow],
    stats: NormalizeStats,
    started: Instant,
}

pub struct IngestEngine {
    config: AppConfig,
    cancelled: Arc<AtomicBool>,
}

impl IngestEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Setting the flag stops the current run at its next chunk boundary.
    /// Each `ingest` or `resolve` call clears it on entry, so a cancel only
    /// ever reaches the run in flight.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Run one report through the pipeline:
    /// 1. Read and normalize every row
    /// 2. Detect intra-file duplicate SKUs; park the run if there are any
    /// 3. Reconcile identifiers and upsert listings chunk by chunk
    pub fn ingest(
        &self,
        db: &Database,
        request: &IngestRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<IngestOutcome> {
        self.cancelled.store(false, Ordering::SeqCst);
        let file_path = request.file_path.to_string_lossy().into_owned();
        let run_id = db.create_run(&NewRun {
            file_id: &request.file_id,
            file_path: &file_path,
            report_format: request.format,
            submitter: request.submitter.as_deref(),
        })?;
        let tracker = StatusTracker::new(db);
        tracker.set_status(run_id, RunStatus::Processing, None)?;

        info!(
            "Run {}: ingesting {} (file id {}, format {})",
            run_id, file_path, request.file_id, request.format
        );
        reporter.on_ingest_start(run_id, &file_path);

        let result = self.run_ingest(db, &tracker, run_id, request, reporter);
        finish(&tracker, run_id, result)
    }

    fn run_ingest(
        &self,
        db: &Database,
        tracker: &StatusTracker<'_>,
        run_id: i64,
        request: &IngestRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<IngestOutcome> {
        let started = Instant::now();
        let profile = self.config.profile_for(request.format);

        let parsed = read_report(&request.file_path, &profile)?;
        reporter.on_parse_complete(
            parsed.rows.len(),
            parsed.stats.skipped_rows,
            started.elapsed().as_secs_f64(),
        );
        db.update_run_counts(run_id, &run_counts(parsed.rows.len(), &parsed.stats, 0))?;

        let duplicates = detect_duplicates(&parsed.rows, &profile);
        if GateState::after_detection(&duplicates) == GateState::Pending {
            let duplicate_rows = duplicate_row_count(&duplicates);
            let issue_id = db.insert_duplicate_issue(run_id, &request.file_id, &duplicates)?;
            tracker.set_status(
                run_id,
                RunStatus::DuplicateDetected,
                Some(json!({
                    "issue_id": issue_id,
                    "duplicate_skus": duplicates.keys().collect::<Vec<_>>(),
                    "duplicate_rows": duplicate_rows,
                })),
            )?;
            warn!(
                "Run {}: {} duplicated SKUs across {} rows, waiting on issue {}",
                run_id,
                duplicates.len(),
                duplicate_rows,
                issue_id
            );
            reporter.on_duplicates_detected(duplicates.len(), duplicate_rows);
            return Ok(IngestOutcome::DuplicatesDetected {
                run_id,
                issue_id,
                duplicate_skus: duplicates.len(),
                duplicate_rows,
            });
        }

        let summary = self.load(
            db,
            tracker,
            &LoadInput {
                run_id,
                file_id: &request.file_id,
                profile: &profile,
                columns: &parsed.columns,
                rows: &parsed.rows,
                stats: parsed.stats,
                started,
            },
            reporter,
        )?;
        Ok(IngestOutcome::Completed(summary))
    }

    /// Apply a resolution to a parked run and finish loading it.
    ///
    /// A mapping that leaves SKUs out is rejected with nothing changed. A
    /// contradictory mapping, or one that still leaves duplicates, puts both
    /// the issue and the run in `error`. The issue is only marked `resolved`
    /// once every row is loaded; if loading fails or is cancelled the run
    /// records the error and the issue stays `pending` for another attempt.
    pub fn resolve(
        &self,
        db: &Database,
        issue_id: i64,
        resolution: &Resolution,
        reporter: &dyn ProgressReporter,
    ) -> Result<IngestOutcome> {
        self.cancelled.store(false, Ordering::SeqCst);
        let issue = db
            .get_duplicate_issue(issue_id)?
            .ok_or(Error::IssueNotFound(issue_id))?;
        if issue.status != IssueStatus::Pending {
            return Err(Error::IssueNotPending {
                id: issue_id,
                status: issue.status.to_string(),
            });
        }
        let run = db.get_run(issue.run_id)?.ok_or(Error::RunNotFound(issue.run_id))?;

        check_complete(&issue.conflicts, resolution)?;

        let tracker = StatusTracker::new(db);
        if run.status == RunStatus::Error {
            info!("Run {}: retrying load for pending issue {}", run.id, issue_id);
            tracker.reopen(run.id)?;
        }
        let gate = GateState::from_issue_status(issue.status);
        let resolution_json = resolution.to_json()?;

        if let Err(e) = validate_resolution(&issue.conflicts, resolution) {
            gate.transition(GateState::Error)?;
            reject_issue(db, issue_id, &resolution_json, &e);
            return finish(&tracker, run.id, Err(e));
        }

        let gate = gate.transition(GateState::Resolving)?;
        tracker.set_status(run.id, RunStatus::Resolving, Some(json!({ "issue_id": issue_id })))?;
        info!(
            "Run {}: resolving issue {} ({} SKUs)",
            run.id,
            issue_id,
            resolution.strategies.len()
        );
        reporter.on_ingest_start(run.id, &run.file_path);

        let started = Instant::now();
        let profile = self.config.profile_for(run.report_format);
        let (columns, rows, stats) = match self.prepare_resolved_rows(&run, &issue, resolution, &profile) {
            Ok(prepared) => prepared,
            Err(e) => {
                // Unreadable source files leave the issue open for a retry.
                if e.is_resolution_failure() {
                    gate.transition(GateState::Error)?;
                    reject_issue(db, issue_id, &resolution_json, &e);
                }
                return finish(&tracker, run.id, Err(e));
            }
        };
        reporter.on_parse_complete(rows.len(), stats.skipped_rows, started.elapsed().as_secs_f64());

        let result = self.load(
            db,
            &tracker,
            &LoadInput {
                run_id: run.id,
                file_id: &run.file_id,
                profile: &profile,
                columns: &columns,
                rows: &rows,
                stats,
                started,
            },
            reporter,
        );
        let summary = finish(&tracker, run.id, result)?;

        gate.transition(GateState::Resolved)?;
        db.mark_issue_resolved(issue_id, &resolution_json, resolution.notes.as_deref())?;
        info!("Issue {}: resolved by run {}", issue_id, run.id);
        Ok(IngestOutcome::Completed(summary))
    }

    /// Re-read the run's file and apply the resolution to it.
    fn prepare_resolved_rows(
        &self,
        run: &IngestionRun,
        issue: &DuplicateIssue,
        resolution: &Resolution,
        profile: &FormatProfile,
    ) -> Result<(ColumnSet, Vec<ReportRow>, NormalizeStats)> {
        let source = Path::new(&run.file_path);
        let parsed = read_report(source, profile)?;
        let rows = resolve_rows(parsed.rows, resolution, profile)?;
        debug!(
            "Issue {}: {} rows remain after resolution",
            issue.id,
            rows.len()
        );

        if self.config.export_resolved {
            let target = resolved_export_path(source);
            if let Err(e) = write_rows(&target, profile, &parsed.columns, &rows) {
                warn!("Could not export resolved rows to {}: {}", target.display(), e);
            }
        }

        Ok((parsed.columns, rows, parsed.stats))
    }

    fn load(
        &self,
        db: &Database,
        tracker: &StatusTracker<'_>,
        input: &LoadInput<'_>,
        reporter: &dyn ProgressReporter,
    ) -> Result<IngestSummary> {
        let total = input.rows.len();
        let ctx = ChunkContext {
            run_id: input.run_id,
            file_id: input.file_id,
            profile: input.profile,
            columns: input.columns,
            policy: self.config.cleared_identifier_policy,
        };
        let mut summary = IngestSummary {
            run_id: input.run_id,
            total_rows: total,
            skipped_rows: input.stats.skipped_rows,
            soft_errors: input.stats.soft_errors,
            ..Default::default()
        };

        reporter.on_load_start(total);
        tracker.set_progress(input.run_id, 0, total);

        for chunk in input.rows.chunks(self.config.chunk_size.max(1)) {
            if self.cancelled.load(Ordering::Relaxed) {
                info!(
                    "Run {}: cancelled after {} of {} rows",
                    input.run_id, summary.processed_rows, total
                );
                return Err(Error::Cancelled);
            }

            let outcome = upsert_chunk(db, &ctx, chunk)?;
            summary.processed_rows += outcome.rows;
            summary.listings_created += outcome.created;
            summary.listings_updated += outcome.updated;
            summary.identifier_changes += outcome.identifier_changes;

            tracker.set_progress(input.run_id, summary.processed_rows, total);
            reporter.on_chunk_committed(summary.processed_rows, total);
        }

        summary.duration_secs = input.started.elapsed().as_secs_f64();
        db.update_run_counts(
            input.run_id,
            &run_counts(total, &input.stats, summary.identifier_changes),
        )?;
        tracker.set_status(
            input.run_id,
            RunStatus::Completed,
            Some(serde_json::to_value(&summary)?),
        )?;
        info!(
            "Run {}: completed {} rows ({} new, {} updated), {} identifier changes in {:.2}s",
            input.run_id,
            summary.processed_rows,
            summary.listings_created,
            summary.listings_updated,
            summary.identifier_changes,
            summary.duration_secs
        );
        reporter.on_ingest_complete(
            summary.processed_rows,
            summary.identifier_changes,
            summary.duration_secs,
        );
        Ok(summary)
    }
}

fn run_counts(total: usize, stats: &NormalizeStats, identifier_changes: usize) -> RunCounts {
    RunCounts {
        total_rows: total as i64,
        skipped_rows: stats.skipped_rows as i64,
        soft_errors: stats.soft_errors as i64,
        identifier_changes: identifier_changes as i64,
    }
}

/// Record a failed run before handing the error back.
fn finish<T>(tracker: &StatusTracker<'_>, run_id: i64, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        let message = match e {
            Error::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        };
        error!("Run {} failed: {}", run_id, message);
        if let Err(mark_err) = tracker.fail(run_id, &message) {
            warn!("Could not mark run {} as failed: {}", run_id, mark_err);
        }
    }
    result
}

fn reject_issue(db: &Database, issue_id: i64, resolution_json: &str, e: &Error) {
    if let Err(mark_err) = db.mark_issue_error(issue_id, Some(resolution_json), &e.to_string()) {
        warn!("Could not mark issue {} as failed: {}", issue_id, mark_err);
    }
}
