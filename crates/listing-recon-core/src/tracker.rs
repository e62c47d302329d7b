use crate::error::{Error, Result};
use crate::storage::models::RunStatus;
use crate::storage::Database;
use serde_json::json;
use tracing::{debug, warn};

/// Writes run status and progress. Status changes are checked against the
/// run lifecycle; progress writes are best-effort.
pub struct StatusTracker<'a> {
    db: &'a Database,
}

impl<'a> StatusTracker<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn set_status(
        &self,
        run_id: i64,
        status: RunStatus,
        details: Option<serde_json::Value>,
    ) -> Result<()> {
        self.transition(run_id, status, details, None)
    }

    /// Move the run to `error`, keeping `message` as its error detail.
    pub fn fail(&self, run_id: i64, message: &str) -> Result<()> {
        self.transition(
            run_id,
            RunStatus::Error,
            Some(json!({ "error": message })),
            Some(message),
        )
    }

    /// A run whose load failed while its duplicate issue is still pending
    /// goes back to waiting on that issue.
    pub fn reopen(&self, run_id: i64) -> Result<()> {
        let from = self.check(run_id, RunStatus::DuplicateDetected)?;
        self.db.reopen_run(run_id)?;
        debug!("Run {}: {} -> {} (reopened)", run_id, from, RunStatus::DuplicateDetected);
        Ok(())
    }

    /// Never fails: a progress write that doesn't land is only logged.
    pub fn set_progress(&self, run_id: i64, processed: usize, total: usize) {
        if let Err(e) = self
            .db
            .update_run_progress(run_id, processed as i64, total as i64)
        {
            warn!("Progress update for run {} failed: {}", run_id, e);
        }
    }

    fn transition(
        &self,
        run_id: i64,
        status: RunStatus,
        details: Option<serde_json::Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let from = self.check(run_id, status)?;
        self.db
            .update_run_status(run_id, status, details.as_ref(), error_message)?;
        debug!("Run {}: {} -> {}", run_id, from, status);
        Ok(())
    }

    fn check(&self, run_id: i64, next: RunStatus) -> Result<RunStatus> {
        let run = self.db.get_run(run_id)?.ok_or(Error::RunNotFound(run_id))?;
        if !run.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: run.status.to_string(),
                to: next.to_string(),
            });
        }
        Ok(run.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::format::ReportFormat;
    use crate::storage::models::NewRun;

    fn new_run(db: &Database) -> i64 {
        db.create_run(&NewRun {
            file_id: "f",
            file_path: "f.txt",
            report_format: ReportFormat::Inventory,
            submitter: Some("ops"),
        })
        .unwrap()
    }

    #[test]
    fn test_lifecycle_and_invalid_transition() {
        let db = Database::open_in_memory().unwrap();
        let tracker = StatusTracker::new(&db);
        let run_id = new_run(&db);

        tracker.set_status(run_id, RunStatus::Processing, None).unwrap();
        tracker.set_status(run_id, RunStatus::Completed, Some(json!({"rows": 2}))).unwrap();

        let run = db.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
        assert_eq!(run.details, Some(json!({"rows": 2})));

        let err = tracker.set_status(run_id, RunStatus::Processing, None).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_fail_stores_message() {
        let db = Database::open_in_memory().unwrap();
        let tracker = StatusTracker::new(&db);
        let run_id = new_run(&db);
        tracker.set_status(run_id, RunStatus::Processing, None).unwrap();
        tracker.fail(run_id, "boom").unwrap();

        let run = db.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_reopen_clears_failure() {
        let db = Database::open_in_memory().unwrap();
        let tracker = StatusTracker::new(&db);
        let run_id = new_run(&db);
        tracker.set_status(run_id, RunStatus::Processing, None).unwrap();
        tracker.set_status(run_id, RunStatus::DuplicateDetected, None).unwrap();
        tracker.set_status(run_id, RunStatus::Resolving, None).unwrap();
        tracker.fail(run_id, "cancelled").unwrap();

        tracker.reopen(run_id).unwrap();
        let run = db.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::DuplicateDetected);
        assert!(run.error_message.is_none());
        assert!(run.completed_at.is_none());

        tracker.set_status(run_id, RunStatus::Resolving, None).unwrap();
        tracker.set_status(run_id, RunStatus::Completed, None).unwrap();
        assert!(matches!(
            tracker.reopen(run_id).unwrap_err(),
            Error::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_progress_failure_is_swallowed() {
        let db = Database::open_in_memory().unwrap();
        let tracker = StatusTracker::new(&db);
        let run_id = new_run(&db);
        tracker.set_progress(run_id, 500, 1000);
        assert_eq!(db.get_run(run_id).unwrap().unwrap().progress_percent(), 50);

        db.connection()
            .execute_batch(
                "CREATE TRIGGER block_progress BEFORE UPDATE ON ingestion_run \
                 BEGIN SELECT RAISE(ABORT, 'read only'); END;",
            )
            .unwrap();
        tracker.set_progress(run_id, 1000, 1000);
        assert_eq!(db.get_run(run_id).unwrap().unwrap().processed_rows, 500);
    }

    #[test]
    fn test_unknown_run() {
        let db = Database::open_in_memory().unwrap();
        let err = StatusTracker::new(&db)
            .set_status(42, RunStatus::Processing, None)
            .unwrap_err();
        assert!(matches!(err, Error::RunNotFound(42)));
    }
}
