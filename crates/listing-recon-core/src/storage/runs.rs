use super::models::*;
use super::sqlite::Database;
use crate::duplicates::detect::{duplicate_row_count, DuplicateReport};
use rusqlite::{params, Result, Row};
use tracing::debug;

const RUN_COLUMNS: &str = "id, file_id, file_path, report_format, submitter, status, total_rows, \
     processed_rows, skipped_rows, soft_errors, identifier_changes, details, error_message, \
     created_at, updated_at, completed_at";

const ISSUE_COLUMNS: &str = "id, run_id, file_id, conflicts, duplicate_rows, status, resolution, \
     notes, error_message, created_at, updated_at, resolved_at";

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn optional_json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => json_column(row, idx).map(Some),
        None => Ok(None),
    }
}

fn map_run(row: &Row<'_>) -> Result<IngestionRun> {
    Ok(IngestionRun {
        id: row.get(0)?,
        file_id: row.get(1)?,
        file_path: row.get(2)?,
        report_format: row.get(3)?,
        submitter: row.get(4)?,
        status: row.get(5)?,
        total_rows: row.get(6)?,
        processed_rows: row.get(7)?,
        skipped_rows: row.get(8)?,
        soft_errors: row.get(9)?,
        identifier_changes: row.get(10)?,
        details: optional_json_column(row, 11)?,
        error_message: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        completed_at: row.get(15)?,
    })
}

fn map_issue(row: &Row<'_>) -> Result<DuplicateIssue> {
    Ok(DuplicateIssue {
        id: row.get(0)?,
        run_id: row.get(1)?,
        file_id: row.get(2)?,
        conflicts: json_column(row, 3)?,
        duplicate_rows: row.get(4)?,
        status: row.get(5)?,
        resolution: optional_json_column(row, 6)?,
        notes: row.get(7)?,
        error_message: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        resolved_at: row.get(11)?,
    })
}

impl Database {
    // ── Ingestion Runs ───────────────────────────────────────────

    pub fn create_run(&self, run: &NewRun<'_>) -> Result<i64> {
        let now = now();
        self.connection().execute(
            "INSERT INTO ingestion_run \
             (file_id, file_path, report_format, submitter, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
            params![run.file_id, run.file_path, run.report_format, run.submitter, now],
        )?;
        let id = self.connection().last_insert_rowid();
        debug!("Created ingestion run {} for file {}", id, run.file_id);
        Ok(id)
    }

    /// Write a status unconditionally. Transition rules live in the tracker.
    pub fn update_run_status(
        &self,
        run_id: i64,
        status: RunStatus,
        details: Option<&serde_json::Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = now();
        let completed_at = status.is_terminal().then(|| now.clone());
        let details = details.map(|d| d.to_string());
        let updated = self.connection().execute(
            "UPDATE ingestion_run SET status = ?1, \
                 details = COALESCE(?2, details), \
                 error_message = COALESCE(?3, error_message), \
                 completed_at = COALESCE(?4, completed_at), \
                 updated_at = ?5 \
             WHERE id = ?6",
            params![status, details, error_message, completed_at, now, run_id],
        )?;
        if updated == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Ok(())
    }

    /// Send a failed run back to `duplicate_detected`, dropping its error
    /// detail and completion time.
    pub fn reopen_run(&self, run_id: i64) -> Result<()> {
        let updated = self.connection().execute(
            "UPDATE ingestion_run SET status = ?1, error_message = NULL, completed_at = NULL, \
                 updated_at = ?2 \
             WHERE id = ?3",
            params![RunStatus::DuplicateDetected, now(), run_id],
        )?;
        if updated == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Ok(())
    }

    pub fn update_run_progress(&self, run_id: i64, processed: i64, total: i64) -> Result<()> {
        self.connection().execute(
            "UPDATE ingestion_run SET processed_rows = ?1, total_rows = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![processed, total, now(), run_id],
        )?;
        Ok(())
    }

    pub fn update_run_counts(&self, run_id: i64, counts: &RunCounts) -> Result<()> {
        self.connection().execute(
            "UPDATE ingestion_run SET total_rows = ?1, skipped_rows = ?2, soft_errors = ?3, \
                 identifier_changes = ?4, updated_at = ?5 \
             WHERE id = ?6",
            params![
                counts.total_rows,
                counts.skipped_rows,
                counts.soft_errors,
                counts.identifier_changes,
                now(),
                run_id
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<IngestionRun>> {
        self.query_opt(
            &format!("SELECT {} FROM ingestion_run WHERE id = ?1", RUN_COLUMNS),
            params![run_id],
            map_run,
        )
    }

    pub fn get_latest_run_for_file(&self, file_id: &str) -> Result<Option<IngestionRun>> {
        self.query_opt(
            &format!(
                "SELECT {} FROM ingestion_run WHERE file_id = ?1 ORDER BY id DESC LIMIT 1",
                RUN_COLUMNS
            ),
            params![file_id],
            map_run,
        )
    }

    /// Runs newest-first.
    pub fn list_runs(&self, offset: i64, limit: i64) -> Result<Vec<IngestionRun>> {
        self.query_all(
            &format!(
                "SELECT {} FROM ingestion_run ORDER BY id DESC LIMIT ?1 OFFSET ?2",
                RUN_COLUMNS
            ),
            params![limit, offset],
            map_run,
        )
    }

    // ── Duplicate Issues ─────────────────────────────────────────

    pub fn insert_duplicate_issue(
        &self,
        run_id: i64,
        file_id: &str,
        conflicts: &DuplicateReport,
    ) -> crate::Result<i64> {
        let payload = serde_json::to_string(conflicts)?;
        let now = now();
        self.connection().execute(
            "INSERT INTO duplicate_issue \
             (run_id, file_id, conflicts, duplicate_rows, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
            params![
                run_id,
                file_id,
                payload,
                duplicate_row_count(conflicts) as i64,
                now
            ],
        )?;
        let id = self.connection().last_insert_rowid();
        debug!("Recorded duplicate issue {} ({} SKUs) for run {}", id, conflicts.len(), run_id);
        Ok(id)
    }

    pub fn get_duplicate_issue(&self, issue_id: i64) -> Result<Option<DuplicateIssue>> {
        self.query_opt(
            &format!("SELECT {} FROM duplicate_issue WHERE id = ?1", ISSUE_COLUMNS),
            params![issue_id],
            map_issue,
        )
    }

    pub fn get_issue_for_run(&self, run_id: i64) -> Result<Option<DuplicateIssue>> {
        self.query_opt(
            &format!("SELECT {} FROM duplicate_issue WHERE run_id = ?1", ISSUE_COLUMNS),
            params![run_id],
            map_issue,
        )
    }

    pub fn list_duplicate_issues(&self, status: Option<IssueStatus>) -> Result<Vec<DuplicateIssue>> {
        self.query_all(
            &format!(
                "SELECT {} FROM duplicate_issue WHERE (?1 IS NULL OR status = ?1) ORDER BY id",
                ISSUE_COLUMNS
            ),
            params![status],
            map_issue,
        )
    }

    pub fn mark_issue_resolved(
        &self,
        issue_id: i64,
        resolution_json: &str,
        notes: Option<&str>,
    ) -> Result<()> {
        let now = now();
        self.connection().execute(
            "UPDATE duplicate_issue SET status = 'resolved', resolution = ?1, notes = ?2, \
                 updated_at = ?3, resolved_at = ?3 \
             WHERE id = ?4",
            params![resolution_json, notes, now, issue_id],
        )?;
        Ok(())
    }

    pub fn mark_issue_error(
        &self,
        issue_id: i64,
        resolution_json: Option<&str>,
        message: &str,
    ) -> Result<()> {
        self.connection().execute(
            "UPDATE duplicate_issue SET status = 'error', resolution = COALESCE(?1, resolution), \
                 error_message = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![resolution_json, message, now(), issue_id],
        )?;
        Ok(())
    }
}
