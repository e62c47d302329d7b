use crate::duplicates::detect::DuplicateReport;
use crate::duplicates::resolve::ResolutionMap;
use crate::reconcile::identifiers::{ChangeType, IdentifierType, Identifiers};
use crate::report::fields::FieldValue;
use crate::report::format::ReportFormat;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Processing,
    DuplicateDetected,
    Resolving,
    Completed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::DuplicateDetected => "duplicate_detected",
            RunStatus::Resolving => "resolving",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Error)
                | (Processing, DuplicateDetected)
                | (Processing, Completed)
                | (Processing, Error)
                | (DuplicateDetected, Resolving)
                | (DuplicateDetected, Error)
                | (Resolving, Completed)
                | (Resolving, Error)
                | (Error, DuplicateDetected)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "processing" => Ok(RunStatus::Processing),
            "duplicate_detected" => Ok(RunStatus::DuplicateDetected),
            "resolving" => Ok(RunStatus::Resolving),
            "completed" => Ok(RunStatus::Completed),
            "error" => Ok(RunStatus::Error),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Pending,
    Resolved,
    Error,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Pending => "pending",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Error => "error",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(IssueStatus::Pending),
            "resolved" => Ok(IssueStatus::Resolved),
            "error" => Ok(IssueStatus::Error),
            other => Err(format!("unknown issue status '{}'", other)),
        }
    }
}

/// Status-like enums are stored as their text form.
fn text_column<T: FromStr<Err = String>>(value: ValueRef<'_>) -> FromSqlResult<T> {
    let s = value.as_str()?;
    s.parse::<T>().map_err(|e| FromSqlError::Other(e.into()))
}

impl ToSql for RunStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RunStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for IssueStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for IssueStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for IdentifierType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for IdentifierType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for ChangeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChangeType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

impl ToSql for ReportFormat {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReportFormat {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value)
    }
}

/// One invocation of the ingestion pipeline for one file.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionRun {
    pub id: i64,
    pub file_id: String,
    pub file_path: String,
    pub report_format: ReportFormat,
    pub submitter: Option<String>,
    pub status: RunStatus,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub skipped_rows: i64,
    pub soft_errors: i64,
    pub identifier_changes: i64,
    pub details: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl IngestionRun {
    pub fn progress_percent(&self) -> i64 {
        if self.total_rows <= 0 {
            return 0;
        }
        (self.processed_rows as f64 / self.total_rows as f64 * 100.0).round() as i64
    }
}

/// Input for a fresh run row.
#[derive(Debug, Clone)]
pub struct NewRun<'a> {
    pub file_id: &'a str,
    pub file_path: &'a str,
    pub report_format: ReportFormat,
    pub submitter: Option<&'a str>,
}

/// Row counters written once the report has been read, and again on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub total_rows: i64,
    pub skipped_rows: i64,
    pub soft_errors: i64,
    pub identifier_changes: i64,
}

/// Catalog entry keyed by seller SKU. `fields` holds every non-null
/// allow-listed report column; identifiers mirror the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub id: i64,
    pub seller_sku: String,
    pub identifiers: Identifiers,
    pub fields: BTreeMap<String, FieldValue>,
    pub source_file_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Listing {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn title(&self) -> Option<&str> {
        self.field("item_name").and_then(FieldValue::as_text)
    }

    pub fn price(&self) -> Option<f64> {
        self.field("price").and_then(FieldValue::as_f64)
    }

    pub fn quantity(&self) -> Option<i64> {
        self.field("quantity").and_then(FieldValue::as_i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierSnapshot {
    pub id: i64,
    pub seller_sku: String,
    pub listing_id: Option<i64>,
    pub identifiers: Identifiers,
    pub updated_at: String,
}

/// One audit record. Never updated except for `acknowledged_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierChange {
    pub id: i64,
    pub seller_sku: String,
    pub identifier_type: IdentifierType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: ChangeType,
    pub run_id: i64,
    pub file_id: String,
    pub listing_id: Option<i64>,
    pub created_at: String,
    pub acknowledged_at: Option<String>,
}

/// An identifier change staged during a chunk, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIdentifierChange {
    pub seller_sku: String,
    pub identifier_type: IdentifierType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: ChangeType,
    pub listing_id: Option<i64>,
}

/// Filters for [`crate::storage::Database::list_identifier_changes`]. All optional.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    pub seller_sku: Option<String>,
    pub run_id: Option<i64>,
    pub identifier_type: Option<IdentifierType>,
    pub change_type: Option<ChangeType>,
    pub unacknowledged_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateIssue {
    pub id: i64,
    pub run_id: i64,
    pub file_id: String,
    pub conflicts: DuplicateReport,
    pub duplicate_rows: i64,
    pub status: IssueStatus,
    pub resolution: Option<ResolutionMap>,
    pub notes: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub resolved_at: Option<String>,
}
