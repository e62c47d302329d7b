use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

use listing_recon_core::report::writer::resolved_export_path;
use listing_recon_core::storage::models::{IssueStatus, RunStatus};
use listing_recon_core::storage::Database;
use listing_recon_core::{
    AppConfig, Error, IngestEngine, IngestOutcome, IngestRequest, ProgressReporter, Resolution,
    SilentReporter,
};

/// Rows 0/2/4 share SKU `A`, rows 1/3 share `C`, `B` is unique.
const REPORT: &str = "seller-sku\titem-name\tasin1\tprice\tquantity\n\
A\tA first\tB0A0\t10.00\t1\n\
C\tC first\tB0C1\t5.00\t2\n\
A\tA second\tB0A2\t\t3\n\
C\tC second\tB0C3\t6.00\t4\n\
A\tA third\tB0A4\t12.00\t5\n\
B\tB only\tB0B5\t7.00\t6\n";

struct Parked {
    _tmp: TempDir,
    path: PathBuf,
    db: Database,
    engine: IngestEngine,
    run_id: i64,
    issue_id: i64,
}

fn park(config: AppConfig) -> Parked {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("listings.txt");
    fs::write(&path, REPORT).unwrap();
    let db = Database::open_in_memory().unwrap();
    let engine = IngestEngine::new(config);
    let outcome = engine
        .ingest(&db, &IngestRequest::new(&path, "dupes"), &SilentReporter)
        .unwrap();
    let IngestOutcome::DuplicatesDetected { run_id, issue_id, .. } = outcome else {
        panic!("expected the run to park on duplicates");
    };
    Parked {
        _tmp: tmp,
        path,
        db,
        engine,
        run_id,
        issue_id,
    }
}

fn resolve(p: &Parked, json: &str) -> listing_recon_core::Result<IngestOutcome> {
    p.engine.resolve(
        &p.db,
        p.issue_id,
        &Resolution::from_json(json).unwrap(),
        &SilentReporter,
    )
}

fn statuses(p: &Parked) -> (IssueStatus, RunStatus) {
    (
        p.db.get_duplicate_issue(p.issue_id).unwrap().unwrap().status,
        p.db.get_run(p.run_id).unwrap().unwrap().status,
    )
}

#[test]
fn test_incomplete_resolution_is_rejected_without_state_change() {
    let p = park(AppConfig::default());

    let err = resolve(&p, r#"{"A": {"resolution_type": "keep_newest"}}"#).unwrap_err();
    assert!(matches!(err, Error::IncompleteResolution(ref skus) if skus == &vec!["C".to_string()]));
    assert_eq!(statuses(&p), (IssueStatus::Pending, RunStatus::DuplicateDetected));
    assert_eq!(p.db.count_listings().unwrap(), 0);

    // The issue can still be resolved afterwards.
    let outcome = resolve(
        &p,
        r#"{"A": {"resolution_type": "keep_newest"}, "C": {"resolution_type": "keep_newest"}}"#,
    )
    .unwrap();
    assert!(matches!(outcome, IngestOutcome::Completed(_)));
    assert_eq!(statuses(&p), (IssueStatus::Resolved, RunStatus::Completed));
}

#[test]
fn test_contradictory_resolution_fails_issue_and_run() {
    let p = park(AppConfig::default());

    let err = resolve(
        &p,
        r#"{"A": {"resolution_type": "keep_one", "row_index": 1},
            "C": {"resolution_type": "remove_all"}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidResolution { ref sku, .. } if sku == "A"));
    assert_eq!(statuses(&p), (IssueStatus::Error, RunStatus::Error));
    assert_eq!(p.db.count_listings().unwrap(), 0);

    let issue = p.db.get_duplicate_issue(p.issue_id).unwrap().unwrap();
    assert!(issue.error_message.unwrap().contains("row 1"));

    let err = resolve(&p, r#"{"A": {"resolution_type": "remove_all"}, "C": {"resolution_type": "remove_all"}}"#)
        .unwrap_err();
    assert!(matches!(err, Error::IssueNotPending { .. }));
}

#[test]
fn test_rename_collision_fails_issue_and_run() {
    let p = park(AppConfig::default());

    let err = resolve(
        &p,
        r#"{"A": {"resolution_type": "rename", "renames": [
                {"row_index": 2, "new_sku": "A-2"},
                {"row_index": 4, "new_sku": "B"}]},
            "C": {"resolution_type": "keep_newest"}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnresolvedDuplicates(ref skus) if skus == &vec!["B".to_string()]));
    assert_eq!(statuses(&p), (IssueStatus::Error, RunStatus::Error));
    assert_eq!(p.db.count_listings().unwrap(), 0);
}

#[test]
fn test_mixed_strategies_load_expected_rows() {
    let p = park(AppConfig::default());

    let outcome = resolve(
        &p,
        r#"{"A": {"resolution_type": "merge", "field_selections": {"item-name": 2, "price": 2, "asin": 4}},
            "C": {"resolution_type": "keep_one", "row_index": 1}}"#,
    )
    .unwrap();
    let IngestOutcome::Completed(summary) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(summary.processed_rows, 3);

    let a = p.db.get_listing("A").unwrap().unwrap();
    assert_eq!(a.title(), Some("A second"));
    // Row 2 has no price, so the merged row has none either.
    assert_eq!(a.price(), None);
    assert_eq!(a.quantity(), Some(1));
    assert_eq!(a.identifiers.asin.as_deref(), Some("B0A4"));

    let c = p.db.get_listing("C").unwrap().unwrap();
    assert_eq!(c.title(), Some("C first"));
    assert!(p.db.get_listing("B").unwrap().is_some());
    assert_eq!(statuses(&p), (IssueStatus::Resolved, RunStatus::Completed));
}

#[test]
fn test_remove_all_and_rename() {
    let p = park(AppConfig::default());

    resolve(
        &p,
        r#"{"A": {"resolution_type": "remove_all"},
            "C": {"resolution_type": "rename", "renames": [{"row_index": 3, "new_sku": "C-v2"}]}}"#,
    )
    .unwrap();

    assert!(p.db.get_listing("A").unwrap().is_none());
    assert!(p.db.get_identifier_snapshot("A").unwrap().is_none());
    assert_eq!(p.db.get_listing("C").unwrap().unwrap().title(), Some("C first"));
    assert_eq!(p.db.get_listing("C-v2").unwrap().unwrap().title(), Some("C second"));
    assert_eq!(p.db.count_listings().unwrap(), 3);
}

#[test]
fn test_resolved_rows_are_exported_when_enabled() {
    let p = park(AppConfig {
        export_resolved: true,
        ..AppConfig::default()
    });
    resolve(
        &p,
        r#"{"A": {"resolution_type": "keep_one", "row_index": 0},
            "C": {"resolution_type": "keep_newest"}}"#,
    )
    .unwrap();

    let export = resolved_export_path(&p.path);
    assert_eq!(export.file_name().unwrap(), "listings_resolved.txt");
    let content = fs::read_to_string(&export).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("seller_sku\t"));
    assert!(lines[1].starts_with("A\t"));
    assert!(lines[2].starts_with("C\t") && lines[2].contains("C second"));
    assert!(lines[3].starts_with("B\t"));
}

#[test]
fn test_export_disabled_by_default() {
    let p = park(AppConfig::default());
    resolve(
        &p,
        r#"{"A": {"resolution_type": "keep_newest"}, "C": {"resolution_type": "keep_newest"}}"#,
    )
    .unwrap();
    assert!(!resolved_export_path(Path::new(&p.path)).exists());
}

#[test]
fn test_empty_merge_fails_issue_and_run() {
    let p = park(AppConfig::default());

    let err = resolve(
        &p,
        r#"{"A": {"resolution_type": "merge", "field_selections": {}},
            "C": {"resolution_type": "keep_newest"}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidResolution { ref sku, .. } if sku == "A"));
    assert_eq!(statuses(&p), (IssueStatus::Error, RunStatus::Error));
    assert_eq!(p.db.count_listings().unwrap(), 0);
}

struct CancelAfterChunk {
    token: Arc<AtomicBool>,
}

impl ProgressReporter for CancelAfterChunk {
    fn on_chunk_committed(&self, _processed: usize, _total: usize) {
        self.token.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_cancelled_resolution_keeps_issue_open_for_retry() {
    let p = park(AppConfig {
        chunk_size: 1,
        ..AppConfig::default()
    });
    let json = r#"{"A": {"resolution_type": "keep_newest"}, "C": {"resolution_type": "keep_newest"}}"#;
    let reporter = CancelAfterChunk {
        token: p.engine.cancel_token(),
    };

    let err = p
        .engine
        .resolve(&p.db, p.issue_id, &Resolution::from_json(json).unwrap(), &reporter)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(statuses(&p), (IssueStatus::Pending, RunStatus::Error));
    assert_eq!(
        p.db.get_run(p.run_id).unwrap().unwrap().error_message.as_deref(),
        Some("cancelled")
    );
    assert_eq!(p.db.count_listings().unwrap(), 1);
    assert!(p.db.get_duplicate_issue(p.issue_id).unwrap().unwrap().resolution.is_none());

    // Same engine, flag still raised from the cancelled attempt.
    let outcome = resolve(&p, json).unwrap();
    let IngestOutcome::Completed(summary) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(summary.run_id, p.run_id);
    assert_eq!(summary.processed_rows, 3);
    assert_eq!(statuses(&p), (IssueStatus::Resolved, RunStatus::Completed));
    assert_eq!(p.db.count_listings().unwrap(), 3);
    assert_eq!(p.db.get_listing("C").unwrap().unwrap().title(), Some("C second"));

    let run = p.db.get_run(p.run_id).unwrap().unwrap();
    assert!(run.error_message.is_none());
    assert!(run.completed_at.is_some());
}

#[test]
fn test_unknown_issue() {
    let p = park(AppConfig::default());
    let err = p
        .engine
        .resolve(&p.db, 9999, &Resolution::default(), &SilentReporter)
        .unwrap_err();
    assert!(matches!(err, Error::IssueNotFound(9999)));
}
