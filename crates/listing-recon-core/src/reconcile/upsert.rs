use super::identifiers::{reconcile, ClearedIdentifierPolicy, ObservedIdentifiers};
use crate::error::Result;
use crate::report::format::FormatProfile;
use crate::report::reader::{ColumnSet, ReportRow};
use crate::storage::catalog;
use crate::storage::models::NewIdentifierChange;
use crate::storage::Database;
use tracing::debug;

/// Everything a chunk needs besides its rows.
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    pub run_id: i64,
    pub file_id: &'a str,
    pub profile: &'a FormatProfile,
    pub columns: &'a ColumnSet,
    pub policy: ClearedIdentifierPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    pub identifier_changes: usize,
}

/// Reconcile and upsert one chunk in a single transaction. Identifier
/// changes are staged while rows are written and inserted just before
/// commit; an error anywhere leaves the chunk with no visible effect.
pub fn upsert_chunk(db: &Database, ctx: &ChunkContext<'_>, rows: &[ReportRow]) -> Result<ChunkOutcome> {
    let timestamp = chrono::Utc::now().to_rfc3339();

    db.in_transaction(|tx| -> Result<ChunkOutcome> {
        let mut outcome = ChunkOutcome {
            rows: rows.len(),
            ..Default::default()
        };
        let mut staged: Vec<NewIdentifierChange> = Vec::new();

        for row in rows {
            let stored = catalog::load_snapshot(tx, &row.seller_sku)?;
            match stored {
                Some(_) => outcome.updated += 1,
                None => outcome.created += 1,
            }
            let stored = stored.unwrap_or_default();

            let observed = ObservedIdentifiers::from_row(row, ctx.columns, ctx.profile);
            let (current, diffs) = reconcile(&stored, &observed, ctx.policy);

            let listing_id =
                catalog::upsert_listing(tx, row, &current, ctx.file_id, &timestamp)?;
            catalog::upsert_snapshot(tx, &row.seller_sku, listing_id, &current, &timestamp)?;

            staged.extend(diffs.into_iter().map(|diff| NewIdentifierChange {
                seller_sku: row.seller_sku.clone(),
                identifier_type: diff.identifier_type,
                old_value: diff.old_value,
                new_value: diff.new_value,
                change_type: diff.change_type,
                listing_id: Some(listing_id),
            }));
        }

        outcome.identifier_changes =
            catalog::insert_identifier_changes(tx, ctx.run_id, ctx.file_id, &staged, &timestamp)?;
        debug!(
            "Chunk for run {}: {} rows ({} new, {} updated), {} identifier changes",
            ctx.run_id, outcome.rows, outcome.created, outcome.updated, outcome.identifier_changes
        );
        Ok(outcome)
    })
}
