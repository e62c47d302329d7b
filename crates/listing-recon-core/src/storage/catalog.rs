use super::models::*;
use super::sqlite::Database;
use crate::reconcile::identifiers::Identifiers;
use crate::report::fields::{plain_listing_fields, FieldKind, FieldValue};
use crate::report::reader::ReportRow;
use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Result, Row};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// SQL built once from the field allow-list. Row contents never change its shape.
struct ListingSql {
    select: String,
    upsert: String,
}

fn listing_sql() -> &'static ListingSql {
    static SQL: OnceLock<ListingSql> = OnceLock::new();
    SQL.get_or_init(|| {
        let fields: Vec<&str> = plain_listing_fields().map(|f| f.name).collect();

        let select = format!(
            "SELECT id, seller_sku, asin, upc, ean, fnsku, source_file_id, created_at, updated_at, {} \
             FROM listing",
            fields.join(", ")
        );

        // ?1 sku, ?2.. plain fields, then asin, upc, ean, fnsku, source_file_id, timestamp.
        let n = fields.len();
        let placeholders: Vec<String> = (2..=n + 1).map(|i| format!("?{}", i)).collect();
        let tail = n + 2;
        let coalesce: Vec<String> = fields
            .iter()
            .map(|f| format!("{f} = COALESCE(excluded.{f}, listing.{f})"))
            .collect();
        let upsert = format!(
            "INSERT INTO listing (seller_sku, {fields}, asin, upc, ean, fnsku, source_file_id, \
                 created_at, updated_at) \
             VALUES (?1, {placeholders}, ?{a}, ?{u}, ?{e}, ?{f}, ?{s}, ?{t}, ?{t}) \
             ON CONFLICT(seller_sku) DO UPDATE SET {coalesce}, \
                 asin = excluded.asin, upc = excluded.upc, ean = excluded.ean, \
                 fnsku = excluded.fnsku, source_file_id = excluded.source_file_id, \
                 updated_at = excluded.updated_at",
            fields = fields.join(", "),
            placeholders = placeholders.join(", "),
            a = tail,
            u = tail + 1,
            e = tail + 2,
            f = tail + 3,
            s = tail + 4,
            t = tail + 5,
            coalesce = coalesce.join(", "),
        );

        ListingSql { select, upsert }
    })
}

fn map_listing(row: &Row<'_>) -> Result<Listing> {
    let mut fields = BTreeMap::new();
    for (offset, spec) in plain_listing_fields().enumerate() {
        let value = match row.get_ref(9 + offset)? {
            ValueRef::Null => continue,
            ValueRef::Integer(v) if spec.kind == FieldKind::Flag => FieldValue::Flag(v != 0),
            ValueRef::Integer(v) => FieldValue::Integer(v),
            ValueRef::Real(v) => FieldValue::Float(v),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                FieldValue::Text(String::from_utf8_lossy(t).into_owned())
            }
        };
        fields.insert(spec.name.to_string(), value);
    }

    Ok(Listing {
        id: row.get(0)?,
        seller_sku: row.get(1)?,
        identifiers: Identifiers {
            asin: row.get(2)?,
            upc: row.get(3)?,
            ean: row.get(4)?,
            fnsku: row.get(5)?,
        },
        fields,
        source_file_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_snapshot(row: &Row<'_>) -> Result<IdentifierSnapshot> {
    Ok(IdentifierSnapshot {
        id: row.get(0)?,
        seller_sku: row.get(1)?,
        listing_id: row.get(2)?,
        identifiers: Identifiers {
            asin: row.get(3)?,
            upc: row.get(4)?,
            ean: row.get(5)?,
            fnsku: row.get(6)?,
        },
        updated_at: row.get(7)?,
    })
}

fn map_change(row: &Row<'_>) -> Result<IdentifierChange> {
    Ok(IdentifierChange {
        id: row.get(0)?,
        seller_sku: row.get(1)?,
        identifier_type: row.get(2)?,
        old_value: row.get(3)?,
        new_value: row.get(4)?,
        change_type: row.get(5)?,
        run_id: row.get(6)?,
        file_id: row.get(7)?,
        listing_id: row.get(8)?,
        created_at: row.get(9)?,
        acknowledged_at: row.get(10)?,
    })
}

const SNAPSHOT_SELECT: &str =
    "SELECT id, seller_sku, listing_id, asin, upc, ean, fnsku, updated_at FROM identifier_snapshot";

const CHANGE_SELECT: &str = "SELECT id, seller_sku, identifier_type, old_value, new_value, \
     change_type, run_id, file_id, listing_id, created_at, acknowledged_at FROM identifier_change";

// ── Chunk-scoped writes ──────────────────────────────────────────
//
// These take a bare connection so they run inside the caller's transaction.

/// The SKU's current identifiers and whether a snapshot exists at all.
pub fn load_snapshot(conn: &Connection, seller_sku: &str) -> Result<Option<Identifiers>> {
    let mut stmt = conn.prepare_cached(
        "SELECT asin, upc, ean, fnsku FROM identifier_snapshot WHERE seller_sku = ?1",
    )?;
    let mut rows = stmt.query(params![seller_sku])?;
    match rows.next()? {
        Some(row) => Ok(Some(Identifiers {
            asin: row.get(0)?,
            upc: row.get(1)?,
            ean: row.get(2)?,
            fnsku: row.get(3)?,
        })),
        None => Ok(None),
    }
}

/// Insert or update the listing for `row`; returns the listing id.
pub fn upsert_listing(
    conn: &Connection,
    row: &ReportRow,
    identifiers: &Identifiers,
    source_file_id: &str,
    timestamp: &str,
) -> Result<i64> {
    let field_values: Vec<Option<&FieldValue>> = plain_listing_fields()
        .map(|spec| row.values.get(spec.name))
        .collect();

    let mut values: Vec<&dyn ToSql> = Vec::with_capacity(field_values.len() + 7);
    values.push(&row.seller_sku);
    for value in &field_values {
        values.push(value);
    }
    values.push(&identifiers.asin);
    values.push(&identifiers.upc);
    values.push(&identifiers.ean);
    values.push(&identifiers.fnsku);
    values.push(&source_file_id);
    values.push(&timestamp);

    let mut stmt = conn.prepare_cached(&listing_sql().upsert)?;
    stmt.execute(params_from_iter(values))?;

    conn.query_row(
        "SELECT id FROM listing WHERE seller_sku = ?1",
        params![row.seller_sku],
        |r| r.get(0),
    )
}

pub fn upsert_snapshot(
    conn: &Connection,
    seller_sku: &str,
    listing_id: i64,
    identifiers: &Identifiers,
    timestamp: &str,
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO identifier_snapshot (seller_sku, listing_id, asin, upc, ean, fnsku, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(seller_sku) DO UPDATE SET \
             listing_id = excluded.listing_id, \
             asin = excluded.asin, \
             upc = excluded.upc, \
             ean = excluded.ean, \
             fnsku = excluded.fnsku, \
             updated_at = excluded.updated_at",
    )?;
    stmt.execute(params![
        seller_sku,
        listing_id,
        identifiers.asin,
        identifiers.upc,
        identifiers.ean,
        identifiers.fnsku,
        timestamp
    ])?;
    Ok(())
}

pub fn insert_identifier_changes(
    conn: &Connection,
    run_id: i64,
    file_id: &str,
    changes: &[NewIdentifierChange],
    timestamp: &str,
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO identifier_change \
         (seller_sku, identifier_type, old_value, new_value, change_type, run_id, file_id, \
          listing_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    let mut count = 0;
    for change in changes {
        count += stmt.execute(params![
            change.seller_sku,
            change.identifier_type,
            change.old_value,
            change.new_value,
            change.change_type,
            run_id,
            file_id,
            change.listing_id,
            timestamp
        ])?;
    }
    Ok(count)
}

impl Database {
    // ── Listings ─────────────────────────────────────────────────

    pub fn get_listing(&self, seller_sku: &str) -> Result<Option<Listing>> {
        self.query_opt(
            &format!("{} WHERE seller_sku = ?1", listing_sql().select),
            params![seller_sku],
            map_listing,
        )
    }

    /// Batch lookup. Unknown SKUs are simply missing from the result.
    pub fn get_listings_by_skus(&self, skus: &[String]) -> crate::Result<Vec<Listing>> {
        let sku_json = serde_json::to_string(skus)?;
        let listings = self.query_all(
            &format!(
                "{} WHERE seller_sku IN (SELECT value FROM json_each(?1)) ORDER BY seller_sku",
                listing_sql().select
            ),
            params![sku_json],
            map_listing,
        )?;
        Ok(listings)
    }

    pub fn count_listings(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM listing", [], |row| row.get(0))
    }

    // ── Identifiers ──────────────────────────────────────────────

    pub fn get_identifier_snapshot(&self, seller_sku: &str) -> Result<Option<IdentifierSnapshot>> {
        self.query_opt(
            &format!("{} WHERE seller_sku = ?1", SNAPSHOT_SELECT),
            params![seller_sku],
            map_snapshot,
        )
    }

    pub fn list_identifier_changes(&self, filter: &ChangeFilter) -> Result<Vec<IdentifierChange>> {
        self.query_all(
            &format!(
                "{} WHERE (?1 IS NULL OR seller_sku = ?1) \
                   AND (?2 IS NULL OR run_id = ?2) \
                   AND (?3 IS NULL OR identifier_type = ?3) \
                   AND (?4 IS NULL OR change_type = ?4) \
                   AND (?5 = 0 OR acknowledged_at IS NULL) \
                 ORDER BY id LIMIT ?6",
                CHANGE_SELECT
            ),
            params![
                filter.seller_sku,
                filter.run_id,
                filter.identifier_type,
                filter.change_type,
                filter.unacknowledged_only,
                filter.limit.unwrap_or(-1)
            ],
            map_change,
        )
    }

    /// Stamp `acknowledged_at` on the given changes. Already acknowledged
    /// records are left alone; returns how many were stamped.
    pub fn acknowledge_identifier_changes(&self, ids: &[i64]) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE identifier_change SET acknowledged_at = ?1 \
                 WHERE id = ?2 AND acknowledged_at IS NULL",
            )?;
            for id in ids {
                count += stmt.execute(params![now, id])?;
            }
        }
        tx.commit()?;
        debug!("Acknowledged {} identifier changes", count);
        Ok(count)
    }
}
