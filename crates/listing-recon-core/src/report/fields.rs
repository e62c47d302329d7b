use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical name of the primary key column.
pub const SELLER_SKU: &str = "seller_sku";

/// Header names (already normalized) accepted for the seller SKU, in priority order.
pub const SELLER_SKU_ALIASES: &[&str] = &["seller_sku", "sku"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// ASIN / FNSKU: stored as text, reconciled through the identifier snapshot.
    Identifier,
    Price,
    Quantity,
    Flag,
    Date,
}

/// One allow-listed report field. `name` is both the canonical field name and
/// the `listing` column it is persisted to.
#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub aliases: &'static [&'static str],
}

const fn field(name: &'static str, kind: FieldKind, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        aliases,
    }
}

/// Schema version 1 of the report → listing mapping. Columns outside this
/// list are ignored by the normalizer and never reach SQL.
pub const LISTING_FIELDS: &[FieldSpec] = &[
    field("item_name", FieldKind::Text, &["item_name", "product_name"]),
    field("item_description", FieldKind::Text, &["item_description"]),
    field("listing_id", FieldKind::Text, &["listing_id"]),
    field("price", FieldKind::Price, &["price", "your_price"]),
    field("quantity", FieldKind::Quantity, &["quantity"]),
    field("open_date", FieldKind::Date, &["open_date"]),
    field("image_url", FieldKind::Text, &["image_url"]),
    field("item_is_marketplace", FieldKind::Flag, &["item_is_marketplace"]),
    field("product_id_type", FieldKind::Text, &["product_id_type"]),
    field("item_note", FieldKind::Text, &["item_note"]),
    field("item_condition", FieldKind::Text, &["item_condition", "condition"]),
    field("asin", FieldKind::Identifier, &["asin1", "asin"]),
    field("product_id", FieldKind::Text, &["product_id"]),
    field("will_ship_internationally", FieldKind::Flag, &["will_ship_internationally"]),
    field("expedited_shipping", FieldKind::Flag, &["expedited_shipping"]),
    field("zshop_boldface", FieldKind::Flag, &["zshop_boldface"]),
    field("pending_quantity", FieldKind::Quantity, &["pending_quantity"]),
    field("fulfillment_channel", FieldKind::Text, &["fulfillment_channel"]),
    field("merchant_shipping_group", FieldKind::Text, &["merchant_shipping_group"]),
    field("status", FieldKind::Text, &["status"]),
    field("fnsku", FieldKind::Identifier, &["fnsku"]),
    field("afn_warehouse_quantity", FieldKind::Quantity, &["afn_warehouse_quantity"]),
    field("afn_fulfillable_quantity", FieldKind::Quantity, &["afn_fulfillable_quantity"]),
    field("afn_unsellable_quantity", FieldKind::Quantity, &["afn_unsellable_quantity"]),
    field("afn_reserved_quantity", FieldKind::Quantity, &["afn_reserved_quantity"]),
    field("afn_total_quantity", FieldKind::Quantity, &["afn_total_quantity"]),
];

pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    LISTING_FIELDS.iter().find(|spec| spec.name == name)
}

/// Listing columns written through the generic `COALESCE` upsert, i.e. every
/// allow-listed field except the identifiers, which follow the snapshot.
pub fn plain_listing_fields() -> impl Iterator<Item = &'static FieldSpec> {
    LISTING_FIELDS
        .iter()
        .filter(|spec| spec.kind != FieldKind::Identifier)
}

/// Normalize a raw header cell: strip BOM, trim, lowercase, and collapse runs
/// of whitespace and hyphens into a single `_`.
pub fn canonical_column_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim_start_matches('\u{feff}').trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.extend(ch.to_lowercase());
    }
    out
}

/// A coerced report value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(true) => f.write_str("Y"),
            FieldValue::Flag(false) => f.write_str("N"),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            FieldValue::Flag(v) => v.to_sql(),
            FieldValue::Integer(v) => v.to_sql(),
            FieldValue::Float(v) => v.to_sql(),
            FieldValue::Text(s) => s.to_sql(),
        }
    }
}
