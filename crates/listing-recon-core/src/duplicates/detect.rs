use crate::report::format::{FormatProfile, ProductIdKind};
use crate::report::reader::ReportRow;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The comparable fields of one row in a duplicate group, as shown to
/// whoever resolves the conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRow {
    pub row_index: usize,
    pub asin: Option<String>,
    pub upc: Option<String>,
    pub ean: Option<String>,
    pub fnsku: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub condition: Option<String>,
    pub title: Option<String>,
}

impl ConflictRow {
    pub fn from_row(row: &ReportRow, profile: &FormatProfile) -> Self {
        let (upc, ean) = product_identifiers(row, profile);
        Self {
            row_index: row.row_index,
            asin: row.text("asin").map(str::to_string),
            upc,
            ean,
            fnsku: row.text("fnsku").map(str::to_string),
            price: row.get("price").and_then(|v| v.as_f64()),
            quantity: row.get("quantity").and_then(|v| v.as_i64()),
            condition: row.text("item_condition").map(str::to_string),
            title: row.text("item_name").map(str::to_string),
        }
    }
}

/// Split `product_id` into (UPC, EAN) according to the row's type code.
pub fn product_identifiers(
    row: &ReportRow,
    profile: &FormatProfile,
) -> (Option<String>, Option<String>) {
    let kind = row
        .text("product_id_type")
        .and_then(|code| profile.product_id_kind(code));
    let id = row.text("product_id").map(str::to_string);
    match kind {
        Some(ProductIdKind::Upc) => (id, None),
        Some(ProductIdKind::Ean) => (None, id),
        None => (None, None),
    }
}

/// SKU → conflicting rows in original file order. SKU keys are sorted.
pub type DuplicateReport = BTreeMap<String, Vec<ConflictRow>>;

/// Group rows by seller SKU and keep only the SKUs seen more than once.
pub fn detect_duplicates(rows: &[ReportRow], profile: &FormatProfile) -> DuplicateReport {
    let mut by_sku: AHashMap<&str, Vec<&ReportRow>> = AHashMap::new();
    for row in rows {
        by_sku.entry(row.seller_sku.as_str()).or_default().push(row);
    }

    by_sku
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(sku, group)| {
            let conflicts = group
                .into_iter()
                .map(|row| ConflictRow::from_row(row, profile))
                .collect();
            (sku.to_string(), conflicts)
        })
        .collect()
}

/// Total number of rows involved across all duplicate groups.
pub fn duplicate_row_count(report: &DuplicateReport) -> usize {
    report.values().map(Vec::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fields::FieldValue;
    use crate::report::format::ReportFormat;

    fn row(index: usize, sku: &str, fields: &[(&'static str, FieldValue)]) -> ReportRow {
        ReportRow {
            row_index: index,
            seller_sku: sku.to_string(),
            values: fields.iter().cloned().collect(),
        }
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn test_no_duplicates() {
        let profile = FormatProfile::for_format(ReportFormat::AllListings);
        let rows = vec![row(0, "A", &[]), row(1, "B", &[])];
        assert!(detect_duplicates(&rows, &profile).is_empty());
    }

    #[test]
    fn test_groups_preserve_file_order() {
        let profile = FormatProfile::for_format(ReportFormat::AllListings);
        let rows = vec![
            row(0, "Z", &[("asin", text("Z0"))]),
            row(1, "A", &[("asin", text("A1"))]),
            row(2, "B", &[]),
            row(3, "Z", &[("asin", text("Z3"))]),
            row(4, "A", &[("asin", text("A4"))]),
            row(5, "Z", &[]),
        ];

        for _ in 0..5 {
            let report = detect_duplicates(&rows, &profile);
            assert_eq!(report.keys().collect::<Vec<_>>(), vec!["A", "Z"]);
            let z: Vec<usize> = report["Z"].iter().map(|c| c.row_index).collect();
            assert_eq!(z, vec![0, 3, 5]);
            let a: Vec<usize> = report["A"].iter().map(|c| c.row_index).collect();
            assert_eq!(a, vec![1, 4]);
            assert_eq!(duplicate_row_count(&report), 5);
        }
    }

    #[test]
    fn test_product_id_split_follows_format_codes() {
        let r = row(
            0,
            "A",
            &[("product_id", text("0123")), ("product_id_type", text("2"))],
        );
        let inventory = FormatProfile::for_format(ReportFormat::Inventory);
        assert_eq!(product_identifiers(&r, &inventory), (None, Some("0123".into())));

        let all = FormatProfile::for_format(ReportFormat::AllListings);
        assert_eq!(product_identifiers(&r, &all), (None, None));
    }

    #[test]
    fn test_conflict_row_fields() {
        let profile = FormatProfile::for_format(ReportFormat::AllListings);
        let r = row(
            7,
            "A",
            &[
                ("asin", text("B000")),
                ("product_id", text("111")),
                ("product_id_type", text("3")),
                ("price", FieldValue::Float(9.5)),
                ("quantity", FieldValue::Integer(4)),
                ("item_condition", text("New")),
                ("item_name", text("Widget")),
            ],
        );
        let c = ConflictRow::from_row(&r, &profile);
        assert_eq!(c.row_index, 7);
        assert_eq!(c.asin.as_deref(), Some("B000"));
        assert_eq!(c.upc.as_deref(), Some("111"));
        assert_eq!(c.ean, None);
        assert_eq!(c.fnsku, None);
        assert_eq!(c.price, Some(9.5));
        assert_eq!(c.quantity, Some(4));
        assert_eq!(c.condition.as_deref(), Some("New"));
        assert_eq!(c.title.as_deref(), Some("Widget"));
    }
}
