use super::detect::{detect_duplicates, DuplicateReport};
use crate::error::{Error, Result};
use crate::report::fields::{canonical_column_name, field_spec};
use crate::report::format::FormatProfile;
use crate::report::reader::ReportRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRow {
    pub row_index: usize,
    pub new_sku: String,
}

/// How to settle one duplicated SKU. Serialized with a `resolution_type` tag,
/// e.g. `{"resolution_type": "keep_one", "row_index": 2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution_type", rename_all = "snake_case")]
pub enum Strategy {
    KeepOne { row_index: usize },
    /// Last row in file order wins. File order is assumed to be chronological.
    KeepNewest,
    /// Start from the group's first row, then take each listed field from the
    /// chosen row.
    Merge { field_selections: BTreeMap<String, usize> },
    RemoveAll,
    Rename { renames: Vec<RenameRow> },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::KeepOne { .. } => "keep_one",
            Strategy::KeepNewest => "keep_newest",
            Strategy::Merge { .. } => "merge",
            Strategy::RemoveAll => "remove_all",
            Strategy::Rename { .. } => "rename",
        }
    }
}

/// SKU → strategy.
pub type ResolutionMap = BTreeMap<String, Strategy>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub strategies: ResolutionMap,
    pub notes: Option<String>,
}

impl Resolution {
    pub fn new(strategies: ResolutionMap) -> Self {
        Self {
            strategies,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.strategies)?)
    }
}

/// Every SKU in the issue needs a strategy.
pub fn check_complete(conflicts: &DuplicateReport, resolution: &Resolution) -> Result<()> {
    let missing: Vec<String> = conflicts
        .keys()
        .filter(|sku| !resolution.strategies.contains_key(*sku))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::IncompleteResolution(missing))
    }
}

/// Check the mapping against the issue's conflict payload without touching
/// any rows. Incomplete mappings fail with [`Error::IncompleteResolution`];
/// anything contradictory fails with [`Error::InvalidResolution`].
pub fn validate_resolution(conflicts: &DuplicateReport, resolution: &Resolution) -> Result<()> {
    check_complete(conflicts, resolution)?;

    for (sku, strategy) in &resolution.strategies {
        let Some(group) = conflicts.get(sku) else {
            return Err(invalid(sku, "SKU is not part of this duplicate issue"));
        };
        let in_group = |index: usize| group.iter().any(|c| c.row_index == index);

        match strategy {
            Strategy::KeepOne { row_index } => {
                if !in_group(*row_index) {
                    return Err(invalid(sku, format!("row {} is not in the group", row_index)));
                }
            }
            Strategy::Merge { field_selections } => {
                if field_selections.is_empty() {
                    return Err(invalid(sku, "no merge fields selected"));
                }
                for (field, row_index) in field_selections {
                    if field_spec(&canonical_column_name(field)).is_none() {
                        return Err(invalid(sku, format!("unknown merge field '{}'", field)));
                    }
                    if !in_group(*row_index) {
                        return Err(invalid(sku, format!("row {} is not in the group", row_index)));
                    }
                }
            }
            Strategy::Rename { renames } => {
                for rename in renames {
                    if rename.new_sku.trim().is_empty() {
                        return Err(invalid(sku, format!("empty new SKU for row {}", rename.row_index)));
                    }
                    if !in_group(rename.row_index) {
                        return Err(invalid(
                            sku,
                            format!("row {} is not in the group", rename.row_index),
                        ));
                    }
                }
            }
            Strategy::KeepNewest | Strategy::RemoveAll => {}
        }
    }
    Ok(())
}

/// Apply the strategies to the full row set and re-check it. The result is in
/// file order; a merged row takes the position of its group's first row.
pub fn resolve_rows(
    rows: Vec<ReportRow>,
    resolution: &Resolution,
    profile: &FormatProfile,
) -> Result<Vec<ReportRow>> {
    let mut groups: BTreeMap<String, Vec<ReportRow>> = BTreeMap::new();
    let mut out: Vec<ReportRow> = Vec::with_capacity(rows.len());
    for row in rows {
        if resolution.strategies.contains_key(&row.seller_sku) {
            groups.entry(row.seller_sku.clone()).or_default().push(row);
        } else {
            out.push(row);
        }
    }

    for (sku, strategy) in &resolution.strategies {
        let group = groups.remove(sku).unwrap_or_default();
        if group.is_empty() {
            return Err(invalid(sku, "SKU no longer appears in the report"));
        }
        out.extend(apply_strategy(sku, strategy, group)?);
    }
    out.sort_by_key(|row| row.row_index);

    let remaining = detect_duplicates(&out, profile);
    if !remaining.is_empty() {
        return Err(Error::UnresolvedDuplicates(remaining.into_keys().collect()));
    }
    Ok(out)
}

fn apply_strategy(sku: &str, strategy: &Strategy, mut group: Vec<ReportRow>) -> Result<Vec<ReportRow>> {
    match strategy {
        Strategy::KeepOne { row_index } => {
            let pos = position(sku, &group, *row_index)?;
            Ok(vec![group.swap_remove(pos)])
        }
        Strategy::KeepNewest => Ok(group.pop().into_iter().collect()),
        Strategy::Merge { field_selections } => {
            let mut merged = group[0].clone();
            for (field, row_index) in field_selections {
                let name = canonical_column_name(field);
                let spec = field_spec(&name)
                    .ok_or_else(|| invalid(sku, format!("unknown merge field '{}'", field)))?;
                let source = &group[position(sku, &group, *row_index)?];
                match source.values.get(spec.name) {
                    Some(value) => {
                        merged.values.insert(spec.name, value.clone());
                    }
                    None => {
                        merged.values.remove(spec.name);
                    }
                }
            }
            Ok(vec![merged])
        }
        Strategy::RemoveAll => Ok(Vec::new()),
        Strategy::Rename { renames } => {
            for rename in renames {
                let new_sku = rename.new_sku.trim();
                if new_sku.is_empty() {
                    return Err(invalid(sku, format!("empty new SKU for row {}", rename.row_index)));
                }
                let pos = position(sku, &group, rename.row_index)?;
                group[pos].seller_sku = new_sku.to_string();
            }
            Ok(group)
        }
    }
}

fn position(sku: &str, group: &[ReportRow], row_index: usize) -> Result<usize> {
    group
        .iter()
        .position(|row| row.row_index == row_index)
        .ok_or_else(|| invalid(sku, format!("row {} is not in the group", row_index)))
}

fn invalid(sku: &str, reason: impl Into<String>) -> Error {
    Error::InvalidResolution {
        sku: sku.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fields::FieldValue;
    use crate::report::format::ReportFormat;

    fn profile() -> FormatProfile {
        FormatProfile::for_format(ReportFormat::AllListings)
    }

    fn row(index: usize, sku: &str, price: f64, name: &str) -> ReportRow {
        let mut r = ReportRow {
            row_index: index,
            seller_sku: sku.to_string(),
            values: Default::default(),
        };
        r.values.insert("price", FieldValue::Float(price));
        r.values.insert("item_name", FieldValue::Text(name.to_string()));
        r
    }

    fn rows() -> Vec<ReportRow> {
        vec![
            row(0, "A", 1.0, "first"),
            row(1, "B", 2.0, "b"),
            row(2, "A", 3.0, "second"),
            row(3, "A", 4.0, "third"),
        ]
    }

    fn single(sku: &str, strategy: Strategy) -> Resolution {
        Resolution::new([(sku.to_string(), strategy)].into_iter().collect())
    }

    #[test]
    fn test_strategy_json_shape() {
        let res = Resolution::from_json(
            r#"{"A": {"resolution_type": "keep_one", "row_index": 2},
                "B": {"resolution_type": "keep_newest"},
                "C": {"resolution_type": "merge", "field_selections": {"price": 0}},
                "D": {"resolution_type": "remove_all"},
                "E": {"resolution_type": "rename", "renames": [{"row_index": 1, "new_sku": "E2"}]}}"#,
        )
        .unwrap();
        assert_eq!(res.strategies["A"], Strategy::KeepOne { row_index: 2 });
        assert_eq!(res.strategies["B"], Strategy::KeepNewest);
        assert_eq!(res.strategies["D"].name(), "remove_all");
        assert!(Resolution::from_json(r#"{"A": {"resolution_type": "shrug"}}"#).is_err());
    }

    #[test]
    fn test_keep_one_keeps_exactly_that_row() {
        let original = rows();
        let out = resolve_rows(original.clone(), &single("A", Strategy::KeepOne { row_index: 2 }), &profile()).unwrap();
        let a: Vec<_> = out.iter().filter(|r| r.seller_sku == "A").collect();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0], &original[2]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_keep_newest_keeps_last_in_file_order() {
        let out = resolve_rows(rows(), &single("A", Strategy::KeepNewest), &profile()).unwrap();
        let indices: Vec<_> = out.iter().map(|r| r.row_index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_merge_takes_selected_fields() {
        let selections = [("price".to_string(), 3usize), ("Item Name".to_string(), 2usize)]
            .into_iter()
            .collect();
        let out = resolve_rows(rows(), &single("A", Strategy::Merge { field_selections: selections }), &profile()).unwrap();
        let merged = out.iter().find(|r| r.seller_sku == "A").unwrap();
        assert_eq!(merged.row_index, 0);
        assert_eq!(merged.get("price"), Some(&FieldValue::Float(4.0)));
        assert_eq!(merged.text("item_name"), Some("second"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_remove_all_drops_sku() {
        let out = resolve_rows(rows(), &single("A", Strategy::RemoveAll), &profile()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].seller_sku, "B");
    }

    #[test]
    fn test_rename_splits_duplicates() {
        let renames = vec![
            RenameRow { row_index: 2, new_sku: "A-2".into() },
            RenameRow { row_index: 3, new_sku: "A-3".into() },
        ];
        let out = resolve_rows(rows(), &single("A", Strategy::Rename { renames }), &profile()).unwrap();
        let skus: Vec<_> = out.iter().map(|r| r.seller_sku.as_str()).collect();
        assert_eq!(skus, vec!["A", "B", "A-2", "A-3"]);
    }

    #[test]
    fn test_rename_collision_is_unresolved() {
        let renames = vec![
            RenameRow { row_index: 2, new_sku: "B".into() },
            RenameRow { row_index: 3, new_sku: "A-3".into() },
        ];
        let err = resolve_rows(rows(), &single("A", Strategy::Rename { renames }), &profile()).unwrap_err();
        assert!(matches!(err, Error::UnresolvedDuplicates(ref skus) if skus == &vec!["B".to_string()]));
        assert!(err.is_resolution_failure());
    }

    #[test]
    fn test_validation_incomplete_and_contradictory() {
        let profile = profile();
        let conflicts = detect_duplicates(&rows(), &profile);

        let err = validate_resolution(&conflicts, &Resolution::default()).unwrap_err();
        assert!(matches!(err, Error::IncompleteResolution(ref skus) if skus == &vec!["A".to_string()]));
        assert!(!err.is_resolution_failure());

        let err = validate_resolution(&conflicts, &single("A", Strategy::KeepOne { row_index: 1 })).unwrap_err();
        assert!(matches!(err, Error::InvalidResolution { .. }));

        let mut extra = single("A", Strategy::KeepNewest);
        extra.strategies.insert("B".into(), Strategy::KeepNewest);
        assert!(validate_resolution(&conflicts, &extra).unwrap_err().is_resolution_failure());

        let bad_field = [("colour".to_string(), 0usize)].into_iter().collect();
        let err = validate_resolution(&conflicts, &single("A", Strategy::Merge { field_selections: bad_field })).unwrap_err();
        assert!(err.is_resolution_failure());

        let empty_merge = single("A", Strategy::Merge { field_selections: Default::default() });
        let err = validate_resolution(&conflicts, &empty_merge).unwrap_err();
        assert!(matches!(err, Error::InvalidResolution { ref reason, .. } if reason.contains("no merge fields")));

        assert!(validate_resolution(&conflicts, &single("A", Strategy::KeepNewest)).is_ok());
    }
}
