use crate::duplicates::detect::product_identifiers;
use crate::report::format::{FormatProfile, ProductIdKind};
use crate::report::reader::{ColumnSet, ReportRow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentifierType {
    Asin,
    Upc,
    Ean,
    Fnsku,
}

impl IdentifierType {
    pub const ALL: [IdentifierType; 4] = [
        IdentifierType::Asin,
        IdentifierType::Upc,
        IdentifierType::Ean,
        IdentifierType::Fnsku,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Asin => "ASIN",
            IdentifierType::Upc => "UPC",
            IdentifierType::Ean => "EAN",
            IdentifierType::Fnsku => "FNSKU",
        }
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        IdentifierType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| format!("unknown identifier type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    New,
    Modified,
    Removed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::New => "new",
            ChangeType::Modified => "modified",
            ChangeType::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(ChangeType::New),
            "modified" => Ok(ChangeType::Modified),
            "removed" => Ok(ChangeType::Removed),
            other => Err(format!("unknown change type '{}'", other)),
        }
    }
}

/// Compare the stored value of one identifier with the incoming one.
/// `None` means nothing to record.
pub fn classify(old: Option<&str>, new: Option<&str>) -> Option<ChangeType> {
    match (old, new) {
        (None, Some(_)) => Some(ChangeType::New),
        (Some(_), None) => Some(ChangeType::Removed),
        (Some(o), Some(n)) if o != n => Some(ChangeType::Modified),
        _ => None,
    }
}

/// What to do with an identifier column that is in the report but empty
/// for a row. A column the format doesn't carry is never treated as cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearedIdentifierPolicy {
    /// The stored value is dropped and a `removed` change recorded.
    #[default]
    Removed,
    /// Keep the stored value, as if the column were absent.
    Ignore,
}

/// One identifier as seen in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The report format doesn't carry it, or the row's type code doesn't select it.
    Absent,
    /// Column present, cell empty.
    Cleared,
    Value(String),
}

impl Observation {
    fn from_column(columns: &ColumnSet, row: &ReportRow, field: &str) -> Self {
        if !columns.contains(field) {
            return Observation::Absent;
        }
        match row.text(field) {
            Some(v) => Observation::Value(v.to_string()),
            None => Observation::Cleared,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    pub asin: Option<String>,
    pub upc: Option<String>,
    pub ean: Option<String>,
    pub fnsku: Option<String>,
}

impl Identifiers {
    pub fn get(&self, kind: IdentifierType) -> Option<&str> {
        match kind {
            IdentifierType::Asin => self.asin.as_deref(),
            IdentifierType::Upc => self.upc.as_deref(),
            IdentifierType::Ean => self.ean.as_deref(),
            IdentifierType::Fnsku => self.fnsku.as_deref(),
        }
    }

    fn slot(&mut self, kind: IdentifierType) -> &mut Option<String> {
        match kind {
            IdentifierType::Asin => &mut self.asin,
            IdentifierType::Upc => &mut self.upc,
            IdentifierType::Ean => &mut self.ean,
            IdentifierType::Fnsku => &mut self.fnsku,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedIdentifiers {
    pub asin: Observation,
    pub upc: Observation,
    pub ean: Observation,
    pub fnsku: Observation,
}

impl ObservedIdentifiers {
    /// UPC and EAN share the `product_id` column; only the one selected by the
    /// row's `product_id_type` code is observed.
    pub fn from_row(row: &ReportRow, columns: &ColumnSet, profile: &FormatProfile) -> Self {
        let mut upc = Observation::Absent;
        let mut ean = Observation::Absent;
        if columns.contains("product_id") {
            let kind = row
                .text("product_id_type")
                .and_then(|code| profile.product_id_kind(code));
            let (upc_value, ean_value) = product_identifiers(row, profile);
            match kind {
                Some(ProductIdKind::Upc) => upc = upc_value.map_or(Observation::Cleared, Observation::Value),
                Some(ProductIdKind::Ean) => ean = ean_value.map_or(Observation::Cleared, Observation::Value),
                None => {}
            }
        }

        Self {
            asin: Observation::from_column(columns, row, "asin"),
            upc,
            ean,
            fnsku: Observation::from_column(columns, row, "fnsku"),
        }
    }

    pub fn get(&self, kind: IdentifierType) -> &Observation {
        match kind {
            IdentifierType::Asin => &self.asin,
            IdentifierType::Upc => &self.upc,
            IdentifierType::Ean => &self.ean,
            IdentifierType::Fnsku => &self.fnsku,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierDiff {
    pub identifier_type: IdentifierType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub change_type: ChangeType,
}

/// Fold a row's observations into the stored identifiers. Returns the new
/// snapshot state and one diff per identifier that changed.
pub fn reconcile(
    stored: &Identifiers,
    observed: &ObservedIdentifiers,
    policy: ClearedIdentifierPolicy,
) -> (Identifiers, Vec<IdentifierDiff>) {
    let mut next = stored.clone();
    let mut diffs = Vec::new();

    for kind in IdentifierType::ALL {
        let old = stored.get(kind);
        let new = match (observed.get(kind), policy) {
            (Observation::Value(v), _) => Some(v.as_str()),
            (Observation::Cleared, ClearedIdentifierPolicy::Removed) => None,
            (Observation::Cleared, ClearedIdentifierPolicy::Ignore) | (Observation::Absent, _) => old,
        };

        if let Some(change_type) = classify(old, new) {
            diffs.push(IdentifierDiff {
                identifier_type: kind,
                old_value: old.map(str::to_string),
                new_value: new.map(str::to_string),
                change_type,
            });
        }
        *next.slot(kind) = new.map(str::to_string);
    }

    (next, diffs)
}
