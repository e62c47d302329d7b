use super::fields::{
    canonical_column_name, FieldKind, FieldSpec, FieldValue, LISTING_FIELDS, SELLER_SKU,
    SELLER_SKU_ALIASES,
};
use super::format::FormatProfile;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use csv::{ByteRecord, ReaderBuilder};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// One normalized data line of a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// 0-based position among the file's data lines; stable across re-reads.
    pub row_index: usize,
    pub seller_sku: String,
    pub values: BTreeMap<&'static str, FieldValue>,
}

impl ReportRow {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(FieldValue::as_text)
    }
}

/// Where each canonical field lives in the header, aliases in priority order.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    sku_positions: Vec<usize>,
    positions: HashMap<&'static str, Vec<usize>>,
}

impl ColumnSet {
    pub fn from_headers(raw_headers: &[String]) -> Result<Self> {
        let headers: Vec<String> = raw_headers
            .iter()
            .map(|h| canonical_column_name(h))
            .collect();

        let sku_positions = alias_positions(&headers, SELLER_SKU_ALIASES);
        if sku_positions.is_empty() {
            return Err(Error::MissingColumn(SELLER_SKU.to_string()));
        }

        let mut positions = HashMap::new();
        for spec in LISTING_FIELDS {
            let found = alias_positions(&headers, spec.aliases);
            if !found.is_empty() {
                positions.insert(spec.name, found);
            }
        }

        let unknown: Vec<&String> = headers
            .iter()
            .filter(|h| {
                !SELLER_SKU_ALIASES.contains(&h.as_str())
                    && !LISTING_FIELDS.iter().any(|s| s.aliases.contains(&h.as_str()))
            })
            .collect();
        if !unknown.is_empty() {
            debug!("Ignoring report columns outside the field allow-list: {:?}", unknown);
        }

        Ok(Self {
            sku_positions,
            positions,
        })
    }

    /// True when the report format carries the canonical field at all,
    /// regardless of whether a given row fills it.
    pub fn contains(&self, field: &str) -> bool {
        field == SELLER_SKU || self.positions.contains_key(field)
    }

    fn first_non_empty<'r>(&self, positions: &[usize], record: &'r [String]) -> Option<&'r str> {
        positions
            .iter()
            .filter_map(|&i| record.get(i))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }
}

fn alias_positions(headers: &[String], aliases: &[&str]) -> Vec<usize> {
    aliases
        .iter()
        .flat_map(|alias| {
            headers
                .iter()
                .enumerate()
                .filter(move |(_, h)| h.as_str() == *alias)
                .map(|(i, _)| i)
        })
        .collect()
}

/// Row-level counters collected while normalizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows_read: usize,
    pub skipped_rows: usize,
    pub soft_errors: usize,
}

/// Lazy normalizer over one report stream. Restart by opening the file again.
pub struct ReportReader<R: Read> {
    reader: csv::Reader<R>,
    columns: ColumnSet,
    profile: FormatProfile,
    record: ByteRecord,
    next_index: usize,
    stats: NormalizeStats,
}

pub fn open_report(path: &Path, profile: &FormatProfile) -> Result<ReportReader<File>> {
    let file = File::open(path)?;
    ReportReader::from_reader(file, profile)
}

impl<R: Read> ReportReader<R> {
    pub fn from_reader(rdr: R, profile: &FormatProfile) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(profile.delimiter)
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_reader(rdr);

        let headers: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();
        let columns = ColumnSet::from_headers(&headers)?;

        Ok(Self {
            reader,
            columns,
            profile: profile.clone(),
            record: ByteRecord::new(),
            next_index: 0,
            stats: NormalizeStats::default(),
        })
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn stats(&self) -> NormalizeStats {
        self.stats
    }

    fn normalize_current(&mut self, row_index: usize) -> Option<ReportRow> {
        let cells: Vec<String> = self
            .record
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();

        let sku = match self.columns.first_non_empty(&self.columns.sku_positions, &cells) {
            Some(sku) => sku.to_string(),
            None => {
                warn!(row_index, "Skipping row without seller SKU");
                self.stats.skipped_rows += 1;
                return None;
            }
        };

        let mut values = BTreeMap::new();
        for spec in LISTING_FIELDS {
            let Some(positions) = self.columns.positions.get(spec.name) else {
                continue;
            };
            let Some(raw) = self.columns.first_non_empty(positions, &cells) else {
                continue;
            };
            if let Some(value) = self.coerce(spec, raw, row_index, &sku) {
                values.insert(spec.name, value);
            }
        }

        Some(ReportRow {
            row_index,
            seller_sku: sku,
            values,
        })
    }

    fn coerce(&mut self, spec: &FieldSpec, raw: &str, row_index: usize, sku: &str) -> Option<FieldValue> {
        match spec.kind {
            FieldKind::Text | FieldKind::Identifier => Some(FieldValue::Text(raw.to_string())),
            FieldKind::Price => match parse_price(raw) {
                Some(price) => Some(FieldValue::Float(price)),
                None => {
                    warn!(row_index, sku, field = spec.name, value = raw, "Unparseable price, leaving it empty");
                    self.stats.soft_errors += 1;
                    None
                }
            },
            FieldKind::Quantity => Some(FieldValue::Integer(parse_quantity(raw))),
            FieldKind::Flag => Some(FieldValue::Flag(parse_flag(raw))),
            FieldKind::Date => Some(FieldValue::Text(if self.profile.truncate_dates {
                truncate_date(raw)
            } else {
                raw.to_string()
            })),
        }
    }
}

impl<R: Read> Iterator for ReportReader<R> {
    type Item = Result<ReportRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) => {
                    let row_index = self.next_index;
                    self.next_index += 1;
                    self.stats.rows_read += 1;
                    if let Some(row) = self.normalize_current(row_index) {
                        return Some(Ok(row));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// A fully materialized report, as needed by duplicate detection.
#[derive(Debug, Clone)]
pub struct ParsedReport {
    pub columns: ColumnSet,
    pub rows: Vec<ReportRow>,
    pub stats: NormalizeStats,
}

pub fn read_report(path: &Path, profile: &FormatProfile) -> Result<ParsedReport> {
    let mut reader = open_report(path, profile)?;
    let rows = reader.by_ref().collect::<Result<Vec<_>>>()?;
    debug!(
        "Read {} rows from {} ({} skipped, {} soft errors)",
        rows.len(),
        path.display(),
        reader.stats().skipped_rows,
        reader.stats().soft_errors,
    );
    Ok(ParsedReport {
        columns: reader.columns().clone(),
        rows,
        stats: reader.stats(),
    })
}

pub fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer quantity. Whole-number decimals like `3.0` are accepted; fractions
/// and anything unparseable become 0.
pub fn parse_quantity(raw: &str) -> i64 {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i64>() {
        return v;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => v as i64,
        _ => 0,
    }
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "y" | "yes" | "true")
}

fn truncate_date(raw: &str) -> String {
    raw.get(..10)
        .filter(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").is_ok())
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string())
}
