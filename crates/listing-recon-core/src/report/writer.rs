use super::fields::{LISTING_FIELDS, SELLER_SKU};
use super::format::FormatProfile;
use super::reader::{ColumnSet, ReportRow};
use crate::error::Result;
use csv::{QuoteStyle, WriterBuilder};
use std::path::{Path, PathBuf};
use tracing::info;

/// `reports/inv.txt` → `reports/inv_resolved.txt`.
pub fn resolved_export_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let name = match source.extension() {
        Some(ext) => format!("{}_resolved.{}", stem, ext.to_string_lossy()),
        None => format!("{}_resolved", stem),
    };
    source.with_file_name(name)
}

/// Write normalized rows back out with canonical headers, limited to the
/// fields the source report carried.
pub fn write_rows(
    path: &Path,
    profile: &FormatProfile,
    columns: &ColumnSet,
    rows: &[ReportRow],
) -> Result<()> {
    let fields: Vec<&str> = LISTING_FIELDS
        .iter()
        .map(|spec| spec.name)
        .filter(|name| columns.contains(name))
        .collect();

    let mut writer = WriterBuilder::new()
        .delimiter(profile.delimiter)
        .quote_style(QuoteStyle::Never)
        .from_path(path)?;

    let mut header = vec![SELLER_SKU];
    header.extend(fields.iter().copied());
    writer.write_record(&header)?;

    for row in rows {
        let mut record = Vec::with_capacity(fields.len() + 1);
        record.push(row.seller_sku.clone());
        for field in &fields {
            record.push(row.get(field).map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!("Wrote {} resolved rows to {}", rows.len(), path.display());
    Ok(())
}
