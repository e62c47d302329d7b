use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The report variants the pipeline understands. Each maps to a
/// [`FormatProfile`] instead of its own ingestion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// "All Listings Report": `product-id-type` 3 = UPC, 4 = EAN, `open-date` carries a time.
    #[default]
    AllListings,
    /// Merchant inventory report: `product-id-type` 2 = EAN, 3 = UPC.
    Inventory,
    /// Amazon-fulfilled inventory report (`sku`, `your-price`, `afn-*` columns).
    FbaInventory,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [
        ReportFormat::AllListings,
        ReportFormat::Inventory,
        ReportFormat::FbaInventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::AllListings => "all_listings",
            ReportFormat::Inventory => "inventory",
            ReportFormat::FbaInventory => "fba_inventory",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ReportFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == normalized)
            .ok_or_else(|| format!("unknown report format '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductIdKind {
    Upc,
    Ean,
}

/// Optional per-format settings read from configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FormatOverride {
    pub upc_type_code: Option<String>,
    pub ean_type_code: Option<String>,
    pub delimiter: Option<String>,
    pub truncate_dates: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatProfile {
    pub format: ReportFormat,
    pub delimiter: u8,
    pub upc_type_code: String,
    pub ean_type_code: String,
    /// Cut date-like fields down to `YYYY-MM-DD`.
    pub truncate_dates: bool,
}

impl FormatProfile {
    pub fn for_format(format: ReportFormat) -> Self {
        let (upc, ean, truncate_dates) = match format {
            ReportFormat::AllListings => ("3", "4", true),
            ReportFormat::Inventory => ("3", "2", false),
            ReportFormat::FbaInventory => ("3", "4", false),
        };
        Self {
            format,
            delimiter: b'\t',
            upc_type_code: upc.to_string(),
            ean_type_code: ean.to_string(),
            truncate_dates,
        }
    }

    pub fn with_override(mut self, o: &FormatOverride) -> Self {
        if let Some(code) = &o.upc_type_code {
            self.upc_type_code = code.trim().to_string();
        }
        if let Some(code) = &o.ean_type_code {
            self.ean_type_code = code.trim().to_string();
        }
        if let Some(delim) = o.delimiter.as_deref().and_then(parse_delimiter) {
            self.delimiter = delim;
        }
        if let Some(truncate) = o.truncate_dates {
            self.truncate_dates = truncate;
        }
        self
    }

    /// Which identifier a `product-id-type` code selects in this format, if any.
    pub fn product_id_kind(&self, type_code: &str) -> Option<ProductIdKind> {
        let code = type_code.trim();
        if code == self.upc_type_code {
            Some(ProductIdKind::Upc)
        } else if code == self.ean_type_code {
            Some(ProductIdKind::Ean)
        } else {
            None
        }
    }
}

fn parse_delimiter(raw: &str) -> Option<u8> {
    match raw {
        "\\t" | "tab" | "\t" => Some(b'\t'),
        other => other.bytes().next().filter(|b| b.is_ascii()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_differ_per_format() {
        let all = FormatProfile::for_format(ReportFormat::AllListings);
        assert_eq!(all.product_id_kind("3"), Some(ProductIdKind::Upc));
        assert_eq!(all.product_id_kind("4"), Some(ProductIdKind::Ean));
        assert_eq!(all.product_id_kind("2"), None);

        let inv = FormatProfile::for_format(ReportFormat::Inventory);
        assert_eq!(inv.product_id_kind("2"), Some(ProductIdKind::Ean));
        assert_eq!(inv.product_id_kind("3"), Some(ProductIdKind::Upc));
        assert_eq!(inv.product_id_kind("4"), None);
    }

    #[test]
    fn test_override_replaces_codes_and_delimiter() {
        let o = FormatOverride {
            upc_type_code: Some("4".into()),
            ean_type_code: Some(" 3 ".into()),
            delimiter: Some(",".into()),
            truncate_dates: Some(false),
        };
        let p = FormatProfile::for_format(ReportFormat::AllListings).with_override(&o);
        assert_eq!(p.product_id_kind("4"), Some(ProductIdKind::Upc));
        assert_eq!(p.product_id_kind("3"), Some(ProductIdKind::Ean));
        assert_eq!(p.delimiter, b',');
        assert!(!p.truncate_dates);
    }

    #[test]
    fn test_parse_report_format() {
        assert_eq!("all-listings".parse::<ReportFormat>(), Ok(ReportFormat::AllListings));
        assert_eq!("FBA_INVENTORY".parse::<ReportFormat>(), Ok(ReportFormat::FbaInventory));
        assert!("nope".parse::<ReportFormat>().is_err());
    }
}
