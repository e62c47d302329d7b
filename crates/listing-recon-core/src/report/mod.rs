pub mod fields;
pub mod format;
pub mod reader;
pub mod writer;

pub use fields::{FieldKind, FieldValue, LISTING_FIELDS};
pub use format::{FormatOverride, FormatProfile, ReportFormat};
pub use reader::{open_report, read_report, ParsedReport, ReportReader, ReportRow};
