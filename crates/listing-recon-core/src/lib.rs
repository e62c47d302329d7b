pub mod config;
pub mod duplicates;
pub mod engine;
pub mod error;
pub mod progress;
pub mod reconcile;
pub mod report;
pub mod storage;
pub mod tracker;

pub use config::AppConfig;
pub use duplicates::{Resolution, Strategy};
pub use engine::{IngestEngine, IngestOutcome, IngestRequest, IngestSummary};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
pub use report::ReportFormat;
pub use storage::Database;
