use clap::{Parser, Subcommand};
use listing_recon_core::reconcile::{ChangeType, IdentifierType};
use listing_recon_core::storage::models::IssueStatus;
use listing_recon_core::ReportFormat;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "listing-recon")]
#[command(about = "Ingest marketplace listing reports and reconcile product identifiers", long_about = None)]
pub struct Cli {
    /// SQLite database path (overrides `db_path` from configuration)
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a report file into the catalog
    Ingest {
        /// Tab-separated report file
        path: PathBuf,
        /// Identifier for this upload (defaults to the file name)
        #[arg(long)]
        file_id: Option<String>,
        /// all_listings, inventory or fba_inventory (defaults to configuration)
        #[arg(long)]
        format: Option<ReportFormat>,
        #[arg(long)]
        submitter: Option<String>,
    },
    /// Resolve a pending duplicate issue and finish its run
    Resolve {
        issue_id: i64,
        /// JSON file mapping each SKU to a strategy
        #[arg(long, conflicts_with = "json")]
        file: Option<PathBuf>,
        /// Inline JSON mapping, e.g. '{"A": {"resolution_type": "keep_newest"}}'
        #[arg(long)]
        json: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show one run, the latest run for a file, or recent runs
    Status {
        run_id: Option<i64>,
        #[arg(long, conflicts_with = "run_id")]
        file_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// List duplicate issues
    Issues {
        /// pending, resolved or error
        #[arg(long)]
        status: Option<IssueStatus>,
    },
    /// Print a duplicate issue with its conflict rows as JSON
    Issue { issue_id: i64 },
    /// Print listings and identifier snapshots for SKUs as JSON
    Listing {
        #[arg(required = true)]
        skus: Vec<String>,
    },
    /// List identifier changes
    Changes {
        #[arg(long)]
        sku: Option<String>,
        #[arg(long)]
        run: Option<i64>,
        /// ASIN, UPC, EAN or FNSKU
        #[arg(long = "type")]
        identifier_type: Option<IdentifierType>,
        /// new, modified or removed
        #[arg(long)]
        change: Option<ChangeType>,
        /// Only changes nobody has acknowledged yet
        #[arg(long)]
        unacknowledged: bool,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Mark identifier changes as acknowledged
    Acknowledge {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Print configuration values
    PrintConfig,
}
