mod commands;
mod logging;
mod progress;

use std::fs;
use std::path::Path;
use std::process;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use listing_recon_core::reconcile::ChangeType;
use listing_recon_core::storage::models::{ChangeFilter, IngestionRun, IssueStatus, RunStatus};
use listing_recon_core::{
    AppConfig, Database, IngestEngine, IngestOutcome, IngestRequest, ReportFormat, Resolution,
};
use progress::CliReporter;
use serde_json::json;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let mut config = match listing_recon_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let result = match args.command {
        Some(Commands::Ingest {
            path,
            file_id,
            format,
            submitter,
        }) => run_ingest(&config, &path, file_id, format, submitter),
        Some(Commands::Resolve {
            issue_id,
            file,
            json,
            notes,
        }) => run_resolve(&config, issue_id, file.as_deref(), json, notes),
        Some(Commands::Status {
            run_id,
            file_id,
            limit,
        }) => run_status(&config, run_id, file_id, limit),
        Some(Commands::Issues { status }) => run_issues(&config, status),
        Some(Commands::Issue { issue_id }) => run_issue(&config, issue_id),
        Some(Commands::Listing { skus }) => run_listing(&config, &skus),
        Some(Commands::Changes {
            sku,
            run,
            identifier_type,
            change,
            unacknowledged,
            limit,
        }) => run_changes(
            &config,
            ChangeFilter {
                seller_sku: sku,
                run_id: run,
                identifier_type,
                change_type: change,
                unacknowledged_only: unacknowledged,
                limit,
            },
        ),
        Some(Commands::Acknowledge { ids }) => run_acknowledge(&config, &ids),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    Database::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path))
}

fn run_ingest(
    config: &AppConfig,
    path: &Path,
    file_id: Option<String>,
    format: Option<ReportFormat>,
    submitter: Option<String>,
) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let file_id = match file_id {
        Some(id) => id,
        None => path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .context("cannot derive a file id from the path, pass --file-id")?,
    };

    let mut request =
        IngestRequest::new(path, file_id).with_format(format.unwrap_or(config.default_format));
    if let Some(submitter) = submitter {
        request = request.with_submitter(submitter);
    }

    let engine = IngestEngine::new(config.clone());
    let outcome = engine.ingest(&db, &request, &CliReporter::new())?;
    print_outcome(&outcome);
    Ok(())
}

fn run_resolve(
    config: &AppConfig,
    issue_id: i64,
    file: Option<&Path>,
    json: Option<String>,
    notes: Option<String>,
) -> anyhow::Result<()> {
    let raw = match (file, json) {
        (Some(file), _) => fs::read_to_string(file)
            .with_context(|| format!("reading resolution file {}", file.display()))?,
        (None, Some(json)) => json,
        (None, None) => bail!("a resolution is required, pass --file or --json"),
    };
    let mut resolution = Resolution::from_json(&raw)?;
    if let Some(notes) = notes {
        resolution = resolution.with_notes(notes);
    }

    let db = open_database(config)?;
    let engine = IngestEngine::new(config.clone());
    let outcome = engine.resolve(&db, issue_id, &resolution, &CliReporter::new())?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &IngestOutcome) {
    println!();
    match outcome {
        IngestOutcome::Completed(summary) => {
            info!(
                "Run {} completed in {}",
                summary.run_id,
                format!("{:.2}s", summary.duration_secs).green(),
            );
            info!(
                "{} rows loaded, {} skipped, {} soft errors",
                format!("{}", summary.processed_rows).green(),
                format!("{}", summary.skipped_rows).yellow(),
                format!("{}", summary.soft_errors).yellow(),
            );
            info!(
                "{} listings created, {} updated, {} identifier changes",
                format!("{}", summary.listings_created).cyan(),
                format!("{}", summary.listings_updated).cyan(),
                format!("{}", summary.identifier_changes).cyan(),
            );
        }
        IngestOutcome::DuplicatesDetected {
            run_id,
            issue_id,
            duplicate_skus,
            duplicate_rows,
        } => {
            warn!(
                "Run {} is waiting on duplicate issue {}: {} SKUs across {} rows",
                run_id,
                format!("{}", issue_id).red(),
                format!("{}", duplicate_skus).red(),
                format!("{}", duplicate_rows).red(),
            );
            info!(
                "Inspect with `listing-recon issue {}`, then `listing-recon resolve {} --file <mapping.json>`",
                issue_id, issue_id
            );
        }
    }
}

fn colored_status(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Completed => status.as_str().green(),
        RunStatus::Error => status.as_str().red(),
        RunStatus::DuplicateDetected => status.as_str().yellow(),
        _ => status.as_str().cyan(),
    }
}

fn print_run(run: &IngestionRun) {
    println!(
        "#{:<5} {:<20} {:<14} {:>3}%  {}/{} rows  {} changes  {}",
        run.id,
        colored_status(run.status),
        run.report_format.as_str(),
        run.progress_percent(),
        run.processed_rows,
        run.total_rows,
        run.identifier_changes,
        run.file_id,
    );
    if let Some(message) = &run.error_message {
        println!("       {}", message.red());
    }
}

fn run_status(
    config: &AppConfig,
    run_id: Option<i64>,
    file_id: Option<String>,
    limit: i64,
) -> anyhow::Result<()> {
    let db = open_database(config)?;
    match (run_id, file_id) {
        (Some(id), _) => {
            let run = db
                .get_run(id)?
                .with_context(|| format!("ingestion run {} not found", id))?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        (None, Some(file_id)) => {
            let run = db
                .get_latest_run_for_file(&file_id)?
                .with_context(|| format!("no runs for file {}", file_id))?;
            print_run(&run);
        }
        (None, None) => {
            let runs = db.list_runs(0, limit)?;
            if runs.is_empty() {
                info!("No ingestion runs recorded");
            }
            for run in &runs {
                print_run(run);
            }
        }
    }
    Ok(())
}

fn run_issues(config: &AppConfig, status: Option<IssueStatus>) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let issues = db.list_duplicate_issues(status)?;
    if issues.is_empty() {
        info!("No duplicate issues");
    }
    for issue in &issues {
        let status = match issue.status {
            IssueStatus::Pending => issue.status.as_str().yellow(),
            IssueStatus::Resolved => issue.status.as_str().green(),
            IssueStatus::Error => issue.status.as_str().red(),
        };
        println!(
            "#{:<5} run {:<5} {:<9} {} SKUs / {} rows  {}",
            issue.id,
            issue.run_id,
            status,
            issue.conflicts.len(),
            issue.duplicate_rows,
            issue.file_id,
        );
    }
    Ok(())
}

fn run_issue(config: &AppConfig, issue_id: i64) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let issue = db
        .get_duplicate_issue(issue_id)?
        .with_context(|| format!("duplicate issue {} not found", issue_id))?;
    println!("{}", serde_json::to_string_pretty(&issue)?);
    Ok(())
}

fn run_listing(config: &AppConfig, skus: &[String]) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let listings = db.get_listings_by_skus(skus)?;
    let mut out = Vec::with_capacity(listings.len());
    for listing in &listings {
        let snapshot = db.get_identifier_snapshot(&listing.seller_sku)?;
        out.push(json!({ "listing": listing, "snapshot": snapshot }));
    }
    for sku in skus {
        if !listings.iter().any(|l| &l.seller_sku == sku) {
            warn!("No listing for SKU {}", sku);
        }
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_changes(config: &AppConfig, filter: ChangeFilter) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let changes = db.list_identifier_changes(&filter)?;
    if changes.is_empty() {
        info!("No identifier changes match");
    }
    for change in &changes {
        let kind = match change.change_type {
            ChangeType::New => change.change_type.as_str().green(),
            ChangeType::Modified => change.change_type.as_str().yellow(),
            ChangeType::Removed => change.change_type.as_str().red(),
        };
        let ack = if change.acknowledged_at.is_some() {
            "ack".dimmed()
        } else {
            "".normal()
        };
        println!(
            "#{:<6} run {:<5} {:<20} {:<5} {:<8} {} -> {} {}",
            change.id,
            change.run_id,
            change.seller_sku,
            change.identifier_type.as_str(),
            kind,
            change.old_value.as_deref().unwrap_or("-"),
            change.new_value.as_deref().unwrap_or("-"),
            ack,
        );
    }
    Ok(())
}

fn run_acknowledge(config: &AppConfig, ids: &[i64]) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let updated = db.acknowledge_identifier_changes(ids)?;
    info!(
        "{} of {} changes acknowledged",
        format!("{}", updated).green(),
        ids.len()
    );
    Ok(())
}
