//! Parkline database tool.
//!
//! Connects to the document store, runs a full initialization or repairs a
//! single multilingual family, then closes the connection. Exits non-zero
//! when the operation reports failure.

mod config;

use std::sync::Arc;

use clap::Parser;
use parkline_persistence::backends::mongodb::MongoConnector;
use parkline_persistence::reconcile::{InitReport, Initializer};
use parkline_persistence::{ConnectionManager, EntityFamilyKind};
use tracing::{error, info};

use crate::config::{Command, DbctlConfig};

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "parkline_persistence={},parkline_dbctl={}",
            level, level
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn print_report(report: &InitReport) {
    println!("collections:");
    for entry in &report.collections {
        match (&entry.outcome, &entry.error) {
            (Some(outcome), _) => println!("  {:<24} {}", entry.collection, outcome),
            (None, Some(error)) => println!("  {:<24} FAILED: {}", entry.collection, error),
            (None, None) => println!("  {:<24} ?", entry.collection),
        }
    }
    if !report.text_indexes.is_empty() {
        println!("text indexes:");
        for entry in &report.text_indexes {
            println!("  {:<32} {}", entry.index, entry.outcome);
        }
    }
    if !report.ttl_indexes.is_empty() {
        println!("ttl indexes:");
        for entry in &report.ttl_indexes {
            println!("  {:<40} {}", entry.index, entry.outcome);
        }
    }
    if !report.families.is_empty() {
        println!("families:");
        for entry in &report.families {
            match (&entry.stats, &entry.error) {
                (Some(stats), _) => println!(
                    "  {:<14} {} entities, {} values created, {} stale removed, {} skipped",
                    entry.family.label(),
                    stats.entities,
                    stats.values_created,
                    stats.stale_values_removed,
                    stats.skipped_without_baseline
                ),
                (None, error) => println!(
                    "  {:<14} FAILED: {}",
                    entry.family.label(),
                    error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }
    if let Some(reason) = &report.aborted {
        println!("aborted: {}", reason);
    }
    println!("elapsed: {}", humantime::format_duration(report.elapsed));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DbctlConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(2);
    }

    let reconcile = config.reconcile_config();
    info!(
        database = %reconcile.connection.database,
        tls = reconcile.connection.tls.enabled,
        languages = ?reconcile.normalized_languages(),
        "Starting Parkline database tool"
    );

    let manager = Arc::new(ConnectionManager::new(MongoConnector::new()));
    if !manager.connect(&reconcile.connection).await {
        anyhow::bail!("Could not connect to the document store");
    }

    let initializer = Initializer::new(manager.clone(), &reconcile);
    let succeeded = match config.command {
        Command::Init { json } => {
            let report = initializer.initialize_with_report().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            report.succeeded()
        }
        Command::Sync { family } => {
            let kind = EntityFamilyKind::from(family);
            initializer.synchronizer().synchronize_kind(kind).await
        }
    };

    manager.close(false).await;

    if !succeeded {
        error!("Operation finished with failures");
        std::process::exit(1);
    }
    Ok(())
}
