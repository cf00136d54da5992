//! Listing-Harvester main entry point
//!
//! This is the command-line interface for the incremental listing harvester.

use anyhow::Context;
use clap::Parser;
use listing_harvester::config::{load_config_with_hash, Config};
use listing_harvester::crawler::{run_harvest, HarvestSummary};
use listing_harvester::output::{load_statistics, print_statistics};
use listing_harvester::{FieldRule, RecordTable};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Listing-Harvester: an incremental listing-site record harvester
///
/// Listing-Harvester walks the result pages of a listing site newest first,
/// extracts a record from every new detail page with a declarative rule
/// table, and merges the accepted records into a CSV file. Each run stops at
/// the newest item stored by the previous one.
#[derive(Parser, Debug)]
#[command(name = "listing-harvester")]
#[command(version = "1.0.0")]
#[command(about = "An incremental listing-site record harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// First listing page to fetch (overrides [harvester] start-page)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    start_page: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the rule table without harvesting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics for the CSV table and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config, cli.start_page);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_harvest(config, cli.start_page).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_harvester=info,warn"),
            1 => EnvFilter::new("listing_harvester=debug,info"),
            2 => EnvFilter::new("listing_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config, start_page: Option<u32>) {
    let start_page = start_page.unwrap_or(config.harvester.start_page);

    println!("=== Listing-Harvester Dry Run ===\n");

    println!("Harvester Configuration:");
    println!("  Workers: {}", config.harvester.workers);
    println!("  Queue capacity: {}", config.harvester.queue_capacity);
    println!("  Start page: {}", start_page);
    match config.harvester.max_pages {
        Some(max) => println!("  Max pages: {}", max),
        None => println!("  Max pages: unlimited"),
    }
    println!(
        "  Timeouts: connect {}s, request {}s",
        config.fetch.connect_timeout_secs, config.fetch.timeout_secs
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nListing:");
    println!("  First page: {}", config.listing.page_url(start_page));
    println!("  Items: {}", config.listing.item_selector);
    println!(
        "  Links: {} (id from '{}')",
        config.listing.link_selector, config.listing.id_attribute
    );

    println!("\nOutput:");
    println!("  CSV: {}", config.output.csv_path);
    println!("  Ordered by: {}", config.output.order_column);

    println!("\nRules ({}):", config.rules.len());
    for rule in &config.rules {
        for line in describe_rule(rule) {
            println!("{}", line);
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Formats one rule for the dry-run listing
fn describe_rule(rule: &FieldRule) -> Vec<String> {
    let flags = match (rule.required, rule.persist) {
        (true, true) => "",
        (false, true) => " [optional]",
        (true, false) => " [not stored]",
        (false, false) => " [optional, not stored]",
    };

    let mut lines = vec![
        format!("  - {}{}", rule.name, flags),
        format!("    * {} -> {}", rule.selector, rule.accessor),
    ];
    if let Some(text) = &rule.text_contains {
        lines.push(format!("    * containing text {:?}", text));
    }
    if rule.next_sibling {
        lines.push("    * then next element sibling".to_string());
    }
    lines.push(format!("    * {:?}, {:?}", rule.converter, rule.validity));
    lines
}

/// Handles the --stats mode: shows statistics for the CSV table
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("CSV table: {}\n", config.output.csv_path);

    let table = RecordTable::load(Path::new(&config.output.csv_path))?;
    let stats = load_statistics(&table, &config.output.order_column);
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, start_page: Option<u32>) -> anyhow::Result<()> {
    tracing::info!(
        "Harvesting {} into {} with {} workers",
        config.listing.url_template,
        config.output.csv_path,
        config.harvester.workers
    );

    match run_harvest(config, start_page).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}

fn print_summary(summary: &HarvestSummary) {
    println!("=== Harvest Summary ===\n");
    println!("  Listing pages: {}", summary.pages_fetched);
    if let Some(reason) = &summary.stop_reason {
        println!("  Stopped: {:?}", reason);
    }
    println!("  Items: {}", summary.stats);
    println!("  New records: {}", summary.new_records);
    println!("  Rows stored: {}", summary.total_rows);
    println!("  Elapsed: {:.1?}", summary.elapsed);
}
