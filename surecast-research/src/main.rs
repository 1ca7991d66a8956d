use anyhow::{Context, Result};
use clap::Parser;
use libsurecast::config::Config;
use libsurecast::research::ResearchService;
use libsurecast::types::CacheEntry;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "surecast-research")]
#[command(version, about = "Fetch today's research sources, at most once a day")]
#[command(long_about = r#"Fetch today's research sources, at most once a day.

Results are cached per calendar day in the data directory and reused while
younger than the configured freshness window (24 hours by default). A rate
limit from the scrape service stops the batch; whatever was fetched before
it is still cached.

EXAMPLES:
    # Fetch, or reuse today's cache
    surecast-research

    # Ignore the cache and fetch again
    surecast-research --force-refresh

    # Read today's cache without fetching
    surecast-research --cached --format json | jq '.results[].title'

EXIT CODES:
    0 - Success (including per-source failures recorded in the results)
    1 - Error (configuration, or --cached with nothing cached)
"#)]
struct Args {
    /// Fetch even if today's cache is fresh
    #[arg(long, conflicts_with = "cached")]
    force_refresh: bool,

    /// Only read today's cache
    #[arg(long)]
    cached: bool,

    /// Configuration file
    #[arg(long, env = "SURECAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn print_entry(entry: &CacheEntry, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(entry)?);
        return Ok(());
    }

    println!(
        "Research for {} (fetched {})",
        entry.date_key,
        entry.fetched_at.format("%Y-%m-%d %H:%M:%S")
    );
    for result in &entry.results {
        match &result.error {
            Some(error) => println!("  ✗ {}: {}", result.url, error),
            None => println!(
                "  ✓ {}: {} ({} chars)",
                result.url,
                result.title,
                result.snippet.chars().count()
            ),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    libsurecast::logging::init_default(args.verbose);

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    let service =
        ResearchService::from_config(&config).context("Failed to set up research fetching")?;

    let entry = if args.cached {
        match service.cached().await {
            Some(entry) => entry,
            None => {
                eprintln!("Error: No research cached for today");
                eprintln!("Fetch it first: surecast-research");
                std::process::exit(1);
            }
        }
    } else {
        service.daily(args.force_refresh).await
    };

    print_entry(&entry, &args.format)
}
