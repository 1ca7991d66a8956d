//! surecast-post - Publish content through the resilient pipeline

use clap::Parser;
use libsurecast::config::Config;
use libsurecast::error::StorageError;
use libsurecast::fallback::{PendingResult, SecondaryResult};
use libsurecast::sequencer::StepResult;
use libsurecast::store;
use libsurecast::{Channel, Content, Outcome, PublishPipeline, Result, SurecastError};
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "surecast-post")]
#[command(version, about = "Publish content to a social platform, exactly once in effect")]
#[command(long_about = r#"Publish content to a social platform, exactly once in effect.

The primary post is created (unless identical text is already live on the
channel), then the reply is attached to it. If the platform rejects the post
for good, the content is saved as a pending item and a copy is sent to the
configured fallback chat.

EXAMPLES:
    surecast-post "Launch A" --reply "More at X"
    surecast-post "Launch A" --media-url https://example.com/banner.png
    echo "Launch A" | surecast-post --channel linkedin
    surecast-post "Launch A" --format json | jq .outcome
    surecast-post --list-pending

EXIT CODES:
    0 - Published (a failed reply still counts as published)
    1 - Failed (fell back after retries, configuration or storage error)
    2 - Rejected by the platform (fell back, or media upload refused)
    3 - Invalid input (empty or over-long content)
"#)]
struct Cli {
    /// Primary text to publish (reads from stdin if not provided)
    content: Option<String>,

    /// Reply to attach to the primary post
    #[arg(short, long, default_value = "")]
    reply: String,

    /// Destination channel (twitter, telegram, linkedin)
    #[arg(short, long, default_value = "twitter")]
    channel: Channel,

    /// Media id from a prior platform upload
    #[arg(short, long, value_name = "MEDIA_ID")]
    attachment: Option<String>,

    /// Image to upload and attach before publishing
    #[arg(long, value_name = "URL", conflicts_with = "attachment")]
    media_url: Option<String>,

    /// Configuration file
    #[arg(long, env = "SURECAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// List pending items instead of publishing
    #[arg(long)]
    list_pending: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libsurecast::logging::init_default(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.list_pending {
        let config = load_config(cli.config.as_deref())?;
        list_pending(&config, &cli.format).await?;
        return Ok(0);
    }

    let primary = read_content(cli.content.as_deref())?;
    validate(&primary, cli.channel)?;
    let config = load_config(cli.config.as_deref())?;

    let pipeline = PublishPipeline::from_config(&config).await?;

    let media_id = match cli.media_url {
        Some(url) => Some(pipeline.resolve_media(cli.channel, &url).await?),
        None => cli.attachment,
    };
    let mut content = Content::new(cli.channel, primary, cli.reply);
    if let Some(media_id) = media_id {
        content = content.with_attachment(media_id);
    }

    tracing::debug!("Publishing to {}", content.destination_channel);

    let outcome = pipeline.publish(&content).await;

    match cli.format.as_str() {
        "json" => print_json(&outcome)?,
        _ => print_text(&outcome),
    }

    Ok(outcome.exit_code())
}

fn read_content(arg: Option<&str>) -> Result<String> {
    let text = match arg {
        Some(text) => text.to_string(),
        None => {
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                return Err(SurecastError::InvalidInput(
                    "No content provided. Pass it as an argument or pipe it on stdin".to_string(),
                ));
            }
            let mut buffer = String::new();
            stdin
                .lock()
                .read_to_string(&mut buffer)
                .map_err(|e| SurecastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
            buffer
        }
    };

    Ok(text.trim_end_matches(['\n', '\r']).to_string())
}

fn validate(primary: &str, channel: Channel) -> Result<()> {
    if primary.trim().is_empty() {
        return Err(SurecastError::InvalidInput("Content cannot be empty".to_string()));
    }
    let length = primary.chars().count();
    if length > channel.character_limit() {
        return Err(SurecastError::InvalidInput(format!(
            "Content is {} characters, {} allows at most {}",
            length,
            channel,
            channel.character_limit()
        )));
    }
    Ok(())
}

async fn list_pending(config: &Config, format: &str) -> Result<()> {
    let stores = store::open(&config.storage).await?;
    let items = stores.pending.list().await?;

    if format == "json" {
        return print_json(&items);
    }
    for item in items {
        println!(
            "{} | {} | {} | {}",
            item.created_at.format("%Y-%m-%d %H:%M:%S"),
            item.channel,
            item.id,
            item.failure_reason
        );
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(StorageError::Serialization)?;
    println!("{}", json);
    Ok(())
}

fn describe_step(step: &StepResult) -> String {
    match step {
        StepResult::Success {
            remote_id: Some(id),
            mutated,
            ..
        } => {
            if *mutated {
                format!("{} (with uniqueness suffix)", id)
            } else {
                id.clone()
            }
        }
        StepResult::Success { remote_id: None, .. } => "accepted, no id returned".to_string(),
        StepResult::Reused { remote_id } => format!("{} (already live)", remote_id),
        StepResult::Skipped { reason } => format!("skipped: {}", reason),
        StepResult::Failed { error } => format!("failed: {}", error),
    }
}

fn print_text(outcome: &Outcome) {
    match outcome {
        Outcome::Published {
            channel,
            create,
            reply,
        } => {
            println!("{}: {}", channel, describe_step(create));
            println!("  reply: {}", describe_step(reply));
        }
        Outcome::FellBack {
            channel,
            reason,
            fallback,
        } => {
            println!("{}: failed: {}", channel, reason);
            match &fallback.pending {
                PendingResult::Saved { location } => println!("  pending: {}", location),
                PendingResult::Failed { error } => println!("  pending: not saved: {}", error),
            }
            match &fallback.secondary {
                SecondaryResult::Delivered { channel, remote_id } => println!(
                    "  fallback: delivered via {} {}",
                    channel,
                    remote_id.as_deref().unwrap_or("")
                ),
                SecondaryResult::NotConfigured => println!("  fallback: not configured"),
                SecondaryResult::Failed { channel, error } => {
                    println!("  fallback: {} failed: {}", channel, error)
                }
            }
        }
    }
}
