mod analysis;
mod config;
mod error;
mod event;
mod http;
mod moderator;
mod platform;
mod server;
mod staging;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::analysis::language::NaturalLanguageClient;
use crate::analysis::vision::VisualRecognitionClient;
use crate::config::Config;
use crate::event::EventEnvelope;
use crate::moderator::Moderator;
use crate::platform::slack::SlackClient;

/// Command line: `slack-moderator [config.toml] [--event <file|->]`.
struct Args {
    config_path: PathBuf,
    event: Option<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut config_path = None;
    let mut event = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--event" {
            event = Some(args.next().context("--event needs a file path or '-'")?);
        } else if config_path.is_none() {
            config_path = Some(PathBuf::from(arg));
        } else {
            anyhow::bail!("Unexpected argument: {arg}");
        }
    }
    Ok(Args {
        config_path: config_path.unwrap_or_else(|| PathBuf::from("config.toml")),
        event,
    })
}

fn build_moderator(config: &Config) -> Result<Moderator> {
    let client = http::build_client(config.server.request_timeout())?;

    let slack = SlackClient::new(client.clone(), &config.slack);
    let vision = VisualRecognitionClient::new(client.clone(), config.visual_recognition.clone());
    let language = NaturalLanguageClient::new(client, &config.natural_language)?;

    let moderator = Moderator::new(
        config.slack.verification_token.clone(),
        Arc::new(slack),
        Arc::new(vision),
        Arc::new(language),
        config.moderation.clone(),
    );
    Ok(match &config.server.staging_dir {
        Some(dir) => moderator.with_staging_dir(dir.clone()),
        None => moderator,
    })
}

fn read_event(source: &str) -> Result<EventEnvelope> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("Failed to read event file: {source}"))?
    };
    let value = serde_json::from_str(&raw).context("Failed to parse event JSON")?;
    Ok(EventEnvelope::from_value(value))
}

/// Handle a single event and print the wire payload, like one function invocation.
async fn run_once(moderator: &Moderator, source: &str) -> Result<()> {
    let envelope = read_event(source)?;
    let outcome = moderator
        .handle(&envelope)
        .await
        .context("Event handling failed")?;
    info!("Outcome: {:?}", outcome);

    if let Some(response) = outcome.response() {
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,slack_moderator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    info!("Loading configuration from: {}", args.config_path.display());
    let config = Config::load(&args.config_path)
        .with_context(|| format!("Failed to load config from {}", args.config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Slack API: {}", config.slack.api_base);
    info!("  Visual Recognition: {}", config.visual_recognition.url);
    info!("  Natural Language: {}", config.natural_language.url);
    info!(
        "  Request timeout: {}s",
        config.server.request_timeout_secs
    );

    let moderator = build_moderator(&config)?;

    if let Some(source) = args.event {
        return run_once(&moderator, &source).await;
    }

    server::serve(&config.server.bind, Arc::new(moderator)).await
}
