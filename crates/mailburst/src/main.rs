//! `mailburst` - send one message to many recipients.
//!
//! Usage: `mailburst <subject> <body> <recipient>...`

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailburst::{Config, DispatchPool};

/// Send one message to many recipients over SMTP.
///
/// Server and credentials come from `SMTP_SERVER`, `SMTP_PORT`,
/// `MAIL_FROM`, `MAIL_PASS` and the optional `SMTP_USER` and
/// `MAILBURST_*` variables.
#[derive(Parser, Debug)]
#[command(name = "mailburst")]
#[command(version)]
struct Cli {
    /// Subject line
    subject: String,

    /// Plain-text body
    body: String,

    /// Recipient addresses, one message each
    #[arg(required = true)]
    recipients: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailburst=info,mailburst_smtp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Cli {
        subject,
        body,
        recipients,
    } = Cli::parse();

    let config = Config::from_env().context("loading configuration")?;
    info!(
        server = %config.host,
        port = config.port,
        workers = config.workers,
        recipients = recipients.len(),
        "starting mailburst"
    );

    let pool = DispatchPool::from_config(&config);
    let messages = recipients
        .iter()
        .map(|to| pool.message(to.as_str(), subject.as_str(), body.as_str()))
        .collect();

    let results = pool.process_all(messages).await?;
    let failed = results.iter().filter(|result| !result.success).count();

    for result in &results {
        if let Some(e) = &result.error {
            error!(
                id = result.message.id,
                to = %result.message.to,
                attempts = result.attempts,
                error = %e,
                "not delivered"
            );
        } else {
            info!(
                id = result.message.id,
                to = %result.message.to,
                attempts = result.attempts,
                elapsed = ?result.elapsed,
                completed_at = %result.completed_at.format("%H:%M:%S"),
                "delivered"
            );
        }
    }

    info!(sent = results.len() - failed, failed, "dispatch finished");

    if failed > 0 {
        bail!("{failed} of {} messages failed", results.len());
    }
    Ok(())
}
