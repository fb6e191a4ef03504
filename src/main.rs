//! # Mint e-paper mailer
//!
//! Downloads the day's *Mint* newspaper PDF (English, Mumbai edition) from
//! tradingref.com and emails it as an attachment.
//!
//! ## Usage
//!
//! ```sh
//! GMAIL_USER=me@gmail.com GMAIL_APP_PASSWORD=... RECEIVER_EMAIL=you@example.com mint_epaper
//! ```
//!
//! ## Architecture
//!
//! 1. **Acquire**: one of three strategies fetches the PDF (see [`acquirers`])
//! 2. **Deliver**: the PDF is mailed over SMTP with STARTTLS (see [`mail`])
//!
//! The run date is resolved once here and passed to both stages.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;

mod acquirers;
mod cli;
mod driver;
mod error;
mod mail;
mod models;
mod utils;

use acquirers::{
    BrowserEvent, BrowserOptions, BrowserPoll, DirectOptions, DirectRequest, Strategy,
};
use cli::{Cli, StrategyKind};
use mail::{MailSettings, Notifier, RetryTransport, SmtpRelay};
use models::{EditionSpec, RunDate};
use utils::ensure_writable_dir;

const BANNER: &str = "==================================================";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "Loaded .env");
    }

    let args = Cli::parse();
    debug!(?args.strategy, ?args.output_dir, ?args.date, "Parsed CLI arguments");

    println!("{BANNER}");
    println!("🗞️  Mint Newspaper Automation");
    println!("{BANNER}");

    let date = args.date.map(RunDate::new).unwrap_or_else(RunDate::today);
    info!(%date, local_time = %Local::now().time(), "Run date resolved");

    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let edition = EditionSpec {
        language: args.language.clone(),
        publication: args.publication.clone(),
        edition: args.edition.clone(),
    };
    let strategy = build_strategy(&args, &edition)?;
    info!(strategy = ?args.strategy, "Acquisition strategy selected");

    let settings = MailSettings {
        sender: args.sender.clone(),
        app_password: args.app_password.clone(),
        recipient: args.recipient.clone(),
        publication: edition.publication_name(),
    };
    let transport = RetryTransport::new(
        SmtpRelay::new(args.smtp_host.clone(), args.smtp_port),
        args.mail_retries,
        Duration::from_secs(1),
    );
    let notifier = Notifier::new(settings, transport);

    let outcome = driver::run(&strategy, &notifier, &date).await;

    println!();
    println!("{}", outcome.summary());
    println!("{BANNER}");

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Turn the parsed arguments into the selected acquisition strategy.
fn build_strategy(args: &Cli, edition: &EditionSpec) -> Result<Strategy, Box<dyn Error>> {
    let site_url = Url::parse(&args.site_url)?;
    let timeout = args.download_timeout.map(Duration::from_secs);

    let mut browser = BrowserOptions::new(site_url.clone(), edition.clone(), args.output_dir.clone());
    browser.chrome_path = args.chrome_path.clone();
    browser.headless = !args.show_browser;

    Ok(match args.strategy {
        StrategyKind::Direct => Strategy::Direct(DirectRequest::new(DirectOptions {
            site_url,
            edition: edition.clone(),
            output_dir: args.output_dir.clone(),
            warmup_delay: Duration::from_secs(2),
            request_timeout: timeout.unwrap_or(Duration::from_secs(30)),
        })),
        StrategyKind::BrowserEvent => Strategy::BrowserEvent(BrowserEvent::new(
            browser,
            timeout.unwrap_or(BrowserEvent::DEFAULT_TIMEOUT),
        )),
        StrategyKind::BrowserPoll => Strategy::BrowserPoll(BrowserPoll::new(
            browser,
            timeout.unwrap_or(BrowserPoll::DEFAULT_TIMEOUT),
            args.poll_interval
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(BrowserPoll::DEFAULT_INTERVAL),
        )),
    })
}
