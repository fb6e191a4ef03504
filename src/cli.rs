//! Command-line interface definitions for the Mint e-paper mailer.
//!
//! All arguments can be provided via command-line flags or environment
//! variables. A `.env` file in the working directory is loaded first.

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How to obtain the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    /// Plain HTTP against a guessed download URL (best effort)
    Direct,
    /// Headless Chromium, waiting on download events
    BrowserEvent,
    /// Headless Chromium, polling the download directory
    BrowserPoll,
}

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Today's paper, default browser strategy, settings from .env
/// mint_epaper
///
/// # A specific date via the HTTP strategy into ./papers
/// mint_epaper --strategy direct --date 2024-03-07 -o ./papers
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Acquisition strategy
    #[arg(short, long, env = "MINT_STRATEGY", value_enum, default_value_t = StrategyKind::BrowserEvent)]
    pub strategy: StrategyKind,

    /// Directory the PDF is saved to
    #[arg(short, long, env = "MINT_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Paper date as YYYY-MM-DD (defaults to today)
    #[arg(short, long, env = "MINT_DATE")]
    pub date: Option<NaiveDate>,

    /// Landing page with the download form
    #[arg(long, env = "MINT_SITE_URL", default_value = "https://www.tradingref.com/mint")]
    pub site_url: String,

    /// Language option value
    #[arg(long, default_value = "english")]
    pub language: String,

    /// Newspaper option value
    #[arg(long, default_value = "mint")]
    pub publication: String,

    /// Edition option value
    #[arg(long, default_value = "mumbai")]
    pub edition: String,

    /// Seconds to wait for the download (120 for browser-event, 60 for browser-poll, 30 per request for direct)
    #[arg(long, env = "MINT_DOWNLOAD_TIMEOUT")]
    pub download_timeout: Option<u64>,

    /// Seconds between directory scans (browser-poll, default 2)
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Chromium executable (auto-detected when unset)
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Run the browser with a visible window
    #[arg(long)]
    pub show_browser: bool,

    /// SMTP submission host
    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    /// SMTP submission port (STARTTLS)
    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    /// Extra attempts after a transient mail failure
    #[arg(long, default_value_t = 2)]
    pub mail_retries: usize,

    /// Sender address
    #[arg(long, env = "GMAIL_USER")]
    pub sender: Option<String>,

    /// Sender app password
    #[arg(long, env = "GMAIL_APP_PASSWORD", hide_env_values = true)]
    pub app_password: Option<String>,

    /// Recipient address
    #[arg(long, env = "RECEIVER_EMAIL")]
    pub recipient: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["mint_epaper"]);

        assert_eq!(cli.strategy, StrategyKind::BrowserEvent);
        assert_eq!(cli.site_url, "https://www.tradingref.com/mint");
        assert_eq!(cli.language, "english");
        assert_eq!(cli.publication, "mint");
        assert_eq!(cli.edition, "mumbai");
        assert_eq!(cli.poll_interval, None);
        assert_eq!(cli.mail_retries, 2);
    }

    #[test]
    fn test_cli_strategy_and_date() {
        let cli = Cli::parse_from([
            "mint_epaper",
            "--strategy",
            "browser-poll",
            "--date",
            "2024-03-07",
            "-o",
            "/tmp/papers",
            "--smtp-port",
            "2525",
        ]);

        assert_eq!(cli.strategy, StrategyKind::BrowserPoll);
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 3, 7));
        assert_eq!(cli.output_dir, PathBuf::from("/tmp/papers"));
        assert_eq!(cli.smtp_port, 2525);
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(["mint_epaper", "--date", "07-03-2024"]).is_err());
    }
}
