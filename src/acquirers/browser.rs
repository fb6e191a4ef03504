//! Headless Chromium session shared by the browser strategies.
//!
//! [`BrowserSession`] owns the browser process, its CDP handler task and the
//! page that drives the e-paper form. Callers release it with
//! [`BrowserSession::close`] on every path after a successful launch; `Drop`
//! stops the handler task if a caller unwinds before reaching `close`.

use crate::error::AcquireError;
use crate::models::{EditionSpec, RunDate};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// CSS selectors of the download form.
#[derive(Debug, Clone)]
pub struct FormSelectors {
    pub date: String,
    pub language: String,
    pub publication: String,
    pub edition: String,
    pub download_button: String,
}

impl Default for FormSelectors {
    fn default() -> Self {
        Self {
            date: "#date".to_string(),
            language: "#language".to_string(),
            publication: "#newspaper".to_string(),
            edition: "#edition".to_string(),
            download_button: "#downloadBtn".to_string(),
        }
    }
}

/// Settings shared by both browser strategies.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub site_url: Url,
    pub edition: EditionSpec,
    /// Where Chromium saves downloads; the artifact ends up here too.
    pub output_dir: PathBuf,
    /// Explicit Chromium binary; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub selectors: FormSelectors,
    pub navigation_timeout: Duration,
    /// Pause after navigation before touching the form.
    pub settle_delay: Duration,
    /// Pause after each form field.
    pub step_delay: Duration,
}

impl BrowserOptions {
    /// Production defaults for `site_url`, writing into `output_dir`.
    pub fn new(site_url: Url, edition: EditionSpec, output_dir: PathBuf) -> Self {
        Self {
            site_url,
            edition,
            output_dir,
            chrome_path: None,
            headless: true,
            selectors: FormSelectors::default(),
            navigation_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_secs(2),
            step_delay: Duration::from_millis(500),
        }
    }
}

/// What the in-page setter script reports back.
#[derive(Debug, Deserialize)]
struct FieldOutcome {
    found: bool,
    applied: bool,
}

/// A launched browser with one page open.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    opts: BrowserOptions,
    download_dir: PathBuf,
}

impl BrowserSession {
    /// Launch Chromium and open a blank page.
    #[instrument(level = "info", skip_all, fields(headless = opts.headless))]
    pub async fn launch(opts: &BrowserOptions) -> Result<Self, AcquireError> {
        let download_dir = std::fs::canonicalize(&opts.output_dir)
            .map_err(|e| AcquireError::io(&opts.output_dir, e))?;

        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !opts.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &opts.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(AcquireError::Launch)?;

        info!("Setting up browser");
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AcquireError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler stopped");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                return Err(e.into());
            }
        };

        Ok(Self {
            browser,
            page,
            handler,
            opts: opts.clone(),
            download_dir,
        })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Absolute download directory handed to Chromium.
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Let the browser save downloads into the download directory.
    ///
    /// With `with_events`, files are saved under their download GUID and
    /// `Browser.downloadWillBegin` / `Browser.downloadProgress` are emitted.
    /// Without, files keep their suggested names and no events fire.
    pub async fn allow_downloads(&self, with_events: bool) -> Result<(), AcquireError> {
        let behavior = if with_events {
            SetDownloadBehaviorBehavior::AllowAndName
        } else {
            SetDownloadBehaviorBehavior::Allow
        };
        let params = SetDownloadBehaviorParams::builder()
            .behavior(behavior)
            .download_path(self.download_dir.to_string_lossy().into_owned())
            .events_enabled(with_events)
            .build()
            .map_err(AcquireError::Launch)?;
        self.browser.execute(params).await?;
        debug!(dir = %self.download_dir.display(), with_events, "Downloads enabled");
        Ok(())
    }

    /// Navigate to the landing page and let it settle.
    #[instrument(level = "info", skip_all, fields(url = %self.opts.site_url))]
    pub async fn open_form_page(&self) -> Result<(), AcquireError> {
        info!("Navigating to website");
        let limit = self.opts.navigation_timeout;
        match timeout(limit, self.page.goto(self.opts.site_url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(AcquireError::Timeout { waited: limit }),
        }
        if let Err(e) = self.page.wait_for_navigation().await {
            warn!(error = %e, "Waiting for navigation failed; continuing");
        }
        sleep(self.opts.settle_delay).await;
        Ok(())
    }

    /// Fill the date and pick language, publication and edition.
    #[instrument(level = "info", skip_all, fields(%date))]
    pub async fn fill_form(&self, date: &RunDate) -> Result<(), AcquireError> {
        info!(date = %date.iso(), "Filling form");
        let s = &self.opts.selectors;
        let e = &self.opts.edition;
        let fields = [
            (&s.date, date.iso()),
            (&s.language, e.language.clone()),
            (&s.publication, e.publication.clone()),
            (&s.edition, e.edition.clone()),
        ];
        for (selector, value) in fields {
            self.set_field(selector, &value).await?;
            sleep(self.opts.step_delay).await;
        }
        // Dependent dropdowns on the page refresh after the last pick.
        sleep(self.opts.step_delay).await;
        Ok(())
    }

    /// Click the download control.
    pub async fn click_download(&self) -> Result<(), AcquireError> {
        let selector = &self.opts.selectors.download_button;
        info!(%selector, "Clicking download button");
        let button = self
            .page
            .find_element(selector.as_str())
            .await
            .map_err(|_| AcquireError::ElementNotFound(selector.clone()))?;
        button.click().await?;
        Ok(())
    }

    /// Shut the browser down and wait for the process to exit.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Waiting for browser exit failed");
        }
        self.handler.abort();
        debug!("Browser closed");
    }

    async fn set_field(&self, selector: &str, value: &str) -> Result<(), AcquireError> {
        let script = field_setter_script(selector, value);
        let outcome: FieldOutcome = self
            .page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|e| AcquireError::Launch(format!("unexpected script result: {e}")))?;

        if !outcome.found {
            return Err(AcquireError::ElementNotFound(selector.to_string()));
        }
        if !outcome.applied {
            return Err(AcquireError::SelectionRejected {
                selector: selector.to_string(),
                value: value.to_string(),
            });
        }
        debug!(%selector, %value, "Field set");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Script that sets an input or select and fires `input`/`change`.
///
/// A `<select>` silently ignores values it has no option for, so reading the
/// value back tells a rejected selection apart from an accepted one.
fn field_setter_script(selector: &str, value: &str) -> String {
    let selector = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".into());
    let value = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".into());
    format!(
        r#"(() => {{
    const el = document.querySelector({selector});
    if (!el) return {{ found: false, applied: false }};
    el.focus();
    el.value = {value};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return {{ found: true, applied: el.value === {value} }};
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selectors_match_site_form() {
        let s = FormSelectors::default();
        assert_eq!(s.date, "#date");
        assert_eq!(s.language, "#language");
        assert_eq!(s.publication, "#newspaper");
        assert_eq!(s.edition, "#edition");
        assert_eq!(s.download_button, "#downloadBtn");
    }

    #[test]
    fn test_field_setter_script_quotes_inputs() {
        let script = field_setter_script("#edition", "mum\"bai");
        assert!(script.contains(r##"document.querySelector("#edition")"##));
        assert!(script.contains(r#"el.value = "mum\"bai";"#));
        assert!(script.contains("applied: el.value === \"mum\\\"bai\""));
    }

    #[test]
    fn test_field_outcome_deserializes() {
        let v: FieldOutcome = serde_json::from_str(r#"{"found":true,"applied":false}"#).unwrap();
        assert!(v.found);
        assert!(!v.applied);
    }

    #[test]
    fn test_browser_options_defaults() {
        let opts = BrowserOptions::new(
            Url::parse("https://www.tradingref.com/mint").unwrap(),
            EditionSpec::default(),
            PathBuf::from("."),
        );
        assert!(opts.headless);
        assert_eq!(opts.navigation_timeout, Duration::from_secs(60));
        assert_eq!(opts.settle_delay, Duration::from_secs(2));
    }
}
