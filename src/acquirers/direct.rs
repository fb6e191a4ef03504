//! Direct-request acquisition.
//!
//! Visits the landing page with a cookie-holding session, then asks for a
//! download URL built from the date and edition:
//!
//! ```text
//! https://www.tradingref.com/download/<publication>/<YYYY-MM-DD>/<edition>/<language>
//! ```
//!
//! The pattern is a guess at the site's backend and is not guaranteed to be
//! stable, so a response only counts when its content type says PDF. An HTML
//! error page served with `200 OK` is a failure.

use super::Acquirer;
use crate::error::AcquireError;
use crate::models::{EditionSpec, PdfArtifact, RunDate};
use crate::utils::{move_into_place, truncate_for_log};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, REFERER};
use scraper::{Html, Selector};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/131.0.0.0 Safari/537.36";

/// Settings for [`DirectRequest`].
#[derive(Debug, Clone)]
pub struct DirectOptions {
    /// Landing page visited first to pick up cookies.
    pub site_url: Url,
    pub edition: EditionSpec,
    pub output_dir: PathBuf,
    /// Pause between the landing page and the download request.
    pub warmup_delay: Duration,
    pub request_timeout: Duration,
}

/// HTTP-only strategy: no browser, one session, two GETs.
#[derive(Debug, Clone)]
pub struct DirectRequest {
    opts: DirectOptions,
}

impl DirectRequest {
    pub fn new(opts: DirectOptions) -> Self {
        Self { opts }
    }

    /// The guessed download endpoint for `date`.
    pub fn download_url(&self, date: &RunDate) -> Result<Url, AcquireError> {
        let e = &self.opts.edition;
        let path = format!(
            "/download/{}/{}/{}/{}",
            e.publication,
            date.iso(),
            e.edition,
            e.language
        );
        Ok(self.opts.site_url.join(&path)?)
    }

    fn session(&self) -> Result<reqwest::Client, AcquireError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,application/pdf,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        if let Ok(referer) = HeaderValue::from_str(self.opts.site_url.as_str()) {
            headers.insert(REFERER, referer);
        }

        Ok(reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(self.opts.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?)
    }
}

impl Acquirer for DirectRequest {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[instrument(level = "info", skip_all, fields(strategy = "direct", %date))]
    async fn acquire(&self, date: &RunDate) -> Result<PdfArtifact, AcquireError> {
        let download_url = self.download_url(date)?;
        // Dropped on every return below, which closes pooled connections.
        let client = self.session()?;

        info!(url = %self.opts.site_url, "Opening session on landing page");
        let landing = client.get(self.opts.site_url.clone()).send().await?;
        debug!(status = landing.status().as_u16(), "Landing page answered");
        sleep(self.opts.warmup_delay).await;

        info!(url = %download_url, "Requesting PDF");
        let response = client.get(download_url.clone()).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !status.is_success() {
            warn!(status = status.as_u16(), %content_type, "Download request failed");
            return Err(AcquireError::Status {
                url: download_url.to_string(),
                status: status.as_u16(),
            });
        }

        if !is_pdf_content_type(&content_type) {
            let body = response.text().await.unwrap_or_default();
            let title = html_title(&body);
            warn!(
                status = status.as_u16(),
                %content_type,
                ?title,
                body_preview = %truncate_for_log(&body, 200),
                "Response is not a PDF"
            );
            return Err(AcquireError::NotPdf {
                status: status.as_u16(),
                content_type,
                title,
            });
        }

        let bytes = response.bytes().await?;
        let final_path = self
            .opts
            .output_dir
            .join(self.opts.edition.artifact_file_name(date));
        if bytes.is_empty() {
            return Err(AcquireError::EmptyDownload(final_path));
        }

        let part_path = final_path.with_extension("pdf.part");
        tokio::fs::write(&part_path, &bytes)
            .await
            .map_err(|e| AcquireError::io(&part_path, e))?;
        if let Err(e) = move_into_place(&part_path, &final_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(AcquireError::io(&final_path, e));
        }

        info!(path = %final_path.display(), bytes = bytes.len(), "PDF downloaded");
        PdfArtifact::confirm(final_path, *date).await
    }
}

/// Whether a `Content-Type` header value denotes a PDF.
///
/// Parameters such as `; charset=binary` are ignored and the comparison is
/// case-insensitive.
pub fn is_pdf_content_type(value: &str) -> bool {
    let essence = value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence == "application/pdf" || essence == "application/x-pdf"
}

/// Pull the `<title>` out of an HTML error page, if there is one.
fn html_title(body: &str) -> Option<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}
