//! Browser acquisition that waits on CDP download events.
//!
//! Downloads are saved under their GUID with events enabled. After clicking
//! the download button we wait for `Browser.downloadProgress` to report the
//! download as completed, then rename `<dir>/<guid>` to the artifact name.

use super::browser::{BrowserOptions, BrowserSession};
use super::Acquirer;
use crate::error::AcquireError;
use crate::models::{PdfArtifact, RunDate};
use crate::utils::move_into_place;
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
};
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Event-driven browser strategy.
#[derive(Debug, Clone)]
pub struct BrowserEvent {
    browser: BrowserOptions,
    download_timeout: Duration,
}

impl BrowserEvent {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(browser: BrowserOptions, download_timeout: Duration) -> Self {
        Self {
            browser,
            download_timeout,
        }
    }

    async fn drive(
        &self,
        session: &BrowserSession,
        date: &RunDate,
    ) -> Result<PdfArtifact, AcquireError> {
        session.allow_downloads(true).await?;
        // Subscribe before the click so no event can slip past.
        let mut began = session
            .browser()
            .event_listener::<EventDownloadWillBegin>()
            .await?;
        let mut progress = session
            .browser()
            .event_listener::<EventDownloadProgress>()
            .await?;

        session.open_form_page().await?;
        session.fill_form(date).await?;
        session.click_download().await?;

        let mut started: Option<String> = None;
        let waited = timeout(
            self.download_timeout,
            wait_for_completion(&mut began, &mut progress, &mut started),
        )
        .await;

        let guid = match waited {
            Ok(result) => result?,
            Err(_) => {
                return Err(match started {
                    Some(guid) => {
                        let partial = session.download_dir().join(&guid);
                        if tokio::fs::remove_file(&partial).await.is_ok() {
                            debug!(path = %partial.display(), "Removed unfinished download");
                        }
                        AcquireError::Timeout {
                            waited: self.download_timeout,
                        }
                    }
                    None => AcquireError::NothingDownloaded {
                        waited: self.download_timeout,
                    },
                });
            }
        };

        let downloaded: PathBuf = session.download_dir().join(&guid);
        let final_path = session
            .download_dir()
            .join(self.browser.edition.artifact_file_name(date));
        move_into_place(&downloaded, &final_path)
            .await
            .map_err(|e| AcquireError::io(&downloaded, e))?;

        info!(path = %final_path.display(), "PDF downloaded");
        PdfArtifact::confirm(final_path, *date).await
    }
}

impl Acquirer for BrowserEvent {
    fn name(&self) -> &'static str {
        "browser-event"
    }

    #[instrument(level = "info", skip_all, fields(strategy = "browser-event", %date))]
    async fn acquire(&self, date: &RunDate) -> Result<PdfArtifact, AcquireError> {
        let session = BrowserSession::launch(&self.browser).await?;
        let outcome = self.drive(&session, date).await;
        session.close().await;
        outcome
    }
}

/// Consume download events until the first download finishes.
///
/// `started` records the GUID of the first download that began so the
/// caller can clean up after a timeout. Progress events for other GUIDs are
/// ignored once a download has begun.
async fn wait_for_completion<B, P>(
    began: &mut B,
    progress: &mut P,
    started: &mut Option<String>,
) -> Result<String, AcquireError>
where
    B: Stream<Item = Arc<EventDownloadWillBegin>> + Unpin,
    P: Stream<Item = Arc<EventDownloadProgress>> + Unpin,
{
    let mut began_open = true;
    loop {
        tokio::select! {
            ev = began.next(), if began_open => match ev {
                Some(ev) => {
                    info!(guid = %ev.guid, file = %ev.suggested_filename, "Download started");
                    started.get_or_insert_with(|| ev.guid.clone());
                }
                None => began_open = false,
            },
            ev = progress.next() => {
                let Some(ev) = ev else {
                    return Err(AcquireError::NothingDownloaded { waited: Duration::ZERO });
                };
                if started.as_deref().is_some_and(|g| g != ev.guid) {
                    continue;
                }
                match ev.state {
                    DownloadProgressState::Completed => {
                        info!(guid = %ev.guid, bytes = ev.received_bytes, "Download completed");
                        return Ok(ev.guid.clone());
                    }
                    DownloadProgressState::Canceled => {
                        warn!(guid = %ev.guid, "Download canceled");
                        return Err(AcquireError::DownloadCanceled);
                    }
                    DownloadProgressState::InProgress => {
                        debug!(received = ev.received_bytes, total = ev.total_bytes, "Download progress");
                    }
                }
            }
        }
    }
}
