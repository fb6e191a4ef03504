//! Browser acquisition that polls the download directory.
//!
//! Same page interaction as the event strategy, but instead of subscribing to
//! download events we scan the output directory on a fixed interval for a new
//! `.pdf` that is not an in-progress download. The directory may already
//! hold unrelated PDFs, so only files created after the click count and the
//! newest one wins.

use super::browser::{BrowserOptions, BrowserSession};
use super::Acquirer;
use crate::error::AcquireError;
use crate::models::{PdfArtifact, RunDate};
use crate::utils::move_into_place;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

/// Suffixes browsers give files that are still being written.
///
/// Chromium `.crdownload`, Firefox `.part`, Edge `.partial`,
/// Safari `.download`, plus generic `.tmp`.
pub const PARTIAL_SUFFIXES: &[&str] = &["crdownload", "part", "partial", "download", "tmp"];

/// Filesystem timestamps come from a coarser clock than `SystemTime::now()`.
const CLOCK_SLACK: Duration = Duration::from_secs(1);

/// Polling browser strategy.
#[derive(Debug, Clone)]
pub struct BrowserPoll {
    browser: BrowserOptions,
    download_timeout: Duration,
    poll_interval: Duration,
}

impl BrowserPoll {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    pub fn new(browser: BrowserOptions, download_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            browser,
            download_timeout,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn drive(
        &self,
        session: &BrowserSession,
        date: &RunDate,
    ) -> Result<PdfArtifact, AcquireError> {
        session.allow_downloads(false).await?;
        session.open_form_page().await?;
        session.fill_form(date).await?;

        let since = click_baseline(SystemTime::now());
        session.click_download().await?;

        let dir = session.download_dir();
        let found = poll_for_download(dir, since, self.poll_interval, self.download_timeout).await?;

        let final_path = dir.join(self.browser.edition.artifact_file_name(date));
        move_into_place(&found, &final_path)
            .await
            .map_err(|e| AcquireError::io(&found, e))?;

        info!(path = %final_path.display(), "PDF downloaded");
        PdfArtifact::confirm(final_path, *date).await
    }
}

impl Acquirer for BrowserPoll {
    fn name(&self) -> &'static str {
        "browser-poll"
    }

    #[instrument(level = "info", skip_all, fields(strategy = "browser-poll", %date))]
    async fn acquire(&self, date: &RunDate) -> Result<PdfArtifact, AcquireError> {
        let session = BrowserSession::launch(&self.browser).await?;
        let outcome = self.drive(&session, date).await;
        session.close().await;
        outcome
    }
}

/// A file seen in the download directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    pub path: PathBuf,
    /// Creation time, or modification time where the platform lacks it.
    pub created: SystemTime,
    pub len: u64,
}

/// Whether `path` names an in-progress download.
pub fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PARTIAL_SUFFIXES.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Earliest creation time a download triggered at `now` may carry.
pub fn click_baseline(now: SystemTime) -> SystemTime {
    now.checked_sub(CLOCK_SLACK).unwrap_or(now)
}

/// The newest finished, non-empty PDF created at or after `since`.
pub fn select_latest_pdf(entries: &[DownloadEntry], since: SystemTime) -> Option<&DownloadEntry> {
    entries
        .iter()
        .filter(|e| e.created >= since && e.len > 0)
        .filter(|e| is_pdf(&e.path) && !is_partial(&e.path))
        .max_by_key(|e| e.created)
}

/// The newest in-progress download created at or after `since`.
pub fn newest_partial(entries: &[DownloadEntry], since: SystemTime) -> Option<&DownloadEntry> {
    entries
        .iter()
        .filter(|e| e.created >= since && is_partial(&e.path))
        .max_by_key(|e| e.created)
}

/// List regular files in `dir` with their creation times.
pub async fn scan_dir(dir: &Path) -> std::io::Result<Vec<DownloadEntry>> {
    let mut entries = Vec::new();
    let mut rd = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let Ok(meta) = entry.metadata().await else {
            // Vanished between listing and stat; the browser renamed it.
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push(DownloadEntry {
            path: entry.path(),
            created,
            len: meta.len(),
        });
    }
    Ok(entries)
}

/// Poll `dir` every `interval` until a finished PDF shows up or `bound` passes.
///
/// On timeout, partial files created since `since` are deleted and the error
/// says whether something was still downloading.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), ?interval, ?bound))]
pub async fn poll_for_download(
    dir: &Path,
    since: SystemTime,
    interval: Duration,
    bound: Duration,
) -> Result<PathBuf, AcquireError> {
    let deadline = Instant::now() + bound;
    loop {
        let entries = scan_dir(dir).await.map_err(|e| AcquireError::io(dir, e))?;
        if let Some(found) = select_latest_pdf(&entries, since) {
            info!(path = %found.path.display(), bytes = found.len, "Found downloaded PDF");
            return Ok(found.path.clone());
        }

        let partial = newest_partial(&entries, since).map(|e| e.path.clone());
        if Instant::now() >= deadline {
            cleanup_partials(&entries, since).await;
            return Err(match partial {
                Some(partial) => {
                    warn!(path = %partial.display(), "Download still in progress at timeout");
                    AcquireError::DownloadStalled {
                        partial,
                        waited: bound,
                    }
                }
                None => AcquireError::NothingDownloaded { waited: bound },
            });
        }

        debug!(in_progress = partial.is_some(), "No finished PDF yet");
        sleep(interval.min(deadline.saturating_duration_since(Instant::now()))).await;
    }
}

async fn cleanup_partials(entries: &[DownloadEntry], since: SystemTime) {
    for entry in entries
        .iter()
        .filter(|e| e.created >= since && is_partial(&e.path))
    {
        match tokio::fs::remove_file(&entry.path).await {
            Ok(()) => debug!(path = %entry.path.display(), "Removed partial download"),
            Err(e) => warn!(path = %entry.path.display(), error = %e, "Could not remove partial download"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, secs_ago: u64, now: SystemTime) -> DownloadEntry {
        DownloadEntry {
            path: PathBuf::from(name),
            created: now - Duration::from_secs(secs_ago),
            len: 1024,
        }
    }

    #[test]
    fn test_selects_newest_complete_pdf() {
        let now = SystemTime::now();
        let entries = vec![
            entry("a.pdf", 10, now),
            entry("b.pdf.partial", 1, now),
            entry("c.pdf", 5, now),
        ];
        let since = now - Duration::from_secs(60);

        let picked = select_latest_pdf(&entries, since).unwrap();
        assert_eq!(picked.path, PathBuf::from("c.pdf"));
    }

    #[test]
    fn test_file_stamped_just_before_click_is_kept() {
        let click = SystemTime::now();
        let early = DownloadEntry {
            path: PathBuf::from("paper.pdf"),
            created: click - Duration::from_millis(4),
            len: 1024,
        };
        let entries = vec![early];

        assert!(select_latest_pdf(&entries, click).is_none());
        let picked = select_latest_pdf(&entries, click_baseline(click)).unwrap();
        assert_eq!(picked.path, PathBuf::from("paper.pdf"));
    }

    #[test]
    fn test_ignores_files_older_than_click() {
        let now = SystemTime::now();
        let entries = vec![entry("yesterday.pdf", 3600, now)];
        assert!(select_latest_pdf(&entries, now - Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_ignores_empty_and_non_pdf_files() {
        let now = SystemTime::now();
        let mut empty = entry("empty.pdf", 1, now);
        empty.len = 0;
        let entries = vec![empty, entry("notes.txt", 1, now), entry("x.pdf.crdownload", 1, now)];
        assert!(select_latest_pdf(&entries, now - Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_partial_suffixes() {
        assert!(is_partial(Path::new("Unconfirmed 123.crdownload")));
        assert!(is_partial(Path::new("mint.pdf.part")));
        assert!(is_partial(Path::new("mint.pdf.partial")));
        assert!(is_partial(Path::new("mint.pdf.download")));
        assert!(!is_partial(Path::new("mint.pdf")));
        assert!(!is_partial(Path::new("README")));
    }

    #[test]
    fn test_uppercase_extension_counts_as_pdf() {
        let now = SystemTime::now();
        let entries = vec![entry("MINT.PDF", 1, now)];
        assert!(select_latest_pdf(&entries, now - Duration::from_secs(5)).is_some());
    }

    #[tokio::test]
    async fn test_poll_finds_file_written_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let since = SystemTime::now() - Duration::from_secs(1);
        let target = dir.path().join("mint.pdf");
        let writer_target = target.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            tokio::fs::write(writer_target, b"%PDF-1.7").await.unwrap();
        });

        let found = poll_for_download(
            dir.path(),
            since,
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(found.file_name(), target.file_name());
    }

    #[tokio::test]
    async fn test_poll_times_out_with_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let err = poll_for_download(
            dir.path(),
            SystemTime::now(),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AcquireError::NothingDownloaded { .. }));
    }

    #[tokio::test]
    async fn test_poll_reports_stalled_download_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let since = SystemTime::now() - Duration::from_secs(1);
        let partial = dir.path().join("mint.pdf.crdownload");
        std::fs::write(&partial, b"%PDF-half").unwrap();

        let err = poll_for_download(
            dir.path(),
            since,
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();

        match err {
            AcquireError::DownloadStalled { partial: p, .. } => {
                assert_eq!(p.file_name(), partial.file_name())
            }
            other => panic!("expected DownloadStalled, got {other:?}"),
        }
        assert!(!partial.exists());
    }
}
