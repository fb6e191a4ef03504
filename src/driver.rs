//! One run: acquire, then deliver.
//!
//! The acquirer runs to completion first; the notifier is only invoked when
//! acquisition produced an artifact. Errors from either stage come back as
//! a [`RunOutcome`] instead of ending the process.

use crate::acquirers::Acquirer;
use crate::error::{AcquireError, NotifyError};
use crate::mail::Notify;
use crate::models::{PdfArtifact, RunDate};
use std::time::Instant;
use tracing::{error, info, instrument};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Delivered(PdfArtifact),
    AcquisitionFailed(AcquireError),
    DeliveryFailed(PdfArtifact, NotifyError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Delivered(_))
    }

    /// One-line summary for the console.
    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Delivered(artifact) => {
                format!("✅ All done! Check your email for {}.", artifact.file_name())
            }
            RunOutcome::AcquisitionFailed(e) => {
                format!("❌ Could not download PDF ({} error: {e})", e.kind())
            }
            RunOutcome::DeliveryFailed(_, e) => {
                format!("❌ Failed to send email ({} error: {e})", e.kind())
            }
        }
    }
}

/// Run one acquisition followed, on success, by one delivery.
#[instrument(level = "info", skip_all, fields(%date, strategy = acquirer.name()))]
pub async fn run<A, N>(acquirer: &A, notifier: &N, date: &RunDate) -> RunOutcome
where
    A: Acquirer,
    N: Notify,
{
    let t0 = Instant::now();
    info!("Acquiring PDF");
    let artifact = match acquirer.acquire(date).await {
        Ok(artifact) => artifact,
        Err(e) => {
            error!(kind = %e.kind(), error = %e, "Error downloading PDF");
            return RunOutcome::AcquisitionFailed(e);
        }
    };
    info!(
        path = %artifact.path().display(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "PDF acquired"
    );

    match notifier.notify(&artifact).await {
        Ok(()) => {
            info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Run complete");
            RunOutcome::Delivered(artifact)
        }
        Err(e) => {
            error!(kind = %e.kind(), error = %e, "Error sending email");
            RunOutcome::DeliveryFailed(artifact, e)
        }
    }
}
