//! PDF acquisition strategies.
//!
//! Every strategy implements [`Acquirer`]: given the run date, produce a
//! confirmed [`PdfArtifact`] or an [`AcquireError`]. Exactly one strategy is
//! picked per run from the command line.
//!
//! # Strategies
//!
//! | Strategy | Module | Method | Notes |
//! |----------|--------|--------|-------|
//! | `direct` | [`direct`] | Two HTTP GETs in one cookie session | Guessed URL, validated by content type |
//! | `browser-event` | [`event`] | Headless Chromium, download events | Default; waits up to 120 s |
//! | `browser-poll` | [`polling`] | Headless Chromium, directory polling | Every 2 s, up to 60 s |
//!
//! The browser strategies share the form-driving code in [`browser`].

pub mod browser;
pub mod direct;
pub mod event;
pub mod polling;

use crate::error::AcquireError;
use crate::models::{PdfArtifact, RunDate};

pub use browser::BrowserOptions;
pub use direct::{DirectOptions, DirectRequest};
pub use event::BrowserEvent;
pub use polling::BrowserPoll;

/// Something that can fetch the paper for a given date.
pub trait Acquirer {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Download the paper for `date`.
    ///
    /// Any resources opened (HTTP session, browser process) are released
    /// before this returns, whatever the outcome.
    async fn acquire(&self, date: &RunDate) -> Result<PdfArtifact, AcquireError>;
}

/// The strategy selected for this run.
#[derive(Debug, Clone)]
pub enum Strategy {
    Direct(DirectRequest),
    BrowserEvent(BrowserEvent),
    BrowserPoll(BrowserPoll),
}

impl Acquirer for Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::Direct(s) => s.name(),
            Strategy::BrowserEvent(s) => s.name(),
            Strategy::BrowserPoll(s) => s.name(),
        }
    }

    async fn acquire(&self, date: &RunDate) -> Result<PdfArtifact, AcquireError> {
        match self {
            Strategy::Direct(s) => s.acquire(date).await,
            Strategy::BrowserEvent(s) => s.acquire(date).await,
            Strategy::BrowserPoll(s) => s.acquire(date).await,
        }
    }
}
