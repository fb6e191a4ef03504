//! Error types for the acquisition and delivery stages.
//!
//! Each stage returns its own error enum instead of panicking or bubbling a
//! boxed error. The driver branches on [`AcquireError::kind`] and
//! [`NotifyError::kind`] to decide what to report.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Broad classification of an acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireErrorKind {
    /// Host unreachable, bad status, timeout, or a response that is not a PDF.
    Network,
    /// Page element missing, value rejected, or no download observed.
    Interaction,
    /// Writing or renaming the file on local storage failed.
    Storage,
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("not a PDF (HTTP {status}, content-type {content_type:?}){}", page_title_suffix(.title))]
    NotPdf {
        status: u16,
        content_type: String,
        title: Option<String>,
    },

    #[error("download produced an empty file: {}", .0.display())]
    EmptyDownload(PathBuf),

    #[error("could not launch browser: {0}")]
    Launch(String),

    #[error("browser protocol error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("page element not found: {0}")]
    ElementNotFound(String),

    #[error("{selector} rejected value {value:?}")]
    SelectionRejected { selector: String, value: String },

    #[error("browser canceled the download")]
    DownloadCanceled,

    #[error("nothing was downloaded within {waited:?}")]
    NothingDownloaded { waited: Duration },

    #[error("download still in progress after {waited:?}: {}", .partial.display())]
    DownloadStalled { partial: PathBuf, waited: Duration },

    #[error("download did not complete within {waited:?}")]
    Timeout { waited: Duration },

    #[error("file system error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn page_title_suffix(title: &Option<String>) -> String {
    title
        .as_ref()
        .map(|t| format!(", page title {t:?}"))
        .unwrap_or_default()
}

impl AcquireError {
    pub fn kind(&self) -> AcquireErrorKind {
        match self {
            AcquireError::InvalidUrl(_)
            | AcquireError::Http(_)
            | AcquireError::Status { .. }
            | AcquireError::NotPdf { .. }
            | AcquireError::EmptyDownload(_) => AcquireErrorKind::Network,
            AcquireError::Launch(_)
            | AcquireError::Browser(_)
            | AcquireError::ElementNotFound(_)
            | AcquireError::SelectionRejected { .. }
            | AcquireError::DownloadCanceled
            | AcquireError::NothingDownloaded { .. }
            | AcquireError::DownloadStalled { .. }
            | AcquireError::Timeout { .. } => AcquireErrorKind::Interaction,
            AcquireError::Io { .. } => AcquireErrorKind::Storage,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AcquireError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Broad classification of a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyErrorKind {
    /// Required setting absent or malformed; no connection was attempted.
    Configuration,
    /// Attachment unreadable, or the mail server refused or failed the send.
    Delivery,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("missing required setting {0}")]
    MissingConfig(&'static str),

    #[error("invalid email address {value:?}: {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("could not read attachment {}: {source}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not build message: {0}")]
    Compose(String),

    #[error("mail server rejected the submission: {0}")]
    Rejected(String),

    #[error("mail transport failed: {0}")]
    Transport(String),
}

impl NotifyError {
    pub fn kind(&self) -> NotifyErrorKind {
        match self {
            NotifyError::MissingConfig(_) | NotifyError::InvalidAddress { .. } => {
                NotifyErrorKind::Configuration
            }
            NotifyError::Attachment { .. }
            | NotifyError::Compose(_)
            | NotifyError::Rejected(_)
            | NotifyError::Transport(_) => NotifyErrorKind::Delivery,
        }
    }

    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Transport(_))
    }
}

impl fmt::Display for AcquireErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AcquireErrorKind::Network => "network",
            AcquireErrorKind::Interaction => "interaction",
            AcquireErrorKind::Storage => "storage",
        })
    }
}

impl fmt::Display for NotifyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyErrorKind::Configuration => "configuration",
            NotifyErrorKind::Delivery => "delivery",
        })
    }
}
