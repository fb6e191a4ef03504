//! Data models shared by the acquisition and delivery stages.
//!
//! - [`RunDate`]: the single calendar date a run operates on
//! - [`EditionSpec`]: which language/publication/edition to request
//! - [`PdfArtifact`]: a confirmed, complete PDF on local storage
//!
//! The run date is resolved once by the driver and threaded through both
//! stages so the downloaded file name and the email subject always agree.

use crate::error::AcquireError;
use crate::utils::upcase;
use chrono::{Local, NaiveDate};
use std::fmt;
use std::path::{Path, PathBuf};

/// The calendar date a run downloads and mails the paper for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDate(NaiveDate);

impl RunDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Today's date in the local timezone.
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    /// `YYYY-MM-DD`, the format the site's date input and download URL use.
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// `dd_Mon_yyyy`, used in artifact file names.
    pub fn file_stem(&self) -> String {
        self.0.format("%d_%b_%Y").to_string()
    }

    /// `Mon dd, yyyy`, used in the email subject.
    pub fn subject_form(&self) -> String {
        self.0.format("%b %d, %Y").to_string()
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iso())
    }
}

/// The form values identifying one edition of one newspaper.
///
/// Values are the site's `<option value>` strings, e.g. `english`,
/// `mint`, `mumbai`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditionSpec {
    pub language: String,
    pub publication: String,
    pub edition: String,
}

impl Default for EditionSpec {
    fn default() -> Self {
        Self {
            language: "english".to_string(),
            publication: "mint".to_string(),
            edition: "mumbai".to_string(),
        }
    }
}

impl EditionSpec {
    /// Human-facing publication name ("Mint").
    pub fn publication_name(&self) -> String {
        upcase(&self.publication)
    }

    /// Human-facing edition name ("Mumbai").
    pub fn edition_name(&self) -> String {
        upcase(&self.edition)
    }

    /// Deterministic artifact file name, e.g. `Mint_Mumbai_07_Mar_2024.pdf`.
    pub fn artifact_file_name(&self, date: &RunDate) -> String {
        format!(
            "{}_{}_{}.pdf",
            self.publication_name(),
            self.edition_name(),
            date.file_stem()
        )
    }
}

/// A downloaded newspaper PDF.
///
/// Only obtainable through [`PdfArtifact::confirm`], so holding one means the
/// file existed and was non-empty when the download finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfArtifact {
    path: PathBuf,
    date: RunDate,
}

impl PdfArtifact {
    /// Check that `path` is a non-empty regular file and wrap it.
    pub async fn confirm(path: impl Into<PathBuf>, date: RunDate) -> Result<Self, AcquireError> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|source| AcquireError::Io {
                path: path.clone(),
                source,
            })?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(AcquireError::EmptyDownload(path));
        }
        Ok(Self { path, date })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn date(&self) -> &RunDate {
        &self.date
    }

    /// The bare file name, used as the attachment name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "newspaper.pdf".to_string())
    }
}
