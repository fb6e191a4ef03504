//! Email delivery of the downloaded paper.
//!
//! [`Notifier`] turns a [`PdfArtifact`] into one email and hands it to a
//! [`MailTransport`]. Configuration is checked before anything else, so a
//! missing setting never costs a network connection.
//!
//! # Settings
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `GMAIL_USER` | Yes | Sender address, also the SMTP username |
//! | `GMAIL_APP_PASSWORD` | Yes | App-specific password for the sender |
//! | `RECEIVER_EMAIL` | Yes | Recipient address |
//!
//! The SMTP host and port come from the command line (`smtp.gmail.com:587`
//! by default).

pub mod message;
pub mod retry;
pub mod transport;

use crate::error::NotifyError;
use crate::models::PdfArtifact;
use message::{Outgoing, body_text, compose, subject_line};
use std::fmt;
use tracing::{info, instrument};
use transport::{MailTransport, SmtpLogin};

pub use retry::RetryTransport;
pub use transport::SmtpRelay;

pub const SENDER_VAR: &str = "GMAIL_USER";
pub const PASSWORD_VAR: &str = "GMAIL_APP_PASSWORD";
pub const RECIPIENT_VAR: &str = "RECEIVER_EMAIL";

/// Delivery settings as read from the environment; any may be missing.
#[derive(Clone, Default)]
pub struct MailSettings {
    pub sender: Option<String>,
    pub app_password: Option<String>,
    pub recipient: Option<String>,
    /// Display name used in the subject and body, e.g. "Mint".
    pub publication: String,
}

impl fmt::Debug for MailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSettings")
            .field("sender", &self.sender)
            .field("app_password", &self.app_password.as_ref().map(|_| "<redacted>"))
            .field("recipient", &self.recipient)
            .field("publication", &self.publication)
            .finish()
    }
}

/// Settings after validation: every required value present.
#[derive(Debug, Clone)]
struct ReadySettings {
    login: SmtpLogin,
    recipient: String,
}

impl MailSettings {
    fn validate(&self) -> Result<ReadySettings, NotifyError> {
        let sender = required(&self.sender, SENDER_VAR)?;
        let password = required(&self.app_password, PASSWORD_VAR)?;
        let recipient = required(&self.recipient, RECIPIENT_VAR)?;
        Ok(ReadySettings {
            login: SmtpLogin {
                username: sender.to_string(),
                password: password.to_string(),
            },
            recipient: recipient.to_string(),
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, NotifyError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(NotifyError::MissingConfig(name)),
    }
}

/// Something that can deliver the artifact.
pub trait Notify {
    async fn notify(&self, artifact: &PdfArtifact) -> Result<(), NotifyError>;
}

/// Emails the artifact through a [`MailTransport`].
#[derive(Debug)]
pub struct Notifier<T> {
    settings: MailSettings,
    transport: T,
}

impl<T: MailTransport> Notifier<T> {
    pub fn new(settings: MailSettings, transport: T) -> Self {
        Self {
            settings,
            transport,
        }
    }
}

impl<T: MailTransport> Notify for Notifier<T> {
    #[instrument(level = "info", skip_all, fields(path = %artifact.path().display()))]
    async fn notify(&self, artifact: &PdfArtifact) -> Result<(), NotifyError> {
        let ready = self.settings.validate()?;

        let bytes = tokio::fs::read(artifact.path())
            .await
            .map_err(|source| NotifyError::Attachment {
                path: artifact.path().to_path_buf(),
                source,
            })?;

        let publication = &self.settings.publication;
        let message = compose(Outgoing {
            from: &ready.login.username,
            to: &ready.recipient,
            subject: subject_line(publication, artifact.date()),
            body: body_text(publication),
            attachment_name: artifact.file_name(),
            attachment: bytes,
        })?;

        info!(recipient = %ready.recipient, "Sending email");
        self.transport.submit(&ready.login, message).await?;
        info!(recipient = %ready.recipient, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunDate;
    use chrono::NaiveDate;
    use lettre::Message;
    use std::sync::Mutex;

    /// Records every submission instead of connecting anywhere.
    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl Recording {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl MailTransport for &Recording {
        async fn submit(&self, login: &SmtpLogin, message: Message) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((login.username.clone(), message.formatted()));
            Ok(())
        }
    }

    fn settings() -> MailSettings {
        MailSettings {
            sender: Some("sender@gmail.com".into()),
            app_password: Some("abcd efgh ijkl mnop".into()),
            recipient: Some("reader@example.com".into()),
            publication: "Mint".into(),
        }
    }

    async fn artifact(dir: &std::path::Path) -> PdfArtifact {
        let path = dir.join("Mint_Mumbai_07_Mar_2024.pdf");
        std::fs::write(&path, b"%PDF-1.7\n\xFF\xFE\x00binary").unwrap();
        let date = RunDate::new(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        PdfArtifact::confirm(path, date).await.unwrap()
    }

    #[tokio::test]
    async fn test_sends_one_message() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact(dir.path()).await;
        let transport = Recording::default();

        Notifier::new(settings(), &transport)
            .notify(&artifact)
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "sender@gmail.com");
        let raw = String::from_utf8_lossy(&sent[0].1);
        assert!(raw.contains("Subject: Mint Epaper - Mar 07, 2024"));
        assert!(raw.contains("To: reader@example.com"));
    }

    #[tokio::test]
    async fn test_missing_setting_makes_no_connection() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact(dir.path()).await;

        let cases: [(fn(&mut MailSettings), &str); 3] = [
            (|s| s.sender = None, SENDER_VAR),
            (|s| s.app_password = None, PASSWORD_VAR),
            (|s| s.recipient = Some("   ".into()), RECIPIENT_VAR),
        ];
        for (clear, var) in cases {
            let mut s = settings();
            clear(&mut s);
            let transport = Recording::default();

            let err = Notifier::new(s, &transport)
                .notify(&artifact)
                .await
                .unwrap_err();

            assert!(matches!(err, NotifyError::MissingConfig(name) if name == var));
            assert_eq!(transport.count(), 0);
        }
    }

    #[tokio::test]
    async fn test_unreadable_attachment_fails_before_sending() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact(dir.path()).await;
        std::fs::remove_file(artifact.path()).unwrap();
        let transport = Recording::default();

        let err = Notifier::new(settings(), &transport)
            .notify(&artifact)
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::Attachment { .. }));
        assert_eq!(transport.count(), 0);
    }

    #[test]
    fn test_settings_debug_redacts_password() {
        let shown = format!("{:?}", settings());
        assert!(!shown.contains("abcd"));
        assert!(shown.contains("<redacted>"));
    }
}
