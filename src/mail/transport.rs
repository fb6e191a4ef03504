//! Mail submission transports.
//!
//! [`MailTransport`] is the seam between composing a message and putting it
//! on the wire. [`SmtpRelay`] submits over SMTP with STARTTLS; tests plug in
//! counting fakes instead.

use crate::error::NotifyError;
use lettre::transport::smtp::AsyncSmtpTransportBuilder;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Login for the submission server.
#[derive(Clone)]
pub struct SmtpLogin {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SmtpLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Something that can submit one finished message.
pub trait MailTransport {
    /// Open a connection, authenticate, send `message`, and close.
    async fn submit(&self, login: &SmtpLogin, message: Message) -> Result<(), NotifyError>;
}

/// SMTP submission with STARTTLS (port 587 by default).
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl SmtpRelay {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(60),
        }
    }
}

impl SmtpRelay {
    /// Apply the relay's port and timeout to a transport builder.
    fn configure(&self, builder: AsyncSmtpTransportBuilder) -> AsyncSmtpTransportBuilder {
        builder.port(self.port).timeout(Some(self.timeout))
    }
}

impl MailTransport for SmtpRelay {
    #[instrument(level = "info", skip_all, fields(host = %self.host, port = self.port))]
    async fn submit(&self, login: &SmtpLogin, message: Message) -> Result<(), NotifyError> {
        // Unpooled: each send opens its own connection. It sends QUIT before
        // returning, and on failure the connection is dropped.
        let builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(classify)?
            .credentials(Credentials::new(
                login.username.clone(),
                login.password.clone(),
            ));
        deliver(self.configure(builder).build(), message).await
    }
}

async fn deliver(
    transport: AsyncSmtpTransport<Tokio1Executor>,
    message: Message,
) -> Result<(), NotifyError> {
    let t0 = Instant::now();
    match transport.send(message).await {
        Ok(response) => {
            info!(
                positive = response.is_positive(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Mail server accepted message"
            );
            Ok(())
        }
        Err(e) => {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "SMTP submission failed");
            Err(classify(e))
        }
    }
}

/// Permanent (5xx, including failed authentication) and client-side errors
/// are final; anything else may be retried.
fn classify(e: lettre::transport::smtp::Error) -> NotifyError {
    if e.is_permanent() || e.is_client() {
        NotifyError::Rejected(e.to_string())
    } else {
        NotifyError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn test_login_debug_redacts_password() {
        let login = SmtpLogin {
            username: "sender@gmail.com".into(),
            password: "abcd efgh ijkl mnop".into(),
        };
        let shown = format!("{login:?}");
        assert!(shown.contains("sender@gmail.com"));
        assert!(!shown.contains("abcd"));
    }

    #[test]
    fn test_relay_defaults() {
        let relay = SmtpRelay::new("smtp.gmail.com", 587);
        assert_eq!(relay.host, "smtp.gmail.com");
        assert_eq!(relay.port, 587);
        assert_eq!(relay.timeout, Duration::from_secs(60));
    }

    /// A minimal SMTP server that accepts one message and records whether the
    /// client said QUIT.
    async fn fake_server(listener: TcpListener, quit: Arc<AtomicBool>) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"220 localhost ESMTP\r\n").await.unwrap();

        let mut in_data = false;
        while let Ok(Some(line)) = lines.next_line().await {
            if in_data {
                if line == "." {
                    in_data = false;
                    write.write_all(b"250 queued\r\n").await.unwrap();
                }
                continue;
            }
            let verb = line.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
            let reply: &[u8] = match verb.as_str() {
                "EHLO" | "HELO" => b"250 localhost\r\n",
                "MAIL" | "RCPT" | "RSET" | "NOOP" => b"250 ok\r\n",
                "DATA" => {
                    in_data = true;
                    b"354 go ahead\r\n"
                }
                "QUIT" => {
                    quit.store(true, Ordering::SeqCst);
                    write.write_all(b"221 bye\r\n").await.unwrap();
                    break;
                }
                _ => b"500 unknown\r\n",
            };
            write.write_all(reply).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_connection_is_closed_after_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let quit = Arc::new(AtomicBool::new(false));
        let server = tokio::spawn(fake_server(listener, quit.clone()));

        let relay = SmtpRelay::new("127.0.0.1", port);
        let transport = relay
            .configure(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("127.0.0.1"))
            .build();
        let message = Message::builder()
            .from("sender@gmail.com".parse().unwrap())
            .to("reader@example.com".parse().unwrap())
            .subject("Mint Epaper - Mar 07, 2024")
            .body("hello".to_string())
            .unwrap();

        deliver(transport, message).await.unwrap();

        assert!(quit.load(Ordering::SeqCst), "QUIT must be sent before returning");
        server.await.unwrap();
    }
}
