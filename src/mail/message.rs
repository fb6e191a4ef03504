//! Building the outgoing email.

use crate::error::NotifyError;
use crate::models::RunDate;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::Message;

/// `"<Publication> Epaper - Mon dd, yyyy"`.
pub fn subject_line(publication: &str, date: &RunDate) -> String {
    format!("{publication} Epaper - {}", date.subject_form())
}

/// `"Your daily <Publication> newspaper is attached."`.
pub fn body_text(publication: &str) -> String {
    format!("Your daily {publication} newspaper is attached.")
}

pub fn parse_mailbox(value: &str) -> Result<Mailbox, NotifyError> {
    value.parse().map_err(|e: lettre::address::AddressError| NotifyError::InvalidAddress {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Everything that goes into one delivery.
#[derive(Debug, Clone)]
pub struct Outgoing<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

/// Compose a `multipart/mixed` message: a plain-text body plus the PDF.
///
/// The attachment is always base64, even for a PDF that happens to be all
/// ASCII.
pub fn compose(out: Outgoing<'_>) -> Result<Message, NotifyError> {
    let from = parse_mailbox(out.from)?;
    let to = parse_mailbox(out.to)?;
    let pdf = ContentType::parse("application/pdf")
        .map_err(|e| NotifyError::Compose(e.to_string()))?;
    let attachment = Body::new_with_encoding(out.attachment, ContentTransferEncoding::Base64)
        .map_err(|_| NotifyError::Compose("attachment cannot be base64 encoded".to_string()))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(out.subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(out.body))
                .singlepart(Attachment::new(out.attachment_name).body(attachment, pdf)),
        )
        .map_err(|e| NotifyError::Compose(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::NaiveDate;

    fn march_7() -> RunDate {
        RunDate::new(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap())
    }

    fn pdf_bytes() -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
        for i in 0..4096u32 {
            bytes.push((i * 31 % 256) as u8);
        }
        bytes.extend_from_slice(b"\n%%EOF\n");
        bytes
    }

    fn outgoing(bytes: Vec<u8>) -> Outgoing<'static> {
        Outgoing {
            from: "sender@gmail.com",
            to: "reader@example.com",
            subject: subject_line("Mint", &march_7()),
            body: body_text("Mint"),
            attachment_name: "Mint_Mumbai_07_Mar_2024.pdf".to_string(),
            attachment: bytes,
        }
    }

    /// Decode the single base64 attachment out of a formatted message.
    fn extract_attachment(raw: &str) -> Vec<u8> {
        let start = raw
            .find("Content-Disposition: attachment")
            .expect("attachment part");
        let part = &raw[start..];
        let body_start = part.find("\r\n\r\n").expect("part body") + 4;
        let body = &part[body_start..];
        let body_end = body.find("\r\n--").expect("closing boundary");
        let encoded: String = body[..body_end]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        STANDARD.decode(encoded).expect("valid base64")
    }

    #[test]
    fn test_subject_and_body() {
        assert_eq!(subject_line("Mint", &march_7()), "Mint Epaper - Mar 07, 2024");
        assert_eq!(body_text("Mint"), "Your daily Mint newspaper is attached.");
    }

    #[test]
    fn test_attachment_bytes_survive_encoding() {
        let bytes = pdf_bytes();
        let message = compose(outgoing(bytes.clone())).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert_eq!(raw.matches("Content-Disposition: attachment").count(), 1);
        assert!(raw.contains("Mint_Mumbai_07_Mar_2024.pdf"));
        assert!(raw.contains("Content-Type: application/pdf"));
        assert!(raw.contains("Content-Transfer-Encoding: base64"));
        assert!(raw.contains("Subject: Mint Epaper - Mar 07, 2024"));
        assert!(raw.contains("Your daily Mint newspaper is attached."));
        assert_eq!(extract_attachment(&raw), bytes);
    }

    #[test]
    fn test_ascii_only_pdf_is_still_base64() {
        let bytes = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\nxref\n0 1\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n".to_vec();
        let message = compose(outgoing(bytes.clone())).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Content-Transfer-Encoding: base64"));
        assert_eq!(extract_attachment(&raw), bytes);
    }

    #[test]
    fn test_invalid_recipient_is_rejected() {
        let mut out = outgoing(pdf_bytes());
        out.to = "not an address";
        let err = compose(out).unwrap_err();
        assert!(matches!(err, NotifyError::InvalidAddress { .. }));
    }
}
