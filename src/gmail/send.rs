//! Outgoing MIME composition for the provider send endpoint.

use lettre::message::{MultiPart, SinglePart};
use lettre::Message;

use super::OutgoingMessage;
use crate::error::{Error, Result};

/// Hard cap the provider enforces on raw messages.
pub const MAX_MESSAGE_BYTES: usize = 25 * 1024 * 1024;

/// Builds the RFC 5322 message for a draft: multipart/alternative when an
/// HTML body is present, threading headers when a reply context is
/// supplied. Returns the raw bytes ready for base64url upload.
pub fn compose_mime(draft: &OutgoingMessage) -> Result<Vec<u8>> {
    if draft.to.is_empty() {
        return Err(Error::validation("at least one recipient is required"));
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(&draft.from)?)
        .subject(draft.subject.clone());
    for to in &draft.to {
        builder = builder.to(parse_mailbox(to)?);
    }
    for cc in &draft.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    for bcc in &draft.bcc {
        builder = builder.bcc(parse_mailbox(bcc)?);
    }
    if let Some(in_reply_to) = &draft.in_reply_to {
        builder = builder.in_reply_to(in_reply_to.clone());
        let references = draft.references.clone().unwrap_or_else(|| in_reply_to.clone());
        builder = builder.references(references);
    }

    let message = if let Some(html) = &draft.body_html {
        builder
            .multipart(MultiPart::alternative_plain_html(
                draft.body_text.clone(),
                html.clone(),
            ))
            .map_err(|e| Error::validation(format!("invalid message: {e}")))?
    } else {
        builder
            .singlepart(SinglePart::plain(draft.body_text.clone()))
            .map_err(|e| Error::validation(format!("invalid message: {e}")))?
    };

    let raw = message.formatted();
    if raw.len() > MAX_MESSAGE_BYTES {
        return Err(Error::validation("message exceeds the 25 MiB limit"));
    }
    Ok(raw)
}

fn parse_mailbox(addr: &str) -> Result<lettre::message::Mailbox> {
    addr.parse()
        .map_err(|_| Error::validation(format!("invalid address: {addr}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> OutgoingMessage {
        OutgoingMessage {
            from: "me@example.com".into(),
            to: vec!["you@example.com".into()],
            subject: "Weekly report".into(),
            body_text: "All green.".into(),
            ..Default::default()
        }
    }

    #[test]
    fn plain_text_message() {
        let raw = compose_mime(&draft()).unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.contains("Subject: Weekly report"));
        assert!(text.contains("To: you@example.com"));
        assert!(!text.contains("multipart/alternative"));
    }

    #[test]
    fn html_body_builds_multipart_alternative() {
        let mut d = draft();
        d.body_html = Some("<p>All green.</p>".into());
        let raw = compose_mime(&d).unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.contains("multipart/alternative"));
        assert!(text.contains("text/plain"));
        assert!(text.contains("text/html"));
    }

    #[test]
    fn reply_context_sets_threading_headers() {
        let mut d = draft();
        d.in_reply_to = Some("<abc123@mail.example.com>".into());
        let raw = compose_mime(&d).unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.contains("In-Reply-To: <abc123@mail.example.com>"));
        assert!(text.contains("References: <abc123@mail.example.com>"));
    }

    #[test]
    fn recipient_required() {
        let mut d = draft();
        d.to.clear();
        assert!(matches!(compose_mime(&d), Err(Error::Validation(_))));
    }

    #[test]
    fn invalid_address_rejected() {
        let mut d = draft();
        d.to = vec!["not an address".into()];
        assert!(matches!(compose_mime(&d), Err(Error::Validation(_))));
    }
}
