//! Normalizes Gmail API message payloads into [`ParsedMessage`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{TimeZone, Utc};
use mailparse::MailAddr;

use super::types::{GmailMessage, GmailPayload};
use super::{ParsedAttachment, ParsedMessage};
use crate::models::message::{is_read_from_labels, is_starred_from_labels};

pub fn parse_message(msg: &GmailMessage) -> ParsedMessage {
    let labels = msg.label_ids.clone().unwrap_or_default();

    let subject = header(msg, "Subject");
    let (from_name, from_email) = match header(msg, "From") {
        Some(raw) => parse_sender(&raw),
        None => (None, String::new()),
    };
    let to_emails = header(msg, "To").map(|h| parse_address_list(&h)).unwrap_or_default();
    let cc_emails = header(msg, "Cc").map(|h| parse_address_list(&h)).unwrap_or_default();
    let bcc_emails = header(msg, "Bcc").map(|h| parse_address_list(&h)).unwrap_or_default();

    let received_at = msg
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    let mut body_text = None;
    let mut body_html = None;
    let mut attachments = Vec::new();
    if let Some(payload) = &msg.payload {
        collect_parts(payload, &mut body_text, &mut body_html, &mut attachments);
    }

    ParsedMessage {
        gmail_message_id: msg.id.clone(),
        gmail_thread_id: msg.thread_id.clone(),
        subject,
        snippet: msg.snippet.clone(),
        from_email,
        from_name,
        to_emails,
        cc_emails,
        bcc_emails,
        body_html,
        body_text,
        received_at,
        is_read: is_read_from_labels(&labels),
        is_starred: is_starred_from_labels(&labels),
        labels,
        attachments,
    }
}

fn header(msg: &GmailMessage, name: &str) -> Option<String> {
    msg.payload
        .as_ref()?
        .headers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// `"Name" <addr>` / `Name <addr>` / bare address → (name, email).
/// Anything unparseable keeps the raw header as the address.
pub fn parse_sender(raw: &str) -> (Option<String>, String) {
    let raw = raw.trim();
    if let Ok(addrs) = mailparse::addrparse(raw) {
        for addr in addrs.iter() {
            if let MailAddr::Single(single) = addr {
                if single.addr.contains('@') {
                    let name = single
                        .display_name
                        .as_deref()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string);
                    return (name, single.addr.clone());
                }
            }
        }
    }
    (None, raw.to_string())
}

pub fn parse_address_list(raw: &str) -> Vec<String> {
    match mailparse::addrparse(raw.trim()) {
        Ok(addrs) => addrs
            .iter()
            .flat_map(|a| match a {
                MailAddr::Single(s) => vec![s.addr.clone()],
                MailAddr::Group(g) => g.addrs.iter().map(|s| s.addr.clone()).collect(),
            })
            .filter(|a| a.contains('@'))
            .collect(),
        Err(_) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| s.contains('@'))
            .map(str::to_string)
            .collect(),
    }
}

fn collect_parts(
    payload: &GmailPayload,
    body_text: &mut Option<String>,
    body_html: &mut Option<String>,
    attachments: &mut Vec<ParsedAttachment>,
) {
    let mime_type = payload
        .mime_type
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase();
    let filename = payload.filename.as_deref().unwrap_or("");

    if !filename.is_empty() {
        let attachment_id = payload
            .body
            .as_ref()
            .and_then(|b| b.attachment_id.clone())
            .unwrap_or_default();
        attachments.push(ParsedAttachment {
            gmail_attachment_id: attachment_id,
            filename: filename.to_string(),
            mime_type: if mime_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                mime_type.clone()
            },
            size: payload.body.as_ref().and_then(|b| b.size).unwrap_or(0),
            content_id: part_header(payload, "Content-ID")
                .map(|v| v.trim().trim_matches(['<', '>']).to_string())
                .filter(|v| !v.is_empty()),
            is_inline: part_header(payload, "Content-Disposition")
                .map(|v| v.to_ascii_lowercase().contains("inline"))
                .unwrap_or(false),
        });
    } else if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        if !data.is_empty() {
            if let Some(decoded) = decode_body(data) {
                if mime_type == "text/plain" && body_text.is_none() {
                    *body_text = Some(decoded);
                } else if mime_type == "text/html" && body_html.is_none() {
                    *body_html = Some(decoded);
                }
            }
        }
    }

    if let Some(parts) = &payload.parts {
        for part in parts {
            collect_parts(part, body_text, body_html, attachments);
        }
    }
}

fn part_header(payload: &GmailPayload, name: &str) -> Option<String> {
    payload
        .headers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

fn decode_body(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_with_quoted_name() {
        let (name, email) = parse_sender("\"John Doe\" <john@example.com>");
        assert_eq!(name.as_deref(), Some("John Doe"));
        assert_eq!(email, "john@example.com");
    }

    #[test]
    fn sender_with_bare_name() {
        let (name, email) = parse_sender("Jane Roe <jane@example.com>");
        assert_eq!(name.as_deref(), Some("Jane Roe"));
        assert_eq!(email, "jane@example.com");
    }

    #[test]
    fn sender_plain_address() {
        let (name, email) = parse_sender("noreply@example.com");
        assert_eq!(name, None);
        assert_eq!(email, "noreply@example.com");
    }

    #[test]
    fn sender_unparseable_keeps_raw() {
        let (name, email) = parse_sender("mailer-daemon");
        assert_eq!(name, None);
        assert_eq!(email, "mailer-daemon");
    }

    #[test]
    fn address_list_splits_and_filters() {
        let addrs = parse_address_list("a@x.com, \"B, Person\" <b@y.com>");
        assert_eq!(addrs, vec!["a@x.com".to_string(), "b@y.com".to_string()]);
    }
}
