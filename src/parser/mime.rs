//! MIME message parsing: raw header lines plus the decoded content tree.

use mail_parser::{MessageParser, MimeHeaders, PartType};

use crate::error::{Result, SearchError};
use crate::model::message::{MimeContent, MimeMessage, MimePart, RawHeader};
use crate::parser::header::decode_header_bytes;

/// Nested `message/rfc822` parts deeper than this are kept as opaque leaves.
const MAX_DEPTH: usize = 10;

/// Parse a complete raw message (headers + body) into a [`MimeMessage`].
///
/// Header lines are taken from the raw bytes so that folding and the
/// original encoded-words survive; the content tree comes from `mail-parser`.
pub fn parse_message(raw_message: &[u8]) -> Result<MimeMessage> {
    let message_bytes = skip_from_line(raw_message);

    let parsed = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| SearchError::MimeError("Failed to parse message".into()))?;

    Ok(convert_message(&parsed, message_bytes, 0))
}

fn convert_message(msg: &mail_parser::Message<'_>, raw: &[u8], depth: usize) -> MimeMessage {
    let body = if msg.parts.is_empty() {
        MimePart::text("text/plain", Some("utf-8"), Vec::new())
    } else {
        convert_part(msg, 0, depth)
    };
    let charset = body.charset.clone();
    let headers = extract_raw_headers(raw, charset.as_deref());
    MimeMessage::new(headers, body)
}

fn convert_part(msg: &mail_parser::Message<'_>, part_id: usize, depth: usize) -> MimePart {
    let Some(part) = msg.parts.get(part_id) else {
        return MimePart::text("text/plain", None, Vec::new());
    };

    let (mime_type, declared_charset) = match part.content_type() {
        Some(ct) => {
            let mime = match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            };
            (mime.to_lowercase(), ct.attribute("charset").map(str::to_string))
        }
        None => ("text/plain".to_string(), None),
    };

    match &part.body {
        // mail-parser has already converted text to UTF-8
        PartType::Text(text) | PartType::Html(text) => {
            let mime = if mime_type.starts_with("text/") {
                mime_type
            } else if matches!(part.body, PartType::Html(_)) {
                "text/html".to_string()
            } else {
                "text/plain".to_string()
            };
            MimePart::text(&mime, Some("utf-8"), text.as_bytes().to_vec())
        }
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => MimePart {
            mime_type,
            charset: declared_charset,
            content: MimeContent::Binary(bytes.len()),
        },
        PartType::Multipart(children) => MimePart::multipart(
            &mime_type,
            children
                .iter()
                .map(|&child| convert_part(msg, child, depth))
                .collect(),
        ),
        PartType::Message(inner) => {
            if depth >= MAX_DEPTH {
                return MimePart {
                    mime_type,
                    charset: None,
                    content: MimeContent::Binary(inner.raw_message.len()),
                };
            }
            let nested = convert_message(inner, &inner.raw_message, depth + 1);
            MimePart {
                mime_type,
                charset: None,
                content: MimeContent::Message(Box::new(nested)),
            }
        }
    }
}

/// Skip the `From ` separator line at the start of MBOX messages.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Split the header block (everything before the first blank line) into
/// raw header lines. Continuation lines stay attached to their header with
/// the line break preserved.
pub fn extract_raw_headers(data: &[u8], charset: Option<&str>) -> Vec<RawHeader> {
    let end = header_block_end(data);
    let text = decode_header_bytes(&data[..end], charset);

    let mut headers: Vec<RawHeader> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = headers.last_mut() {
                last.value.push('\n');
                last.value.push_str(line);
            }
        } else if let Some(colon) = line.find(':') {
            headers.push(RawHeader {
                name: line[..colon].trim().to_string(),
                value: line[colon + 1..].trim_start().to_string(),
            });
        }
    }
    headers
}

fn header_block_end(data: &[u8]) -> usize {
    let lf = data.windows(2).position(|w| w == b"\n\n").map(|p| p + 1);
    let crlf = data.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 2);
    match (lf, crlf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => data.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
        let plain = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(plain), plain);
    }

    #[test]
    fn test_extract_raw_headers_keeps_folding() {
        let data = b"From: alice@example.com\nSubject: a long\n\tsubject\n\nBody here\n";
        let headers = extract_raw_headers(data, None);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].name, "From");
        assert_eq!(headers[1].value, "a long\n\tsubject");
    }

    #[test]
    fn test_parse_plain_message() {
        let raw = b"From: alice@example.com\nSubject: Hi\nContent-Type: text/plain; charset=utf-8\n\nHello body\n";
        let msg = parse_message(raw).expect("parse");
        assert_eq!(msg.header("subject"), Some("Hi"));
        assert!(msg.body.is_text());
        match &msg.body.content {
            MimeContent::Text(bytes) => {
                assert!(String::from_utf8_lossy(bytes).contains("Hello body"))
            }
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn test_parse_multipart_message() {
        let raw = b"From: a@b.c\n\
Subject: multi\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"XX\"\n\
\n\
--XX\n\
Content-Type: text/plain\n\
\n\
first part\n\
--XX\n\
Content-Type: application/octet-stream\n\
Content-Transfer-Encoding: base64\n\
\n\
AAECAw==\n\
--XX--\n";
        let msg = parse_message(raw).expect("parse");
        assert_eq!(msg.body.mime_type, "multipart/mixed");
        let MimeContent::Multipart(parts) = &msg.body.content else {
            panic!("expected multipart");
        };
        assert_eq!(parts.len(), 2);
        assert!(parts[0].is_text());
        assert!(matches!(parts[1].content, MimeContent::Binary(_)));
    }
}
