//! Scanning decoded message bodies.

use regex::Regex;
use tracing::debug;

use crate::model::message::{MimeContent, MimeMessage, MimePart};
use crate::parser::header::decode_charset;
use crate::search::words::Words;
use crate::search::Cancellable;
use crate::store::folder::Folder;

/// Call `f` with the decoded text of every `text/*` leaf under `part`,
/// depth first. Stops as soon as `f` returns `false`; the return value tells
/// whether the walk ran to the end.
pub fn for_each_text(part: &MimePart, f: &mut dyn FnMut(&str) -> bool) -> bool {
    match &part.content {
        MimeContent::Text(bytes) => {
            if !part.is_text() {
                return true;
            }
            let charset = part.charset.as_deref().unwrap_or("utf-8");
            f(&decode_charset(charset, bytes, None))
        }
        MimeContent::Multipart(children) => children.iter().all(|child| for_each_text(child, f)),
        MimeContent::Message(inner) => for_each_text(&inner.body, f),
        MimeContent::Binary(_) => true,
    }
}

/// Whether the message text contains every word, case-insensitively.
///
/// Words may be found in different parts; scanning stops once all of them
/// have been seen.
pub fn message_contains_words(message: &MimeMessage, words: &Words) -> bool {
    let full = words.full_mask();
    if full == 0 {
        return true;
    }
    let mut mask = 0u32;
    for_each_text(&message.body, &mut |text| {
        let lowered = text.to_lowercase();
        for (i, word) in words.iter().enumerate() {
            if mask & (1 << i) == 0 && lowered.contains(&word.text) {
                mask |= 1 << i;
            }
        }
        mask != full
    });
    mask == full
}

/// Fetch a message and scan it for `words`. A message that cannot be
/// fetched does not match.
pub fn match_words_message(
    folder: &dyn Folder,
    uid: &str,
    words: &Words,
    cancel: &Cancellable,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    match folder.get_message(uid) {
        Ok(message) => message_contains_words(&message, words),
        Err(e) => {
            debug!(uid, error = %e, "Cannot fetch message for body search");
            false
        }
    }
}

/// Whether `regex` matches the decoded text of any `text/*` part.
pub fn message_matches_regex(message: &MimeMessage, regex: &Regex) -> bool {
    !for_each_text(&message.body, &mut |text| !regex.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::RawHeader;

    fn message() -> MimeMessage {
        let body = MimePart::multipart(
            "multipart/mixed",
            vec![
                MimePart::text("text/plain", Some("utf-8"), "Quarterly INVOICE attached"),
                MimePart::text("text/html", Some("iso-8859-1"), b"<p>Gr\xfc\xdfe</p>".to_vec()),
                MimePart {
                    mime_type: "application/pdf".into(),
                    charset: None,
                    content: MimeContent::Binary(4096),
                },
            ],
        );
        MimeMessage::new(vec![RawHeader::new("Subject", "hi")], body)
    }

    #[test]
    fn test_words_across_parts() {
        let msg = message();
        assert!(message_contains_words(&msg, &Words::split("invoice grüße").unwrap()));
        assert!(!message_contains_words(&msg, &Words::split("invoice refund").unwrap()));
    }

    #[test]
    fn test_phrase_with_space() {
        let msg = message();
        assert!(message_contains_words(&msg, &Words::split(r#""invoice attached""#).unwrap()));
    }

    #[test]
    fn test_nested_message_is_scanned() {
        let inner = MimeMessage::new(
            Vec::new(),
            MimePart::text("text/plain", None, "forwarded secret"),
        );
        let outer = MimeMessage::new(
            Vec::new(),
            MimePart {
                mime_type: "message/rfc822".into(),
                charset: None,
                content: MimeContent::Message(Box::new(inner)),
            },
        );
        assert!(message_contains_words(&outer, &Words::split("secret").unwrap()));
    }

    #[test]
    fn test_regex_over_text_parts() {
        let msg = message();
        assert!(message_matches_regex(&msg, &Regex::new("(?i)^quarterly").unwrap()));
        assert!(!message_matches_regex(&msg, &Regex::new("pdf").unwrap()));
    }
}
