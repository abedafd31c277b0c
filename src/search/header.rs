//! Header predicates over summaries and full messages.

use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::model::mail::MessageInfo;
use crate::model::message::{MimeMessage, RawHeader};
use crate::parser::header::{decode_encoded_words, unfold_value};
use crate::search::matcher::{header_match, HeaderKind, MatchMode};
use crate::search::words::Words;
use crate::store::folder::Folder;

/// Headers whose raw values are RFC 2047 decoded before regex matching.
const DECODED_HEADERS: [&str; 5] = ["from", "to", "cc", "bcc", "subject"];

/// The summary value of a header the summary record carries directly.
pub fn summary_header(info: &MessageInfo, name: &str) -> Option<(String, HeaderKind)> {
    let value = match name.to_ascii_lowercase().as_str() {
        "subject" => (info.subject.clone(), HeaderKind::AsIs),
        "date" => (info.date_sent.to_string(), HeaderKind::AsIs),
        "from" => (info.from.clone(), HeaderKind::Address),
        "to" => (info.to.clone(), HeaderKind::Address),
        "cc" => (info.cc.clone(), HeaderKind::Address),
        "x-camel-mlist" => (info.mlist.clone(), HeaderKind::Mlist),
        _ => return None,
    };
    Some(value)
}

/// Unfolded, RFC 2047 decoded value of a raw header line.
pub fn decode_value(header: &RawHeader, default_charset: &str) -> String {
    decode_encoded_words(&unfold_value(&header.value), Some(default_charset))
}

fn is_decoded_header(name: &str) -> bool {
    DECODED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Test one message against a `header-*` predicate.
///
/// Patterns are OR'd. In `Contains` mode each pattern is split into words
/// that must all match; every other mode compares the whole pattern. An
/// empty pattern always matches. Headers outside the summary need the full
/// message; if it cannot be fetched the message does not match.
pub fn check_header(
    folder: &dyn Folder,
    info: &MessageInfo,
    name: &str,
    patterns: &[&str],
    mode: MatchMode,
) -> Result<bool> {
    let summary = summary_header(info, name);
    let message = match summary {
        Some(_) => None,
        None => match folder.get_message(&info.uid) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(uid = %info.uid, error = %e, "Cannot fetch message for header test");
                return Ok(false);
            }
        },
    };

    let test = |pattern: &str| -> bool {
        match (&summary, &message) {
            (Some((value, kind)), _) => header_match(value, pattern, mode, *kind),
            (None, Some(message)) => {
                let charset = message.default_charset();
                message
                    .headers
                    .iter()
                    .filter(|h| name.is_empty() || h.name.eq_ignore_ascii_case(name))
                    .any(|h| header_match(&decode_value(h, charset), pattern, mode, HeaderKind::AsIs))
            }
            (None, None) => false,
        }
    };

    for pattern in patterns {
        if pattern.is_empty() {
            return Ok(true);
        }
        let hit = if mode == MatchMode::Contains {
            let words = Words::split(pattern)?;
            let all = words.iter().all(|w| test(&w.text));
            all
        } else {
            test(pattern)
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether `regex` matches the first header called `name`. Address and
/// subject headers are decoded first; other values are used raw.
pub fn header_regex_matches(message: &MimeMessage, name: &str, regex: &Regex) -> bool {
    let Some(header) = message
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
    else {
        return false;
    };
    if is_decoded_header(name) {
        regex.is_match(&decode_value(header, message.default_charset()))
    } else {
        regex.is_match(&header.value)
    }
}

/// All headers rendered as `Name: value` lines, with address and subject
/// values decoded.
pub fn render_headers(message: &MimeMessage) -> String {
    let charset = message.default_charset();
    let mut out = String::new();
    for header in &message.headers {
        let value = if is_decoded_header(&header.name) {
            decode_value(header, charset)
        } else {
            header.value.clone()
        };
        out.push_str(&header.name);
        out.push(':');
        if !value.starts_with(char::is_whitespace) {
            out.push(' ');
        }
        out.push_str(&value);
        out.push('\n');
    }
    out
}

/// Whether any of the named headers is present.
pub fn has_header(message: &MimeMessage, names: &[&str]) -> bool {
    names.iter().any(|name| message.header(name).is_some())
}
