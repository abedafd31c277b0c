//! RFC 5322 header parsing: folding, encoded-words (RFC 2047), flags, and dates.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::model::flags::MessageFlags;
use crate::model::mail::MessageInfo;

/// Build a [`MessageInfo`] summary record from raw header bytes.
///
/// Only the header block is read; `size` is the length of the whole raw
/// message.
pub fn parse_headers_to_info(raw_headers: &[u8], uid: &str, size: u64) -> MessageInfo {
    let text = decode_header_bytes(raw_headers, None);
    let headers = unfold_headers(&text);

    let mut info = MessageInfo::new(uid);
    info.size = size;

    info.date_sent = get_header(&headers, "date")
        .and_then(|d| parse_date(&d))
        .map(|d| d.timestamp())
        .unwrap_or(0);
    info.date_received = get_header(&headers, "received")
        .and_then(|r| r.rsplit(';').next().and_then(parse_date))
        .map(|d| d.timestamp())
        .unwrap_or(info.date_sent);

    info.subject = decoded(&headers, "subject");
    info.from = decoded(&headers, "from");
    info.to = decoded(&headers, "to");
    info.cc = decoded(&headers, "cc");
    info.mlist = get_header(&headers, "list-id")
        .map(|l| list_tag(&decode_encoded_words(&l, None)))
        .unwrap_or_default();

    info.message_id = get_header(&headers, "message-id")
        .map(|s| extract_angle_bracket(&s))
        .unwrap_or_default();
    info.in_reply_to = get_header(&headers, "in-reply-to").map(|s| extract_angle_bracket(&s));
    info.references =
        extract_all_angle_brackets(&get_header(&headers, "references").unwrap_or_default());

    info.flags = parse_flags(&headers);

    for name in ["x-keywords", "x-gmail-labels"] {
        if let Some(raw) = get_header(&headers, name) {
            info.user_flags.extend(
                decode_encoded_words(&raw, None)
                    .split([',', ' '])
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            );
        }
    }

    info
}

/// System flags from `Status`, `X-Status`, and the content type.
fn parse_flags(headers: &[(String, String)]) -> MessageFlags {
    let mut flags = MessageFlags::empty();

    let status = get_header(headers, "status").unwrap_or_default();
    let x_status = get_header(headers, "x-status").unwrap_or_default();
    for ch in status.chars().chain(x_status.chars()) {
        match ch {
            'R' => flags.insert(MessageFlags::SEEN),
            'A' => flags.insert(MessageFlags::ANSWERED),
            'F' => flags.insert(MessageFlags::FLAGGED),
            'D' => flags.insert(MessageFlags::DELETED),
            'T' => flags.insert(MessageFlags::DRAFT),
            _ => {}
        }
    }

    let content_type = get_header(headers, "content-type")
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
        .unwrap_or_default();
    if content_type.starts_with("multipart/mixed")
        || headers
            .iter()
            .any(|(k, v)| k == "content-disposition" && v.to_lowercase().contains("attachment"))
    {
        flags.insert(MessageFlags::ATTACHMENTS);
    }
    if content_type == "multipart/signed" || content_type == "multipart/encrypted" {
        flags.insert(MessageFlags::SECURE);
    }

    if let Some(spam) = get_header(headers, "x-spam-flag") {
        if spam.eq_ignore_ascii_case("yes") {
            flags.insert(MessageFlags::JUNK);
        }
    }

    flags
}

fn decoded(headers: &[(String, String)], name: &str) -> String {
    get_header(headers, name)
        .map(|v| decode_encoded_words(&v, None))
        .unwrap_or_default()
}

/// The list tag of a `List-Id` value: the part inside angle brackets.
pub fn list_tag(value: &str) -> String {
    let trimmed = value.trim();
    match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if end > start => trimmed[start + 1..end].trim().to_string(),
        _ => trimmed.to_string(),
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then the given charset, then Windows-1252 (which
/// accepts every byte).
pub fn decode_header_bytes(bytes: &[u8], charset: Option<&str>) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => match charset.and_then(|c| encoding_rs::Encoding::for_label(c.as_bytes())) {
            Some(encoding) => encoding.decode(bytes).0.into_owned(),
            None => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        },
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Collapse folded continuation lines of a single header value.
pub fn unfold_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, line) in value.lines().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(line.trim());
    }
    out
}

fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Words whose charset is unknown are decoded with `default_charset` when
/// given. If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str, default_charset: Option<&str>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some((text, consumed)) = try_decode_one_word(after_start, default_charset) {
            result.push_str(&text);
            remaining = &remaining[start + 2 + consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?encoding?text?=`; returns the text and the bytes consumed
/// after the leading `=?`.
fn try_decode_one_word(s: &str, default_charset: Option<&str>) -> Option<(String, usize)> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(encoded_text)?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some((decode_charset(charset, &bytes, default_charset), consumed))
}

/// Base64 decoding for encoded-words; whitespace is skipped and padding may
/// be missing.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    fn value(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some((c - b'A') as u32),
            b'a'..=b'z' => Some((c - b'a' + 26) as u32),
            b'0'..=b'9' => Some((c - b'0' + 52) as u32),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc = 0u32;
    let mut bits = 0u32;
    for &c in input.as_bytes() {
        if c == b'=' {
            break;
        }
        if c.is_ascii_whitespace() {
            continue;
        }
        acc = (acc << 6) | value(c)?;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Some(out)
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset, falling back to `default_charset`
/// and finally to lossy UTF-8.
pub fn decode_charset(charset: &str, bytes: &[u8], default_charset: Option<&str>) -> String {
    if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let encoding = encoding_rs::Encoding::for_label(charset.as_bytes()).or_else(|| {
        default_charset.and_then(|d| encoding_rs::Encoding::for_label(d.as_bytes()))
    });
    match encoding {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => {
            warn!(charset, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Extract content between `<` and `>` (for Message-ID, In-Reply-To).
fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            return trimmed[start..start + end + 1].to_string();
        }
    }
    trimmed.to_string()
}

/// Extract all `<…>` tokens from a string (for References header).
fn extract_all_angle_brackets(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut remaining = s;
    while let Some(start) = remaining.find('<') {
        match remaining[start..].find('>') {
            Some(end) => {
                result.push(remaining[start..start + end + 1].to_string());
                remaining = &remaining[start + end + 1..];
            }
            None => break,
        }
    }
    result
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, and common broken real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let no_dow = strip_day_of_week(trimmed);
    let candidates = [no_dow.clone(), replace_named_tz(&no_dow)];

    const FORMATS: [&str; 8] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%d-%b-%Y %H:%M:%S %z",
        "%d-%b-%Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
    ];

    for candidate in &candidates {
        for fmt in &FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    debug!(date = trimmed, "Could not parse date");
    None
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim_start_matches(',').trim().to_string();
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 11] = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}
