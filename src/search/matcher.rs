//! Matching one header value against one pattern.

use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::model::address::EmailAddress;

/// How a pattern is compared with a header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Contains,
    Exact,
    StartsWith,
    EndsWith,
    Soundex,
    /// The pattern occurs delimited by non-alphanumerics.
    Word,
}

/// How a header value is interpreted before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    AsIs,
    /// An address list; each name and address is compared on its own.
    Address,
    /// A mailing-list tag, compared without surrounding `<>`.
    Mlist,
}

/// Compare a decoded header value with a pattern, case-insensitively.
pub fn header_match(value: &str, pattern: &str, mode: MatchMode, kind: HeaderKind) -> bool {
    let pattern = pattern.trim().to_lowercase();
    match kind {
        HeaderKind::AsIs => match_text(value.trim(), &pattern, mode),
        HeaderKind::Mlist => {
            let tag = value.trim();
            let tag = tag.strip_prefix('<').unwrap_or(tag);
            let tag = tag.strip_suffix('>').unwrap_or(tag);
            match_text(tag, &pattern, mode)
        }
        HeaderKind::Address => {
            let addresses = EmailAddress::parse_list(value);
            if addresses.is_empty() {
                return match_text(value.trim(), &pattern, mode);
            }
            addresses.iter().any(|addr| {
                let tokens = addr.match_tokens();
                tokens
                    .iter()
                    .filter(|t| mode == MatchMode::Exact || !t.contains('<'))
                    .any(|t| match_text(t, &pattern, mode))
            })
        }
    }
}

/// `pattern` must already be lower-cased.
fn match_text(value: &str, pattern: &str, mode: MatchMode) -> bool {
    let value = value.to_lowercase();
    match mode {
        MatchMode::Contains => value.contains(pattern),
        MatchMode::Exact => value == pattern,
        MatchMode::StartsWith => value.starts_with(pattern),
        MatchMode::EndsWith => value.ends_with(pattern),
        MatchMode::Soundex => {
            let code = soundex(pattern);
            !code.is_empty()
                && value
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| soundex(word) == code)
        }
        MatchMode::Word => contains_word(&value, pattern),
    }
}

fn contains_word(value: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    let mut start = 0;
    while let Some(pos) = value[start..].find(pattern) {
        let begin = start + pos;
        let end = begin + pattern.len();
        let open = value[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let close = value[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if open && close {
            return true;
        }
        start = begin + value[begin..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// American Soundex code of the ASCII letters of `word`, or an empty string
/// when it has none.
pub fn soundex(word: &str) -> String {
    let mut letters = word
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase());
    let Some(first) = letters.next() else {
        return String::new();
    };

    let mut code = String::with_capacity(4);
    code.push(first);
    let mut last = soundex_digit(first);
    for c in letters {
        match soundex_digit(c) {
            Some(d) if Some(d) != last => {
                code.push(d);
                if code.len() == 4 {
                    break;
                }
                last = Some(d);
            }
            Some(_) => {}
            // H and W do not separate equal codes; vowels do.
            None if c == 'H' || c == 'W' => {}
            None => last = None,
        }
    }
    while code.len() < 4 {
        code.push('0');
    }
    code
}

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

/// Compile patterns as alternatives of one case-insensitive regex.
/// `multi_line` lets `^` and `$` match at line boundaries.
pub fn build_regex(patterns: &[&str], multi_line: bool) -> Result<Regex> {
    let joined = patterns
        .iter()
        .map(|p| format!("(?:{p})"))
        .collect::<Vec<_>>()
        .join("|");
    Ok(RegexBuilder::new(&joined)
        .case_insensitive(true)
        .multi_line(multi_line)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes_are_case_insensitive() {
        let v = "Re: Quarterly Invoice";
        assert!(header_match(v, "invoice", MatchMode::Contains, HeaderKind::AsIs));
        assert!(header_match(v, "RE:", MatchMode::StartsWith, HeaderKind::AsIs));
        assert!(header_match(v, "INVOICE", MatchMode::EndsWith, HeaderKind::AsIs));
        assert!(header_match(v, "re: quarterly invoice", MatchMode::Exact, HeaderKind::AsIs));
        assert!(!header_match(v, "quarterly", MatchMode::Exact, HeaderKind::AsIs));
    }

    #[test]
    fn test_word_mode() {
        let v = "meeting notes for tomorrow";
        assert!(header_match(v, "notes", MatchMode::Word, HeaderKind::AsIs));
        assert!(!header_match(v, "note", MatchMode::Word, HeaderKind::AsIs));
        assert!(header_match(v, "for tomorrow", MatchMode::Word, HeaderKind::AsIs));
    }

    #[test]
    fn test_address_kind() {
        let v = "\"Smith, Jane\" <jane@example.com>, bob@example.org";
        assert!(header_match(v, "jane@example.com", MatchMode::Exact, HeaderKind::Address));
        assert!(header_match(v, "smith, jane", MatchMode::Exact, HeaderKind::Address));
        assert!(header_match(
            v,
            "Smith, Jane <jane@example.com>",
            MatchMode::Exact,
            HeaderKind::Address
        ));
        assert!(header_match(v, "bob@", MatchMode::StartsWith, HeaderKind::Address));
        assert!(header_match(v, "example.org", MatchMode::EndsWith, HeaderKind::Address));
        assert!(!header_match(v, "example", MatchMode::Exact, HeaderKind::Address));
    }

    #[test]
    fn test_mlist_kind() {
        assert!(header_match(
            "<dev.lists.example.org>",
            "dev.lists.example.org",
            MatchMode::Exact,
            HeaderKind::Mlist
        ));
    }

    #[test]
    fn test_soundex() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(soundex("Tymczak"), "T522");
        assert_eq!(soundex("Pfister"), "P236");
        assert_eq!(soundex("Ashcraft"), "A261");
        assert_eq!(soundex("123"), "");
        assert!(header_match("Meet Robert", "rupert", MatchMode::Soundex, HeaderKind::AsIs));
        assert!(!header_match("Meet Alice", "rupert", MatchMode::Soundex, HeaderKind::AsIs));
    }

    #[test]
    fn test_build_regex() {
        let re = build_regex(&["^subject: urgent", "invoice"], true).unwrap();
        assert!(re.is_match("From: a\nSubject: URGENT\n"));
        assert!(re.is_match("an Invoice"));
        assert!(build_regex(&["("], false).is_err());
    }
}
