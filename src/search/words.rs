//! Splitting a search phrase into words.
//!
//! `hello "big world" c\+\+` splits into `hello`, `big world` and `c++`.
//! Words made only of alphanumerics are *simple* and can be looked up in a
//! body index; anything else is *complex* and needs a literal substring scan
//! of the decoded text.

use crate::error::{Result, SearchError};

/// Words per phrase are tracked in a `u32` mask.
pub const MAX_WORDS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordKind {
    Simple,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Lower-cased text.
    pub text: String,
    pub kind: WordKind,
}

/// The de-duplicated words of one phrase, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Words {
    words: Vec<Word>,
}

impl Words {
    /// Split a phrase on whitespace, honoring `"..."` grouping and `\` escapes.
    pub fn split(phrase: &str) -> Result<Self> {
        let mut words = Words::default();
        let mut current = String::new();
        let mut complex = false;
        let mut in_quotes = false;
        let mut chars = phrase.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '"' => in_quotes = !in_quotes,
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        if !escaped.is_alphanumeric() {
                            complex = true;
                        }
                        current.push(escaped);
                    }
                }
                c if c.is_whitespace() && !in_quotes => {
                    words.push(&mut current, complex);
                    complex = false;
                }
                c => {
                    if !c.is_alphanumeric() {
                        complex = true;
                    }
                    current.push(c);
                }
            }
        }
        words.push(&mut current, complex);

        if words.len() > MAX_WORDS {
            return Err(SearchError::TooManyWords(words.len()));
        }
        Ok(words)
    }

    fn push(&mut self, current: &mut String, complex: bool) {
        if current.is_empty() {
            return;
        }
        let text = std::mem::take(current).to_lowercase();
        if self.words.iter().any(|w| w.text == text) {
            return;
        }
        let kind = if complex {
            WordKind::Complex
        } else {
            WordKind::Simple
        };
        self.words.push(Word { text, kind });
    }

    /// Complex if any word is complex.
    pub fn kind(&self) -> WordKind {
        if self.words.iter().any(|w| w.kind == WordKind::Complex) {
            WordKind::Complex
        } else {
            WordKind::Simple
        }
    }

    pub fn is_simple(&self) -> bool {
        self.kind() == WordKind::Simple
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Word> {
        self.words.iter()
    }

    /// Mask with one bit set per word.
    pub fn full_mask(&self) -> u32 {
        match self.words.len() {
            0 => 0,
            n if n >= 32 => u32::MAX,
            n => (1u32 << n) - 1,
        }
    }

    /// The alphanumeric runs of every word, as simple words. Used to
    /// narrow a complex phrase through the body index before scanning.
    pub fn simple(&self) -> Words {
        let mut out = Words::default();
        for word in &self.words {
            let mut run = String::new();
            for c in word.text.chars() {
                if c.is_alphanumeric() {
                    run.push(c);
                } else {
                    out.push(&mut run, false);
                }
            }
            out.push(&mut run, false);
        }
        // Past the mask width only the first words narrow the candidates.
        out.words.truncate(MAX_WORDS);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(words: &Words) -> Vec<&str> {
        words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn test_split_simple_words() {
        let words = Words::split("Hello  World hello").unwrap();
        assert_eq!(texts(&words), vec!["hello", "world"]);
        assert!(words.is_simple());
        assert_eq!(words.full_mask(), 0b11);
    }

    #[test]
    fn test_split_quotes_and_escapes() {
        let words = Words::split(r#"plain "big world" c\+\+"#).unwrap();
        assert_eq!(texts(&words), vec!["plain", "big world", "c++"]);
        assert_eq!(words.kind(), WordKind::Complex);
        let kinds: Vec<WordKind> = words.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![WordKind::Simple, WordKind::Complex, WordKind::Complex]
        );
    }

    #[test]
    fn test_wildcard_is_complex() {
        let words = Words::split("inv*").unwrap();
        assert_eq!(words.kind(), WordKind::Complex);
    }

    #[test]
    fn test_simple_subwords() {
        let words = Words::split(r#""big world" foo-bar"#).unwrap();
        let simple = words.simple();
        assert_eq!(texts(&simple), vec!["big", "world", "foo", "bar"]);
        assert!(simple.is_simple());
    }

    #[test]
    fn test_too_many_words() {
        let phrase: Vec<String> = (0..33).map(|i| format!("w{i}")).collect();
        let err = Words::split(&phrase.join(" ")).unwrap_err();
        assert!(matches!(err, SearchError::TooManyWords(33)));

        let phrase: Vec<String> = (0..32).map(|i| format!("w{i}")).collect();
        let words = Words::split(&phrase.join(" ")).unwrap();
        assert_eq!(words.full_mask(), u32::MAX);
    }

    #[test]
    fn test_empty_phrase() {
        let words = Words::split("   ").unwrap();
        assert!(words.is_empty());
        assert_eq!(words.full_mask(), 0);
    }
}
