//! Fully parsed messages: raw header lines plus the MIME content tree.
//!
//! This is what the body scanner and the header predicates work on when the
//! summary alone is not enough. It is built on demand and never cached by the
//! search engine itself.

/// One raw header line, folding preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHeader {
    pub name: String,
    pub value: String,
}

/// A full message: its header block and its top-level body part.
#[derive(Debug, Clone)]
pub struct MimeMessage {
    /// Header lines in message order.
    pub headers: Vec<RawHeader>,
    /// Top-level content of the message.
    pub body: MimePart,
}

/// One node of the MIME tree.
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Lower-cased `type/subtype`.
    pub mime_type: String,
    /// Declared `charset` parameter, if any.
    pub charset: Option<String>,
    pub content: MimeContent,
}

/// Content of a MIME part.
#[derive(Debug, Clone)]
pub enum MimeContent {
    /// Undecoded text bytes in the part's declared charset.
    Text(Vec<u8>),
    /// Child parts of a multipart container.
    Multipart(Vec<MimePart>),
    /// An embedded `message/rfc822`.
    Message(Box<MimeMessage>),
    /// Any other leaf; only its length is kept.
    Binary(usize),
}

impl MimeMessage {
    /// Create a message from headers and a body part.
    pub fn new(headers: Vec<RawHeader>, body: MimePart) -> Self {
        Self { headers, body }
    }

    /// First raw value of a header (case-insensitive name).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Charset used to decode 8-bit header text: the top-level declared
    /// charset, or UTF-8.
    pub fn default_charset(&self) -> &str {
        self.body.charset.as_deref().unwrap_or("utf-8")
    }
}

impl MimePart {
    /// A text leaf.
    pub fn text(mime_type: &str, charset: Option<&str>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.to_lowercase(),
            charset: charset.map(str::to_string),
            content: MimeContent::Text(data.into()),
        }
    }

    /// A multipart container.
    pub fn multipart(mime_type: &str, parts: Vec<MimePart>) -> Self {
        Self {
            mime_type: mime_type.to_lowercase(),
            charset: None,
            content: MimeContent::Multipart(parts),
        }
    }

    /// Whether the media type is `text/*`.
    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
    }
}

impl RawHeader {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}
