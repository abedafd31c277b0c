//! Address lists (RFC 5322 §3.4) as seen by address-aware header matching.

use std::fmt;

/// One mailbox of an address header.
///
/// `"Juan García <juan@ejemplo.com>"` has `display_name = "Juan García"` and
/// `address = "juan@ejemplo.com"`; a bare `"user@example.com"` has no
/// display name.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailAddress {
    pub display_name: String,
    pub address: String,
}

impl EmailAddress {
    /// Parse one mailbox. Text that is not in `name <addr>` form is taken
    /// whole as the address.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let angled = raw
            .rsplit_once('<')
            .and_then(|(name, rest)| rest.split_once('>').map(|(addr, _)| (name, addr)));

        match angled {
            Some((name, addr)) => Self {
                display_name: unquote(name).to_string(),
                address: addr.trim().to_string(),
            },
            None => Self {
                display_name: String::new(),
                address: raw.to_string(),
            },
        }
    }

    /// Parse a comma-separated address list. Commas inside quotes or angle
    /// brackets do not split, group names (`team: a@b, c@d;`) are dropped,
    /// and empty entries are skipped.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        split_mailboxes(raw)
            .into_iter()
            .map(Self::parse)
            .filter(|a| !a.address.is_empty())
            .collect()
    }

    /// What an address-aware comparison looks at: the display name (when
    /// present), the bare address, and the formatted form.
    pub fn match_tokens(&self) -> Vec<String> {
        if self.display_name.is_empty() {
            return vec![self.address.clone()];
        }
        vec![
            self.display_name.clone(),
            self.address.clone(),
            self.to_string(),
        ]
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_name.is_empty() {
            f.write_str(&self.address)
        } else {
            write!(f, "{} <{}>", self.display_name, self.address)
        }
    }
}

/// Split on top-level commas, also ending an entry at a group's `;` and
/// discarding the text before a group's `:`.
fn split_mailboxes(raw: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut angle = false;

    for (i, ch) in raw.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '<' if !quoted => angle = true,
            '>' if !quoted => angle = false,
            ':' if !quoted && !angle => start = i + 1,
            ',' | ';' if !quoted && !angle => {
                out.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&raw[start..]);
    out
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(s)
}
