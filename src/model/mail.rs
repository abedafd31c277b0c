//! Message summary records and identifiers.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use super::flags::MessageFlags;

/// Folder-unique message identifier.
///
/// Identifiers are immutable and shared freely between the summary, the
/// evaluator and the returned result lists, so cloning only bumps a count.
pub type Uid = Arc<str>;

/// Lightweight, read-only projection of one message.
///
/// Owned by the folder; the evaluator borrows a record only for the duration
/// of one expression evaluation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct MessageInfo {
    /// Folder-unique identifier, stable for the lifetime of the message.
    pub uid: Uid,

    /// Decoded subject line.
    pub subject: String,

    /// Decoded `From:` header (address list syntax).
    pub from: String,

    /// Decoded `To:` header (address list syntax).
    pub to: String,

    /// Decoded `Cc:` header (address list syntax).
    pub cc: String,

    /// Mailing-list tag, usually taken from `List-Id`.
    pub mlist: String,

    /// The `Message-ID` header value.
    pub message_id: String,

    /// The `In-Reply-To` header value, if present.
    pub in_reply_to: Option<String>,

    /// Message-IDs from the `References` header, oldest first.
    pub references: Vec<String>,

    /// Sent date, seconds since the Unix epoch.
    pub date_sent: i64,

    /// Received date, seconds since the Unix epoch.
    pub date_received: i64,

    /// Size of the raw message in bytes.
    pub size: u64,

    /// System flags (seen, answered, ...).
    pub flags: MessageFlags,

    /// User-defined flags (keywords, labels).
    pub user_flags: BTreeSet<String>,

    /// User-defined key/value tags.
    pub user_tags: BTreeMap<String, String>,
}

impl MessageInfo {
    /// Create an empty record for `uid`.
    pub fn new(uid: &str) -> Self {
        Self {
            uid: Uid::from(uid),
            subject: String::new(),
            from: String::new(),
            to: String::new(),
            cc: String::new(),
            mlist: String::new(),
            message_id: String::new(),
            in_reply_to: None,
            references: Vec::new(),
            date_sent: 0,
            date_received: 0,
            size: 0,
            flags: MessageFlags::empty(),
            user_flags: BTreeSet::new(),
            user_tags: BTreeMap::new(),
        }
    }

    /// Whether the named user flag is set.
    pub fn user_flag(&self, name: &str) -> bool {
        self.user_flags.contains(name)
    }

    /// Value of the named user tag, if any.
    pub fn user_tag(&self, name: &str) -> Option<&str> {
        self.user_tags.get(name).map(String::as_str)
    }
}

/// Interns identifier strings so that rows coming back from the summary
/// database share storage with the folder's own uids.
#[derive(Debug, Default)]
pub struct UidPool {
    uids: HashSet<Uid>,
}

impl UidPool {
    /// Create a pool pre-seeded with known identifiers.
    pub fn with_uids<'a>(uids: impl IntoIterator<Item = &'a Uid>) -> Self {
        Self {
            uids: uids.into_iter().cloned().collect(),
        }
    }

    /// Return the shared identifier for `s`, inserting it if new.
    pub fn intern(&mut self, s: &str) -> Uid {
        if let Some(existing) = self.uids.get(s) {
            return existing.clone();
        }
        let uid = Uid::from(s);
        self.uids.insert(uid.clone());
        uid
    }

    /// Number of distinct identifiers held.
    pub fn len(&self) -> usize {
        self.uids.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_storage() {
        let known: Uid = Uid::from("42");
        let mut pool = UidPool::with_uids([&known]);
        let again = pool.intern("42");
        assert!(Arc::ptr_eq(&known, &again));
        let fresh = pool.intern("43");
        assert_eq!(&*fresh, "43");
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_user_flags_and_tags() {
        let mut info = MessageInfo::new("1");
        info.user_flags.insert("work".to_string());
        info.user_tags.insert("label".to_string(), "important".to_string());
        assert!(info.user_flag("work"));
        assert!(!info.user_flag("home"));
        assert_eq!(info.user_tag("label"), Some("important"));
        assert_eq!(info.user_tag("color"), None);
    }
}
