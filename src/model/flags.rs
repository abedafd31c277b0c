//! System flag bitset.

/// Bitset of system flags carried by every message summary.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct MessageFlags(u32);

impl MessageFlags {
    pub const ANSWERED: Self = Self(1 << 0);
    pub const DELETED: Self = Self(1 << 1);
    pub const DRAFT: Self = Self(1 << 2);
    pub const FLAGGED: Self = Self(1 << 3);
    pub const SEEN: Self = Self(1 << 4);
    pub const ATTACHMENTS: Self = Self(1 << 5);
    pub const ANSWERED_ALL: Self = Self(1 << 6);
    pub const JUNK: Self = Self(1 << 7);
    pub const SECURE: Self = Self(1 << 8);
    pub const NOTJUNK: Self = Self(1 << 9);

    /// Names accepted by `system-flag`, matched case-insensitively.
    const NAMES: [(&'static str, MessageFlags); 10] = [
        ("answered", Self::ANSWERED),
        ("deleted", Self::DELETED),
        ("draft", Self::DRAFT),
        ("flagged", Self::FLAGGED),
        ("seen", Self::SEEN),
        ("attachments", Self::ATTACHMENTS),
        ("answered-all", Self::ANSWERED_ALL),
        ("junk", Self::JUNK),
        ("secure", Self::SECURE),
        ("notjunk", Self::NOTJUNK),
    ];

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Look up a flag by its name (`"Seen"`, `"deleted"`, ...).
    pub fn by_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    /// Test a flag by name; unknown names are never set.
    pub fn get_by_name(self, name: &str) -> bool {
        Self::by_name(name).is_some_and(|f| self.contains(f))
    }
}

impl std::ops::BitOr for MessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
