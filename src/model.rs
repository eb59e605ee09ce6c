//! Core value types shared by the group cache, the heuristic and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque tab (session) identifier owned by the external session store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    /// Wraps a session identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TabId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Generates a fresh random identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Color token for a group.
///
/// The palette is fixed; presentation layers map each token to a theme color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl GroupColor {
    /// Palette in assignment order.
    pub const PALETTE: [GroupColor; 9] = [
        GroupColor::Blue,
        GroupColor::Red,
        GroupColor::Yellow,
        GroupColor::Green,
        GroupColor::Pink,
        GroupColor::Purple,
        GroupColor::Cyan,
        GroupColor::Orange,
        GroupColor::Grey,
    ];

    /// Returns the token name as written to storage.
    pub fn as_str(self) -> &'static str {
        match self {
            GroupColor::Grey => "grey",
            GroupColor::Blue => "blue",
            GroupColor::Red => "red",
            GroupColor::Yellow => "yellow",
            GroupColor::Green => "green",
            GroupColor::Pink => "pink",
            GroupColor::Purple => "purple",
            GroupColor::Cyan => "cyan",
            GroupColor::Orange => "orange",
        }
    }
}

impl fmt::Display for GroupColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing a [`GroupColor`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColorError(pub String);

impl fmt::Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid group color: {}", self.0)
    }
}

impl std::error::Error for ParseColorError {}

impl FromStr for GroupColor {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        GroupColor::PALETTE
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| ParseColorError(s.to_string()))
    }
}

/// Privacy mode plus profile tag of a tab or group.
///
/// Private tabs only ever share a group with other private tabs. Normal tabs
/// share a group when their profiles match or when either side is unassigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrivacyScope {
    /// Whether the tab is in private mode.
    pub private: bool,
    /// Profile/context tag; `None` means unassigned (guest).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl PrivacyScope {
    /// Normal mode, unassigned profile.
    pub fn normal() -> Self {
        Self::default()
    }

    /// Private mode.
    pub fn private() -> Self {
        Self {
            private: true,
            profile: None,
        }
    }

    /// Normal mode with a profile tag.
    pub fn profile(tag: impl Into<String>) -> Self {
        Self {
            private: false,
            profile: Some(tag.into()),
        }
    }

    /// Returns `true` if tabs in `self` and `other` may share a group.
    pub fn is_compatible(&self, other: &PrivacyScope) -> bool {
        if self.private != other.private {
            return false;
        }
        if self.private {
            return true;
        }
        match (&self.profile, &other.profile) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Combines two compatible scopes, keeping the assigned profile if any.
    pub fn narrowed(&self, other: &PrivacyScope) -> PrivacyScope {
        PrivacyScope {
            private: self.private,
            profile: self.profile.clone().or_else(|| other.profile.clone()),
        }
    }
}

impl fmt::Display for PrivacyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.private, &self.profile) {
            (true, _) => f.write_str("private"),
            (false, Some(profile)) => write!(f, "normal:{}", profile),
            (false, None) => f.write_str("normal"),
        }
    }
}

/// A tab group ("island").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique identifier.
    pub id: GroupId,
    /// Display name. Empty is a valid, intentionally unnamed group.
    pub name: String,
    /// Color token.
    pub color: GroupColor,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Ordered member tabs, never empty, never duplicated.
    pub tab_ids: Vec<TabId>,
    /// Privacy/profile scope shared by all members.
    pub scope: PrivacyScope,
}

impl Group {
    /// Returns `true` if `tab_id` is a member.
    pub fn contains(&self, tab_id: &TabId) -> bool {
        self.tab_ids.contains(tab_id)
    }

    /// Number of member tabs.
    pub fn len(&self) -> usize {
        self.tab_ids.len()
    }

    /// Returns `true` when the group has no members.
    pub fn is_empty(&self) -> bool {
        self.tab_ids.is_empty()
    }
}
