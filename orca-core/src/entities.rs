//! Domain entities cached by the client.
//!
//! Entities refer to each other by value here (a post embeds its author), but
//! are persisted by key: see the adapters in `orca-cache`.

use crate::{Key, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relationship between the signed-in account and a followable profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Follow {
    PublicUnfollowed,
    PublicFollowing,
    PrivateUnfollowed,
    PrivateRequested,
    PrivateFollowing,
}

impl Follow {
    /// Stable string form used in persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicUnfollowed => "public.unfollowed",
            Self::PublicFollowing => "public.following",
            Self::PrivateUnfollowed => "private.unfollowed",
            Self::PrivateRequested => "private.requested",
            Self::PrivateFollowing => "private.following",
        }
    }

    /// Parse the string form produced by [`Follow::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public.unfollowed" => Some(Self::PublicUnfollowed),
            "public.following" => Some(Self::PublicFollowing),
            "private.unfollowed" => Some(Self::PrivateUnfollowed),
            "private.requested" => Some(Self::PrivateRequested),
            "private.following" => Some(Self::PrivateFollowing),
            _ => None,
        }
    }

    /// Whether the profile's posts are hidden from non-followers.
    pub fn is_private(&self) -> bool {
        matches!(
            self,
            Self::PrivateUnfollowed | Self::PrivateRequested | Self::PrivateFollowing
        )
    }
}

impl fmt::Display for Follow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a profile belongs to the signed-in account or to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    /// The signed-in account's own profile.
    Editable,
    /// Another account's profile.
    Followable { follow: Follow },
}

/// Account profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Key,
    /// `user@instance` handle.
    pub account: String,
    pub avatar_url: String,
    pub name: String,
    pub bio: String,
    pub kind: ProfileKind,
    pub follower_count: u32,
    pub following_count: u32,
    pub url: String,
}

impl Profile {
    /// Author view of this profile, as embedded in posts.
    pub fn to_author(&self) -> Author {
        Author {
            id: self.id.clone(),
            name: self.name.clone(),
            account: self.account.clone(),
            avatar_url: self.avatar_url.clone(),
            profile_url: self.url.clone(),
        }
    }
}

/// Minimal profile information shown alongside a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Key,
    pub name: String,
    pub account: String,
    pub avatar_url: String,
    pub profile_url: String,
}

/// Link preview attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub subtitle: Option<String>,
    pub cover_url: String,
}

/// Body of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    pub headline: Option<Headline>,
}

/// Published post, possibly reblogged by someone other than its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: Key,
    pub author: Author,
    pub reblogger: Option<Author>,
    pub content: Content,
    pub published_at: Timestamp,
    pub comment_count: u32,
    pub is_favorite: bool,
    pub favorite_count: u32,
    pub is_reblogged: bool,
    pub reblog_count: u32,
    pub url: String,
}

impl Post {
    /// Whether this post reached the timeline through a reblog.
    pub fn is_reblog(&self) -> bool {
        self.reblogger.is_some()
    }
}
