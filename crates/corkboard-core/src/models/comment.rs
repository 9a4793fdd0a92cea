//! Comment model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::trimmed_non_empty;

/// A unique identifier for a comment.
///
/// Remote-assigned ids are opaque strings (the hosted store may use UUIDs or
/// integer keys); locally synthesized ids are UUID v7 strings, which sort by
/// creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    /// Synthesize a new time-ordered id for a comment created without a
    /// remote round-trip.
    #[must_use]
    pub fn synthesize() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CommentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CommentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A comment as surfaced to consumers.
///
/// `pinned` and `hidden` are *effective* values: the remote field OR-ed with
/// the local override for this id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Unique identifier
    pub id: CommentId,
    /// Author display name
    pub name: String,
    /// Comment body
    pub message: String,
    /// Public URL of the author photo, when one was uploaded
    pub photo_url: Option<String>,
    /// Creation timestamp (remote clock, or local clock on fallback)
    pub created_at: DateTime<Utc>,
    /// Like counter
    pub likes: u32,
    /// Effective pin flag
    pub pinned: bool,
    /// Effective hidden flag
    pub hidden: bool,
    /// Raw remote flag values, kept so effective flags can be re-derived
    /// against the override store without a re-fetch.
    #[serde(skip)]
    pub(crate) remote_pinned: bool,
    #[serde(skip)]
    pub(crate) remote_hidden: bool,
}

impl Comment {
    /// Build a comment for the local fallback path: synthesized id, local
    /// clock, zeroed counter and flags.
    #[must_use]
    pub fn local(
        name: impl Into<String>,
        message: impl Into<String>,
        photo_url: Option<String>,
    ) -> Self {
        Self {
            id: CommentId::synthesize(),
            name: name.into(),
            message: message.into(),
            photo_url,
            created_at: Utc::now(),
            likes: 0,
            pinned: false,
            hidden: false,
            remote_pinned: false,
            remote_hidden: false,
        }
    }

    /// A record with an empty name or message is treated as corrupt data and
    /// never rendered publicly.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.name.trim().is_empty() || self.message.trim().is_empty()
    }
}

/// A photo attached to a comment submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    /// Original file name, used to derive the stored object key
    pub file_name: String,
    /// Raw file bytes
    pub bytes: Vec<u8>,
    /// MIME type, when known
    pub content_type: Option<String>,
}

/// Pending submission form state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentDraft {
    pub name: String,
    pub message: String,
    pub photo: Option<PhotoUpload>,
}

impl CommentDraft {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            photo: None,
        }
    }

    #[must_use]
    pub fn with_photo(mut self, photo: PhotoUpload) -> Self {
        self.photo = Some(photo);
        self
    }

    /// Reject drafts whose name or message is empty after trimming.
    ///
    /// Validation runs before any mutation, so a failed submission leaves the
    /// caller's pending input intact.
    pub fn validate(&self) -> Result<()> {
        if trimmed_non_empty(&self.name).is_none() {
            return Err(Error::InvalidInput("Comment name cannot be empty".to_string()));
        }
        if trimmed_non_empty(&self.message).is_none() {
            return Err(Error::InvalidInput(
                "Comment message cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn trimmed_name(&self) -> &str {
        self.name.trim()
    }

    #[must_use]
    pub fn trimmed_message(&self) -> &str {
        self.message.trim()
    }
}
