//! Remote store contract: hosted comments table plus photo bucket.
//!
//! The engine only sees this trait; `SupabaseStore` talks to a real hosted
//! backend and `MemoryStore` backs tests and failure-path exercises.

mod memory;
mod supabase;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;
pub use supabase::{RemoteConfig, SupabaseStore};

/// Result type for remote store operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors produced by a remote store implementation
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API rejected the request
    #[error("Remote API error: {message} ({status})")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The targeted column does not exist in the remote schema.
    ///
    /// This is a capability signal, not a fault: moderation columns are
    /// optional remotely and the local override store covers their absence.
    #[error("Remote schema has no '{column}' column")]
    MissingColumn { column: String },

    /// A request or response payload could not be used
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),

    /// The store was constructed from unusable configuration
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

/// A raw comment row as returned by the remote store.
///
/// Every field beyond `id` is optional: the hosted schema may predate the
/// moderation columns, and rows written by other clients may omit values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteComment {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes: Option<i64>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub hidden: Option<bool>,
}

/// Payload for inserting a new comment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewComment {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_photo_url: Option<String>,
}

/// Partial update for a comment row. Only set fields are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

impl CommentPatch {
    #[must_use]
    pub const fn likes(value: i64) -> Self {
        Self {
            likes: Some(value),
            pinned: None,
            hidden: None,
        }
    }

    #[must_use]
    pub const fn pinned(value: bool) -> Self {
        Self {
            likes: None,
            pinned: Some(value),
            hidden: None,
        }
    }

    #[must_use]
    pub const fn hidden(value: bool) -> Self {
        Self {
            likes: None,
            pinned: None,
            hidden: Some(value),
        }
    }

    /// Names of the columns this patch writes, used to label a
    /// column-missing rejection.
    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.likes.is_some() {
            names.push("likes");
        }
        if self.pinned.is_some() {
            names.push("pinned");
        }
        if self.hidden.is_some() {
            names.push("hidden");
        }
        names
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.likes.is_none() && self.pinned.is_none() && self.hidden.is_none()
    }
}

/// Operations against the hosted comments table and photo bucket.
///
/// `select_comments` returns rows newest first; `update_comment` and
/// `delete_comment` report how many rows were touched so callers can
/// distinguish a no-op from a success.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Fetch all comment rows, newest first.
    async fn select_comments(&self) -> RemoteResult<Vec<RemoteComment>>;

    /// Insert a comment row and return the stored row with its assigned id.
    async fn insert_comment(&self, new: &NewComment) -> RemoteResult<RemoteComment>;

    /// Patch fields of a comment row; returns the number of rows affected.
    async fn update_comment(&self, id: &str, patch: &CommentPatch) -> RemoteResult<u64>;

    /// Delete a comment row; returns the number of rows affected.
    async fn delete_comment(&self, id: &str) -> RemoteResult<u64>;

    /// Check whether a comment row exists.
    async fn comment_exists(&self, id: &str) -> RemoteResult<bool>;

    /// Upload photo bytes under `key` and return the public URL.
    async fn upload_photo(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> RemoteResult<String>;

    /// Remove a previously uploaded photo object.
    async fn remove_photo(&self, key: &str) -> RemoteResult<()>;

    /// Derive the storage key for a photo URL this store produced, when the
    /// URL is recognizably ours.
    fn photo_key(&self, url: &str) -> Option<String> {
        let _ = url;
        None
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn remote_comment_accepts_numeric_ids() {
        let row: RemoteComment =
            serde_json::from_str(r#"{"id": 42, "name": "Ada", "message": "Hello"}"#).unwrap();
        assert_eq!(row.id, "42");
        assert_eq!(row.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn remote_comment_accepts_string_ids() {
        let row: RemoteComment =
            serde_json::from_str(r#"{"id": "c1", "name": "Ada", "message": "Hello"}"#).unwrap();
        assert_eq!(row.id, "c1");
    }

    #[test]
    fn remote_comment_tolerates_missing_columns() {
        let row: RemoteComment = serde_json::from_str(r#"{"id": "c1"}"#).unwrap();
        assert_eq!(row.name, None);
        assert_eq!(row.likes, None);
        assert_eq!(row.pinned, None);
        assert_eq!(row.hidden, None);
        assert_eq!(row.created_at, None);
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = CommentPatch::pinned(true);
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"pinned":true}"#);

        let patch = CommentPatch::likes(4);
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"likes":4}"#);
    }

    #[test]
    fn patch_reports_touched_columns() {
        assert_eq!(CommentPatch::hidden(false).column_names(), vec!["hidden"]);
        assert!(CommentPatch::default().column_names().is_empty());
        assert!(CommentPatch::default().is_empty());
    }

    #[test]
    fn new_comment_omits_absent_photo() {
        let new = NewComment {
            name: "Ada".to_string(),
            message: "Hello".to_string(),
            profile_photo_url: None,
        };
        let json = serde_json::to_string(&new).unwrap();
        assert!(!json.contains("profile_photo_url"));
    }
}
