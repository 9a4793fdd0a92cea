//! In-memory remote store, primarily for tests.
//!
//! Behaves like the hosted backend over `RemoteComment` rows and adds
//! switches that force individual operations to fail, so callers can
//! exercise offline and degraded paths without a network.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CommentPatch, NewComment, RemoteComment, RemoteError, RemoteResult, RemoteStore};

const PUBLIC_URL_BASE: &str = "memory://photos";

#[derive(Debug)]
struct Inner {
    rows: Vec<RemoteComment>,
    photos: HashMap<String, Vec<u8>>,
    moderation_columns: bool,
    fail_selects: bool,
    fail_inserts: bool,
    fail_updates: bool,
    fail_deletes: bool,
    fail_uploads: bool,
    deny_deletes: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            photos: HashMap::new(),
            moderation_columns: true,
            fail_selects: false,
            fail_inserts: false,
            fail_updates: false,
            fail_deletes: false,
            fail_uploads: false,
            deny_deletes: false,
        }
    }
}

/// Thread-safe in-memory remote store. Clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Add a row directly, bypassing insert switches.
    pub async fn seed(&self, row: RemoteComment) {
        let mut inner = self.inner.lock().await;
        inner.rows.push(row);
    }

    /// Snapshot of the stored rows in insertion order.
    pub async fn rows(&self) -> Vec<RemoteComment> {
        let inner = self.inner.lock().await;
        inner.rows.clone()
    }

    /// Keys of all uploaded photos.
    pub async fn photo_keys(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.photos.keys().cloned().collect()
    }

    pub async fn contains_photo(&self, key: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.photos.contains_key(key)
    }

    /// When false, the store behaves like a schema without the `pinned`
    /// and `hidden` columns: selects omit them and patches targeting them
    /// are rejected as missing columns.
    pub async fn set_moderation_columns(&self, value: bool) {
        self.inner.lock().await.moderation_columns = value;
    }

    pub async fn set_fail_selects(&self, value: bool) {
        self.inner.lock().await.fail_selects = value;
    }

    pub async fn set_fail_inserts(&self, value: bool) {
        self.inner.lock().await.fail_inserts = value;
    }

    pub async fn set_fail_updates(&self, value: bool) {
        self.inner.lock().await.fail_updates = value;
    }

    pub async fn set_fail_deletes(&self, value: bool) {
        self.inner.lock().await.fail_deletes = value;
    }

    pub async fn set_fail_uploads(&self, value: bool) {
        self.inner.lock().await.fail_uploads = value;
    }

    /// When set, deletes report zero affected rows without removing
    /// anything, the way a permission-restricted table behaves.
    pub async fn set_deny_deletes(&self, value: bool) {
        self.inner.lock().await.deny_deletes = value;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryStore {
    async fn select_comments(&self) -> RemoteResult<Vec<RemoteComment>> {
        let inner = self.inner.lock().await;
        if inner.fail_selects {
            return Err(unavailable("select"));
        }

        let mut rows = inner.rows.clone();
        if !inner.moderation_columns {
            for row in &mut rows {
                row.pinned = None;
                row.hidden = None;
            }
        }
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_comment(&self, new: &NewComment) -> RemoteResult<RemoteComment> {
        let mut inner = self.inner.lock().await;
        if inner.fail_inserts {
            return Err(unavailable("insert"));
        }

        let has_moderation = inner.moderation_columns;
        let row = RemoteComment {
            id: Uuid::now_v7().to_string(),
            name: Some(new.name.clone()),
            message: Some(new.message.clone()),
            profile_photo_url: new.profile_photo_url.clone(),
            created_at: Some(Utc::now()),
            likes: Some(0),
            pinned: has_moderation.then_some(false),
            hidden: has_moderation.then_some(false),
        };
        inner.rows.push(row.clone());
        Ok(row)
    }

    async fn update_comment(&self, id: &str, patch: &CommentPatch) -> RemoteResult<u64> {
        let mut inner = self.inner.lock().await;
        if inner.fail_updates {
            return Err(unavailable("update"));
        }

        if !inner.moderation_columns {
            if patch.pinned.is_some() {
                return Err(RemoteError::MissingColumn {
                    column: "pinned".to_string(),
                });
            }
            if patch.hidden.is_some() {
                return Err(RemoteError::MissingColumn {
                    column: "hidden".to_string(),
                });
            }
        }

        let Some(row) = inner.rows.iter_mut().find(|row| row.id == id) else {
            return Ok(0);
        };

        if let Some(likes) = patch.likes {
            row.likes = Some(likes);
        }
        if let Some(pinned) = patch.pinned {
            row.pinned = Some(pinned);
        }
        if let Some(hidden) = patch.hidden {
            row.hidden = Some(hidden);
        }
        Ok(1)
    }

    async fn delete_comment(&self, id: &str) -> RemoteResult<u64> {
        let mut inner = self.inner.lock().await;
        if inner.fail_deletes {
            return Err(unavailable("delete"));
        }
        if inner.deny_deletes {
            return Ok(0);
        }

        let before = inner.rows.len();
        inner.rows.retain(|row| row.id != id);
        Ok((before - inner.rows.len()) as u64)
    }

    async fn comment_exists(&self, id: &str) -> RemoteResult<bool> {
        let inner = self.inner.lock().await;
        if inner.fail_selects {
            return Err(unavailable("select"));
        }
        Ok(inner.rows.iter().any(|row| row.id == id))
    }

    async fn upload_photo(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: Option<&str>,
    ) -> RemoteResult<String> {
        let mut inner = self.inner.lock().await;
        if inner.fail_uploads {
            return Err(unavailable("upload"));
        }

        let key = key.trim_matches('/').to_string();
        if key.is_empty() {
            return Err(RemoteError::InvalidPayload(
                "Photo object key cannot be empty".to_string(),
            ));
        }

        let url = format!("{PUBLIC_URL_BASE}/{key}");
        inner.photos.insert(key, bytes.to_vec());
        Ok(url)
    }

    async fn remove_photo(&self, key: &str) -> RemoteResult<()> {
        let mut inner = self.inner.lock().await;
        inner.photos.remove(key.trim_matches('/'));
        Ok(())
    }

    fn photo_key(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(PUBLIC_URL_BASE)?.trim_matches('/');
        if key.is_empty() {
            return None;
        }
        Some(key.to_string())
    }
}

fn unavailable(operation: &str) -> RemoteError {
    RemoteError::Api {
        status: 503,
        code: None,
        message: format!("memory store {operation} unavailable"),
    }
}
