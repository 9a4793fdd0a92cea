//! Comment synchronization engine.
//!
//! Produces a consistent, ordered view of comments for the public board and
//! the moderation panel, and applies mutations with remote-write-then-local
//! semantics: the remote store is written first when one is configured, and
//! the local override store catches whatever could not land remotely. The
//! engine owns no comment list; callers hold the snapshot and replace it
//! wholesale on fetch, apart from the sanctioned optimistic patches
//! (submit-prepend and like-increment).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Comment, CommentDraft, CommentId, PhotoUpload};
use crate::overrides::{OverrideStore, StatusPersistence};
use crate::remote::{CommentPatch, NewComment, RemoteComment, RemoteError, RemoteStore};
use crate::util::normalize_text_option;
use crate::{Error, Result};

/// Remote connectivity as observed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A remote store is configured and assumed reachable.
    Connected,
    /// No remote store is configured; the session is local-only.
    LocalOnly,
    /// A remote query failed; reads stay local until `reconnect`.
    Lost,
}

/// Which consumer a fetched list is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentView {
    /// Public board: hidden and malformed entries are filtered out.
    Public,
    /// Moderation panel: unfiltered, including hidden rows.
    Admin,
}

/// Where a submitted comment ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Stored remotely; id and timestamp are server-assigned.
    Remote,
    /// Kept in session state only, after a failed or impossible remote
    /// insert.
    Local,
}

/// A successful submission: the normalized comment to prepend and the path
/// it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub comment: Comment,
    pub placement: Placement,
}

/// Result of a like request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    /// The caller should bump its in-memory counter and add the id to its
    /// session liked set.
    Applied,
    /// This session already liked the comment; nothing changed.
    AlreadyLiked,
}

/// Result of a confirmed delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The remote row was removed.
    Remote,
    /// No reachable remote; only local override state was cleared.
    LocalOnly,
}

/// The synchronization core, generic over the remote store and the override
/// persistence backend so both can be injected in tests.
pub struct CommentEngine<R: RemoteStore, P: StatusPersistence> {
    remote: Option<R>,
    overrides: OverrideStore<P>,
    connection: ConnectionState,
}

impl<R: RemoteStore, P: StatusPersistence> CommentEngine<R, P> {
    /// Build an engine. Without a remote store the engine starts, and
    /// stays, local-only.
    pub fn new(remote: Option<R>, overrides: OverrideStore<P>) -> Self {
        let connection = if remote.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::LocalOnly
        };
        Self {
            remote,
            overrides,
            connection,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// True when the engine currently talks to a remote store.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Re-arm a lost connection so the next fetch tries the remote again.
    pub fn reconnect(&mut self) {
        if self.connection == ConnectionState::Lost {
            self.connection = ConnectionState::Connected;
        }
    }

    /// The override store, exposed for diagnostics.
    #[must_use]
    pub const fn overrides(&self) -> &OverrideStore<P> {
        &self.overrides
    }

    /// Drop every stored override. Remote flag values are untouched and
    /// resurface on the next fetch.
    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Fetch and normalize the comment list.
    ///
    /// Local-only and lost connections return an empty list without touching
    /// the remote. A remote failure flips the connection to `Lost` and also
    /// returns empty; the read path never returns an error.
    pub async fn fetch_comments(&mut self, view: CommentView) -> Vec<Comment> {
        let Some(remote) = self.remote.as_ref() else {
            return Vec::new();
        };
        if self.connection == ConnectionState::Lost {
            return Vec::new();
        }

        match remote.select_comments().await {
            Ok(rows) => {
                self.connection = ConnectionState::Connected;
                let mut comments: Vec<Comment> =
                    rows.into_iter().map(|row| self.normalize(row)).collect();
                if view == CommentView::Public {
                    comments.retain(|comment| !comment.hidden && !comment.is_malformed());
                }
                sort_comments(&mut comments);
                comments
            }
            Err(error) => {
                tracing::warn!("Comment fetch failed, treating connection as lost: {error}");
                self.connection = ConnectionState::Lost;
                Vec::new()
            }
        }
    }

    /// Re-derive effective flags for an existing snapshot and restore the
    /// sort order, for consumers that cannot re-fetch.
    pub fn merge_overrides(&self, comments: &mut [Comment]) {
        for comment in comments.iter_mut() {
            let flags = self.overrides.status(comment.id.as_str());
            comment.pinned = comment.remote_pinned || flags.pinned;
            comment.hidden = comment.remote_hidden || flags.hidden;
        }
        sort_comments(comments);
    }

    /// Submit a new comment.
    ///
    /// Validation failures happen before any mutation, so the caller keeps
    /// its pending input. The photo upload and the remote insert are each
    /// best-effort: a failed upload drops the photo, a failed insert falls
    /// back to a locally synthesized comment.
    pub async fn submit(&self, draft: &CommentDraft) -> Result<Submission> {
        draft.validate()?;
        let name = draft.trimmed_name().to_string();
        let message = draft.trimmed_message().to_string();

        let photo_url = match &draft.photo {
            Some(photo) => self.upload_photo(photo).await,
            None => None,
        };

        if let Some(remote) = self.connected_remote() {
            let new = NewComment {
                name: name.clone(),
                message: message.clone(),
                profile_photo_url: photo_url.clone(),
            };
            match remote.insert_comment(&new).await {
                Ok(row) => {
                    return Ok(Submission {
                        comment: self.normalize(row),
                        placement: Placement::Remote,
                    });
                }
                Err(error) => {
                    tracing::warn!("Remote insert failed, storing comment locally: {error}");
                }
            }
        }

        Ok(Submission {
            comment: Comment::local(name, message, photo_url),
            placement: Placement::Local,
        })
    }

    /// Apply a like for `id`.
    ///
    /// The session liked-set is caller-owned and passed in; ids already in
    /// it are a no-op. The remote increment to `current_likes + 1` is
    /// best-effort: failures are logged and the local increment still
    /// applies.
    pub async fn like(
        &self,
        id: &CommentId,
        current_likes: u32,
        already_liked: &HashSet<CommentId>,
    ) -> LikeOutcome {
        if already_liked.contains(id) {
            return LikeOutcome::AlreadyLiked;
        }

        if let Some(remote) = self.connected_remote() {
            let patch = CommentPatch::likes(i64::from(current_likes) + 1);
            if let Err(error) = remote.update_comment(id.as_str(), &patch).await {
                tracing::warn!("Remote like for {id} failed: {error}");
            }
        }

        LikeOutcome::Applied
    }

    /// Toggle the pin flag for a comment, returning the new value.
    ///
    /// The remote column update is attempted when connected; a missing
    /// column is expected capability absence, any other failure is logged
    /// and does not block. The override store is then written
    /// unconditionally and is authoritative whenever the remote column is
    /// unavailable. The consumer re-derives its list afterwards.
    pub async fn toggle_pinned(&mut self, id: &CommentId, currently: bool) -> bool {
        let value = !currently;
        self.push_moderation_flag(id, CommentPatch::pinned(value))
            .await;
        self.overrides.set_pinned(id.as_str(), value);
        value
    }

    /// Toggle the hidden flag for a comment, returning the new value.
    pub async fn toggle_hidden(&mut self, id: &CommentId, currently: bool) -> bool {
        let value = !currently;
        self.push_moderation_flag(id, CommentPatch::hidden(value))
            .await;
        self.overrides.set_hidden(id.as_str(), value);
        value
    }

    /// Delete a comment. The consumer is responsible for confirming the
    /// action first.
    ///
    /// Connected: verify existence, delete, and inspect affected rows. Zero
    /// rows with no error means the row is still there, so the override
    /// entry stays and the caller gets a diagnosis instead of a silent
    /// no-op. On confirmed deletion the comment's photo object is removed
    /// best-effort, then the override entry. Disconnected: clear the
    /// override entry only.
    pub async fn delete(&mut self, comment: &Comment) -> Result<DeleteOutcome> {
        let Some(remote) = self.connected_remote() else {
            self.overrides.remove(comment.id.as_str());
            return Ok(DeleteOutcome::LocalOnly);
        };

        if !remote.comment_exists(comment.id.as_str()).await? {
            return Err(Error::CommentNotFound(comment.id.to_string()));
        }

        let affected = remote.delete_comment(comment.id.as_str()).await?;
        if affected == 0 {
            return Err(Error::DeleteBlocked {
                id: comment.id.to_string(),
            });
        }

        if let Some(url) = &comment.photo_url {
            self.remove_photo_object(url).await;
        }
        self.overrides.remove(comment.id.as_str());
        Ok(DeleteOutcome::Remote)
    }

    fn connected_remote(&self) -> Option<&R> {
        if self.is_connected() {
            self.remote.as_ref()
        } else {
            None
        }
    }

    fn normalize(&self, row: RemoteComment) -> Comment {
        let flags = self.overrides.status(&row.id);
        let remote_pinned = row.pinned.unwrap_or(false);
        let remote_hidden = row.hidden.unwrap_or(false);
        Comment {
            id: CommentId::from(row.id),
            name: row.name.unwrap_or_default(),
            message: row.message.unwrap_or_default(),
            photo_url: normalize_text_option(row.profile_photo_url),
            created_at: row.created_at.unwrap_or(DateTime::UNIX_EPOCH),
            likes: u32::try_from(row.likes.unwrap_or(0).max(0)).unwrap_or(u32::MAX),
            pinned: remote_pinned || flags.pinned,
            hidden: remote_hidden || flags.hidden,
            remote_pinned,
            remote_hidden,
        }
    }

    async fn upload_photo(&self, photo: &PhotoUpload) -> Option<String> {
        let remote = self.connected_remote()?;
        let key = photo_object_key(&photo.file_name);
        match remote
            .upload_photo(&key, &photo.bytes, photo.content_type.as_deref())
            .await
        {
            Ok(url) => Some(url),
            Err(error) => {
                tracing::warn!("Photo upload failed, submitting without photo: {error}");
                None
            }
        }
    }

    async fn push_moderation_flag(&self, id: &CommentId, patch: CommentPatch) {
        let Some(remote) = self.connected_remote() else {
            return;
        };
        match remote.update_comment(id.as_str(), &patch).await {
            Ok(0) => tracing::debug!("Moderation update for {id} matched no remote rows"),
            Ok(_) => {}
            Err(RemoteError::MissingColumn { column }) => {
                tracing::debug!("Remote schema has no {column} column; keeping the flag locally");
            }
            Err(error) => {
                tracing::warn!("Remote moderation update for {id} failed: {error}");
            }
        }
    }

    async fn remove_photo_object(&self, url: &str) {
        let Some(remote) = self.connected_remote() else {
            return;
        };
        let Some(key) = remote.photo_key(url) else {
            tracing::debug!("Photo URL is not in the managed bucket, leaving it: {url}");
            return;
        };
        if let Err(error) = remote.remove_photo(&key).await {
            tracing::warn!("Photo cleanup for {key} failed: {error}");
        }
    }
}

/// Pinned comments first, newest first inside each group. The sort is
/// stable, so equal keys keep their fetched order.
fn sort_comments(comments: &mut [Comment]) {
    comments.sort_by(|a, b| {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Collision-resistant object key for an uploaded photo, derived from the
/// upload time plus the original file name.
fn photo_object_key(file_name: &str) -> String {
    let ts = Utc::now().timestamp_millis();
    let id = Uuid::now_v7();
    format!("comments/{ts}-{id}-{}", sanitize_file_name(file_name))
}

fn sanitize_file_name(file_name: &str) -> String {
    let trimmed = file_name.trim().trim_matches('/');
    if trimmed.is_empty() {
        return "photo".to_string();
    }

    let (stem, ext) = trimmed
        .rsplit_once('.')
        .map_or((trimmed, ""), |parts| parts);
    let stem = sanitize_token(stem);
    let stem = if stem.is_empty() {
        "photo".to_string()
    } else {
        stem
    };
    let ext = sanitize_token(ext);

    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}

fn sanitize_token(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;

    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    out.trim_matches('-').to_string()
}
