//! Public comment board session.

use std::collections::HashSet;

use crate::engine::{CommentEngine, CommentView, ConnectionState, LikeOutcome, Placement};
use crate::models::{Comment, CommentDraft, CommentId};
use crate::overrides::StatusPersistence;
use crate::remote::RemoteStore;
use crate::{Error, Result};

/// Session state behind the public comment board.
///
/// Owns the comment snapshot, the pending submission draft, and the
/// session liked-set. The snapshot is replaced wholesale by remote-backed
/// loads; a local-only or lost session keeps what it has added.
pub struct CommentBoard<R: RemoteStore, P: StatusPersistence> {
    engine: CommentEngine<R, P>,
    comments: Vec<Comment>,
    draft: CommentDraft,
    liked: HashSet<CommentId>,
    loading: bool,
    submitting: bool,
}

impl<R: RemoteStore, P: StatusPersistence> CommentBoard<R, P> {
    #[must_use]
    pub fn new(engine: CommentEngine<R, P>) -> Self {
        Self {
            engine,
            comments: Vec::new(),
            draft: CommentDraft::default(),
            liked: HashSet::new(),
            loading: false,
            submitting: false,
        }
    }

    /// Load the public view.
    pub async fn load(&mut self) {
        if self.loading {
            return;
        }
        self.loading = true;
        let fetched = self.engine.fetch_comments(CommentView::Public).await;
        if self.engine.is_connected() {
            self.comments = fetched;
        }
        self.loading = false;
    }

    /// Re-arm a lost connection and load again.
    pub async fn retry(&mut self) {
        self.engine.reconnect();
        self.load().await;
    }

    /// Submit the pending draft.
    ///
    /// On success (remote or local fallback) the new comment is prepended
    /// and the draft cleared. A validation error leaves both the list and
    /// the draft untouched.
    pub async fn submit(&mut self) -> Result<Placement> {
        if self.submitting {
            return Err(Error::InvalidInput(
                "A submission is already in flight".to_string(),
            ));
        }
        self.submitting = true;
        let result = self.engine.submit(&self.draft).await;
        let outcome = match result {
            Ok(submission) => {
                self.comments.insert(0, submission.comment);
                self.draft = CommentDraft::default();
                Ok(submission.placement)
            }
            Err(error) => Err(error),
        };
        self.submitting = false;
        outcome
    }

    /// Like a comment once per session.
    ///
    /// The counter bump is optimistic; the id is recorded so the next
    /// attempt is a no-op.
    pub async fn like(&mut self, id: &CommentId) -> Result<LikeOutcome> {
        let Some(position) = self.comments.iter().position(|comment| &comment.id == id) else {
            return Err(Error::CommentNotFound(id.to_string()));
        };

        let current = self.comments[position].likes;
        let outcome = self.engine.like(id, current, &self.liked).await;
        if outcome == LikeOutcome::Applied {
            self.comments[position].likes = current.saturating_add(1);
            self.liked.insert(id.clone());
        }
        Ok(outcome)
    }

    /// Comments in render order, re-filtered so hidden or malformed entries
    /// never surface even when the snapshot predates a moderation action.
    #[must_use]
    pub fn visible(&self) -> Vec<&Comment> {
        self.comments
            .iter()
            .filter(|comment| !comment.hidden && !comment.is_malformed())
            .collect()
    }

    /// The raw snapshot, unfiltered.
    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    #[must_use]
    pub const fn draft(&self) -> &CommentDraft {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: CommentDraft) {
        self.draft = draft;
    }

    #[must_use]
    pub fn has_liked(&self, id: &CommentId) -> bool {
        self.liked.contains(id)
    }

    #[must_use]
    pub const fn connection(&self) -> ConnectionState {
        self.engine.connection()
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        self.submitting
    }
}
