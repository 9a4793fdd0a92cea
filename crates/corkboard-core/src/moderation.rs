//! Moderation panel session for the comment admin surface.

use std::collections::HashSet;

use crate::engine::{CommentEngine, CommentView, ConnectionState, DeleteOutcome};
use crate::models::{Comment, CommentId};
use crate::overrides::{OverrideStore, StatusPersistence};
use crate::remote::RemoteStore;
use crate::{Error, Result};

/// Status facet for the panel's filtered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Pinned,
    Hidden,
}

/// Admin-side session state: the unfiltered snapshot plus client-side
/// search and status filters.
///
/// Filtering happens purely in memory; narrowing the view never re-fetches.
/// Moderation actions go through the engine and then re-derive the
/// snapshot: a re-fetch when the remote is reachable, a local override
/// merge otherwise.
pub struct ModerationPanel<R: RemoteStore, P: StatusPersistence> {
    engine: CommentEngine<R, P>,
    comments: Vec<Comment>,
    search: String,
    status: StatusFilter,
    busy: HashSet<CommentId>,
    loading: bool,
}

impl<R: RemoteStore, P: StatusPersistence> ModerationPanel<R, P> {
    #[must_use]
    pub fn new(engine: CommentEngine<R, P>) -> Self {
        Self {
            engine,
            comments: Vec::new(),
            search: String::new(),
            status: StatusFilter::All,
            busy: HashSet::new(),
            loading: false,
        }
    }

    /// Load the unfiltered admin view, hidden rows included.
    pub async fn load(&mut self) {
        if self.loading {
            return;
        }
        self.loading = true;
        let fetched = self.engine.fetch_comments(CommentView::Admin).await;
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

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.search = text.into();
    }

    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        self.status = status;
    }

    #[must_use]
    pub const fn status_filter(&self) -> StatusFilter {
        self.status
    }

    /// The rows matching the current search text and status filter.
    ///
    /// Search is a case-insensitive substring match over author name and
    /// message body.
    #[must_use]
    pub fn rows(&self) -> Vec<&Comment> {
        let needle = self.search.trim().to_lowercase();
        self.comments
            .iter()
            .filter(|comment| {
                let status_matches = match self.status {
                    StatusFilter::All => true,
                    StatusFilter::Pinned => comment.pinned,
                    StatusFilter::Hidden => comment.hidden,
                };
                if !status_matches {
                    return false;
                }
                if needle.is_empty() {
                    return true;
                }
                comment.name.to_lowercase().contains(&needle)
                    || comment.message.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Toggle the pin flag for a comment and re-derive the snapshot.
    /// Returns the new value.
    pub async fn toggle_pinned(&mut self, id: &CommentId) -> Result<bool> {
        let currently = self.find(id)?.pinned;
        self.begin(id)?;
        let value = self.engine.toggle_pinned(id, currently).await;
        self.refresh_after_action(None).await;
        self.busy.remove(id);
        Ok(value)
    }

    /// Toggle the hidden flag for a comment and re-derive the snapshot.
    /// Returns the new value.
    pub async fn toggle_hidden(&mut self, id: &CommentId) -> Result<bool> {
        let currently = self.find(id)?.hidden;
        self.begin(id)?;
        let value = self.engine.toggle_hidden(id, currently).await;
        self.refresh_after_action(None).await;
        self.busy.remove(id);
        Ok(value)
    }

    /// Delete a comment. The caller confirms the action before invoking
    /// this; a blocked or failed delete leaves the snapshot untouched.
    pub async fn delete(&mut self, id: &CommentId) -> Result<DeleteOutcome> {
        let comment = self.find(id)?.clone();
        self.begin(id)?;
        let result = self.engine.delete(&comment).await;
        if result.is_ok() {
            self.refresh_after_action(Some(id)).await;
        }
        self.busy.remove(id);
        result
    }

    /// Drop every stored override and re-derive the snapshot from remote
    /// flag values alone.
    pub fn clear_overrides(&mut self) {
        self.engine.clear_overrides();
        self.engine.merge_overrides(&mut self.comments);
    }

    /// Look up a comment in the current snapshot.
    #[must_use]
    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|comment| &comment.id == id)
    }

    /// The raw snapshot, unfiltered.
    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    #[must_use]
    pub const fn overrides(&self) -> &OverrideStore<P> {
        self.engine.overrides()
    }

    #[must_use]
    pub const fn connection(&self) -> ConnectionState {
        self.engine.connection()
    }

    #[must_use]
    pub fn is_busy(&self, id: &CommentId) -> bool {
        self.busy.contains(id)
    }

    fn find(&self, id: &CommentId) -> Result<&Comment> {
        self.comments
            .iter()
            .find(|comment| &comment.id == id)
            .ok_or_else(|| Error::CommentNotFound(id.to_string()))
    }

    fn begin(&mut self, id: &CommentId) -> Result<()> {
        if !self.busy.insert(id.clone()) {
            return Err(Error::InvalidInput(format!(
                "An action for comment {id} is already in flight"
            )));
        }
        Ok(())
    }

    /// Re-derive the snapshot after a moderation action: re-fetch when the
    /// remote is reachable, otherwise drop the removed row (if any) and
    /// merge overrides locally.
    async fn refresh_after_action(&mut self, removed: Option<&CommentId>) {
        if self.engine.is_connected() {
            let fetched = self.engine.fetch_comments(CommentView::Admin).await;
            if self.engine.is_connected() {
                self.comments = fetched;
                return;
            }
        }
        if let Some(id) = removed {
            self.comments.retain(|comment| &comment.id != id);
        }
        self.engine.merge_overrides(&mut self.comments);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    use crate::overrides::MemoryStatusPersistence;
    use crate::remote::{MemoryStore, RemoteComment};

    use super::*;

    type TestPanel = ModerationPanel<MemoryStore, MemoryStatusPersistence>;

    fn panel_with(store: MemoryStore) -> TestPanel {
        ModerationPanel::new(CommentEngine::new(
            Some(store),
            OverrideStore::open(MemoryStatusPersistence::new()),
        ))
    }

    fn row(id: &str, name: &str, message: &str, minutes_ago: i64) -> RemoteComment {
        RemoteComment {
            id: id.to_string(),
            name: Some(name.to_string()),
            message: Some(message.to_string()),
            profile_photo_url: None,
            created_at: Some(Utc::now() - Duration::minutes(minutes_ago)),
            likes: Some(0),
            pinned: Some(false),
            hidden: Some(false),
        }
    }

    fn ids(rows: &[&Comment]) -> Vec<String> {
        rows.iter().map(|comment| comment.id.to_string()).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_includes_hidden_rows() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "visible", 5)).await;
        let mut hidden = row("c2", "Brin", "tucked away", 1);
        hidden.hidden = Some(true);
        store.seed(hidden).await;

        let mut panel = panel_with(store);
        panel.load().await;

        assert_eq!(panel.comments().len(), 2);
        assert_eq!(ids(&panel.rows()), vec!["c2", "c1"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn search_matches_name_and_message_case_insensitively() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada Lovelace", "loved the garden", 3)).await;
        store.seed(row("c2", "Brin", "Great GARDEN photos", 2)).await;
        store.seed(row("c3", "Chen", "unrelated", 1)).await;

        let mut panel = panel_with(store);
        panel.load().await;

        panel.set_search("garden");
        assert_eq!(ids(&panel.rows()), vec!["c2", "c1"]);

        panel.set_search("ADA");
        assert_eq!(ids(&panel.rows()), vec!["c1"]);

        panel.set_search("  ");
        assert_eq!(panel.rows().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn status_filter_narrows_without_refetching() {
        let store = MemoryStore::new();
        let mut pinned = row("c1", "Ada", "pinned", 3);
        pinned.pinned = Some(true);
        store.seed(pinned).await;
        let mut hidden = row("c2", "Brin", "hidden", 2);
        hidden.hidden = Some(true);
        store.seed(hidden).await;
        store.seed(row("c3", "Chen", "plain", 1)).await;

        let mut panel = panel_with(store.clone());
        panel.load().await;
        store.set_fail_selects(true).await;

        panel.set_status_filter(StatusFilter::Pinned);
        assert_eq!(ids(&panel.rows()), vec!["c1"]);

        panel.set_status_filter(StatusFilter::Hidden);
        assert_eq!(ids(&panel.rows()), vec!["c2"]);

        panel.set_status_filter(StatusFilter::All);
        assert_eq!(panel.rows().len(), 3);
        assert_eq!(panel.connection(), ConnectionState::Connected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn toggle_pinned_updates_remote_and_snapshot() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "hello", 1)).await;

        let mut panel = panel_with(store.clone());
        panel.load().await;

        let id = CommentId::from("c1");
        assert!(panel.toggle_pinned(&id).await.unwrap());
        assert!(panel.comments()[0].pinned);
        assert_eq!(store.rows().await[0].pinned, Some(true));
        assert!(!panel.is_busy(&id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn toggle_hidden_without_remote_column_still_hides() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "hello", 1)).await;
        store.set_moderation_columns(false).await;

        let mut panel = panel_with(store.clone());
        panel.load().await;

        let id = CommentId::from("c1");
        assert!(panel.toggle_hidden(&id).await.unwrap());
        assert!(panel.comments()[0].hidden);
        assert_eq!(store.rows().await[0].hidden, Some(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn toggle_falls_back_to_local_merge_when_refetch_fails() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "hello", 1)).await;

        let mut panel = panel_with(store.clone());
        panel.load().await;
        store.set_fail_selects(true).await;

        let id = CommentId::from("c1");
        assert!(panel.toggle_pinned(&id).await.unwrap());
        assert_eq!(panel.connection(), ConnectionState::Lost);
        assert!(panel.comments()[0].pinned);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_removes_row_everywhere() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "first", 2)).await;
        store.seed(row("c2", "Brin", "second", 1)).await;

        let mut panel = panel_with(store.clone());
        panel.load().await;

        let outcome = panel.delete(&CommentId::from("c1")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Remote);
        assert_eq!(ids(&panel.rows()), vec!["c2"]);
        assert_eq!(store.rows().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocked_delete_keeps_snapshot_and_override() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "stubborn", 1)).await;

        let mut panel = panel_with(store.clone());
        panel.load().await;

        let id = CommentId::from("c1");
        panel.toggle_hidden(&id).await.unwrap();
        store.set_deny_deletes(true).await;

        let error = panel.delete(&id).await.unwrap_err();
        assert!(matches!(error, Error::DeleteBlocked { .. }));
        assert_eq!(panel.comments().len(), 1);
        assert!(panel.overrides().status("c1").hidden);
        assert!(!panel.is_busy(&id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_unknown_id_reports_not_found() {
        let mut panel = panel_with(MemoryStore::new());
        panel.load().await;

        let error = panel.delete(&CommentId::from("ghost")).await.unwrap_err();
        assert!(matches!(error, Error::CommentNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn busy_guard_rejects_concurrent_action() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "hello", 1)).await;

        let mut panel = panel_with(store);
        panel.load().await;

        let id = CommentId::from("c1");
        panel.busy.insert(id.clone());
        let error = panel.toggle_pinned(&id).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
        assert!(!panel.comments()[0].pinned);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnected_delete_clears_override_and_drops_row() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "hello", 1)).await;

        let mut panel = panel_with(store.clone());
        panel.load().await;
        let id = CommentId::from("c1");
        panel.toggle_hidden(&id).await.unwrap();

        store.set_fail_selects(true).await;
        panel.load().await;
        assert_eq!(panel.connection(), ConnectionState::Lost);

        let outcome = panel.delete(&id).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::LocalOnly);
        assert!(panel.comments().is_empty());
        assert!(panel.overrides().is_empty());
        assert_eq!(store.rows().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_overrides_restores_remote_flag_values() {
        let store = MemoryStore::new();
        store.seed(row("c1", "Ada", "hello", 1)).await;
        store.set_moderation_columns(false).await;

        let mut panel = panel_with(store);
        panel.load().await;
        let id = CommentId::from("c1");
        panel.toggle_hidden(&id).await.unwrap();
        assert!(panel.comments()[0].hidden);

        panel.clear_overrides();
        assert!(!panel.comments()[0].hidden);
        assert!(panel.overrides().is_empty());
    }
}
