//! corkboard-core - Core library for Corkboard
//!
//! This crate contains the comment models, the local moderation override
//! store, the hosted-store client, and the synchronization engine shared by
//! the public comment board and the admin moderation panel.

pub mod board;
pub mod engine;
pub mod error;
pub mod models;
pub mod moderation;
pub mod overrides;
pub mod remote;
pub mod util;

pub use board::CommentBoard;
pub use engine::{
    CommentEngine, CommentView, ConnectionState, DeleteOutcome, LikeOutcome, Placement, Submission,
};
pub use error::{Error, Result};
pub use models::{Comment, CommentDraft, CommentId, PhotoUpload};
pub use moderation::{ModerationPanel, StatusFilter};
pub use overrides::{FileStatusPersistence, ModerationFlags, OverrideStore, StatusPersistence};
pub use remote::{RemoteConfig, RemoteError, RemoteStore, SupabaseStore};
