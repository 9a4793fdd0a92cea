//! Data models for Corkboard

mod comment;

pub use comment::{Comment, CommentDraft, CommentId, PhotoUpload};
