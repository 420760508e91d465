//! Remote platforms the finished post touches.
//!
//! | Capability | Trait | Live implementation |
//! |------------|-------|---------------------|
//! | Publishing | [`Publish`] | [`blogger::Blogger`] |
//! | Related video lookup | [`VideoSearch`] | [`youtube::YouTube`] |
//!
//! Publishing reports a typed [`PublishError`] so the worker can tell an
//! expired token apart from an ordinary platform failure. Video lookup is
//! best-effort and only ever yields a video or nothing.

pub mod blogger;
pub mod youtube;

use crate::error::PublishError;
use crate::models::{PostResult, RelatedVideo};

/// Creates public posts on a blog.
pub trait Publish {
    async fn publish(
        &self,
        document: &str,
        blog_id: &str,
        title: &str,
        labels: &[String],
    ) -> Result<PostResult, PublishError>;
}

/// Finds at most one embeddable video for a topic.
pub trait VideoSearch {
    async fn find_related(&self, query: &str) -> Option<RelatedVideo>;
}
