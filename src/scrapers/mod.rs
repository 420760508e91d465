//! Web search and article scraping.
//!
//! This module contains the two read-only web capabilities the pipeline
//! depends on, each behind a narrow trait so the aggregator and worker can be
//! driven by fakes in tests:
//!
//! | Capability | Trait | Live implementation |
//! |------------|-------|---------------------|
//! | Source discovery | [`Discover`] | [`search::DuckDuckGo`] |
//! | Article extraction | [`Extract`] | [`article::ArticleScraper`] |
//!
//! # Common Patterns
//!
//! - Every request carries a randomly chosen browser user agent
//! - Failures are values: discovery returns an empty list, extraction a
//!   [`Rejection`](crate::error::Rejection); neither is ever retried in place
//! - Every call accepts the worker's cancellation token and gives up as soon
//!   as it fires

pub mod article;
pub mod search;
pub mod source;

use crate::error::Rejection;
use crate::models::{ArticleRecord, DiscoveryHit};
use tokio_util::sync::CancellationToken;

/// Turns a topic query into ranked candidate links.
pub trait Discover {
    /// Return at most `max_results` hits in provider order. Never fails:
    /// network problems and empty result pages both yield an empty list.
    async fn discover(
        &self,
        query: &str,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Vec<DiscoveryHit>;
}

/// Turns a URL into an article, or explains why it could not.
pub trait Extract {
    async fn extract(&self, url: &str, cancel: &CancellationToken)
    -> Result<ArticleRecord, Rejection>;

    /// Article links found on a section or home page, in page order.
    async fn source_links(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, Rejection>;
}
