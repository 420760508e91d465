//! Source discovery through DuckDuckGo's HTML results page.
//!
//! [DuckDuckGo HTML](https://html.duckduckgo.com/html/) serves a script-free
//! results page, so links can be pulled straight out of `a.result__a`.
//!
//! # URL Pattern
//!
//! Result links are usually redirect wrappers such as
//! `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fstory&rut=...`;
//! the real target lives in the `uddg` query parameter.

use super::Discover;
use crate::models::DiscoveryHit;
use crate::utils::{random_user_agent, truncate_for_log};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

const DUCKDUCKGO_HTML: &str = "https://html.duckduckgo.com/html/";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(20);

static RESULT_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__a").expect("static selector"));

/// DuckDuckGo-backed [`Discover`] implementation.
#[derive(Debug, Clone)]
pub struct DuckDuckGo {
    client: Client,
    endpoint: String,
    topical_keywords: Vec<String>,
}

impl DuckDuckGo {
    pub fn new(topical_keywords: Vec<String>) -> Self {
        Self::with_endpoint(DUCKDUCKGO_HTML, topical_keywords)
    }

    /// Point at a different results endpoint (used by tests).
    pub fn with_endpoint(endpoint: impl Into<String>, topical_keywords: Vec<String>) -> Self {
        let client = Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            topical_keywords: topical_keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    async fn fetch_results_page(&self, query: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

impl Discover for DuckDuckGo {
    #[instrument(level = "info", skip(self, cancel))]
    async fn discover(
        &self,
        query: &str,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Vec<DiscoveryHit> {
        let max_results = max_results.max(1);
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let html = tokio::select! {
            _ = cancel.cancelled() => return Vec::new(),
            res = self.fetch_results_page(query) => match res {
                Ok(html) => html,
                Err(e) => {
                    warn!(error = %e, "Search request failed");
                    return Vec::new();
                }
            },
        };

        let hits = parse_results(&html, query, max_results, &self.topical_keywords);
        if hits.is_empty() {
            info!("No usable results matched the topical filter");
        } else {
            info!(count = hits.len(), "Discovered candidate articles");
        }
        debug!(hits = ?hits, "Discovery hits");
        hits
    }
}

/// Extract relevant hits from a results page, preserving provider order.
pub fn parse_results(
    html: &str,
    query: &str,
    max_results: usize,
    topical_keywords: &[String],
) -> Vec<DiscoveryHit> {
    let document = Html::parse_document(html);
    let broad = is_broad_query(query);
    let mut hits: Vec<DiscoveryHit> = Vec::new();

    for link in document.select(&RESULT_LINK) {
        if hits.len() >= max_results {
            break;
        }
        let title = link.text().collect::<String>().trim().to_string();
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_result_url(href) else {
            debug!(href = %truncate_for_log(href, 120), "Dropped non-article result link");
            continue;
        };
        if title.is_empty() || hits.iter().any(|h| h.url == url) {
            continue;
        }
        if broad || is_relevant(&title, &url, topical_keywords) {
            hits.push(DiscoveryHit { title, url });
        }
    }

    hits
}

/// Queries of fewer than three terms are trusted to be on-topic already.
pub fn is_broad_query(query: &str) -> bool {
    query.split_whitespace().count() < 3
}

/// Whether any topical keyword appears in the lowercased title or URL.
///
/// Matching is by substring, so short keywords such as `ai` also match inside
/// longer words.
pub fn is_relevant(title: &str, url: &str, topical_keywords: &[String]) -> bool {
    let title = title.to_lowercase();
    let url = url.to_lowercase();
    topical_keywords
        .iter()
        .any(|k| title.contains(k.as_str()) || url.contains(k.as_str()))
}

/// Unwrap DuckDuckGo redirect links and drop anything that is not an
/// external http(s) URL.
pub fn resolve_result_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;

    let target = if is_duckduckgo_host(&parsed) && parsed.path().starts_with("/l/") {
        let (_, uddg) = parsed.query_pairs().find(|(k, _)| k == "uddg")?;
        Url::parse(&uddg).ok()?
    } else {
        parsed
    };

    if !matches!(target.scheme(), "http" | "https") || is_duckduckgo_host(&target) {
        return None;
    }
    Some(target.to_string())
}

fn is_duckduckgo_host(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"))
}
