//! Combining related articles until a post is long enough.
//!
//! A primary article that already meets the word target is posted alone.
//! Otherwise one follow-up search is made from the primary's keywords and
//! title, and supporting articles are appended in discovery order until the
//! batch is full, the target is met, or the candidates run out.

use crate::ledger::Ledger;
use crate::models::{AggregationBatch, ArticleRecord};
use crate::scrapers::{Discover, Extract};
use crate::utils::jitter;
use itertools::Itertools;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Supporting articles below this length add too little to be worth a section.
pub const MIN_SUPPORTING_WORDS: usize = 200;

/// Upper bound on follow-up search results per aggregation.
const MAX_CANDIDATES: usize = 5;

const RELATED_QUERY_SUFFIX: &str = "latest technology";

/// Follow-up search query: up to two keywords, then the title, then a fixed
/// topical suffix. Repeated terms are kept once, first occurrence wins.
pub fn related_query(primary: &ArticleRecord) -> String {
    let terms = primary
        .effective_keywords()
        .iter()
        .take(2)
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .chain(std::iter::once(primary.title.as_str()))
        .unique()
        .join(" ");
    format!("{terms} {RELATED_QUERY_SUFFIX}")
}

/// Build the batch for one post around `primary`.
///
/// Never fails; the returned batch may still be below `min_words`, and the
/// caller decides whether that is publishable. At most
/// `min(2 * (max_articles - 1), 5)` supporting extractions are attempted.
#[instrument(level = "info", skip_all, fields(primary = %primary.url(), words = primary.word_count()))]
pub async fn aggregate<D, X>(
    primary: ArticleRecord,
    ledger: &Ledger,
    min_words: usize,
    max_articles: usize,
    discover: &D,
    extract: &X,
    cancel: &CancellationToken,
) -> AggregationBatch
where
    D: Discover,
    X: Extract,
{
    let mut batch = AggregationBatch::new(primary);
    if batch.total_words() >= min_words {
        info!("Primary article meets the word target on its own");
        return batch;
    }

    let additional = max_articles.saturating_sub(batch.len());
    if additional == 0 {
        return batch;
    }

    let query = related_query(batch.primary());
    let wanted = (additional * 2).min(MAX_CANDIDATES);
    info!(
        total = batch.total_words(),
        target = min_words,
        candidates = wanted,
        query = %query,
        "Searching for supporting articles"
    );
    let candidates = discover.discover(&query, wanted, cancel).await;

    let mut tried: HashSet<String> = HashSet::from([batch.primary().url().to_string()]);
    for hit in candidates {
        if cancel.is_cancelled() {
            break;
        }
        if batch.len() >= max_articles {
            info!("Reached max articles to combine");
            break;
        }
        if batch.total_words() >= min_words {
            info!(total = batch.total_words(), "Reached target word count");
            break;
        }
        if ledger.contains(&hit.url) || !tried.insert(hit.url.clone()) {
            debug!(url = %hit.url, "Skipping supporting candidate already posted or tried");
            continue;
        }

        if jitter(cancel, 4_000..8_000).await {
            break;
        }
        match extract.extract(&hit.url, cancel).await {
            Ok(article) if article.word_count() < MIN_SUPPORTING_WORDS => {
                info!(url = %hit.url, words = article.word_count(), "Supporting article too short");
            }
            Ok(article) => {
                let words = article.word_count();
                if batch.push(article) {
                    info!(url = %hit.url, words, total = batch.total_words(), "Added supporting article");
                }
            }
            Err(rejection) => {
                debug!(url = %hit.url, reason = %rejection, "Supporting candidate rejected");
            }
        }
    }

    info!(
        articles = batch.len(),
        total = batch.total_words(),
        "Finished gathering supporting articles"
    );
    batch
}
