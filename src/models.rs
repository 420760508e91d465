//! Data models for scraped articles and the batches built from them.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`ArticleRecord`]: One scraped (and possibly AI-rewritten) article
//! - [`Enhancement`]: The rewritten fields produced by the enhancer
//! - [`DiscoveryHit`]: A search result not yet extracted
//! - [`AggregationBatch`]: The ordered articles that make up one post
//! - [`RelatedVideo`] and [`PostResult`]: Results of the external platforms

use crate::utils::count_words;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;

/// A candidate `(title, url)` pair returned by source discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryHit {
    pub title: String,
    pub url: String,
}

/// One scraped article.
///
/// The URL is fixed at construction and the word count is derived from the
/// body every time the body changes, so the two can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    url: String,
    pub title: String,
    body_text: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub publish_date: Option<NaiveDate>,
    pub top_image_url: Option<String>,
    pub all_image_urls: Vec<String>,
    pub keywords: Vec<String>,
    /// Keywords chosen by the enhancer; empty until enhanced.
    pub ai_keywords: Vec<String>,
    /// Meta description written by the enhancer; empty until enhanced.
    pub ai_meta_description: String,
    word_count: usize,
}

impl ArticleRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>, body_text: impl Into<String>) -> Self {
        let body_text = body_text.into();
        let word_count = count_words(&body_text);
        Self {
            url: url.into(),
            title: title.into(),
            body_text,
            summary: String::new(),
            authors: Vec::new(),
            publish_date: None,
            top_image_url: None,
            all_image_urls: Vec::new(),
            keywords: Vec::new(),
            ai_keywords: Vec::new(),
            ai_meta_description: String::new(),
            word_count,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    /// Replace title, body and SEO fields with the enhancer's output.
    pub fn apply_enhancement(&mut self, enhancement: Enhancement) {
        self.title = enhancement.title;
        self.body_text = enhancement.body_text;
        self.ai_keywords = enhancement.keywords;
        self.ai_meta_description = enhancement.meta_description;
        self.word_count = count_words(&self.body_text);
    }

    /// Keywords to steer follow-up searches: AI keywords when present,
    /// otherwise the raw extracted ones.
    pub fn effective_keywords(&self) -> &[String] {
        if self.ai_keywords.is_empty() {
            &self.keywords
        } else {
            &self.ai_keywords
        }
    }
}

/// The rewritten fields of an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enhancement {
    pub title: String,
    pub body_text: String,
    pub keywords: Vec<String>,
    pub meta_description: String,
}

/// Articles combined into one post, primary article first.
///
/// URLs are unique within a batch and the running word total only grows.
#[derive(Debug, Clone)]
pub struct AggregationBatch {
    articles: Vec<ArticleRecord>,
    urls: HashSet<String>,
    total_words: usize,
}

impl AggregationBatch {
    pub fn new(primary: ArticleRecord) -> Self {
        let total_words = primary.word_count();
        let urls = HashSet::from([primary.url().to_string()]);
        Self {
            articles: vec![primary],
            urls,
            total_words,
        }
    }

    /// Append a supporting article. Returns `false` (and leaves the batch
    /// untouched) if its URL is already in the batch.
    pub fn push(&mut self, article: ArticleRecord) -> bool {
        if !self.urls.insert(article.url().to_string()) {
            return false;
        }
        self.total_words += article.word_count();
        self.articles.push(article);
        true
    }

    pub fn primary(&self) -> &ArticleRecord {
        &self.articles[0]
    }

    pub fn articles(&self) -> &[ArticleRecord] {
        &self.articles
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    /// URLs in publication order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.articles.iter().map(ArticleRecord::url)
    }
}

/// An embeddable video found for a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedVideo {
    pub title: String,
    pub video_id: String,
}

/// A successfully created blog post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostResult {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}
