//! Article extraction from arbitrary news pages.
//!
//! Pages are fetched with a randomised browser user agent and parsed with
//! `scraper`. Extraction prefers structured metadata (Open Graph, article
//! meta tags) and falls back to the visible document.
//!
//! # Acceptance
//!
//! A page becomes an [`ArticleRecord`] only if it has a title, a body, and at
//! least [`MIN_ARTICLE_WORDS`] words of body text. Everything else is a
//! [`Rejection`] carrying the reason.

use super::Extract;
use super::source;
use crate::error::Rejection;
use crate::models::ArticleRecord;
use crate::utils::{count_words, jitter, leading_sentences_summary, random_user_agent};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Minimum body length for a page to count as an article on its own.
pub const MIN_ARTICLE_WORDS: usize = 100;

/// Summaries shorter than this are replaced by the leading sentences.
const MIN_SUMMARY_CHARS: usize = 50;

const ARTICLE_TIMEOUT: Duration = Duration::from_secs(25);
const SOURCE_TIMEOUT: Duration = Duration::from_secs(30);
const KEYWORD_COUNT: usize = 10;
const SUMMARY_SENTENCES: usize = 5;

static STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "more",
    "most", "new", "not", "of", "on", "one", "or", "other", "our", "out", "over", "said", "she",
    "so", "some", "than", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "to", "up", "us", "was", "we", "were", "what", "when", "which", "who", "will", "with",
    "would", "you", "your",
];

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: Lazy<Selector> = Lazy::new(|| Selector::parse($css).expect("static selector"));
    };
}

selector!(OG_TITLE, r#"meta[property="og:title"]"#);
selector!(TITLE, "title");
selector!(H1, "h1");
selector!(ARTICLE, "article");
selector!(PARAGRAPH, "p");
selector!(OG_IMAGE, r#"meta[property="og:image"]"#);
selector!(IMG, "img");
selector!(META_KEYWORDS, r#"meta[name="keywords"], meta[name="news_keywords"]"#);
selector!(META_AUTHOR, r#"meta[name="author"], meta[property="article:author"]"#);
selector!(REL_AUTHOR, r#"[rel="author"]"#);
selector!(
    META_DATE,
    r#"meta[property="article:published_time"], meta[name="pubdate"], meta[name="publish-date"], meta[name="date"], meta[itemprop="datePublished"]"#
);
selector!(TIME, "time[datetime]");

/// Live [`Extract`] implementation backed by `reqwest` and `scraper`.
#[derive(Debug, Clone)]
pub struct ArticleScraper {
    article_client: Client,
    source_client: Client,
}

impl Default for ArticleScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl ArticleScraper {
    pub fn new() -> Self {
        let build = |timeout| {
            Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new())
        };
        Self {
            article_client: build(ARTICLE_TIMEOUT),
            source_client: build(SOURCE_TIMEOUT),
        }
    }

    async fn fetch(client: &Client, url: &str, cancel: &CancellationToken) -> Result<String, Rejection> {
        let request = async {
            let response = client
                .get(url)
                .header(reqwest::header::USER_AGENT, random_user_agent())
                .send()
                .await
                .map_err(|e| Rejection::Network(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(Rejection::Http(status.as_u16()));
            }
            response
                .text()
                .await
                .map_err(|e| Rejection::Network(e.to_string()))
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Rejection::Cancelled),
            res = request => res,
        }
    }
}

impl Extract for ArticleScraper {
    #[instrument(level = "info", skip(self, cancel))]
    async fn extract(&self, url: &str, cancel: &CancellationToken) -> Result<ArticleRecord, Rejection> {
        if cancel.is_cancelled() {
            return Err(Rejection::Cancelled);
        }
        let html = Self::fetch(&self.article_client, url, cancel).await?;
        if jitter(cancel, 500..1500).await {
            return Err(Rejection::Cancelled);
        }

        match parse_article(url, &html) {
            Ok(article) => {
                info!(
                    title = %article.title,
                    words = article.word_count(),
                    images = article.all_image_urls.len(),
                    "Scraped article"
                );
                Ok(article)
            }
            Err(rejection) => {
                warn!(reason = %rejection, "Insufficient article content");
                Err(rejection)
            }
        }
    }

    #[instrument(level = "info", skip(self, cancel))]
    async fn source_links(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<String>, Rejection> {
        if cancel.is_cancelled() {
            return Err(Rejection::Cancelled);
        }
        let html = Self::fetch(&self.source_client, url, cancel).await?;
        let page = source::SourcePage::parse(url, &html);

        let mut links = Vec::new();
        for feed_url in page.feeds.iter().take(2) {
            match Self::fetch(&self.source_client, feed_url, cancel).await {
                Ok(xml) => links.extend(source::parse_feed_links(&xml)),
                Err(Rejection::Cancelled) => return Err(Rejection::Cancelled),
                Err(e) => debug!(feed = %feed_url, reason = %e, "Feed unavailable"),
            }
        }
        links.extend(page.article_links);

        let links: Vec<String> = links.into_iter().unique().collect();
        info!(count = links.len(), feeds = page.feeds.len(), "Enumerated source page links");
        if links.is_empty() {
            Err(Rejection::NoLinks)
        } else {
            Ok(links)
        }
    }
}

/// Parse an article page into a record, or reject it.
pub fn parse_article(url: &str, html: &str) -> Result<ArticleRecord, Rejection> {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    if title.is_empty() {
        return Err(Rejection::EmptyTitle);
    }
    let body = extract_body(&document);
    if body.trim().is_empty() {
        return Err(Rejection::EmptyBody);
    }
    let words = count_words(&body);
    if words < MIN_ARTICLE_WORDS {
        return Err(Rejection::TooShort { words });
    }

    let mut article = ArticleRecord::new(url, title, body);

    let mut keywords = meta_keywords(&document);
    if keywords.is_empty() {
        keywords = frequent_terms(article.body_text(), KEYWORD_COUNT);
    }
    let mut summary = summarize(article.body_text(), &keywords, SUMMARY_SENTENCES);
    if summary.chars().count() < MIN_SUMMARY_CHARS {
        summary = leading_sentences_summary(article.body_text());
    }
    article.keywords = keywords;
    article.summary = summary;

    article.authors = extract_authors(&document);
    article.publish_date = extract_publish_date(&document);

    let base = Url::parse(url).ok();
    let top_image = first_content(&document, &OG_IMAGE).and_then(|src| absolutize(base.as_ref(), &src));
    let mut images: Vec<String> = top_image.iter().cloned().collect();
    for img in document.select(&IMG) {
        let src = img
            .value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"));
        if let Some(resolved) = src.and_then(|s| absolutize(base.as_ref(), s)) {
            images.push(resolved);
        }
    }
    article.all_image_urls = images.into_iter().unique().collect();
    article.top_image_url = top_image.or_else(|| article.all_image_urls.first().cloned());

    Ok(article)
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().join(" ")
}

fn first_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn extract_title(document: &Html) -> String {
    first_content(document, &OG_TITLE)
        .or_else(|| document.select(&TITLE).next().map(element_text))
        .or_else(|| document.select(&H1).next().map(element_text))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn in_page_chrome(el: &ElementRef<'_>) -> bool {
    el.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| matches!(e.name(), "nav" | "footer" | "aside" | "header" | "form"))
    })
}

/// Paragraph text of the page, one paragraph per block separated by blank lines.
fn extract_body(document: &Html) -> String {
    let paragraphs = |root: ElementRef<'_>| -> Vec<String> {
        root.select(&PARAGRAPH)
            .filter(|p| !in_page_chrome(p))
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect()
    };

    let mut blocks: Vec<String> = document.select(&ARTICLE).flat_map(paragraphs).collect();
    if blocks.is_empty() {
        blocks = paragraphs(document.root_element());
    }
    blocks.into_iter().unique().join("\n\n")
}

fn meta_keywords(document: &Html) -> Vec<String> {
    first_content(document, &META_KEYWORDS)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .unique()
                .collect()
        })
        .unwrap_or_default()
}

fn extract_authors(document: &Html) -> Vec<String> {
    let from_meta = document
        .select(&META_AUTHOR)
        .filter_map(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string());
    let from_links = document.select(&REL_AUTHOR).map(element_text);

    from_meta
        .chain(from_links)
        .filter(|a| !a.is_empty() && !a.starts_with("http"))
        .unique()
        .collect()
}

fn extract_publish_date(document: &Html) -> Option<NaiveDate> {
    let from_meta = document
        .select(&META_DATE)
        .filter_map(|el| el.value().attr("content"));
    let from_time = document
        .select(&TIME)
        .filter_map(|el| el.value().attr("datetime"));

    from_meta.chain(from_time).find_map(parse_leading_date)
}

/// Parse the `YYYY-MM-DD` prefix of an ISO-8601 timestamp.
pub fn parse_leading_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

fn absolutize(base: Option<&Url>, src: &str) -> Option<String> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    let url = match base {
        Some(base) => base.join(src).ok()?,
        None => Url::parse(src).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2 && w.chars().any(char::is_alphabetic))
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
}

/// The `n` most frequent non-stopword terms, ties broken by first appearance.
pub fn frequent_terms(text: &str, n: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (idx, term) in terms(text).enumerate() {
        counts.entry(term).or_insert((0, idx)).0 += 1;
    }
    counts
        .into_iter()
        .sorted_by(|(_, (ca, fa)), (_, (cb, fb))| cb.cmp(ca).then(fa.cmp(fb)))
        .take(n)
        .map(|(term, _)| term)
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_none_or(|next| next.is_whitespace());
        if at_boundary {
            let sentence = current.split_whitespace().join(" ");
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }
    let tail = current.split_whitespace().join(" ");
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Pick the `n` sentences that best cover `keywords`, in document order.
pub fn summarize(text: &str, keywords: &[String], n: usize) -> String {
    if keywords.is_empty() {
        return String::new();
    }
    let sentences = split_sentences(text);
    sentences
        .iter()
        .enumerate()
        .map(|(idx, sentence)| {
            let hits = terms(sentence)
                .filter(|t| keywords.iter().any(|k| k.eq_ignore_ascii_case(t)))
                .count();
            let len = count_words(sentence).max(1);
            (idx, hits as f64 / len as f64)
        })
        .filter(|(_, score)| *score > 0.0)
        .sorted_by(|(ia, sa), (ib, sb)| sb.total_cmp(sa).then(ia.cmp(ib)))
        .take(n)
        .map(|(idx, _)| idx)
        .sorted()
        .map(|idx| sentences[idx].as_str())
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn paragraph(topic: &str, n: usize) -> String {
        format!(
            "<p>{}</p>",
            (0..n).map(|i| format!("{topic} detail number {i} matters.")).join(" ")
        )
    }

    fn article_page(paragraphs: usize) -> String {
        let body: String = (0..paragraphs).map(|_| paragraph("Chip", 10)).collect();
        format!(
            r#"<html><head>
                <title>Fallback title</title>
                <meta property="og:title" content="Nvidia ships a new accelerator">
                <meta property="og:image" content="/img/hero.jpg">
                <meta name="author" content="Jane Doe">
                <meta property="article:published_time" content="2025-05-06T14:30:00Z">
                <meta name="keywords" content="nvidia, gpu, nvidia, datacenter">
            </head><body>
                <nav><p>Home Sections Subscribe Login Newsletter Contact About Us</p></nav>
                <article>{body}<img src="https://cdn.example.com/chart.png"><img src="data:image/gif;base64,AAAA"></article>
                <footer><p>Copyright notice for the whole site goes here</p></footer>
            </body></html>"#
        )
    }

    #[test]
    fn test_parse_article_full_metadata() {
        let article = parse_article("https://example.com/2025/05/06/gpu", &article_page(3)).unwrap();
        assert_eq!(article.title, "Nvidia ships a new accelerator");
        assert_eq!(article.authors, vec!["Jane Doe"]);
        assert_eq!(article.publish_date, NaiveDate::from_ymd_opt(2025, 5, 6));
        assert_eq!(article.keywords, vec!["nvidia", "gpu", "datacenter"]);
        assert_eq!(article.top_image_url.as_deref(), Some("https://example.com/img/hero.jpg"));
        assert_eq!(
            article.all_image_urls,
            vec!["https://example.com/img/hero.jpg", "https://cdn.example.com/chart.png"]
        );
        assert!(!article.body_text().contains("Subscribe"));
        assert!(!article.body_text().contains("Copyright"));
        assert_eq!(article.word_count(), count_words(article.body_text()));
        assert!(article.word_count() >= MIN_ARTICLE_WORDS);
        assert!(!article.summary.is_empty());
    }

    #[test]
    fn test_parse_article_rejects_short_pages() {
        let err = parse_article("https://example.com/a", &article_page(1)).unwrap_err();
        assert!(matches!(err, Rejection::TooShort { words } if words < MIN_ARTICLE_WORDS));
    }

    #[test]
    fn test_parse_article_rejects_missing_title_or_body() {
        let no_title = format!("<html><body>{}</body></html>", paragraph("Chip", 40));
        assert_eq!(parse_article("https://example.com/a", &no_title), Err(Rejection::EmptyTitle));

        let no_body = "<html><head><title>Only a title</title></head><body></body></html>";
        assert_eq!(parse_article("https://example.com/a", no_body), Err(Rejection::EmptyBody));
    }

    #[test]
    fn test_summary_falls_back_to_leading_sentences() {
        let body: String = (0..3).map(|_| paragraph("Chip", 10)).collect();
        let html = format!("<html><head><title>T</title></head><body>{body}</body></html>");
        let article = parse_article("https://example.com/a", &html).unwrap();
        assert!(article.summary.len() >= MIN_SUMMARY_CHARS);
        assert_eq!(
            leading_sentences_summary("Short one. Short two. Short three. Four."),
            "Short one. Short two. Short three."
        );
    }

    #[test]
    fn test_frequent_terms() {
        let text = "Robots build robots. Robots need chips; chips need power. The power grid.";
        assert_eq!(frequent_terms(text, 3), vec!["robots", "need", "chips"]);
    }

    #[test]
    fn test_summarize_keeps_document_order() {
        let text = "Weather was mild. Chips power robots. Lunch was served. Robots use chips daily.";
        let keywords = vec!["chips".to_string(), "robots".to_string()];
        assert_eq!(
            summarize(text, &keywords, 2),
            "Chips power robots. Robots use chips daily."
        );
        assert_eq!(summarize(text, &[], 2), "");
    }

    #[test]
    fn test_parse_leading_date() {
        assert_eq!(parse_leading_date("2024-02-29T10:00:00+01:00"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(parse_leading_date("2024-13-01"), None);
        assert_eq!(parse_leading_date("May 5"), None);
    }

    #[tokio::test]
    async fn test_extract_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2025/05/06/gpu"))
            .respond_with(ResponseTemplate::new(200).set_body_string(article_page(3)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scraper = ArticleScraper::new();
        let cancel = CancellationToken::new();
        let url = format!("{}/2025/05/06/gpu", server.uri());
        let article = scraper.extract(&url, &cancel).await.unwrap();
        assert_eq!(article.url(), url);

        let missing = scraper.extract(&format!("{}/missing", server.uri()), &cancel).await;
        assert_eq!(missing, Err(Rejection::Http(404)));
    }

    #[tokio::test]
    async fn test_source_links_reads_feed_and_page_links() {
        let server = MockServer::start().await;
        let base = server.uri();
        let home = format!(
            r#"<html><head><link rel="alternate" type="application/rss+xml" href="/feed.xml"></head>
            <body><a href="/tech/2025/story-one">One</a><a href="/about">About</a>
            <a href="https://elsewhere.example/x/y">Off-site</a></body></html>"#
        );
        let feed = format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Feed</title>
            <item><title>Feed story</title><link>{base}/tech/2025/feed-story</link></item>
            </channel></rss>"#
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(home))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed))
            .mount(&server)
            .await;

        let links = ArticleScraper::new()
            .source_links(&format!("{base}/"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            links,
            vec![
                format!("{base}/tech/2025/feed-story"),
                format!("{base}/tech/2025/story-one"),
            ]
        );
    }
}
