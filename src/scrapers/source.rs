//! Section and home page handling.
//!
//! When a search hit points at a front page rather than a story, the worker
//! treats it as a news source and looks for stories linked from it: first
//! through any RSS/Atom feeds the page advertises, then through same-site
//! links whose paths look like articles.

use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

static FEED_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"link[rel="alternate"][type*="rss"], link[rel="alternate"][type*="atom"]"#)
        .expect("static selector")
});
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// Whether `url` looks like a home or section page instead of an article.
///
/// A URL qualifies when its path is empty, `/`, or a single segment such as
/// `/technology`. Short article slugs (`/some-story`) match too, so this is a
/// known source of false positives.
pub fn is_probable_section_page(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path();
            path.is_empty() || path == "/" || path.split('/').count() <= 2
        }
        Err(_) => false,
    }
}

/// Links discovered on a source page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePage {
    /// Advertised RSS/Atom feeds, absolute.
    pub feeds: Vec<String>,
    /// Same-site links that look like articles, in page order.
    pub article_links: Vec<String>,
}

impl SourcePage {
    pub fn parse(page_url: &str, html: &str) -> Self {
        let Ok(base) = Url::parse(page_url) else {
            return Self::default();
        };
        let document = Html::parse_document(html);

        let feeds = document
            .select(&FEED_LINK)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base.join(href.trim()).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .map(|u| u.to_string())
            .unique()
            .collect();

        let article_links = document
            .select(&ANCHOR)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base.join(href.trim()).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .filter(|u| u.host_str() == base.host_str())
            .map(|mut u| {
                u.set_fragment(None);
                u.to_string()
            })
            .filter(|u| u != page_url && !is_probable_section_page(u))
            .unique()
            .collect();

        Self {
            feeds,
            article_links,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

/// Item links from an RSS 2.0 or Atom document. Malformed feeds yield none.
pub fn parse_feed_links(xml: &str) -> Vec<String> {
    let links: Vec<String> = if let Ok(rss) = quick_xml::de::from_str::<Rss>(xml) {
        rss.channel
            .items
            .into_iter()
            .filter_map(|item| item.link)
            .collect()
    } else if let Ok(atom) = quick_xml::de::from_str::<AtomFeed>(xml) {
        atom.entries
            .into_iter()
            .filter_map(|entry| {
                entry
                    .links
                    .into_iter()
                    .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
                    .map(|l| l.href)
            })
            .collect()
    } else {
        Vec::new()
    };

    links
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| l.starts_with("http"))
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_page_heuristic() {
        assert!(is_probable_section_page("https://example.com"));
        assert!(is_probable_section_page("https://example.com/"));
        assert!(is_probable_section_page("https://example.com/technology"));
        // Short article slugs are misclassified as section pages.
        assert!(is_probable_section_page("https://example.com/apple-unveils-new-chip"));
        assert!(!is_probable_section_page("https://example.com/technology/"));
        assert!(!is_probable_section_page("https://example.com/2025/05/story"));
        assert!(!is_probable_section_page("not a url"));
    }

    #[test]
    fn test_source_page_links() {
        let html = r##"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/rss">
            <link rel="stylesheet" href="/style.css">
        </head><body>
            <a href="/tech">Tech</a>
            <a href="/tech/2025/chip-news#comments">Chip news</a>
            <a href="/tech/2025/chip-news">Chip news again</a>
            <a href="https://other.example/tech/2025/x">Elsewhere</a>
            <a href="mailto:tips@example.com">Tips</a>
        </body></html>"##;
        let page = SourcePage::parse("https://example.com/", html);
        assert_eq!(page.feeds, vec!["https://example.com/rss"]);
        assert_eq!(page.article_links, vec!["https://example.com/tech/2025/chip-news"]);
    }

    #[test]
    fn test_parse_rss_feed() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0"><channel>
              <title>Tech</title>
              <link>https://example.com/</link>
              <item><title>One</title><link>https://example.com/a/1</link></item>
              <item><title>Two</title><link> https://example.com/a/2 </link></item>
              <item><title>No link</title></item>
            </channel></rss>"#;
        assert_eq!(
            parse_feed_links(xml),
            vec!["https://example.com/a/1", "https://example.com/a/2"]
        );
    }

    #[test]
    fn test_parse_atom_feed() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
              <title>Tech</title>
              <entry><title>One</title><link rel="alternate" href="https://example.com/b/1"/></entry>
              <entry><title>Two</title><link href="https://example.com/b/2"/></entry>
            </feed>"#;
        assert_eq!(
            parse_feed_links(xml),
            vec!["https://example.com/b/1", "https://example.com/b/2"]
        );
    }

    #[test]
    fn test_parse_garbage_feed() {
        assert!(parse_feed_links("<html>not a feed").is_empty());
    }
}
