//! Related-video lookup through the YouTube Data API v3 search endpoint.

use super::VideoSearch;
use crate::models::RelatedVideo;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const YOUTUBE_SEARCH: &str = "https://youtube.googleapis.com/youtube/v3/search";

const QUERY_SUFFIX: &str = "technology review OR explanation";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
}

#[derive(Debug, Clone)]
pub struct YouTube {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl YouTube {
    /// A client without a key never searches and always finds nothing.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_endpoint(YOUTUBE_SEARCH, api_key)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    async fn search(&self, key: &str, query: &str) -> Result<SearchResponse, reqwest::Error> {
        let q = format!("{query} {QUERY_SUFFIX}");
        self.client
            .get(&self.endpoint)
            .query(&[
                ("part", "snippet"),
                ("q", q.as_str()),
                ("type", "video"),
                ("videoEmbeddable", "true"),
                ("maxResults", "1"),
                ("order", "relevance"),
                ("key", key),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

impl VideoSearch for YouTube {
    #[instrument(level = "info", skip(self))]
    async fn find_related(&self, query: &str) -> Option<RelatedVideo> {
        let Some(key) = &self.api_key else {
            debug!("No YouTube API key configured; skipping video search");
            return None;
        };

        match self.search(key, query).await {
            Ok(response) => {
                let video = response.items.into_iter().next().map(|item| RelatedVideo {
                    title: item.snippet.title,
                    video_id: item.id.video_id,
                });
                match &video {
                    Some(v) => info!(title = %v.title, "Found related video"),
                    None => info!("No related embeddable videos found"),
                }
                video
            }
            Err(e) => {
                warn!(error = %e, "YouTube search failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_find_related() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "Nvidia GPU technology review OR explanation"))
            .and(query_param("videoEmbeddable", "true"))
            .and(query_param("maxResults", "1"))
            .and(query_param("key", "yt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{
                    "id": {"kind": "youtube#video", "videoId": "dQw4w9WgXcQ"},
                    "snippet": {"title": "GPU explained"}
                }]
            })))
            .mount(&server)
            .await;

        let yt = YouTube::with_endpoint(server.uri(), Some("yt-key".into()));
        assert_eq!(
            yt.find_related("Nvidia GPU").await,
            Some(RelatedVideo {
                title: "GPU explained".into(),
                video_id: "dQw4w9WgXcQ".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_no_items_or_error_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "empty technology review OR explanation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "quota technology review OR explanation"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let yt = YouTube::with_endpoint(server.uri(), Some("yt-key".into()));
        assert!(yt.find_related("empty").await.is_none());
        assert!(yt.find_related("quota").await.is_none());
    }

    #[tokio::test]
    async fn test_without_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let yt = YouTube::with_endpoint(server.uri(), Some("  ".into()));
        assert!(yt.find_related("anything").await.is_none());
    }
}
