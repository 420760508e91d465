//! Blogger v3 REST client.
//!
//! Posts are inserted with `POST /blogs/{blogId}/posts/?isDraft=false` using
//! the bearer token held in the shared [`Credentials`]. The client never
//! refreshes or re-requests tokens; an authorization failure is reported as
//! [`PublishError::Auth`] and handled by the caller.

use super::Publish;
use crate::auth::Credentials;
use crate::error::PublishError;
use crate::models::PostResult;
use crate::utils::truncate_for_log;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub const BLOGGER_API: &str = "https://www.googleapis.com/blogger/v3";

/// Labels attached to every post, ahead of the caller's.
pub const BASELINE_LABELS: [&str; 4] = ["Tech News", "AI Update", "Gadget Review", "Automated Post"];

/// Blogger rejects posts with more labels than this.
pub const MAX_LABELS: usize = 20;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Id reported for a created post whose response body was unreadable.
pub const UNKNOWN_POST_ID: &str = "unknown";

/// Baseline labels followed by the trimmed, non-empty caller labels, without
/// duplicates (case-sensitive) and capped at [`MAX_LABELS`].
pub fn merge_labels(labels: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = BASELINE_LABELS.iter().map(|l| l.to_string()).collect();
    for label in labels.iter().map(|l| l.trim()) {
        if merged.len() >= MAX_LABELS {
            break;
        }
        if !label.is_empty() && !merged.iter().any(|m| m == label) {
            merged.push(label.to_string());
        }
    }
    merged
}

#[derive(Debug, Serialize)]
struct PostBody<'a> {
    kind: &'static str,
    title: &'a str,
    content: &'a str,
    labels: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Blogger {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl Blogger {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_base_url(BLOGGER_API, credentials)
    }

    pub fn with_base_url(base_url: impl Into<String>, credentials: Credentials) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    async fn bearer(&self) -> Result<String, PublishError> {
        self.credentials
            .bearer()
            .await
            .ok_or_else(|| PublishError::Auth("no valid Blogger credentials".into()))
    }

    /// Check that the current token can read `blog_id`.
    #[instrument(level = "info", skip(self))]
    pub async fn verify_access(&self, blog_id: &str) -> Result<(), PublishError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .get(format!("{}/blogs/{}", self.base_url, urlencoding::encode(blog_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        if response.status().is_success() {
            info!("Blogger access token is valid");
            return Ok(());
        }
        let err = classify_failure(response).await;
        warn!(error = %err, "Blogger token check failed");
        Err(err)
    }
}

impl Publish for Blogger {
    #[instrument(level = "info", skip(self, document, labels), fields(labels = labels.len()))]
    async fn publish(
        &self,
        document: &str,
        blog_id: &str,
        title: &str,
        labels: &[String],
    ) -> Result<PostResult, PublishError> {
        let token = self.bearer().await?;
        let labels = merge_labels(labels);
        let body = PostBody {
            kind: "blogger#post",
            title,
            content: document,
            labels: &labels,
        };

        info!(label_count = labels.len(), "Submitting post to Blogger");
        let response = self
            .client
            .post(format!(
                "{}/blogs/{}/posts/",
                self.base_url,
                urlencoding::encode(blog_id)
            ))
            .query(&[("isDraft", "false")])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Blogger request failed");
                PublishError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            let err = classify_failure(response).await;
            error!(error = %err, "Blogger rejected the post");
            return Err(err);
        }

        // The post exists once Blogger answers 2xx, whatever the body says.
        let body = response.text().await.unwrap_or_default();
        let post = serde_json::from_str::<PostResult>(&body).unwrap_or_else(|e| {
            warn!(
                error = %e,
                body = %truncate_for_log(&body, 200),
                "Post created but the response could not be read"
            );
            PostResult {
                id: UNKNOWN_POST_ID.to_string(),
                url: None,
            }
        });
        info!(post_id = %post.id, url = ?post.url, "Published post");
        Ok(post)
    }
}

/// Sort a non-2xx response into an auth or platform failure.
async fn classify_failure(response: Response) -> PublishError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let lowered = body.to_lowercase();

    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|e| e.error.message)
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| truncate_for_log(&body, 200));

    if status == StatusCode::UNAUTHORIZED
        || lowered.contains("invalid_grant")
        || lowered.contains("token has been expired or revoked")
    {
        PublishError::Auth(message)
    } else {
        PublishError::Platform {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{GOOGLE_TOKEN_URI, OAuthToken};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> Credentials {
        Credentials::new(Some(OAuthToken {
            token: "ya29.access".into(),
            refresh_token: None,
            token_uri: GOOGLE_TOKEN_URI.into(),
            client_id: None,
            client_secret: None,
            expiry: None,
        }))
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_labels() {
        let merged = merge_labels(&labels(&[" AI chips ", "Tech News", "", "tech news", "AI chips"]));
        assert_eq!(
            merged,
            labels(&["Tech News", "AI Update", "Gadget Review", "Automated Post", "AI chips", "tech news"])
        );

        let many: Vec<String> = (0..40).map(|i| format!("label {i}")).collect();
        let merged = merge_labels(&many);
        assert_eq!(merged.len(), MAX_LABELS);
        assert_eq!(merged[4], "label 0");
    }

    #[tokio::test]
    async fn test_publish_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/blogs/123/posts/"))
            .and(query_param("isDraft", "false"))
            .and(header("authorization", "Bearer ya29.access"))
            .and(body_partial_json(serde_json::json!({
                "kind": "blogger#post",
                "title": "Title",
                "labels": ["Tech News", "AI Update", "Gadget Review", "Automated Post", "GPUs"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kind": "blogger#post",
                "id": "987",
                "url": "https://blog.example/2025/05/title.html"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let blogger = Blogger::with_base_url(server.uri(), credentials());
        let post = blogger
            .publish("<p>x</p>", "123", "Title", &labels(&["GPUs"]))
            .await
            .unwrap();
        assert_eq!(post.id, "987");
        assert_eq!(post.url.as_deref(), Some("https://blog.example/2025/05/title.html"));
    }

    #[tokio::test]
    async fn test_publish_success_with_unreadable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/blogs/123/posts/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let blogger = Blogger::with_base_url(server.uri(), credentials());
        let post = blogger.publish("<p>x</p>", "123", "Title", &[]).await.unwrap();
        assert_eq!(post.id, UNKNOWN_POST_ID);
        assert_eq!(post.url, None);
    }

    #[tokio::test]
    async fn test_publish_unauthorized_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"code": 401, "message": "Request had invalid authentication credentials."}
            })))
            .mount(&server)
            .await;

        let blogger = Blogger::with_base_url(server.uri(), credentials());
        let err = blogger.publish("x", "123", "T", &[]).await.unwrap_err();
        assert_eq!(
            err,
            PublishError::Auth("Request had invalid authentication credentials.".into())
        );
    }

    #[tokio::test]
    async fn test_publish_revoked_token_body_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#),
            )
            .mount(&server)
            .await;

        let blogger = Blogger::with_base_url(server.uri(), credentials());
        assert!(blogger.publish("x", "123", "T", &[]).await.unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn test_publish_server_error_is_platform_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {"code": 500, "message": "Backend Error"}
            })))
            .mount(&server)
            .await;

        let blogger = Blogger::with_base_url(server.uri(), credentials());
        let err = blogger.publish("x", "123", "T", &[]).await.unwrap_err();
        assert_eq!(
            err,
            PublishError::Platform {
                status: 500,
                message: "Backend Error".into()
            }
        );
    }

    #[tokio::test]
    async fn test_publish_transport_failure() {
        let blogger = Blogger::with_base_url("http://127.0.0.1:9", credentials());
        let err = blogger.publish("x", "123", "T", &[]).await.unwrap_err();
        assert!(matches!(err, PublishError::Transport(_)));
    }

    #[tokio::test]
    async fn test_publish_without_credentials() {
        let blogger = Blogger::with_base_url("http://127.0.0.1:9", Credentials::default());
        assert!(blogger.publish("x", "123", "T", &[]).await.unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn test_verify_access() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blogs/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "123"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blogs/456"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let blogger = Blogger::with_base_url(server.uri(), credentials());
        assert!(blogger.verify_access("123").await.is_ok());
        assert!(blogger.verify_access("456").await.unwrap_err().is_auth());
    }
}
