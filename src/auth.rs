//! Blogger OAuth credentials shared between the controller and the worker.
//!
//! The controller owns the token lifecycle: it loads `token.json`, refreshes
//! expired access tokens, and deletes the file when the platform rejects it.
//! The worker only asks [`Credentials::is_valid`] and, after an authorization
//! failure, calls [`Credentials::invalidate`]; it never re-authenticates.
//!
//! The interactive consent flow that produces the first `token.json` is not
//! part of this crate; the file is provisioned externally.

use crate::error::AuthError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this margin are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 10;

/// Authorized-user token, stored in the same shape Google client libraries use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl OAuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now + ChronoDuration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.token.trim().is_empty() && !self.is_expired(now)
    }
}

/// Cloneable handle to the current access token.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    inner: Arc<RwLock<Option<OAuthToken>>>,
}

impl Credentials {
    pub fn new(token: Option<OAuthToken>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub async fn is_valid(&self) -> bool {
        self.inner
            .read()
            .await
            .as_ref()
            .is_some_and(|t| t.is_valid(Utc::now()))
    }

    /// The bearer token, if one is held and not expired.
    pub async fn bearer(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_valid(Utc::now()))
            .map(|t| t.token.clone())
    }

    pub async fn replace(&self, token: OAuthToken) {
        *self.inner.write().await = Some(token);
    }

    /// Drop the cached token so nothing is posted until re-authorization.
    pub async fn invalidate(&self) {
        if self.inner.write().await.take().is_some() {
            warn!("Cached Blogger credentials invalidated");
        }
    }
}

/// `token.json` on disk.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored token. A missing file yields `Ok(None)`.
    pub async fn load(&self) -> Result<Option<OAuthToken>, AuthError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AuthError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| AuthError::Malformed {
                path: self.path.clone(),
                source,
            })
    }

    pub async fn save(&self, token: &OAuthToken) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(token).map_err(|source| AuthError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| AuthError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Delete the stored token so the next start requires re-authorization.
    pub async fn remove(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed token file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AuthError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Exchange the token's refresh token for a new access token.
///
/// `client_id`/`client_secret` override the values stored in the token.
#[instrument(level = "info", skip_all)]
pub async fn refresh_token(
    client: &Client,
    token: &OAuthToken,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> Result<OAuthToken, AuthError> {
    let refresh = token
        .refresh_token
        .as_deref()
        .ok_or(AuthError::NoRefreshToken)?;
    let client_id = client_id.or(token.client_id.as_deref()).unwrap_or_default();
    let client_secret = client_secret
        .or(token.client_secret.as_deref())
        .unwrap_or_default();

    let response = client
        .post(&token.token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .await
        .map_err(|e| AuthError::Refresh(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Refresh(format!("HTTP {status}: {body}")));
    }

    let refreshed: RefreshResponse = response
        .json()
        .await
        .map_err(|e| AuthError::Refresh(e.to_string()))?;

    info!("Refreshed Blogger access token");
    Ok(OAuthToken {
        token: refreshed.access_token,
        refresh_token: refreshed.refresh_token.or_else(|| token.refresh_token.clone()),
        token_uri: token.token_uri.clone(),
        client_id: Some(client_id.to_string()).filter(|s| !s.is_empty()),
        client_secret: Some(client_secret.to_string()).filter(|s| !s.is_empty()),
        expiry: refreshed
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(expiry: Option<DateTime<Utc>>) -> OAuthToken {
        OAuthToken {
            token: "ya29.access".into(),
            refresh_token: Some("1//refresh".into()),
            token_uri: GOOGLE_TOKEN_URI.into(),
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            expiry,
        }
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        assert!(token(None).is_valid(now));
        assert!(token(Some(now + ChronoDuration::hours(1))).is_valid(now));
        assert!(!token(Some(now + ChronoDuration::seconds(5))).is_valid(now));
        assert!(!token(Some(now - ChronoDuration::hours(1))).is_valid(now));
    }

    #[tokio::test]
    async fn test_credentials_invalidate() {
        let creds = Credentials::new(Some(token(None)));
        let shared = creds.clone();
        assert!(creds.is_valid().await);
        assert_eq!(creds.bearer().await.as_deref(), Some("ya29.access"));

        shared.invalidate().await;
        assert!(!creds.is_valid().await);
        assert!(creds.bearer().await.is_none());
    }

    #[tokio::test]
    async fn test_token_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(store.load().await.unwrap().is_none());

        let t = token(Some(Utc::now() + ChronoDuration::hours(1)));
        store.save(&t).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(t));

        store.remove().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        store.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_token_store_reads_google_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"token": "ya29.x", "refresh_token": "1//r", "token_uri": "https://oauth2.googleapis.com/token",
               "client_id": "id", "client_secret": "s", "scopes": ["https://www.googleapis.com/auth/blogger"],
               "expiry": "2030-01-01T00:00:00.000000Z"}"#,
        )
        .unwrap();
        let loaded = TokenStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(loaded.token, "ya29.x");
        assert!(loaded.is_valid(Utc::now()));
    }

    #[tokio::test]
    async fn test_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let mut old = token(Some(Utc::now() - ChronoDuration::hours(1)));
        old.token_uri = format!("{}/token", server.uri());

        let fresh = refresh_token(&Client::new(), &old, None, None).await.unwrap();
        assert_eq!(fresh.token, "ya29.new");
        assert_eq!(fresh.refresh_token.as_deref(), Some("1//refresh"));
        assert!(fresh.is_valid(Utc::now()));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .mount(&server)
            .await;

        let mut old = token(None);
        old.token_uri = format!("{}/token", server.uri());
        let err = refresh_token(&Client::new(), &old, None, None).await.unwrap_err();
        assert!(matches!(err, AuthError::Refresh(msg) if msg.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let mut t = token(None);
        t.refresh_token = None;
        let err = refresh_token(&Client::new(), &t, None, None).await.unwrap_err();
        assert!(matches!(err, AuthError::NoRefreshToken));
    }
}
