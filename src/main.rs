//! # Tech News Autoposter
//!
//! A background bot that finds current technology articles, extracts and
//! optionally rewrites them, combines related coverage into one long-form
//! HTML post, and publishes it to a Blogger blog on a fixed interval.
//!
//! ## Usage
//!
//! ```sh
//! tech_news_autoposter --config bot.yaml
//! ```
//!
//! ## Architecture
//!
//! The binary is a thin controller around one [`worker::Worker`]:
//! 1. **Discovery**: Search the web for candidates matching a topic query
//! 2. **Extraction**: Pull the article out of the page, or out of the
//!    articles a section page links to
//! 3. **Enhancement**: Rewrite title and body through an LLM when configured
//! 4. **Aggregation**: Add related articles until the word target is met
//! 5. **Publishing**: Compose the post, attach a related video, publish,
//!    and record every included URL in the ledger
//!
//! The controller owns the OAuth token file. It watches the worker's events,
//! refreshes or removes the token when Blogger rejects it, and stops the
//! worker on Ctrl-C.

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod api;
mod auth;
mod cli;
mod config;
mod enhancer;
mod error;
mod ledger;
mod models;
mod outputs;
mod platforms;
mod scrapers;
mod utils;
mod worker;

use api::LlmClient;
use auth::{Credentials, OAuthToken, TokenStore, refresh_token};
use cli::Cli;
use config::BotConfig;
use enhancer::Enhancer;
use platforms::blogger::Blogger;
use platforms::youtube::YouTube;
use scrapers::article::ArticleScraper;
use scrapers::search::DuckDuckGo;
use worker::{AUTH_RECHECK, Capabilities, EventKind, StopReason, Worker, WorkerEvent, WorkerState};

/// Token file access shared by start-up and the controller task.
struct TokenKeeper {
    http: reqwest::Client,
    store: TokenStore,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl TokenKeeper {
    /// Load the stored token, refreshing it if it is expired or `force` is set.
    #[instrument(level = "info", skip(self), fields(path = %self.store.path().display()))]
    async fn load(&self, force: bool) -> Option<OAuthToken> {
        let token = match self.store.load().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!("No token file; Blogger authorization is required");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Could not read the token file");
                return None;
            }
        };
        if !force && token.is_valid(Utc::now()) {
            return Some(token);
        }

        match refresh_token(
            &self.http,
            &token,
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
        )
        .await
        {
            Ok(fresh) => {
                if let Err(e) = self.store.save(&fresh).await {
                    warn!(error = %e, "Refreshed token could not be saved");
                }
                Some(fresh)
            }
            Err(e) => {
                warn!(error = %e, "Could not refresh the Blogger token");
                None
            }
        }
    }

    async fn discard(&self) {
        if let Err(e) = self.store.remove().await {
            error!(error = %e, "Failed to remove the rejected token file");
        }
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tech_news_autoposter starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.ledger, ?args.token_file, once = args.once, "Parsed CLI arguments");

    // ---- Config ----
    let config = match &args.config {
        Some(path) => BotConfig::from_file(path).await?,
        None => {
            info!("No config file given; using defaults");
            BotConfig::default()
        }
    };
    let config = args.overlay(config);
    config.validate()?;

    // ---- Credentials ----
    let keeper = TokenKeeper {
        http: reqwest::Client::new(),
        store: TokenStore::new(args.token_file.clone()),
        client_id: args.google_client_id.clone(),
        client_secret: args.google_client_secret.clone(),
    };
    let credentials = Credentials::new(keeper.load(false).await);
    let blogger = Blogger::new(credentials.clone());

    if credentials.is_valid().await {
        match blogger.verify_access(&config.blog_id).await {
            Ok(()) => info!(blog_id = %config.blog_id, "Blogger access verified"),
            Err(e) if e.is_auth() => {
                error!(error = %e, "Stored token was rejected; re-authorization is required");
                credentials.invalidate().await;
                keeper.discard().await;
            }
            // Transient; the worker's own publish attempts will tell.
            Err(e) => warn!(error = %e, "Could not verify Blogger access"),
        }
    } else {
        warn!(
            path = %args.token_file.display(),
            "No valid Blogger token; the worker will wait for one"
        );
    }

    // ---- Capabilities ----
    let enhancer = Enhancer::new(config.llm.as_ref().map(LlmClient::new));
    if !enhancer.is_configured() {
        info!("No LLM endpoint configured; articles are posted as extracted");
    }
    let caps = Capabilities {
        discover: DuckDuckGo::new(config.topical_keywords.clone()),
        extract: ArticleScraper::new(),
        enhancer,
        video: YouTube::new(config.youtube_api_key.clone()),
        publisher: blogger,
    };
    let (mut worker, mut handle) = Worker::new(config, args.ledger.clone(), caps, credentials.clone());
    let cancel = handle.cancel_token();

    // ---- Single iteration ----
    if args.once {
        let once = worker.run_once();
        tokio::pin!(once);
        let outcome = tokio::select! {
            outcome = &mut once => outcome,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received; cancelling the iteration");
                handle.stop();
                once.await
            }
        };
        while let Ok(event) = handle.events.try_recv() {
            on_event(&event, &keeper, &credentials).await;
        }
        let outcome = outcome?;
        info!(?outcome, "Single iteration finished");
        return Ok(());
    }

    // ---- Posting loop ----
    let controller = async {
        let mut recheck = tokio::time::interval(AUTH_RECHECK);
        loop {
            tokio::select! {
                event = handle.events.recv() => {
                    let Some(event) = event else { break };
                    if !on_event(&event, &keeper, &credentials).await {
                        break;
                    }
                }
                _ = recheck.tick() => {
                    let state = handle.state();
                    debug!(?state, "Worker status");
                    if state == WorkerState::PausedAwaitingAuth {
                        if let Some(token) = keeper.load(false).await {
                            info!("Loaded Blogger credentials; resuming");
                            credentials.replace(token).await;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                    info!("Interrupt received; stopping worker");
                    handle.stop();
                }
            }
        }
    };

    let (reason, ()) = tokio::join!(worker.run(), controller);
    report_stop(reason)
}

/// Log a worker event and react to it. Returns `false` once the worker stopped.
async fn on_event(event: &WorkerEvent, keeper: &TokenKeeper, credentials: &Credentials) -> bool {
    let at = event.timestamp.format("%Y-%m-%d %H:%M:%S");
    match &event.kind {
        EventKind::Published { post, title, articles, words } => {
            info!(%at, post_id = %post.id, url = ?post.url, %title, articles, words, "Post published");
        }
        EventKind::LedgerWriteFailed { url, error } => {
            error!(%at, %url, %error, "Ledger file not updated; URL will be reposted after a restart");
        }
        EventKind::PublishFailed { error } => {
            warn!(%at, %error, "Publishing failed; iteration abandoned");
        }
        EventKind::CredentialsRejected { reason } => {
            warn!(%at, %reason, "Blogger rejected the credentials; refreshing");
            match keeper.load(true).await {
                Some(token) => {
                    credentials.replace(token).await;
                    info!("Blogger token refreshed");
                }
                None => {
                    error!("Token refresh failed; removing token file, re-authorization is required");
                    keeper.discard().await;
                }
            }
        }
        EventKind::IterationFailed { errors, error } => {
            warn!(%at, errors, %error, "Worker iteration failed");
        }
        EventKind::Stopped(reason) => {
            info!(%at, ?reason, "Worker reported stop");
            return false;
        }
        kind => debug!(%at, ?kind, "Worker event"),
    }
    true
}

fn report_stop(reason: StopReason) -> Result<(), Box<dyn Error>> {
    match reason {
        StopReason::Cancelled => {
            info!("Shut down cleanly");
            Ok(())
        }
        StopReason::TooManyErrors => Err("worker stopped after too many consecutive errors".into()),
        StopReason::LedgerUnavailable => Err("worker stopped: the published-URL ledger is unreadable".into()),
    }
}
