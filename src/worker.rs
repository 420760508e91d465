//! The background posting loop.
//!
//! One [`Worker`] runs one iteration at a time: pick the next topic query,
//! discover candidates, turn the first usable one into a batch of articles,
//! publish it, record it in the ledger, then wait. Every remote call and
//! every wait observes the worker's [`CancellationToken`].
//!
//! # State Machine
//!
//! ```text
//! Idle -> Running -> PausedAwaitingAuth -> Running
//!                 -> BackoffError      -> Running
//! any state -> Stopped
//! ```
//!
//! The controller never touches worker-owned state. It watches
//! [`WorkerState`] through a `watch` channel, drains [`WorkerEvent`]s from an
//! unbounded `mpsc` channel, and stops the worker through its token.
//!
//! # Failure Handling
//!
//! Per-URL rejections, platform failures and missing optional capabilities
//! are ordinary events. Authorization failures invalidate the shared
//! credentials and pause the loop without counting as errors. Anything else,
//! including a panic inside an iteration, counts towards
//! [`MAX_CONSECUTIVE_ERRORS`]; each one is followed by a
//! [`ERROR_BACKOFF`] wait and the counter resets after a successful post.

use crate::aggregator::aggregate;
use crate::api::AskAsync;
use crate::auth::Credentials;
use crate::config::{BotConfig, DEFAULT_SEARCH_QUERIES};
use crate::enhancer::Enhancer;
use crate::error::{IterationError, PublishError, Rejection};
use crate::ledger::Ledger;
use crate::models::{AggregationBatch, ArticleRecord, PostResult};
use crate::outputs::html::compose_post;
use crate::platforms::{Publish, VideoSearch};
use crate::scrapers::source::is_probable_section_page;
use crate::scrapers::{Discover, Extract};
use crate::utils::{capitalize, jitter, pause, truncate_for_log};
use chrono::{DateTime, Local};
use futures::FutureExt;
use itertools::Itertools;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Unclassified faults in a row before the worker gives up.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 7;
pub const ERROR_BACKOFF: Duration = Duration::from_secs(5 * 60);
pub const AUTH_RECHECK: Duration = Duration::from_secs(60);
/// Upper bound on the wait after an iteration that posted nothing.
pub const RETRY_INTERVAL_CAP: Duration = Duration::from_secs(15 * 60);

const CANDIDATES_PER_QUERY: usize = 3;
const SOURCE_PAGE_BUDGET: usize = 2;

/// Why the worker stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TooManyErrors,
    LedgerUnavailable,
}

/// Externally visible worker status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    PausedAwaitingAuth,
    BackoffError { errors: u32 },
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Started { ledger_size: usize },
    AwaitingAuth,
    IterationStarted { query: String },
    CandidateSkipped { url: String },
    ArticleRejected { url: String, reason: Rejection },
    ArticleObtained { url: String, title: String, words: usize },
    BelowTarget { words: usize, target: usize },
    Published { post: PostResult, title: String, articles: usize, words: usize },
    /// A published URL could not be appended to the ledger file.
    LedgerWriteFailed { url: String, error: String },
    PublishFailed { error: PublishError },
    CredentialsRejected { reason: String },
    IterationFailed { errors: u32, error: String },
    Waiting { duration: Duration },
    Stopped(StopReason),
}

/// A timestamped entry of the worker's observable log.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerEvent {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
}

/// Result of one iteration that did not fault.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Posted(PostResult),
    NothingPosted,
    AwaitingAuth,
    AuthRejected,
    Cancelled,
}

/// The controller's side of a worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pub status: watch::Receiver<WorkerState>,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
    cancel: CancellationToken,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        self.status.borrow().clone()
    }

    /// Request a stop. Pending waits return immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// External capabilities a worker drives.
pub struct Capabilities<D, X, A, V, P> {
    pub discover: D,
    pub extract: X,
    pub enhancer: Enhancer<A>,
    pub video: V,
    pub publisher: P,
}

pub struct Worker<D, X, A, V, P> {
    config: BotConfig,
    queries: Vec<String>,
    query_cursor: usize,
    ledger_path: PathBuf,
    caps: Capabilities<D, X, A, V, P>,
    credentials: Credentials,
    cancel: CancellationToken,
    status: watch::Sender<WorkerState>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl<D, X, A, V, P> Worker<D, X, A, V, P>
where
    D: Discover,
    X: Extract,
    A: AskAsync<Response = String>,
    V: VideoSearch,
    P: Publish,
{
    pub fn new(
        config: BotConfig,
        ledger_path: impl Into<PathBuf>,
        caps: Capabilities<D, X, A, V, P>,
        credentials: Credentials,
    ) -> (Self, WorkerHandle) {
        let (status_tx, status_rx) = watch::channel(WorkerState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let mut queries: Vec<String> = config
            .search_queries
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            queries = DEFAULT_SEARCH_QUERIES.iter().map(|q| q.to_string()).collect();
        }

        let worker = Self {
            config,
            queries,
            query_cursor: 0,
            ledger_path: ledger_path.into(),
            caps,
            credentials,
            cancel: cancel.clone(),
            status: status_tx,
            events: events_tx,
        };
        let handle = WorkerHandle {
            status: status_rx,
            events: events_rx,
            cancel,
        };
        (worker, handle)
    }

    fn set_state(&self, state: WorkerState) {
        self.status.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn emit(&self, kind: EventKind) {
        // The controller may have gone away; the loop keeps its own course.
        let _ = self.events.send(WorkerEvent {
            timestamp: Local::now(),
            kind,
        });
    }

    fn stop(&self, reason: StopReason) -> StopReason {
        info!(?reason, "Worker stopped");
        self.set_state(WorkerState::Stopped(reason));
        self.emit(EventKind::Stopped(reason));
        reason
    }

    fn next_query(&mut self) -> String {
        let query = self.queries[self.query_cursor % self.queries.len()].clone();
        self.query_cursor = self.query_cursor.wrapping_add(1);
        query
    }

    /// Run until cancelled or until the error threshold is reached.
    #[instrument(level = "info", skip_all, fields(blog_id = %self.config.blog_id))]
    pub async fn run(&mut self) -> StopReason {
        if self.cancel.is_cancelled() {
            return self.stop(StopReason::Cancelled);
        }
        let mut ledger = match Ledger::load(&self.ledger_path).await {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "Cannot read the published-URL ledger");
                return self.stop(StopReason::LedgerUnavailable);
            }
        };
        info!(
            ledger = %ledger.path().display(),
            ledger_size = ledger.len(),
            target_words = self.config.min_post_word_count,
            interval_min = self.config.post_interval_minutes,
            "Worker started"
        );
        self.set_state(WorkerState::Running);
        self.emit(EventKind::Started {
            ledger_size: ledger.len(),
        });

        let mut errors = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return self.stop(StopReason::Cancelled);
            }

            let wait = match self.guarded_iteration(&mut ledger).await {
                Ok(IterationOutcome::Cancelled) => return self.stop(StopReason::Cancelled),
                Ok(IterationOutcome::AuthRejected) => continue,
                Ok(IterationOutcome::AwaitingAuth) => {
                    warn!("Credentials missing or invalid; pausing until re-authorized");
                    self.set_state(WorkerState::PausedAwaitingAuth);
                    self.emit(EventKind::AwaitingAuth);
                    AUTH_RECHECK
                }
                Ok(IterationOutcome::Posted(_)) => {
                    errors = 0;
                    self.config.post_interval()
                }
                Ok(IterationOutcome::NothingPosted) => {
                    info!("No new article posted in this iteration");
                    self.config.post_interval().min(RETRY_INTERVAL_CAP)
                }
                Err(e) => {
                    errors += 1;
                    error!(error = %e, errors, max = MAX_CONSECUTIVE_ERRORS, "Iteration failed");
                    self.emit(EventKind::IterationFailed {
                        errors,
                        error: e.to_string(),
                    });
                    if errors >= MAX_CONSECUTIVE_ERRORS {
                        return self.stop(StopReason::TooManyErrors);
                    }
                    self.set_state(WorkerState::BackoffError { errors });
                    ERROR_BACKOFF
                }
            };

            info!(secs = wait.as_secs(), "Waiting before next iteration");
            self.emit(EventKind::Waiting { duration: wait });
            if pause(&self.cancel, wait).await {
                return self.stop(StopReason::Cancelled);
            }
        }
    }

    /// Run a single iteration against the ledger on disk.
    pub async fn run_once(&mut self) -> Result<IterationOutcome, IterationError> {
        let mut ledger = Ledger::load(&self.ledger_path).await?;
        let outcome = self.guarded_iteration(&mut ledger).await;
        self.set_state(WorkerState::Idle);
        outcome
    }

    async fn guarded_iteration(&mut self, ledger: &mut Ledger) -> Result<IterationOutcome, IterationError> {
        AssertUnwindSafe(self.iteration(ledger))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(IterationError::Panic(panic_message(payload.as_ref()))))
    }

    async fn iteration(&mut self, ledger: &mut Ledger) -> Result<IterationOutcome, IterationError> {
        if !self.credentials.is_valid().await {
            return Ok(IterationOutcome::AwaitingAuth);
        }
        self.set_state(WorkerState::Running);

        let query = self.next_query();
        info!(query = %query, "Starting iteration");
        self.emit(EventKind::IterationStarted {
            query: query.clone(),
        });

        let hits = self
            .caps
            .discover
            .discover(&query, CANDIDATES_PER_QUERY, &self.cancel)
            .await;

        for hit in hits {
            if self.cancel.is_cancelled() {
                return Ok(IterationOutcome::Cancelled);
            }
            debug!(title = %hit.title, url = %hit.url, "Processing candidate");

            let Some(primary) = self.obtain_primary(&hit.url, ledger).await else {
                continue;
            };
            if self.cancel.is_cancelled() {
                return Ok(IterationOutcome::Cancelled);
            }
            if ledger.contains(primary.url()) {
                info!(url = %primary.url(), "Article already posted");
                self.emit(EventKind::CandidateSkipped {
                    url: primary.url().to_string(),
                });
                continue;
            }
            self.emit(EventKind::ArticleObtained {
                url: primary.url().to_string(),
                title: primary.title.clone(),
                words: primary.word_count(),
            });

            let primary = self.caps.enhancer.enhance(primary).await;
            let batch = aggregate(
                primary,
                ledger,
                self.config.min_post_word_count,
                self.config.max_articles_to_combine,
                &self.caps.discover,
                &self.caps.extract,
                &self.cancel,
            )
            .await;
            if self.cancel.is_cancelled() {
                return Ok(IterationOutcome::Cancelled);
            }

            if batch.total_words() < self.config.min_post_word_count {
                info!(
                    words = batch.total_words(),
                    target = self.config.min_post_word_count,
                    "Combined content below target; not posting"
                );
                self.emit(EventKind::BelowTarget {
                    words: batch.total_words(),
                    target: self.config.min_post_word_count,
                });
                continue;
            }

            return match self.publish_batch(&batch).await {
                Ok(post) => {
                    for url in batch.urls() {
                        if let Err(e) = ledger.record(url).await {
                            error!(url, error = %e, "Published URL kept in memory only");
                            self.emit(EventKind::LedgerWriteFailed {
                                url: url.to_string(),
                                error: e.to_string(),
                            });
                        }
                    }
                    self.emit(EventKind::Published {
                        post: post.clone(),
                        title: batch.primary().title.clone(),
                        articles: batch.len(),
                        words: batch.total_words(),
                    });
                    Ok(IterationOutcome::Posted(post))
                }
                Err(PublishError::Auth(reason)) => {
                    warn!(reason = %reason, "Blogger rejected the credentials");
                    self.credentials.invalidate().await;
                    self.emit(EventKind::CredentialsRejected { reason });
                    Ok(IterationOutcome::AuthRejected)
                }
                Err(error) => {
                    self.emit(EventKind::PublishFailed { error });
                    Ok(IterationOutcome::NothingPosted)
                }
            };
        }

        if self.cancel.is_cancelled() {
            return Ok(IterationOutcome::Cancelled);
        }
        Ok(IterationOutcome::NothingPosted)
    }

    /// Extract the candidate directly, falling back to the articles it links
    /// to when it is not an article itself.
    async fn obtain_primary(&self, url: &str, ledger: &Ledger) -> Option<ArticleRecord> {
        let posted = ledger.contains(url);
        if posted {
            debug!(url, "Candidate already posted; skipping direct scrape");
            self.emit(EventKind::CandidateSkipped { url: url.to_string() });
        } else {
            if jitter(&self.cancel, 1_000..3_000).await {
                return None;
            }
            match self.caps.extract.extract(url, &self.cancel).await {
                Ok(article) => return Some(article),
                Err(Rejection::Cancelled) => return None,
                Err(reason) => {
                    info!(url, reason = %reason, "Direct scrape failed");
                    self.emit(EventKind::ArticleRejected {
                        url: url.to_string(),
                        reason,
                    });
                }
            }
        }

        if posted && !is_probable_section_page(url) {
            return None;
        }
        self.from_source_page(url, ledger).await
    }

    async fn from_source_page(&self, url: &str, ledger: &Ledger) -> Option<ArticleRecord> {
        info!(url, "Treating candidate as a news source page");
        let links = match self.caps.extract.source_links(url, &self.cancel).await {
            Ok(links) => links,
            Err(reason) => {
                self.emit(EventKind::ArticleRejected {
                    url: url.to_string(),
                    reason,
                });
                return None;
            }
        };

        let mut attempts = 0;
        for link in links {
            if attempts >= SOURCE_PAGE_BUDGET || self.cancel.is_cancelled() {
                break;
            }
            if !link.starts_with("http") || ledger.contains(&link) {
                continue;
            }
            if jitter(&self.cancel, 2_000..5_000).await {
                return None;
            }
            attempts += 1;
            match self.caps.extract.extract(&link, &self.cancel).await {
                Ok(article) => {
                    info!(url = %link, title = %article.title, "Obtained article from source page");
                    return Some(article);
                }
                Err(Rejection::Cancelled) => return None,
                Err(reason) => self.emit(EventKind::ArticleRejected { url: link, reason }),
            }
        }
        None
    }

    async fn publish_batch(&self, batch: &AggregationBatch) -> Result<PostResult, PublishError> {
        let primary = batch.primary();
        info!(
            words = batch.total_words(),
            articles = batch.len(),
            "Content meets target; publishing"
        );

        let labels = post_labels(batch);
        let video_query = std::iter::once(primary.title.as_str())
            .chain(primary.ai_keywords.iter().take(2).map(String::as_str))
            .join(" ");
        let video = self.caps.video.find_related(&video_query).await;
        let document = compose_post(batch, video.as_ref());

        debug!(
            title = %truncate_for_log(&primary.title, 80),
            labels = ?labels,
            bytes = document.len(),
            "Composed post"
        );
        self.caps
            .publisher
            .publish(&document, &self.config.blog_id, &primary.title, &labels)
            .await
    }
}

/// The primary's AI keywords plus every member's capitalised raw keywords.
pub fn post_labels(batch: &AggregationBatch) -> Vec<String> {
    let mut labels: BTreeSet<String> = batch
        .primary()
        .ai_keywords
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    for article in batch.articles() {
        labels.extend(
            article
                .keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(capitalize),
        );
    }
    labels.into_iter().collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
