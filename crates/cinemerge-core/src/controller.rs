use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::catalog::{DetailFetcher, Resolver};
use crate::config::{FailurePolicy, HarvestConfig};
use crate::error::{FetchError, MergeError};
use crate::merge::merge;
use crate::model::{MergedRecord, Namespace, Resolution, ResolvedPair, WorkItem};
use crate::sink::RecordSink;
use crate::source::{IdentifierSource, SourceError};

/// Knobs the controller needs from [`HarvestConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub policy: FailurePolicy,
    pub pacing: Duration,
    pub max_attempts: usize,
    pub retry_backoff: Duration,
}

impl From<&HarvestConfig> for RunSettings {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            policy: config.policy,
            pacing: config.pacing,
            max_attempts: config.max_attempts,
            retry_backoff: config.retry_backoff,
        }
    }
}

/// Per-run counters, threaded through the controller and handed back at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped_not_found: usize,
    pub skipped_error: usize,
    /// Items that ended the run under abort or through a failed write.
    pub failed: usize,
    pub cursor: Option<u32>,
}

impl RunState {
    pub fn skipped(&self) -> usize {
        self.skipped_not_found + self.skipped_error
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The identifier source was exhausted.
    Done,
    /// A stop was requested between items.
    Stopped,
    /// An unrecovered error ended the run. `item` is `None` for listing failures.
    Aborted { item: Option<String>, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub state: RunState,
    pub status: RunStatus,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.status {
            RunStatus::Done => "done",
            RunStatus::Stopped => "stopped",
            RunStatus::Aborted { .. } => "aborted",
        };
        write!(
            f,
            "{status}: attempted={} succeeded={} skipped={} (not found={}, errors={}) failed={}",
            self.state.attempted,
            self.state.succeeded,
            self.state.skipped(),
            self.state.skipped_not_found,
            self.state.skipped_error,
            self.state.failed
        )
    }
}

/// Why one item produced no output.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemFailure {
    NotFound(String),
    /// Turned away before any upstream request was made.
    NotRequested(String),
    Transport(FetchError),
    Incomplete(MergeError),
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFailure::NotFound(reason) | ItemFailure::NotRequested(reason) => {
                f.write_str(reason)
            }
            ItemFailure::Transport(err) => write!(f, "{err}"),
            ItemFailure::Incomplete(err) => write!(f, "{err}"),
        }
    }
}

impl From<FetchError> for ItemFailure {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound { .. } => ItemFailure::NotFound(err.to_string()),
            transport => ItemFailure::Transport(transport),
        }
    }
}

/// Outcome of one item, reported as it happens.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Written,
    SkippedNotFound(String),
    SkippedError(String),
    Aborted(String),
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub sequence: usize,
    pub item: WorkItem,
    pub outcome: ItemOutcome,
}

pub type ItemObserver = Arc<dyn Fn(&ItemReport) + Send + Sync + 'static>;

/// Both catalogs as seen by the dual-source pipeline.
#[derive(Debug)]
pub struct Upstreams<'a, R, A, B> {
    pub resolver: &'a R,
    pub tmdb: &'a A,
    pub omdb: &'a B,
}

/// Drives items one at a time through resolve, fetch, merge and write.
pub struct RunController {
    settings: RunSettings,
    observer: Option<ItemObserver>,
    stop: Option<Arc<AtomicBool>>,
}

impl RunController {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            observer: None,
            stop: None,
        }
    }

    pub fn with_observer(mut self, observer: ItemObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The run ends as [`RunStatus::Stopped`] once `flag` is set, after the current item.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Full pipeline: each item ends up as one [`MergedRecord`] in `sink` or is skipped.
    pub async fn harvest<R, A, B, S, K>(
        &self,
        upstreams: &Upstreams<'_, R, A, B>,
        source: &mut S,
        sink: &mut K,
    ) -> RunSummary
    where
        R: Resolver,
        A: DetailFetcher,
        B: DetailFetcher,
        S: IdentifierSource,
        K: RecordSink<MergedRecord>,
    {
        self.drive(source, sink, |item| self.merge_item(upstreams, item))
            .await
    }

    /// Cross-reference only: writes one `(external, internal)` pair per resolved item.
    pub async fn resolve_only<R, S, K>(
        &self,
        resolver: &R,
        source: &mut S,
        sink: &mut K,
    ) -> RunSummary
    where
        R: Resolver,
        S: IdentifierSource,
        K: RecordSink<ResolvedPair>,
    {
        self.drive(source, sink, |item| self.resolve_item(resolver, item))
            .await
    }

    async fn drive<T, S, K, F, Fut>(
        &self,
        source: &mut S,
        sink: &mut K,
        mut step: F,
    ) -> RunSummary
    where
        S: IdentifierSource,
        K: RecordSink<T>,
        F: FnMut(WorkItem) -> Fut,
        Fut: Future<Output = Result<T, ItemFailure>>,
    {
        let mut state = RunState::default();
        let mut pace_pending = false;

        let mut status = loop {
            if pace_pending && !self.settings.pacing.is_zero() {
                sleep(self.settings.pacing).await;
            }
            pace_pending = false;

            if self.stop_requested() {
                info!("stop requested; ending run between items");
                break RunStatus::Stopped;
            }

            let next = self.next_item(source).await;
            state.cursor = source.cursor();
            let item = match next {
                Ok(Some(item)) => item,
                Ok(None) => break RunStatus::Done,
                Err(SourceError::Page(err)) => match self.settings.policy {
                    FailurePolicy::Abort => {
                        error!(error = %err, "listing failed; aborting run");
                        break RunStatus::Aborted {
                            item: None,
                            error: err.to_string(),
                        };
                    }
                    FailurePolicy::Skip => {
                        warn!(error = %err, "listing failed; no further items");
                        break RunStatus::Done;
                    }
                },
                Err(SourceError::InvalidLine { line }) => {
                    state.attempted += 1;
                    match self.settings.policy {
                        FailurePolicy::Abort => {
                            state.failed += 1;
                            error!(line, "identifier is not valid UTF-8; aborting run");
                            break RunStatus::Aborted {
                                item: Some(format!("line {line}")),
                                error: "identifier is not valid UTF-8".to_string(),
                            };
                        }
                        FailurePolicy::Skip => {
                            state.skipped_error += 1;
                            warn!(line, "skipped: identifier is not valid UTF-8");
                            continue;
                        }
                    }
                }
                Err(SourceError::Io(err)) => {
                    error!(error = %err, "failed to read identifiers; aborting run");
                    break RunStatus::Aborted {
                        item: None,
                        error: err.to_string(),
                    };
                }
            };

            state.attempted += 1;
            let sequence = state.attempted;

            let result = step(item.clone()).await;
            pace_pending = !matches!(result, Err(ItemFailure::NotRequested(_)));
            match result {
                Ok(record) => {
                    if let Err(err) = sink.write(&record) {
                        state.failed += 1;
                        error!(
                            sequence,
                            id = item.id(),
                            error = %err,
                            "write failed; aborting run"
                        );
                        self.report(sequence, &item, ItemOutcome::Aborted(err.to_string()));
                        break RunStatus::Aborted {
                            item: Some(item.id().to_string()),
                            error: format!("output error: {err}"),
                        };
                    }
                    state.succeeded += 1;
                    info!(sequence, id = item.id(), "Ok");
                    self.report(sequence, &item, ItemOutcome::Written);
                }
                Err(ItemFailure::NotFound(reason) | ItemFailure::NotRequested(reason)) => {
                    state.skipped_not_found += 1;
                    info!(sequence, id = item.id(), %reason, "skipped: not found");
                    self.report(sequence, &item, ItemOutcome::SkippedNotFound(reason));
                }
                Err(ItemFailure::Incomplete(err)) => {
                    state.skipped_error += 1;
                    warn!(sequence, id = item.id(), error = %err, "skipped: incomplete payload");
                    self.report(sequence, &item, ItemOutcome::SkippedError(err.to_string()));
                }
                Err(ItemFailure::Transport(err)) => match self.settings.policy {
                    FailurePolicy::Abort => {
                        state.failed += 1;
                        error!(sequence, id = item.id(), error = %err, "aborting run");
                        self.report(sequence, &item, ItemOutcome::Aborted(err.to_string()));
                        break RunStatus::Aborted {
                            item: Some(item.id().to_string()),
                            error: err.to_string(),
                        };
                    }
                    FailurePolicy::Skip => {
                        state.skipped_error += 1;
                        warn!(sequence, id = item.id(), error = %err, "skipped: upstream error");
                        self.report(sequence, &item, ItemOutcome::SkippedError(err.to_string()));
                    }
                },
            }
        };

        if let Err(err) = sink.finish() {
            error!(error = %err, "failed to flush output");
            if !matches!(status, RunStatus::Aborted { .. }) {
                status = RunStatus::Aborted {
                    item: None,
                    error: format!("output error: {err}"),
                };
            }
        }
        let summary = RunSummary { state, status };
        info!(%summary, "run finished");
        summary
    }

    /// Pulls the next item, asking again for a listing page that failed transiently.
    async fn next_item<S: IdentifierSource>(
        &self,
        source: &mut S,
    ) -> Result<Option<WorkItem>, SourceError> {
        let max = self.settings.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            match source.next_item().await {
                Err(SourceError::Page(err)) => {
                    attempt += 1;
                    if attempt >= max || !err.is_retryable() {
                        return Err(SourceError::Page(err));
                    }
                    warn!(attempt, max, error = %err, "retrying listing page");
                    if !self.settings.retry_backoff.is_zero() {
                        sleep(self.settings.retry_backoff).await;
                    }
                }
                other => return other,
            }
        }
    }

    async fn merge_item<R, A, B>(
        &self,
        upstreams: &Upstreams<'_, R, A, B>,
        item: WorkItem,
    ) -> Result<MergedRecord, ItemFailure>
    where
        R: Resolver,
        A: DetailFetcher,
        B: DetailFetcher,
    {
        let (pair, raw_a) = match item.namespace() {
            Namespace::External => {
                let pair = self.resolve_item(upstreams.resolver, item).await?;
                let raw_a = self
                    .with_retries(|| upstreams.tmdb.fetch(&pair.internal_id))
                    .await?;
                (pair, raw_a)
            }
            Namespace::Internal => {
                let raw_a = self.with_retries(|| upstreams.tmdb.fetch(item.id())).await?;
                let Some(external_id) = raw_a.text("imdb_id").map(str::to_string) else {
                    let title = raw_a.text("title").unwrap_or("untitled");
                    return Err(ItemFailure::NotFound(format!(
                        "{} {} ({}) has no imdb_id",
                        upstreams.tmdb.catalog(),
                        item.id(),
                        title
                    )));
                };
                let pair = ResolvedPair {
                    external_id,
                    internal_id: item.id().to_string(),
                };
                (pair, raw_a)
            }
        };

        let raw_b = self
            .with_retries(|| upstreams.omdb.fetch(&pair.external_id))
            .await?;

        merge(&pair, raw_a, raw_b).map_err(ItemFailure::Incomplete)
    }

    async fn resolve_item<R: Resolver>(
        &self,
        resolver: &R,
        item: WorkItem,
    ) -> Result<ResolvedPair, ItemFailure> {
        if item.namespace() == Namespace::Internal {
            return Err(ItemFailure::NotRequested(format!(
                "{} is already an internal id; nothing to resolve",
                item.id()
            )));
        }

        match self.with_retries(|| resolver.resolve(item.id())).await? {
            Resolution::Found(pair) => Ok(pair),
            Resolution::NotFound => Err(ItemFailure::NotFound(format!(
                "no cross-reference match for {}",
                item.id()
            ))),
        }
    }

    /// Retries transient transport errors with a fixed backoff before giving up.
    async fn with_retries<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max = self.settings.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= max || !err.is_retryable() {
                        return Err(err);
                    }
                    warn!(attempt, max, error = %err, "retrying upstream request");
                    if !self.settings.retry_backoff.is_zero() {
                        sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }
    }

    fn report(&self, sequence: usize, item: &WorkItem, outcome: ItemOutcome) {
        if let Some(observer) = &self.observer {
            observer(&ItemReport {
                sequence,
                item: item.clone(),
                outcome,
            });
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}
