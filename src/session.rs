//! Aggregation session
//!
//! Runs every registered metric source concurrently and joins the results
//! into one raw metric bag.
//!
//! - Each source runs on its own task; a slow or failing source never delays
//!   or cancels another.
//! - Source failures, panics, invalid samples and timeouts are logged and the
//!   affected slots settle to their default value. Nothing is propagated.
//! - The session task is the only writer of the bag. Sources report back by
//!   completing their task, and the bag is handed out only after the join.
//! - Observers subscribe to [`SessionEvent`]s: one per settled source and a
//!   final `Completed` carrying the finished bag.

use crate::error::SourceError;
use crate::sources::{MetricSource, SourceRegistry};
use crate::types::{RawMetricBag, Sample, SourceKey};
use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

/// Default time a single source may take
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time the whole session may take
pub const DEFAULT_SESSION_DEADLINE: Duration = Duration::from_secs(30);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Time budget of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Per-source limit; `None` waits for the source indefinitely
    pub source_timeout: Option<Duration>,
    /// Overall limit; `None` waits until every source settles
    pub deadline: Option<Duration>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            source_timeout: Some(DEFAULT_SOURCE_TIMEOUT),
            deadline: Some(DEFAULT_SESSION_DEADLINE),
        }
    }
}

impl SessionPolicy {
    /// No limits at all: a source that never answers stalls the session
    pub fn unbounded() -> Self {
        Self {
            source_timeout: None,
            deadline: None,
        }
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = Some(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// How one source ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Settlement {
    Fetched,
    Failed { reason: String },
    TimedOut,
}

impl Settlement {
    pub fn is_fetched(&self) -> bool {
        matches!(self, Settlement::Fetched)
    }
}

/// Settlement of one source within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSettlement {
    pub key: SourceKey,
    #[serde(flatten)]
    pub settlement: Settlement,
    pub elapsed_ms: u64,
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    /// One entry per registered source, ordered by key
    pub settlements: Vec<SourceSettlement>,
    pub elapsed_ms: u64,
    /// Whether the overall deadline cut the session short
    pub deadline_hit: bool,
}

impl SessionReport {
    /// Sources whose slots hold a default instead of a fetched value
    pub fn defaulted(&self) -> Vec<SourceKey> {
        self.settlements
            .iter()
            .filter(|s| !s.settlement.is_fetched())
            .map(|s| s.key)
            .collect()
    }

    pub fn fetched_count(&self) -> usize {
        self.settlements
            .iter()
            .filter(|s| s.settlement.is_fetched())
            .count()
    }

    pub fn settlement(&self, key: SourceKey) -> Option<&Settlement> {
        self.settlements
            .iter()
            .find(|s| s.key == key)
            .map(|s| &s.settlement)
    }
}

/// Notification published while a session runs
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A source settled and its slots were written
    MetricSettled {
        key: SourceKey,
        sample: Sample,
        settlement: Settlement,
    },
    /// Every source settled; the bag is final
    Completed {
        bag: RawMetricBag,
        report: SessionReport,
    },
}

/// One concurrent collection over a set of sources.
///
/// The registry is owned by the session and released when it completes.
pub struct AggregationSession {
    session_id: String,
    registry: SourceRegistry,
    policy: SessionPolicy,
    events: broadcast::Sender<SessionEvent>,
}

impl AggregationSession {
    /// Create a session with the default time budget
    pub fn new(registry: SourceRegistry) -> Self {
        Self::with_policy(registry, SessionPolicy::default())
    }

    pub fn with_policy(registry: SourceRegistry, policy: SessionPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session_id: Uuid::new_v4().to_string(),
            registry,
            policy,
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Subscribe to settlement events; must be called before `collect`
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Run every source and return the joined bag
    pub async fn collect(self) -> RawMetricBag {
        self.collect_with_report().await.0
    }

    /// Run every source and return the joined bag with a per-source report
    pub async fn collect_with_report(self) -> (RawMetricBag, SessionReport) {
        let started = Instant::now();
        let deadline = self.policy.deadline.map(|d| started + d);
        let source_timeout = self.policy.source_timeout;

        log::debug!(
            "Session {} starting with {} sources",
            self.session_id,
            self.registry.len()
        );

        let mut tasks = JoinSet::new();
        let mut pending: BTreeSet<SourceKey> = BTreeSet::new();
        for source in self.registry.sources() {
            pending.insert(source.key());
            tasks.spawn(settle(Arc::clone(source), source_timeout));
        }

        let mut bag = RawMetricBag::new();
        let mut settlements = Vec::with_capacity(pending.len());
        let mut deadline_hit = false;

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        deadline_hit = true;
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            match next {
                None => break,
                Some(Ok(outcome)) => {
                    pending.remove(&outcome.key);
                    let (sample, settlement) = resolve(outcome.key, outcome.result);
                    self.apply(&mut bag, outcome.key, sample, settlement.clone());
                    settlements.push(SourceSettlement {
                        key: outcome.key,
                        settlement,
                        elapsed_ms: millis(outcome.elapsed),
                    });
                }
                Some(Err(e)) => {
                    // settle() catches panics, so only cancellation lands here
                    log::warn!("Source task ended without a result: {e}");
                }
            }
        }

        let elapsed = started.elapsed();
        for key in pending {
            let settlement = if deadline_hit {
                log::warn!("Source {key} missed the session deadline, using default");
                Settlement::TimedOut
            } else {
                Settlement::Failed {
                    reason: "source task ended without a result".to_string(),
                }
            };
            self.apply(&mut bag, key, key.default_sample(), settlement.clone());
            settlements.push(SourceSettlement {
                key,
                settlement,
                elapsed_ms: millis(elapsed),
            });
        }

        settlements.sort_by_key(|s| s.key);
        let report = SessionReport {
            session_id: self.session_id.clone(),
            settlements,
            elapsed_ms: millis(elapsed),
            deadline_hit,
        };

        log::info!(
            "Session {} complete: {}/{} sources fetched in {}ms",
            report.session_id,
            report.fetched_count(),
            report.settlements.len(),
            report.elapsed_ms
        );

        let _ = self.events.send(SessionEvent::Completed {
            bag: bag.clone(),
            report: report.clone(),
        });

        (bag, report)
    }

    fn apply(&self, bag: &mut RawMetricBag, key: SourceKey, sample: Sample, settlement: Settlement) {
        bag.record(key, sample);
        // No subscribers is fine
        let _ = self.events.send(SessionEvent::MetricSettled {
            key,
            sample,
            settlement,
        });
    }
}

struct FetchOutcome {
    key: SourceKey,
    result: Result<Sample, SourceError>,
    elapsed: Duration,
}

async fn settle(source: Arc<dyn MetricSource>, timeout: Option<Duration>) -> FetchOutcome {
    let key = source.key();
    let started = Instant::now();
    let fetch = AssertUnwindSafe(source.fetch()).catch_unwind();

    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fetch).await {
            Ok(caught) => caught,
            Err(_) => {
                return FetchOutcome {
                    key,
                    result: Err(SourceError::Timeout(millis(limit))),
                    elapsed: started.elapsed(),
                }
            }
        },
        None => fetch.await,
    };

    let result = match caught {
        Ok(Ok(sample)) if !sample.fits(key) => Err(SourceError::InvalidSample(format!(
            "{key} returned a sample of the wrong shape"
        ))),
        Ok(Ok(sample)) if !sample.is_finite() => Err(SourceError::InvalidSample(format!(
            "{key} returned a non-finite value"
        ))),
        Ok(result) => result,
        Err(_) => Err(SourceError::Other(format!("{key} panicked"))),
    };

    FetchOutcome {
        key,
        result,
        elapsed: started.elapsed(),
    }
}

/// Turn a fetch result into the sample to store and how the source settled
fn resolve(key: SourceKey, result: Result<Sample, SourceError>) -> (Sample, Settlement) {
    match result {
        Ok(sample) => {
            log::debug!("Source {key} settled with {sample:?}");
            (sample, Settlement::Fetched)
        }
        Err(SourceError::Timeout(ms)) => {
            log::warn!("Source {key} timed out after {ms}ms, using default");
            (key.default_sample(), Settlement::TimedOut)
        }
        Err(e) => {
            log::warn!("Source {key} failed, using default: {e}");
            (
                key.default_sample(),
                Settlement::Failed {
                    reason: e.to_string(),
                },
            )
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
