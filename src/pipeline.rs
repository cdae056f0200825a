//! Pipeline orchestration
//!
//! This module provides the public API for healthsync. It drives one upload
//! from registered metric sources to the server response:
//!
//! 1. `AggregationSession` - collect every source concurrently into a raw bag
//! 2. `Normalizer` - convert units and rename into the canonical record
//! 3. `UploadClient` - encode and POST the record once

use crate::config::SyncConfig;
use crate::encoder::RecordEncoder;
use crate::error::SyncError;
use crate::normalizer::Normalizer;
use crate::session::{AggregationSession, SessionPolicy, SessionReport};
use crate::sources::{bag_from_snapshot, SourceRegistry};
use crate::types::{CanonicalHealthRecord, RawMetricBag, RecordConfig, UploadOutcome};
use crate::upload::UploadClient;
use serde::Serialize;

/// Convert a raw metric document into the upload JSON body.
///
/// # Arguments
/// * `raw_json` - Metric values keyed by collector name (see `sources::snapshot`)
/// * `config` - Identity and session settings for the record
/// * `pretty` - Pretty-print the output
///
/// # Example
/// ```ignore
/// let body = normalize_to_json(
///     r#"{"steps": 8500, "distance": 5400}"#,
///     &RecordConfig::new("a@b.com"),
///     false,
/// )?;
/// ```
pub fn normalize_to_json(
    raw_json: &str,
    config: &RecordConfig,
    pretty: bool,
) -> Result<String, SyncError> {
    config.validate()?;
    let bag = bag_from_snapshot(raw_json)?;
    let record = Normalizer::normalize(&bag, config);

    let encoder = if pretty {
        RecordEncoder::pretty()
    } else {
        RecordEncoder::new()
    };
    encoder.encode(&record)
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub session: SessionReport,
    pub bag: RawMetricBag,
    pub record: CanonicalHealthRecord,
    /// `None` for a dry run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<UploadOutcome>,
}

impl SyncReport {
    /// True only when the record was uploaded and answered with 200
    pub fn is_success(&self) -> bool {
        self.outcome.as_ref().is_some_and(UploadOutcome::is_success)
    }
}

/// Collect, normalize and upload in one call.
///
/// Holds no per-run state; one pipeline may run any number of sessions.
#[derive(Debug, Clone)]
pub struct SyncPipeline {
    client: UploadClient,
    policy: SessionPolicy,
    dry_run: bool,
}

impl SyncPipeline {
    pub fn new(client: UploadClient) -> Self {
        Self {
            client,
            policy: SessionPolicy::default(),
            dry_run: false,
        }
    }

    /// Pipeline with the client and session budget taken from `config`
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        Ok(Self::new(UploadClient::from_config(config)?).with_policy(config.session_policy()))
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop after normalization without contacting the server
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn client(&self) -> &UploadClient {
        &self.client
    }

    /// Build a session over `registry` using this pipeline's budget.
    ///
    /// Subscribe to it before handing it to [`SyncPipeline::run_session`] to
    /// observe settlements as they happen.
    pub fn session(&self, registry: SourceRegistry) -> AggregationSession {
        AggregationSession::with_policy(registry, self.policy)
    }

    pub async fn run(&self, registry: SourceRegistry, config: &RecordConfig) -> SyncReport {
        self.run_session(self.session(registry), config).await
    }

    pub async fn run_session(
        &self,
        session: AggregationSession,
        config: &RecordConfig,
    ) -> SyncReport {
        let (bag, session) = session.collect_with_report().await;
        let record = Normalizer::normalize(&bag, config);

        let outcome = if self.dry_run {
            log::info!("Dry run, not uploading record for {}", record.date);
            None
        } else {
            let outcome = self.client.submit(record.clone()).await;
            log::info!("Upload outcome: {outcome}");
            Some(outcome)
        };

        SyncReport {
            session,
            bag,
            record,
            outcome,
        }
    }
}
