//! healthsync - Health metric aggregation and upload
//!
//! healthsync collects daily health metrics from independent sources, joins
//! them into one canonical record and uploads it to an aggregation server:
//! concurrent collection → unit normalization → wire encoding → single POST.
//!
//! ## Modules
//!
//! - **Collection**: `sources` and `session` run every metric source
//!   concurrently and settle failures to default values
//! - **Record**: `normalizer` and `encoder` produce the canonical upload body
//! - **Upload**: `upload` and `pipeline` submit the record and report the outcome

pub mod config;
pub mod encoder;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod session;
pub mod sources;
pub mod types;
pub mod upload;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{CliOverrides, SyncConfig};
pub use encoder::{json_schema, RecordEncoder, WIRE_SCHEMA_ID};
pub use error::{SourceError, SyncError};
pub use normalizer::Normalizer;
pub use pipeline::{normalize_to_json, SyncPipeline, SyncReport};
pub use session::{AggregationSession, SessionEvent, SessionPolicy, SessionReport, Settlement};
pub use sources::{FixedSource, FnSource, MetricSource, SnapshotSource, SourceRegistry};
pub use types::{
    CanonicalHealthRecord, Difficulty, HealthData, Metric, RawMetricBag, RecordConfig, Sample,
    SourceKey, UploadOutcome,
};
pub use upload::{UploadClient, UPLOAD_PATH};

/// healthsync version, sent in the client user agent
pub const HEALTHSYNC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client name for the user agent
pub const CLIENT_NAME: &str = "healthsync";
