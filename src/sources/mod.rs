//! Metric sources
//!
//! A metric source is the capability contract between the pipeline and the
//! platform layer that actually reads a measurement. The pipeline never knows
//! how a value is obtained, only which slot it fills.

mod fixed;
mod snapshot;

pub use fixed::{FixedSource, FnSource};
pub use snapshot::{bag_from_snapshot, parse_snapshot, SnapshotSource};

use crate::error::{SourceError, SyncError};
use crate::types::{Sample, SourceKey};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Provider of one raw metric value
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Which source this is; also decides the bag slots it writes
    fn key(&self) -> SourceKey;

    /// Read the current value
    async fn fetch(&self) -> Result<Sample, SourceError>;
}

/// The set of sources one aggregation session runs.
///
/// At most one source per key, so no two sources ever write the same bag slot.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceKey, Arc<dyn MetricSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source, rejecting a second source for the same key
    pub fn register<S>(&mut self, source: S) -> Result<(), SyncError>
    where
        S: MetricSource + 'static,
    {
        self.register_arc(Arc::new(source))
    }

    pub fn register_arc(&mut self, source: Arc<dyn MetricSource>) -> Result<(), SyncError> {
        let key = source.key();
        if self.sources.contains_key(&key) {
            return Err(SyncError::DuplicateSource(key.to_string()));
        }
        self.sources.insert(key, source);
        Ok(())
    }

    /// Builder-style `register`
    pub fn with<S>(mut self, source: S) -> Result<Self, SyncError>
    where
        S: MetricSource + 'static,
    {
        self.register(source)?;
        Ok(self)
    }

    /// Registry with one snapshot-backed source per key, read from a JSON export
    pub fn from_snapshot_json(json: &str) -> Result<Self, SyncError> {
        let values = parse_snapshot(json)?;
        let mut registry = Self::new();
        for key in SourceKey::ALL {
            registry.register(SnapshotSource::new(key, values.get(&key).copied()))?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn contains(&self, key: SourceKey) -> bool {
        self.sources.contains_key(&key)
    }

    /// Keys of the standard set that have no registered source
    pub fn missing(&self) -> Vec<SourceKey> {
        SourceKey::ALL
            .iter()
            .copied()
            .filter(|k| !self.sources.contains_key(k))
            .collect()
    }

    pub fn sources(&self) -> impl Iterator<Item = &Arc<dyn MetricSource>> {
        self.sources.values()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_duplicate_key() {
        let mut registry = SourceRegistry::new();
        registry
            .register(FixedSource::scalar(SourceKey::Steps, 10.0))
            .unwrap();

        let err = registry
            .register(FixedSource::scalar(SourceKey::Steps, 20.0))
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateSource(ref k) if k == "steps"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_lists_unregistered_keys() {
        let registry = SourceRegistry::new()
            .with(FixedSource::scalar(SourceKey::Hrv, 45.0))
            .unwrap();
        let missing = registry.missing();
        assert_eq!(missing.len(), SourceKey::ALL.len() - 1);
        assert!(!missing.contains(&SourceKey::Hrv));
    }

    #[test]
    fn test_from_snapshot_registers_full_set() {
        let registry = SourceRegistry::from_snapshot_json(r#"{"steps": 8500}"#).unwrap();
        assert_eq!(registry.len(), SourceKey::ALL.len());
        assert!(registry.missing().is_empty());
    }
}
