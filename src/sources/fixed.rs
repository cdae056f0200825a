//! In-process sources
//!
//! `FixedSource` returns a constant (optionally after a delay), `FnSource`
//! wraps an async closure so platform code can plug a reader in without
//! defining a type.

use crate::error::SourceError;
use crate::types::{Sample, SourceKey};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use super::MetricSource;

/// Source yielding a fixed sample
#[derive(Debug, Clone)]
pub struct FixedSource {
    key: SourceKey,
    sample: Sample,
    delay: Duration,
}

impl FixedSource {
    pub fn new(key: SourceKey, sample: Sample) -> Self {
        Self {
            key,
            sample,
            delay: Duration::ZERO,
        }
    }

    pub fn scalar(key: SourceKey, value: f64) -> Self {
        Self::new(key, Sample::Scalar(value))
    }

    pub fn pair(key: SourceKey, first: f64, second: f64) -> Self {
        Self::new(key, Sample::Pair(first, second))
    }

    /// Wait `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MetricSource for FixedSource {
    fn key(&self) -> SourceKey {
        self.key
    }

    async fn fetch(&self) -> Result<Sample, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.sample)
    }
}

/// Source backed by an async closure
pub struct FnSource<F> {
    key: SourceKey,
    read: F,
}

impl<F, Fut> FnSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Sample, SourceError>> + Send,
{
    pub fn new(key: SourceKey, read: F) -> Self {
        Self { key, read }
    }
}

#[async_trait]
impl<F, Fut> MetricSource for FnSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Sample, SourceError>> + Send,
{
    fn key(&self) -> SourceKey {
        self.key
    }

    async fn fetch(&self) -> Result<Sample, SourceError> {
        (self.read)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_source_returns_sample() {
        let source = FixedSource::pair(SourceKey::BloodPressure, 118.0, 76.0);
        assert_eq!(source.key(), SourceKey::BloodPressure);
        assert_eq!(source.fetch().await, Ok(Sample::Pair(118.0, 76.0)));
    }

    #[tokio::test]
    async fn test_fn_source_propagates_error() {
        let source = FnSource::new(SourceKey::BloodGlucose, || async {
            Err::<Sample, _>(SourceError::NotAuthorized("glucose".to_string()))
        });
        assert!(matches!(
            source.fetch().await,
            Err(SourceError::NotAuthorized(_))
        ));
    }
}
