//! Upload client
//!
//! Submits one canonical record to the aggregator in a single POST. There is
//! no retry and no backoff; the caller decides whether to submit again.
//!
//! The outcome is `Success` only for status 200. Any other status, including
//! other 2xx codes, is reported as `ServerRejected`.

use crate::config::{join_url, SyncConfig};
use crate::encoder::RecordEncoder;
use crate::error::SyncError;
use crate::types::{CanonicalHealthRecord, UploadOutcome};
use crate::{CLIENT_NAME, HEALTHSYNC_VERSION};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Path of the upload endpoint on the aggregator
pub const UPLOAD_PATH: &str = "/api/auto/upload";

/// Single-shot uploader for canonical records
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    endpoint: Url,
    auth_token: Option<String>,
}

impl UploadClient {
    /// Client posting to `server_url` + [`UPLOAD_PATH`] with transport defaults
    pub fn new(server_url: &str) -> Result<Self, SyncError> {
        Self::builder(server_url).build()
    }

    pub fn builder(server_url: &str) -> UploadClientBuilder {
        UploadClientBuilder {
            server_url: server_url.to_string(),
            upload_path: UPLOAD_PATH.to_string(),
            timeout: None,
            auth_token: None,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let mut builder = Self::builder(&config.server.url).upload_path(&config.server.upload_path);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(token) = &config.server.auth_token {
            builder = builder.auth_token(token);
        }
        builder.build()
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Encode and POST `record` once
    pub async fn submit(&self, record: CanonicalHealthRecord) -> UploadOutcome {
        let body = match RecordEncoder::new().encode(&record) {
            Ok(body) => body,
            Err(e) => {
                log::error!("Not uploading record for {}: {e}", record.date);
                return UploadOutcome::EncodingFailure {
                    reason: e.to_string(),
                };
            }
        };

        log::info!("Uploading record for {} to {}", record.date, self.endpoint);
        log::debug!("Upload body: {body}");

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.auth_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Upload failed: {e}");
                return UploadOutcome::NetworkFailure {
                    reason: e.to_string(),
                };
            }
        };

        let status = response.status();
        // The status alone decides the outcome; an unreadable body is kept empty
        let body = response.text().await.unwrap_or_default();
        log::info!("Server answered {status}");
        log::debug!("Server response body: {body}");

        if status == StatusCode::OK {
            UploadOutcome::Success
        } else {
            UploadOutcome::ServerRejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// Builder for [`UploadClient`]
#[derive(Debug, Clone)]
pub struct UploadClientBuilder {
    server_url: String,
    upload_path: String,
    timeout: Option<Duration>,
    auth_token: Option<String>,
}

impl UploadClientBuilder {
    pub fn upload_path(mut self, path: &str) -> Self {
        self.upload_path = path.to_string();
        self
    }

    /// Whole-request timeout; the transport default applies otherwise
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string()).filter(|t| !t.is_empty());
        self
    }

    pub fn build(self) -> Result<UploadClient, SyncError> {
        let raw = join_url(&self.server_url, &self.upload_path);
        let endpoint =
            Url::parse(&raw).map_err(|e| SyncError::ConfigError(format!("invalid server URL {raw}: {e}")))?;

        let mut http = reqwest::Client::builder()
            .user_agent(format!("{CLIENT_NAME}/{HEALTHSYNC_VERSION}"));
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| SyncError::ClientError(e.to_string()))?;

        Ok(UploadClient {
            http,
            endpoint,
            auth_token: self.auth_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Normalizer;
    use crate::types::{Metric, RawMetricBag, RecordConfig};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> CanonicalHealthRecord {
        let bag = RawMetricBag::from_values([(Metric::Steps, 8500.0), (Metric::Hrv, 48.0)]);
        let config = RecordConfig::new("a@b.com").with_date("2025-12-17").unwrap();
        Normalizer::normalize(&bag, &config)
    }

    async fn server_answering(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .and(header("content-type", "application/json"))
            .respond_with(template)
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_endpoint_joining() {
        let client = UploadClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000/api/auto/upload");
        assert!(UploadClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_status_200_is_success() {
        let server = server_answering(ResponseTemplate::new(200).set_body_string("{\"success\": true}")).await;
        let client = UploadClient::new(&server.uri()).unwrap();
        assert_eq!(client.submit(record()).await, UploadOutcome::Success);
    }

    #[tokio::test]
    async fn test_status_200_with_unparsable_body_is_success() {
        let server = server_answering(ResponseTemplate::new(200).set_body_string("<<not json>>")).await;
        let client = UploadClient::new(&server.uri()).unwrap();
        assert_eq!(client.submit(record()).await, UploadOutcome::Success);
    }

    #[tokio::test]
    async fn test_status_201_is_rejected() {
        let server = server_answering(ResponseTemplate::new(201).set_body_string("created")).await;
        let client = UploadClient::new(&server.uri()).unwrap();
        assert_eq!(
            client.submit(record()).await,
            UploadOutcome::ServerRejected {
                status: 201,
                body: "created".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_is_rejected() {
        let server = server_answering(ResponseTemplate::new(500).set_body_string("Summary failed")).await;
        let client = UploadClient::new(&server.uri()).unwrap();
        assert!(matches!(
            client.submit(record()).await,
            UploadOutcome::ServerRejected { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_body_matches_wire_encoding() {
        let record = record();
        let expected: serde_json::Value =
            serde_json::from_str(&RecordEncoder::new().encode(&record).unwrap()).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPLOAD_PATH))
            .and(body_json(&expected))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = UploadClient::new(&server.uri()).unwrap();
        assert!(client.submit(record).await.is_success());
    }

    #[tokio::test]
    async fn test_auth_header_only_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = UploadClient::builder(&server.uri())
            .auth_token("s3cret")
            .build()
            .unwrap();
        assert!(client.submit(record()).await.is_success());
    }

    #[tokio::test]
    async fn test_encoding_failure_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut bad = record();
        bad.health.hrv = f64::INFINITY;
        let client = UploadClient::new(&server.uri()).unwrap();
        assert!(matches!(
            client.submit(bad).await,
            UploadOutcome::EncodingFailure { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_failure() {
        // Reserve a free port, then release it so nothing is listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let uri = format!("http://127.0.0.1:{port}");
        let client = UploadClient::builder(&uri)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert!(matches!(
            client.submit(record()).await,
            UploadOutcome::NetworkFailure { .. }
        ));
    }
}
