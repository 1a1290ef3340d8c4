//! Object-storage history (S3 and GCS)
//!
//! Each published id is a zero-length object whose key is the id's decimal
//! form. There is no aggregate file to read-modify-write, so independent
//! processes can probe and record concurrently.

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{GcsHistoryConfig, S3HistoryConfig};
use crate::error::HistoryError;
use crate::history::HistoryStore;
use crate::types::CandidateId;

const DEFAULT_RECORD_TIMEOUT: Duration = Duration::from_secs(50);

/// History backed by object existence in a bucket
pub struct ObjectHistory {
    store: Arc<dyn ObjectStore>,
    backend: String,
    prefix: Option<Path>,
    record_timeout: Duration,
}

impl ObjectHistory {
    /// Wrap any object store; `backend` is the name used in logs and errors
    pub fn new(store: Arc<dyn ObjectStore>, backend: impl Into<String>) -> Self {
        Self {
            store,
            backend: backend.into(),
            prefix: None,
            record_timeout: DEFAULT_RECORD_TIMEOUT,
        }
    }

    /// Keep markers under `prefix/` instead of the bucket root
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            None
        } else {
            Some(Path::from(trimmed))
        };
        self
    }

    /// Deadline applied to each `record` write
    pub fn with_record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = timeout;
        self
    }

    /// Build an S3 (or S3-compatible) history from configuration
    pub fn s3(config: &S3HistoryConfig) -> Result<Self, HistoryError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret.expose_secret());
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build().map_err(|e| HistoryError::Backend {
            backend: "s3".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self::from_parts(
            Arc::new(store),
            "s3",
            config.prefix.as_deref(),
            config.record_timeout_secs,
        ))
    }

    /// Build a Google Cloud Storage history from configuration
    pub fn gcs(config: &GcsHistoryConfig) -> Result<Self, HistoryError> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);
        if let Some(path) = &config.service_account_path {
            builder = builder.with_service_account_path(path);
        }

        let store = builder.build().map_err(|e| HistoryError::Backend {
            backend: "gcs".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self::from_parts(
            Arc::new(store),
            "gcs",
            config.prefix.as_deref(),
            config.record_timeout_secs,
        ))
    }

    fn from_parts(
        store: Arc<dyn ObjectStore>,
        backend: &str,
        prefix: Option<&str>,
        record_timeout_secs: u64,
    ) -> Self {
        let history = Self::new(store, backend)
            .with_record_timeout(Duration::from_secs(record_timeout_secs));
        match prefix {
            Some(prefix) => history.with_prefix(prefix),
            None => history,
        }
    }

    /// Object key marking `id` as published
    pub fn key(&self, id: CandidateId) -> Path {
        match &self.prefix {
            Some(prefix) => prefix.child(id.to_string()),
            None => Path::from(id.to_string()),
        }
    }
}

#[async_trait]
impl HistoryStore for ObjectHistory {
    async fn exists(&self, id: CandidateId) -> Result<bool, HistoryError> {
        let key = self.key(id);
        match self.store.head(&key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(HistoryError::Lookup {
                backend: self.backend.clone(),
                id,
                reason: e.to_string(),
            }),
        }
    }

    async fn record(&self, id: CandidateId) -> Result<(), HistoryError> {
        let key = self.key(id);
        debug!(backend = %self.backend, key = %key, "Recording published id");

        let put = self.store.put(&key, PutPayload::new());
        match tokio::time::timeout(self.record_timeout, put).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HistoryError::Write {
                backend: self.backend.clone(),
                id,
                reason: e.to_string(),
            }),
            Err(_) => Err(HistoryError::Write {
                backend: self.backend.clone(),
                id,
                reason: format!("timed out after {:?}", self.record_timeout),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.backend
    }
}
