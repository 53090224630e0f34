//! # Images
//!
//! Post images go to an object-storage bucket on the hosted backend. The
//! board only keeps the public URL the bucket hands back.
//!
//! - Upload: `POST /storage/v1/object/<bucket>/<name>`
//! - Public URL: `/storage/v1/object/public/<bucket>/<name>`
//!
//! Object names are `<unix millis>.<extension>`, see [`object_name`].
use std::{collections::HashMap, sync::LazyLock, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{
    Client,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

static EXTENSION_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-z0-9]").expect("static pattern")
});

const FALLBACK_EXTENSION: &str = "bin";
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage returned {status}: {message}")]
    Backend { status: u16, message: String },
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `name` and returns its public URL.
    async fn upload(&self, name: &str, content_type: &str, bytes: Vec<u8>)
    -> Result<String, BlobError>;
}

/// Builds the object name for an upload from the client's original file
/// name, keeping only a short alphanumeric extension.
pub fn object_name(file_name: &str, now: DateTime<Utc>) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| EXTENSION_NOISE.replace_all(&ext.to_lowercase(), "").into_owned())
        .filter(|ext| !ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    format!("{}.{extension}", now.timestamp_millis())
}

pub struct RestBlobStore {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl RestBlobStore {
    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> Result<Self, BlobError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    pub fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{name}",
            self.base_url, self.bucket
        )
    }
}

#[async_trait]
impl BlobStore for RestBlobStore {
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BlobError> {
        let size = bytes.len();
        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/{}/{name}",
                self.base_url, self.bucket
            ))
            .header("apikey", &self.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BlobError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        info!("Uploaded {name} ({size} bytes)");
        Ok(self.public_url(name))
    }
}

/// Keeps uploads in memory. Used when no backend is configured, and by tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().await.get(name).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BlobError> {
        self.objects
            .lock()
            .await
            .insert(name.to_string(), (content_type.to_string(), bytes));

        Ok(format!("memory://posts/{name}"))
    }
}
