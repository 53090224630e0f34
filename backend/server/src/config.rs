use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Context, Result};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Hosted backend base URL. Empty runs everything in memory.
    pub backend_url: String,
    pub backend_service_key: String,
    pub storage_bucket: String,
    /// Empty keeps memberships in memory.
    pub redis_url: String,
    pub page_limit: u32,
    pub max_page_limit: u32,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        let backend_url: String = try_load("BACKEND_URL", "")?;
        let backend_service_key = if backend_url.is_empty() {
            String::new()
        } else {
            read_secret("BACKEND_SERVICE_KEY")?
        };

        Ok(Self {
            port: try_load("RUST_PORT", "8080")?,
            backend_url,
            backend_service_key,
            storage_bucket: try_load("STORAGE_BUCKET", "posts")?,
            redis_url: try_load("REDIS_URL", "")?,
            page_limit: try_load("PAGE_LIMIT", "8")?,
            max_page_limit: try_load("MAX_PAGE_LIMIT", "50")?,
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", "5242880")?,
        })
    }

    pub fn uses_backend(&self) -> bool {
        !self.backend_url.is_empty()
    }

    pub fn uses_redis(&self) -> bool {
        !self.redis_url.is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            backend_url: String::new(),
            backend_service_key: String::new(),
            storage_bucket: "posts".to_string(),
            redis_url: String::new(),
            page_limit: 8,
            max_page_limit: 50,
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow::anyhow!("Environment misconfigured: {key}={raw}: {e}")
    })
}

/// Reads `/run/secrets/<name>`, falling back to the environment variable of
/// the same name.
fn read_secret(secret_name: &str) -> Result<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Ok(secret.trim().to_string()),
        Err(e) => {
            warn!("Failed to read {secret_name} from file: {e}");

            var(secret_name)
                .map(|secret| secret.trim().to_string())
                .filter(|secret| !secret.is_empty())
                .with_context(|| format!("Secrets misconfigured: {secret_name} missing"))
        }
    }
}
