//! Object-store configuration.
//!
//! Bucket, region, optional static credentials and an optional key prefix,
//! with validation of the rules callers most often get wrong (a missing
//! bucket, a base path without its trailing separator).

use serde::{Deserialize, Serialize};

use crate::registry::ClientIdentity;
use crate::{FileVaultError, Result};

/// An explicit access-key/secret pair for the object store.
#[derive(Clone, Serialize, Deserialize)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_access_key: String,
}

// Secrets stay out of logs.
impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Configuration for the object-store side of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Bucket all objects are written to. Versioning must be enabled on it.
    pub bucket: String,
    /// Region the bucket lives in.
    pub region: String,
    /// Explicit credentials; when absent the ambient provider chain is used.
    pub credentials: Option<StaticCredentials>,
    /// Optional key prefix applied to every record. Must end with `/`.
    pub base_path: Option<String>,
}

impl StoreConfig {
    pub fn new<B: Into<String>, R: Into<String>>(bucket: B, region: R) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            credentials: None,
            base_path: None,
        }
    }

    /// Use an explicit access-key/secret pair instead of the ambient chain.
    pub fn with_static_credentials<A, K>(mut self, access_key: A, secret_access_key: K) -> Self
    where
        A: Into<String>,
        K: Into<String>,
    {
        self.credentials = Some(StaticCredentials {
            access_key: access_key.into(),
            secret_access_key: secret_access_key.into(),
        });
        self
    }

    /// Prefix every object key. The prefix must end with `/`.
    pub fn with_base_path<S: Into<String>>(mut self, base_path: S) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Load configuration from the environment.
    ///
    /// `FILEVAULT_BUCKET` is required. The region comes from
    /// `FILEVAULT_REGION`, falling back to `AWS_REGION`. Optional:
    /// `FILEVAULT_ACCESS_KEY` + `FILEVAULT_SECRET_ACCESS_KEY` (both or
    /// neither) and `FILEVAULT_BASE_PATH`.
    pub fn from_env() -> Result<Self> {
        let bucket = std::env::var("FILEVAULT_BUCKET").map_err(|_| {
            FileVaultError::configuration("FILEVAULT_BUCKET is not set")
        })?;
        let region = std::env::var("FILEVAULT_REGION")
            .or_else(|_| std::env::var("AWS_REGION"))
            .map_err(|_| {
                FileVaultError::configuration("neither FILEVAULT_REGION nor AWS_REGION is set")
            })?;

        let mut config = Self::new(bucket, region);

        match (
            std::env::var("FILEVAULT_ACCESS_KEY").ok(),
            std::env::var("FILEVAULT_SECRET_ACCESS_KEY").ok(),
        ) {
            (Some(access_key), Some(secret)) => {
                config = config.with_static_credentials(access_key, secret);
            }
            (None, None) => {}
            _ => {
                return Err(FileVaultError::configuration(
                    "FILEVAULT_ACCESS_KEY and FILEVAULT_SECRET_ACCESS_KEY must be set together",
                ));
            }
        }

        if let Ok(base_path) = std::env::var("FILEVAULT_BASE_PATH") {
            config = config.with_base_path(base_path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(FileVaultError::configuration("bucket name is required"));
        }
        if self.region.trim().is_empty() {
            return Err(FileVaultError::configuration("region is required"));
        }
        if let Some(base) = &self.base_path {
            if !base.ends_with('/') {
                return Err(FileVaultError::configuration(format!(
                    "base path '{base}' must end with '/'"
                )));
            }
        }
        Ok(())
    }

    /// The client identity this configuration authenticates as.
    pub fn identity(&self) -> ClientIdentity {
        match &self.credentials {
            Some(creds) => ClientIdentity::with_keys(
                creds.access_key.clone(),
                creds.secret_access_key.clone(),
                self.region.clone(),
            ),
            None => ClientIdentity::ambient(self.region.clone()),
        }
    }
}
