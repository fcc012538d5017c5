/*!
Amazon S3 object-store adapter.

A blocking facade over the official AWS SDK: each handle owns a dedicated
tokio runtime and drives the async SDK with `block_on`, so callers see the
purely synchronous interface the core is built around. Handles are
constructed from a [`ClientIdentity`](crate::registry::ClientIdentity) and
are safe for concurrent use once built; `close` tears the runtime down and
is invoked by the client registry on shutdown.
*/

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::RwLock;

use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier, Tag, Tagging};
use aws_sdk_s3::Client as S3Client;
use tokio::runtime::Runtime;
use tracing::{debug, error, info};

use super::{ObjectStoreAdapter, ObjectSummary, ObjectVersion};
use crate::registry::ClientIdentity;
use crate::{FileVaultError, Result};

/// Amazon S3 implementation of [`ObjectStoreAdapter`].
///
/// # Authentication
/// With [`ClientIdentity::Ambient`] the standard AWS credential provider
/// chain applies (environment variables, credentials file, instance/task
/// roles). With [`ClientIdentity::Static`] the given key pair is used
/// directly.
pub struct S3ObjectStore {
    client: S3Client,
    region: String,
    runtime: RwLock<Option<Runtime>>,
}

impl S3ObjectStore {
    /// Construct an authenticated handle for the given identity.
    ///
    /// Failure here (no credential chain, runtime creation failure) is a
    /// critical error; the registry does not retry it.
    pub fn connect(identity: &ClientIdentity) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| {
            FileVaultError::storage(format!(
                "failed to create blocking runtime for object-store client: {e}"
            ))
        })?;

        let (client, region) = match identity {
            ClientIdentity::Ambient { region } => {
                let sdk_config = runtime.block_on(async {
                    aws_config::defaults(aws_config::BehaviorVersion::latest())
                        .region(Region::new(region.clone()))
                        .load()
                        .await
                });

                if sdk_config.credentials_provider().is_none() {
                    return Err(FileVaultError::storage(
                        "no AWS credential chain available; set AWS_ACCESS_KEY_ID, \
                         AWS_SECRET_ACCESS_KEY and AWS_REGION or run with an instance role",
                    ));
                }

                (S3Client::new(&sdk_config), region.clone())
            }
            ClientIdentity::Static {
                access_key,
                secret_access_key,
                region,
            } => {
                let credentials = Credentials::new(
                    access_key.clone(),
                    secret_access_key.clone(),
                    None,
                    None,
                    "filevault-static",
                );
                let config = aws_sdk_s3::config::Builder::new()
                    .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
                    .region(Region::new(region.clone()))
                    .credentials_provider(credentials)
                    .build();

                (S3Client::from_conf(config), region.clone())
            }
        };

        info!(
            region = %region,
            auth = identity.auth_label(),
            "initialized object-store client"
        );

        Ok(Self {
            client,
            region,
            runtime: RwLock::new(Some(runtime)),
        })
    }

    /// The region this handle operates in.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Shut the handle down, releasing its runtime and connection pool.
    /// Subsequent operations fail with a storage error. Idempotent.
    pub fn close(&self) {
        let taken = match self.runtime.write() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(runtime) = taken {
            runtime.shutdown_background();
            info!(region = %self.region, "closed object-store client");
        }
    }

    /// Drive an SDK future to completion on the handle's runtime.
    fn block_on<F: std::future::Future>(&self, fut: F) -> Result<F::Output> {
        let guard = self
            .runtime
            .read()
            .map_err(|_| FileVaultError::storage("object-store client runtime lock poisoned"))?;
        let runtime = guard
            .as_ref()
            .ok_or_else(|| FileVaultError::storage("object-store client is closed"))?;
        Ok(runtime.block_on(fut))
    }
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl ObjectStoreAdapter for S3ObjectStore {
    fn put_object(&self, bucket: &str, key: &str, file: &Path) -> Result<String> {
        debug!(bucket, key, file = %file.display(), "starting put_object");
        #[cfg(feature = "metrics")]
        let timer = crate::observability::MetricsTimer::start("put_object");

        let result = self.block_on(async {
            let body = ByteStream::from_path(file).await.map_err(|e| {
                FileVaultError::storage(format!(
                    "failed to open staged file {}: {e}",
                    file.display()
                ))
            })?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(|e| map_store_error("put_object", e, key))
        })?;

        #[cfg(feature = "metrics")]
        match &result {
            Ok(_) => timer.finish(),
            Err(_) => timer.finish_with_error(),
        }

        let response = result.inspect_err(|e| {
            error!(bucket, key, error = %e, "put_object failed");
        })?;

        let version = response.version_id().map(str::to_string).ok_or_else(|| {
            FileVaultError::storage(format!(
                "bucket '{bucket}' issued no version token for key '{key}'; \
                 object versioning must be enabled"
            ))
        })?;

        debug!(bucket, key, version = %version, "put_object complete");
        Ok(version)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
        dest: &Path,
    ) -> Result<()> {
        debug!(bucket, key, ?version, dest = %dest.display(), "starting get_object");
        #[cfg(feature = "metrics")]
        let timer = crate::observability::MetricsTimer::start("get_object");

        let result = self.block_on(async {
            let mut request = self.client.get_object().bucket(bucket).key(key);
            if let Some(version) = version {
                request = request.version_id(version);
            }
            let output = request
                .send()
                .await
                .map_err(|e| map_store_error("get_object", e, key))?;
            output.body.collect().await.map_err(|e| {
                FileVaultError::storage(format!("failed to read object body for '{key}': {e}"))
            })
        })?;

        #[cfg(feature = "metrics")]
        match &result {
            Ok(_) => timer.finish(),
            Err(_) => timer.finish_with_error(),
        }

        let data = result.inspect_err(|e| {
            error!(bucket, key, error = %e, "get_object failed");
        })?;

        std::fs::write(dest, data.into_bytes())?;
        debug!(bucket, key, dest = %dest.display(), "get_object complete");
        Ok(())
    }

    fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        debug!(bucket, count = keys.len(), "starting delete_objects");

        let mut identifiers = Vec::with_capacity(keys.len());
        for key in keys {
            identifiers.push(
                ObjectIdentifier::builder()
                    .key(key.as_str())
                    .build()
                    .map_err(|e| FileVaultError::storage(format!("invalid object key: {e}")))?,
            );
        }
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .build()
            .map_err(|e| FileVaultError::storage(format!("invalid delete request: {e}")))?;

        self.block_on(async {
            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| map_store_error("delete_objects", e, keys.first().map_or("", |k| k)))
        })??;

        Ok(())
    }

    fn delete_object_versions(&self, bucket: &str, versions: &[(String, String)]) -> Result<()> {
        debug!(bucket, count = versions.len(), "starting delete_object_versions");

        let mut identifiers = Vec::with_capacity(versions.len());
        for (key, version) in versions {
            identifiers.push(
                ObjectIdentifier::builder()
                    .key(key.as_str())
                    .version_id(version.as_str())
                    .build()
                    .map_err(|e| FileVaultError::storage(format!("invalid object key: {e}")))?,
            );
        }
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .build()
            .map_err(|e| FileVaultError::storage(format!("invalid delete request: {e}")))?;

        self.block_on(async {
            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| {
                    map_store_error(
                        "delete_object_versions",
                        e,
                        versions.first().map_or("", |(k, _)| k),
                    )
                })
        })??;

        Ok(())
    }

    fn object_tags(&self, bucket: &str, key: &str) -> Result<HashMap<String, String>> {
        let output = self.block_on(async {
            self.client
                .get_object_tagging()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| map_store_error("get_object_tagging", e, key))
        })??;

        Ok(output
            .tag_set()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }

    fn put_object_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        let mut tag_set = Vec::with_capacity(tags.len());
        for (name, value) in tags {
            tag_set.push(
                Tag::builder()
                    .key(name.as_str())
                    .value(value.as_str())
                    .build()
                    .map_err(|e| FileVaultError::storage(format!("invalid object tag: {e}")))?,
            );
        }
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| FileVaultError::storage(format!("invalid tag set: {e}")))?;

        self.block_on(async {
            self.client
                .put_object_tagging()
                .bucket(bucket)
                .key(key)
                .tagging(tagging)
                .send()
                .await
                .map_err(|e| map_store_error("put_object_tagging", e, key))
        })??;

        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>> {
        let output = self.block_on(async {
            self.client
                .list_objects_v2()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| map_store_error("list_objects", e, ""))
        })??;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                Some(ObjectSummary {
                    key,
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                })
            })
            .collect())
    }

    fn list_object_versions<'a>(
        &'a self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectVersion>> + 'a>> {
        Ok(Box::new(VersionPages {
            store: self,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            key_marker: None,
            version_marker: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }
}

/// Lazy, marker-paginated iterator over object versions. Each page is
/// fetched only when the previous one has been drained, so iterating a
/// large bucket never materializes the full listing.
struct VersionPages<'a> {
    store: &'a S3ObjectStore,
    bucket: String,
    prefix: String,
    key_marker: Option<String>,
    version_marker: Option<String>,
    buffer: VecDeque<ObjectVersion>,
    exhausted: bool,
}

impl VersionPages<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let output = self.store.block_on(async {
            self.store
                .client
                .list_object_versions()
                .bucket(self.bucket.as_str())
                .prefix(self.prefix.as_str())
                .set_key_marker(self.key_marker.clone())
                .set_version_id_marker(self.version_marker.clone())
                .send()
                .await
                .map_err(|e| map_store_error("list_object_versions", e, &self.prefix))
        })??;

        for entry in output.versions() {
            let (Some(key), Some(version_id)) = (entry.key(), entry.version_id()) else {
                continue;
            };
            self.buffer.push_back(ObjectVersion {
                key: key.to_string(),
                version_id: version_id.to_string(),
                is_latest: entry.is_latest().unwrap_or(false),
                size: entry.size().unwrap_or(0).max(0) as u64,
            });
        }

        if output.is_truncated().unwrap_or(false) {
            self.key_marker = output.next_key_marker().map(str::to_string);
            self.version_marker = output.next_version_id_marker().map(str::to_string);
        } else {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for VersionPages<'_> {
    type Item = Result<ObjectVersion>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(version) = self.buffer.pop_front() {
                return Some(Ok(version));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

/// Map AWS SDK errors into the crate taxonomy.
pub(crate) fn map_store_error<E>(op: &str, error: SdkError<E>, key: &str) -> FileVaultError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    match &error {
        SdkError::DispatchFailure(dispatch_err) => FileVaultError::storage(format!(
            "{op} request failed to dispatch: {dispatch_err:?}"
        )),
        SdkError::TimeoutError(_) => {
            FileVaultError::storage(format!("{op} request timed out (key: {key})"))
        }
        SdkError::ResponseError(response_err) => {
            FileVaultError::storage(format!("{op} response error: {response_err:?}"))
        }
        SdkError::ServiceError(service_err) => match service_err.err().code() {
            Some(code) => classify_service_code(op, code, key, service_err.err().message()),
            None => FileVaultError::storage(format!("{op} service error: {service_err:?}")),
        },
        _ => FileVaultError::storage(format!("{op} error: {error}")),
    }
}

/// Classify a service error code into the crate taxonomy. Split out from
/// [`map_store_error`] so the classification is unit-testable without
/// constructing SDK response machinery.
pub(crate) fn classify_service_code(
    op: &str,
    code: &str,
    key: &str,
    message: Option<&str>,
) -> FileVaultError {
    match code {
        "NoSuchKey" | "NoSuchVersion" => {
            FileVaultError::not_found(format!("object '{key}' ({op})"))
        }
        "NoSuchBucket" => FileVaultError::bucket_not_found(format!("bucket missing ({op})")),
        "AccessDenied" | "Forbidden" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" => {
            FileVaultError::storage(format!(
                "access denied for {op} (check credentials and permissions)"
            ))
        }
        "InvalidBucketName" => FileVaultError::storage("invalid bucket name".to_string()),
        _ => FileVaultError::storage(format!(
            "{op} service error ({code}): {}",
            message.unwrap_or("unknown error")
        )),
    }
}
