/*!
Object-store adapters.

This module defines the object-store abstraction (port) the persistence
core consumes and its concrete implementations. The wire protocol belongs
entirely to the SDK behind the adapter; the core only sequences calls. All
operations block the calling thread for their duration — no timeout or
retry wrapping happens at this layer.
*/

#[cfg(feature = "s3")]
pub mod s3;
#[cfg(all(test, feature = "s3"))]
mod s3_tests;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::Result;

/// One object in a bucket listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One entry in a version listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub size: u64,
}

/// Storage abstraction for versioned object persistence.
///
/// Writes always originate from a local file and reads always land in one,
/// which keeps resume/retry semantics with the backend SDK rather than a
/// stream held by this core. Errors distinguish a missing object/version
/// (`NotFound`), a missing bucket (`BucketNotFound`) and generic backend
/// failure (`Storage`).
pub trait ObjectStoreAdapter: Send + Sync {
    /// Upload a local file to `key`, returning the backend-issued version
    /// token for this write.
    fn put_object(&self, bucket: &str, key: &str, file: &Path) -> Result<String>;

    /// Download an object (a specific version when given) into the local
    /// file `dest`, creating or truncating it.
    fn get_object(&self, bucket: &str, key: &str, version: Option<&str>, dest: &Path)
        -> Result<()>;

    /// Delete objects by key. On a versioned bucket this adds a delete
    /// marker; prior versions survive until deleted explicitly.
    fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()>;

    /// Permanently delete specific `(key, version)` pairs.
    fn delete_object_versions(&self, bucket: &str, versions: &[(String, String)]) -> Result<()>;

    /// Read the tag set of an object.
    fn object_tags(&self, bucket: &str, key: &str) -> Result<HashMap<String, String>>;

    /// Replace the tag set of an object.
    fn put_object_tags(&self, bucket: &str, key: &str, tags: &HashMap<String, String>)
        -> Result<()>;

    /// List the objects of a bucket.
    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>>;

    /// Lazily list object versions under a key prefix. Pages are fetched as
    /// the iterator advances; do not collect a large bucket into memory.
    fn list_object_versions<'a>(
        &'a self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectVersion>> + 'a>>;
}

// Re-export for convenience
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

/// In-memory versioned object store for testing.
#[cfg(test)]
pub struct MemoryObjectStore {
    bucket: String,
    inner: std::sync::Mutex<MemoryBucket>,
    put_count: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
#[derive(Default)]
struct MemoryBucket {
    // key -> versions in write order
    objects: std::collections::BTreeMap<String, StoredObject>,
    next_version: u64,
}

#[cfg(test)]
#[derive(Default)]
struct StoredObject {
    versions: Vec<StoredVersion>,
    delete_marker: bool,
    tags: std::collections::HashMap<String, String>,
}

#[cfg(test)]
struct StoredVersion {
    version_id: String,
    data: Vec<u8>,
}

#[cfg(test)]
impl MemoryObjectStore {
    pub fn with_bucket<S: Into<String>>(bucket: S) -> Self {
        Self {
            bucket: bucket.into(),
            inner: std::sync::Mutex::new(MemoryBucket {
                next_version: 1,
                ..MemoryBucket::default()
            }),
            put_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn put_count(&self) -> usize {
        self.put_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn version_count(&self, key: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.objects.get(key).map_or(0, |o| o.versions.len())
    }

    fn check_bucket(&self, bucket: &str) -> Result<()> {
        if bucket == self.bucket {
            Ok(())
        } else {
            Err(crate::FileVaultError::bucket_not_found(bucket.to_string()))
        }
    }
}

#[cfg(test)]
impl ObjectStoreAdapter for MemoryObjectStore {
    fn put_object(&self, bucket: &str, key: &str, file: &Path) -> Result<String> {
        self.check_bucket(bucket)?;
        let data = std::fs::read(file)?;

        let mut inner = self.inner.lock().unwrap();
        let version_id = format!("v{}", inner.next_version);
        inner.next_version += 1;
        let object = inner.objects.entry(key.to_string()).or_default();
        object.delete_marker = false;
        object.versions.push(StoredVersion {
            version_id: version_id.clone(),
            data,
        });

        self.put_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(version_id)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&str>,
        dest: &Path,
    ) -> Result<()> {
        self.check_bucket(bucket)?;
        let inner = self.inner.lock().unwrap();
        let object = inner
            .objects
            .get(key)
            .ok_or_else(|| crate::FileVaultError::not_found(key.to_string()))?;

        let stored = match version {
            Some(v) => object
                .versions
                .iter()
                .find(|s| s.version_id == v)
                .ok_or_else(|| crate::FileVaultError::not_found(format!("{key}@{v}")))?,
            None => {
                if object.delete_marker {
                    return Err(crate::FileVaultError::not_found(key.to_string()));
                }
                object
                    .versions
                    .last()
                    .ok_or_else(|| crate::FileVaultError::not_found(key.to_string()))?
            }
        };

        std::fs::write(dest, &stored.data)?;
        Ok(())
    }

    fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        self.check_bucket(bucket)?;
        let mut inner = self.inner.lock().unwrap();
        for key in keys {
            if let Some(object) = inner.objects.get_mut(key) {
                object.delete_marker = true;
            }
        }
        Ok(())
    }

    fn delete_object_versions(&self, bucket: &str, versions: &[(String, String)]) -> Result<()> {
        self.check_bucket(bucket)?;
        let mut inner = self.inner.lock().unwrap();
        for (key, version) in versions {
            let emptied = inner.objects.get_mut(key).map_or(false, |object| {
                object.versions.retain(|s| &s.version_id != version);
                object.versions.is_empty()
            });
            if emptied {
                inner.objects.remove(key);
            }
        }
        Ok(())
    }

    fn object_tags(&self, bucket: &str, key: &str) -> Result<HashMap<String, String>> {
        self.check_bucket(bucket)?;
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(key)
            .map(|o| o.tags.clone())
            .ok_or_else(|| crate::FileVaultError::not_found(key.to_string()))
    }

    fn put_object_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        self.check_bucket(bucket)?;
        let mut inner = self.inner.lock().unwrap();
        let object = inner
            .objects
            .get_mut(key)
            .ok_or_else(|| crate::FileVaultError::not_found(key.to_string()))?;
        object.tags = tags.clone();
        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>> {
        self.check_bucket(bucket)?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .objects
            .iter()
            .filter(|(_, o)| !o.delete_marker && !o.versions.is_empty())
            .map(|(key, o)| ObjectSummary {
                key: key.clone(),
                size: o.versions.last().map_or(0, |s| s.data.len() as u64),
                last_modified: None,
            })
            .collect())
    }

    fn list_object_versions<'a>(
        &'a self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectVersion>> + 'a>> {
        self.check_bucket(bucket)?;
        let inner = self.inner.lock().unwrap();
        let versions: Vec<ObjectVersion> = inner
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .flat_map(|(key, o)| {
                let last = o.versions.len().saturating_sub(1);
                o.versions
                    .iter()
                    .enumerate()
                    .map(move |(i, s)| ObjectVersion {
                        key: key.clone(),
                        version_id: s.version_id.clone(),
                        is_latest: i == last && !o.delete_marker,
                        size: s.data.len() as u64,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        Ok(Box::new(versions.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::named_temp_path;

    fn stage_bytes(name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = named_temp_path(name).unwrap();
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn put_get_roundtrip_by_version() {
        let store = MemoryObjectStore::with_bucket("test-bucket");
        let file = stage_bytes("a.txt", b"first");

        let v1 = store.put_object("test-bucket", "k/a.txt", &file).unwrap();
        std::fs::write(&file, b"second").unwrap();
        let v2 = store.put_object("test-bucket", "k/a.txt", &file).unwrap();
        assert_ne!(v1, v2);

        let dest = named_temp_path("a.txt").unwrap();
        store
            .get_object("test-bucket", "k/a.txt", Some(&v1), &dest)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");

        store.get_object("test-bucket", "k/a.txt", None, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
    }

    #[test]
    fn unknown_bucket_is_distinguished() {
        let store = MemoryObjectStore::with_bucket("test-bucket");
        let err = store.list_objects("other-bucket").unwrap_err();
        assert!(matches!(err, crate::FileVaultError::BucketNotFound(_)));
    }

    #[test]
    fn missing_key_and_version_are_not_found() {
        let store = MemoryObjectStore::with_bucket("test-bucket");
        let dest = named_temp_path("x").unwrap();

        let err = store
            .get_object("test-bucket", "missing", None, &dest)
            .unwrap_err();
        assert!(err.is_not_found());

        let file = stage_bytes("a.txt", b"data");
        store.put_object("test-bucket", "a.txt", &file).unwrap();
        let err = store
            .get_object("test-bucket", "a.txt", Some("v999"), &dest)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_marker_hides_latest_but_keeps_versions() {
        let store = MemoryObjectStore::with_bucket("test-bucket");
        let file = stage_bytes("a.txt", b"data");
        let v1 = store.put_object("test-bucket", "a.txt", &file).unwrap();

        store
            .delete_objects("test-bucket", &["a.txt".to_string()])
            .unwrap();

        let dest = named_temp_path("a.txt").unwrap();
        assert!(store
            .get_object("test-bucket", "a.txt", None, &dest)
            .is_err());
        assert!(store
            .get_object("test-bucket", "a.txt", Some(&v1), &dest)
            .is_ok());

        store
            .delete_object_versions("test-bucket", &[("a.txt".to_string(), v1)])
            .unwrap();
        assert_eq!(store.version_count("a.txt"), 0);
    }

    #[test]
    fn tags_roundtrip() {
        let store = MemoryObjectStore::with_bucket("test-bucket");
        let file = stage_bytes("a.txt", b"data");
        store.put_object("test-bucket", "a.txt", &file).unwrap();

        let mut tags = HashMap::new();
        tags.insert("compression".to_string(), "none".to_string());
        store.put_object_tags("test-bucket", "a.txt", &tags).unwrap();

        assert_eq!(store.object_tags("test-bucket", "a.txt").unwrap(), tags);
    }

    #[test]
    fn version_listing_is_prefix_filtered() {
        let store = MemoryObjectStore::with_bucket("test-bucket");
        let file = stage_bytes("a.txt", b"data");
        store.put_object("test-bucket", "logs/a.txt", &file).unwrap();
        store.put_object("test-bucket", "logs/a.txt", &file).unwrap();
        store.put_object("test-bucket", "docs/b.txt", &file).unwrap();

        let versions: Vec<_> = store
            .list_object_versions("test-bucket", "logs/")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(versions.len(), 2);
        assert!(versions.iter().all(|v| v.key == "logs/a.txt"));
        assert_eq!(versions.iter().filter(|v| v.is_latest).count(), 1);
    }
}
