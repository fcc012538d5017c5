/*!
Object-store client registry.

Authenticated backend clients are expensive to construct, so they are
cached process-wide and keyed by credential/region identity. The cache is
guarded by a mutex around the whole check-then-insert so that concurrent
first requests for the same identity never construct duplicate clients.
Cached handles must be released through [`ClientRegistry::shutdown`];
relying on drop-time finalization alone is not a release path.
*/

#[cfg(feature = "s3")]
use std::collections::HashMap;
#[cfg(feature = "s3")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "s3")]
use once_cell::sync::Lazy;
#[cfg(feature = "s3")]
use tracing::{info, warn};

#[cfg(feature = "s3")]
use crate::storage::s3::S3ObjectStore;
#[cfg(feature = "s3")]
use crate::{FileVaultError, Result};

/// Identity a backend client authenticates as.
///
/// Equality is exact match of the credential/region tuple (or region alone
/// for ambient credentials); two identities that compare equal share one
/// cached client.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    /// Machine/environment credentials resolved by the SDK provider chain.
    Ambient { region: String },
    /// An explicit access-key/secret pair.
    Static {
        access_key: String,
        secret_access_key: String,
        region: String,
    },
}

impl ClientIdentity {
    pub fn ambient<S: Into<String>>(region: S) -> Self {
        Self::Ambient {
            region: region.into(),
        }
    }

    pub fn with_keys<A, K, R>(access_key: A, secret_access_key: K, region: R) -> Self
    where
        A: Into<String>,
        K: Into<String>,
        R: Into<String>,
    {
        Self::Static {
            access_key: access_key.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// The region this identity operates in.
    pub fn region(&self) -> &str {
        match self {
            Self::Ambient { region } => region,
            Self::Static { region, .. } => region,
        }
    }

    /// Short label for logs.
    pub fn auth_label(&self) -> &'static str {
        match self {
            Self::Ambient { .. } => "ambient",
            Self::Static { .. } => "static",
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ambient { region } => f.debug_struct("Ambient").field("region", region).finish(),
            Self::Static {
                access_key, region, ..
            } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_access_key", &"<redacted>")
                .field("region", region)
                .finish(),
        }
    }
}

/// Process-wide cache of ready object-store client handles.
#[cfg(feature = "s3")]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientIdentity, Arc<S3ObjectStore>>>,
}

#[cfg(feature = "s3")]
static GLOBAL_REGISTRY: Lazy<ClientRegistry> = Lazy::new(ClientRegistry::new);

#[cfg(feature = "s3")]
impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry instance.
    pub fn global() -> &'static ClientRegistry {
        &GLOBAL_REGISTRY
    }

    /// Return the cached client for `identity`, constructing and caching it
    /// on first request.
    ///
    /// Construction happens while holding the cache lock, which serializes
    /// concurrent first requests for the same identity and prevents
    /// duplicate clients from leaking. Construction failure (bad
    /// credentials, unreachable service) is critical and is not retried
    /// here.
    pub fn get_client(&self, identity: &ClientIdentity) -> Result<Arc<S3ObjectStore>> {
        let mut cache = self.lock_cache()?;

        if let Some(client) = cache.get(identity) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(S3ObjectStore::connect(identity)?);
        cache.insert(identity.clone(), Arc::clone(&client));
        info!(
            region = identity.region(),
            auth = identity.auth_label(),
            cached = cache.len(),
            "cached new object-store client"
        );
        Ok(client)
    }

    /// Close every cached client and clear the cache.
    pub fn shutdown(&self) {
        let drained: Vec<Arc<S3ObjectStore>> = match self.lock_cache() {
            Ok(mut cache) => cache.drain().map(|(_, client)| client).collect(),
            Err(e) => {
                warn!(error = %e, "client cache lock poisoned during shutdown");
                return;
            }
        };

        for client in &drained {
            client.close();
        }
        if !drained.is_empty() {
            info!(closed = drained.len(), "client registry shut down");
        }
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.lock_cache().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_cache(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ClientIdentity, Arc<S3ObjectStore>>>> {
        self.clients
            .lock()
            .map_err(|_| FileVaultError::storage("client cache lock poisoned"))
    }
}

#[cfg(feature = "s3")]
impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(identity: &ClientIdentity) -> u64 {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn identity_equality_is_by_credential_and_region() {
        let a = ClientIdentity::ambient("us-east-1");
        let b = ClientIdentity::ambient("us-east-1");
        let c = ClientIdentity::ambient("eu-west-1");

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);

        let k1 = ClientIdentity::with_keys("AKID", "secret", "us-east-1");
        let k2 = ClientIdentity::with_keys("AKID", "secret", "us-east-1");
        let k3 = ClientIdentity::with_keys("AKID", "other-secret", "us-east-1");

        assert_eq!(k1, k2);
        assert_eq!(hash_of(&k1), hash_of(&k2));
        assert_ne!(k1, k3);
        assert_ne!(a, k1);
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let identity = ClientIdentity::with_keys("AKID", "super-secret", "us-east-1");
        let rendered = format!("{identity:?}");

        assert!(rendered.contains("AKID"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("super-secret"));
    }

    #[cfg(feature = "s3")]
    #[test]
    fn empty_registry_shutdown_is_a_noop() {
        let registry = ClientRegistry::new();
        assert!(registry.is_empty());
        registry.shutdown();
        assert_eq!(registry.len(), 0);
    }
}
