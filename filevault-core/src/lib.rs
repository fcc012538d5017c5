/*!
# filevault core

Durable file-content persistence behind two interchangeable backends: an
embedded database (content inline as a byte blob) or a remote object store
(content external, addressed by a generated key plus a backend-issued
version token).

The crate is the persistence routing and content-staging core:

- the [`PersistenceEngine`] decides whether a backend write is needed,
  dispatches to the backend owning the record, and reconciles stale content
  rows; retrieval reverses the flow
- the [`ContentStager`] moves content between memory and staged local files
  and runs the create/update pipeline
- the compression selector resolves NONE vs maximum compression with a
  trial archive whose artifact is reused for the actual write
- object keys are derived from record state alone, so retrieval needs no
  side-channel lookup
- authenticated object-store clients are pooled process-wide in the
  [`ClientRegistry`]

External collaborators — the relational data-access layer, the validation
framework, the temp-file reaper — plug in behind the [`DatabaseAdapter`],
[`RecordValidator`] and [`CleanupScheduler`] traits. All calls are
synchronous and blocking; retry policy, when wanted, belongs to the caller.

## Usage

```rust,no_run
use std::sync::Arc;
use filevault_core::{
    engine_from_config, CompressionMode, NoCleanup, PersistenceKind, StoreConfig,
};
# use filevault_core::{ContentStager, Result};
# fn database() -> Arc<dyn filevault_core::DatabaseAdapter> { unimplemented!() }

# fn main() -> Result<()> {
let config = StoreConfig::new("my-files-bucket", "us-east-1");
let engine = engine_from_config(&config, database(), Arc::new(NoCleanup))?;

let stager = ContentStager::default();
let record = stager.new_text_record(
    PersistenceKind::ObjectStore,
    "report.txt",
    "quarterly numbers",
    CompressionMode::Unresolved,
)?;

let mut stored = engine.persist(record)?;
engine.retrieve(&mut stored)?;
let local = engine.resolve_usable_file(&stored)?;
# let _ = local;
# Ok(())
# }
```
*/

pub mod backend;
pub mod compression;
pub mod config;
pub mod db;
pub mod error;
pub mod keys;
pub mod observability;
pub mod record;
pub mod registry;
pub mod router;
pub mod staging;
pub mod storage;
pub mod validate;

pub use backend::{ContentBackend, InlineBackend, RemoteBackend, WriteReceipt};
pub use config::{StaticCredentials, StoreConfig};
pub use db::{ContentFilter, DatabaseAdapter};
pub use error::{FileVaultError, Result};
pub use record::{
    CompressionMode, ContentLocation, FileRecord, InlineContent, PersistenceKind,
};
pub use registry::ClientIdentity;
#[cfg(feature = "s3")]
pub use registry::ClientRegistry;
#[cfg(feature = "s3")]
pub use router::engine_from_config;
pub use router::PersistenceEngine;
pub use staging::{CleanupScheduler, ContentStager, NoCleanup, STAGING_RETENTION};
#[cfg(feature = "s3")]
pub use storage::S3ObjectStore;
pub use storage::{ObjectStoreAdapter, ObjectSummary, ObjectVersion};
pub use validate::{RecordValidator, StandardValidator};
