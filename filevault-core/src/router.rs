/*!
Persistence routing and retrieval coordination.

[`PersistenceEngine`] is the orchestrator callers hand records to: it
validates, decides whether a backend write is needed, dispatches to the
backend implementation for the record's persistence kind, and reconciles
stale state. Retrieval reverses the flow, re-staging backend content as a
local file and unpacking compression on demand.
*/

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{ContentBackend, InlineBackend, RemoteBackend, WriteReceipt};
use crate::compression;
use crate::db::{ContentFilter, DatabaseAdapter};
use crate::keys;
use crate::record::{CompressionMode, FileRecord, PersistenceKind};
use crate::staging::{self, ContentStager};
use crate::storage::ObjectStoreAdapter;
use crate::validate::{RecordValidator, StandardValidator};
use crate::{FileVaultError, Result};

/// Routes records to the backend that owns their content.
///
/// Persist calls are assumed single-threaded per logical record; the engine
/// itself holds no record state and may be shared freely.
pub struct PersistenceEngine {
    db: Arc<dyn DatabaseAdapter>,
    store: Arc<dyn ObjectStoreAdapter>,
    bucket: String,
    validator: Arc<dyn RecordValidator>,
    inline: InlineBackend,
    remote: RemoteBackend,
}

impl PersistenceEngine {
    /// Create an engine with the standard field-level validator.
    pub fn new(
        db: Arc<dyn DatabaseAdapter>,
        store: Arc<dyn ObjectStoreAdapter>,
        bucket: impl Into<String>,
        stager: ContentStager,
    ) -> Self {
        Self::with_validator(db, store, bucket, stager, Arc::new(StandardValidator))
    }

    /// Create an engine with a custom validation framework.
    pub fn with_validator(
        db: Arc<dyn DatabaseAdapter>,
        store: Arc<dyn ObjectStoreAdapter>,
        bucket: impl Into<String>,
        stager: ContentStager,
        validator: Arc<dyn RecordValidator>,
    ) -> Self {
        let bucket = bucket.into();
        Self {
            inline: InlineBackend::new(Arc::clone(&db)),
            remote: RemoteBackend::new(
                Arc::clone(&db),
                Arc::clone(&store),
                bucket.clone(),
                stager,
            ),
            db,
            store,
            bucket,
            validator,
        }
    }

    fn backend(&self, kind: PersistenceKind) -> &dyn ContentBackend {
        match kind {
            PersistenceKind::Inline => &self.inline,
            PersistenceKind::ObjectStore => &self.remote,
        }
    }

    /// Persist a record through the backend its persistence kind selects.
    ///
    /// Inline records require non-empty inline content and get any stale
    /// content rows reconciled away. Object-store records with a version
    /// token are an idempotent no-op; without one the content is staged,
    /// posted, tagged, and only then is the metadata row written, so a row
    /// can never reference a version the backend did not commit.
    pub fn persist(&self, mut record: FileRecord) -> Result<FileRecord> {
        // External identifiers are meaningless for inline persistence.
        if record.kind == PersistenceKind::Inline {
            record.external_uuid = None;
            record.external_version = None;
        }

        self.validator.validate_for_persist(&record)?;

        let receipt = self.backend(record.kind).write(&mut record)?;
        debug!(name = %record.name, ?receipt, "persist complete");
        Ok(record)
    }

    /// Load the record's content back from its backend.
    ///
    /// For object-store records the versioned object is downloaded into a
    /// fresh local temp file (named to match the stored compression) whose
    /// cleanup the caller owns; for inline records the content row is
    /// loaded into memory.
    pub fn retrieve(&self, record: &mut FileRecord) -> Result<()> {
        self.backend(record.kind).read(record)
    }

    /// Load a record by id through the database boundary, then retrieve its
    /// content.
    pub fn retrieve_by_id(&self, id: i64) -> Result<FileRecord> {
        let mut record = self
            .db
            .find_record(id)?
            .ok_or_else(|| FileVaultError::not_found(format!("no file record with id {id}")))?;
        self.backend(record.kind).read(&mut record)?;
        Ok(record)
    }

    /// Produce a ready-to-use local file from a retrieved record.
    ///
    /// For maximum compression the single archive entry is unpacked into a
    /// fresh temp file; otherwise the staged path is returned unchanged.
    /// Only meaningful for object-store records with a staged file; anything
    /// else fails fatally.
    pub fn resolve_usable_file(&self, record: &FileRecord) -> Result<PathBuf> {
        if record.kind != PersistenceKind::ObjectStore {
            return Err(FileVaultError::storage(
                "only object-store records carry a retrievable staged file",
            ));
        }
        let staged = record
            .staged_path()
            .ok_or_else(|| FileVaultError::storage("record has no staged file to resolve"))?;

        match record.compression {
            CompressionMode::Maximum => {
                let dest = staging::named_temp_path(&record.name)?;
                compression::extract_entry(staged, &record.name, &dest)?;
                Ok(dest)
            }
            CompressionMode::None => Ok(staged.to_path_buf()),
            CompressionMode::Unresolved => Err(FileVaultError::storage(
                "record compression is unresolved; the record never went through persistence",
            )),
        }
    }

    /// Reclaim a record's content when the owning entity is deleted:
    /// backend-resident content (content row, or the specific object
    /// version), the record row, and any staged temp file are removed.
    pub fn discard(&self, record: &FileRecord) -> Result<()> {
        match record.kind {
            PersistenceKind::Inline => {
                if let Some(record_id) = record.id {
                    while let Some(row) = self.db.find_unique_content(&ContentFilter {
                        record_id,
                        exclude_content_id: None,
                    })? {
                        let Some(row_id) = row.id else { break };
                        self.db.delete_content(row_id)?;
                    }
                    self.db.delete_record(record_id)?;
                }
            }
            PersistenceKind::ObjectStore => {
                if let Some(version) = &record.external_version {
                    let key = keys::object_key(record)?;
                    self.store
                        .delete_object_versions(&self.bucket, &[(key, version.clone())])?;
                }
                if let Some(record_id) = record.id {
                    self.db.delete_record(record_id)?;
                }
            }
        }

        if let Some(path) = record.staged_path() {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }

        info!(name = %record.name, id = ?record.id, "discarded record content");
        Ok(())
    }
}

/// Build an engine from a validated store configuration, resolving the
/// object-store client through the process-wide registry.
#[cfg(feature = "s3")]
pub fn engine_from_config(
    config: &crate::config::StoreConfig,
    db: Arc<dyn DatabaseAdapter>,
    scheduler: Arc<dyn crate::staging::CleanupScheduler>,
) -> Result<PersistenceEngine> {
    config.validate()?;
    let store: Arc<dyn ObjectStoreAdapter> =
        crate::registry::ClientRegistry::global().get_client(&config.identity())?;
    Ok(PersistenceEngine::new(
        db,
        store,
        config.bucket.clone(),
        ContentStager::new(scheduler),
    ))
}
