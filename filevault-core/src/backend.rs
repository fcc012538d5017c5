/*!
Per-backend content persistence.

Each storage destination implements [`ContentBackend`]: a write that moves
the record's content into the backend and a read that brings it back. The
router dispatches on the record's persistence kind, so adding a third
backend means adding an implementation, not widening a switch.
*/

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::db::{ContentFilter, DatabaseAdapter};
use crate::keys;
use crate::record::{CompressionMode, ContentLocation, FileRecord};
use crate::staging::{self, ContentStager};
use crate::storage::ObjectStoreAdapter;
use crate::{FileVaultError, Result};

/// What a backend write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteReceipt {
    /// Inline write; the content row now lives under this record id.
    Row(i64),
    /// Object-store write; the backend issued this version token.
    Version(String),
    /// The content revision was already persisted; nothing was written.
    Unchanged,
}

/// Common write/read capability every backend satisfies.
pub trait ContentBackend: Send + Sync {
    /// Persist the record's content, mutating the record in place (ids,
    /// version token, stored form).
    fn write(&self, record: &mut FileRecord) -> Result<WriteReceipt>;

    /// Load the record's content back from the backend.
    fn read(&self, record: &mut FileRecord) -> Result<()>;
}

/// Database-backed inline content.
pub struct InlineBackend {
    db: Arc<dyn DatabaseAdapter>,
}

impl InlineBackend {
    pub fn new(db: Arc<dyn DatabaseAdapter>) -> Self {
        Self { db }
    }
}

impl ContentBackend for InlineBackend {
    fn write(&self, record: &mut FileRecord) -> Result<WriteReceipt> {
        if record.inline_payload().map_or(true, <[u8]>::is_empty) {
            return Err(FileVaultError::validation(
                "inline content is required for database-persisted files",
            ));
        }

        // A record that already has an id may have content rows left over
        // from partial prior writes; at most one row may exist per record,
        // so every row other than the live one is removed first.
        if let Some(record_id) = record.id {
            let filter = ContentFilter {
                record_id,
                exclude_content_id: record.content_row_id(),
            };
            while let Some(stale) = self.db.find_unique_content(&filter)? {
                let Some(stale_id) = stale.id else { break };
                debug!(record_id, stale_id, "removing stale content row");
                self.db.delete_content(stale_id)?;
            }
        }

        *record = self.db.persist_record(record, true)?;
        let id = record.id.ok_or_else(|| {
            FileVaultError::storage("database adapter returned a record without an id")
        })?;
        info!(record_id = id, size = record.size, "persisted inline content");
        Ok(WriteReceipt::Row(id))
    }

    fn read(&self, record: &mut FileRecord) -> Result<()> {
        let record_id = record.id.ok_or_else(|| {
            FileVaultError::validation("record id is required to read inline content")
        })?;
        let row = self
            .db
            .find_unique_content(&ContentFilter {
                record_id,
                exclude_content_id: None,
            })?
            .ok_or_else(|| {
                FileVaultError::not_found(format!("no content row for record {record_id}"))
            })?;
        record.content = ContentLocation::Inline(row);
        Ok(())
    }
}

/// Object-store-backed external content.
pub struct RemoteBackend {
    db: Arc<dyn DatabaseAdapter>,
    store: Arc<dyn ObjectStoreAdapter>,
    bucket: String,
    stager: ContentStager,
}

impl RemoteBackend {
    pub fn new(
        db: Arc<dyn DatabaseAdapter>,
        store: Arc<dyn ObjectStoreAdapter>,
        bucket: impl Into<String>,
        stager: ContentStager,
    ) -> Self {
        Self {
            db,
            store,
            bucket: bucket.into(),
            stager,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ContentBackend for RemoteBackend {
    fn write(&self, record: &mut FileRecord) -> Result<WriteReceipt> {
        // A version token means this content revision is already in the
        // backend; repeated calls are a no-op.
        if record.external_version.is_some() {
            debug!(name = %record.name, "content revision already posted, skipping backend write");
            return Ok(WriteReceipt::Unchanged);
        }

        if record.external_uuid.is_none() {
            return Err(FileVaultError::validation(
                "an external uuid is required for object-store persistence",
            ));
        }
        if !record.has_content() {
            return Err(FileVaultError::validation(
                "no content to persist to the object store",
            ));
        }

        // Backend writes always originate from a file, never a stream.
        self.stager.stage_to_file(record)?;
        let staged = record
            .staged_path()
            .ok_or_else(|| FileVaultError::storage("staging produced no file"))?
            .to_path_buf();
        if !staged.exists() {
            return Err(FileVaultError::storage(format!(
                "staged file {} is missing",
                staged.display()
            )));
        }

        let key = keys::object_key(record)?;
        let version = self.store.put_object(&self.bucket, &key, &staged)?;
        record.external_version = Some(version.clone());

        let mut tags = HashMap::new();
        tags.insert(
            "compression".to_string(),
            record.compression.label().to_string(),
        );
        tags.insert("filename".to_string(), record.name.clone());
        self.store.put_object_tags(&self.bucket, &key, &tags)?;

        // The metadata row is written only after the backend write
        // succeeded, so a row can never reference an uncommitted version.
        // The staged path is process-local state the row does not carry, so
        // it survives the round through the adapter.
        let staged_location = record.content.clone();
        *record = self.db.persist_record(record, true)?;
        record.content = staged_location;

        info!(
            bucket = %self.bucket,
            key = %key,
            version = %version,
            size = record.size,
            "posted content to the object store"
        );
        Ok(WriteReceipt::Version(version))
    }

    fn read(&self, record: &mut FileRecord) -> Result<()> {
        let version = record
            .external_version
            .clone()
            .ok_or_else(|| FileVaultError::storage("record has no version to retrieve"))?;
        let key = keys::object_key(record)?;

        // The downloaded file is named to match the stored compression; the
        // caller owns its cleanup, so no retention window is requested.
        let file_name = match record.compression {
            CompressionMode::Maximum => format!("{}.zip", keys::file_stem(&record.name)),
            _ => record.name.clone(),
        };
        let dest = staging::named_temp_path(&file_name)?;

        self.store
            .get_object(&self.bucket, &key, Some(&version), &dest)?;
        debug!(
            bucket = %self.bucket,
            key = %key,
            version = %version,
            dest = %dest.display(),
            "retrieved object-store content"
        );
        record.content = ContentLocation::Staged(dest);
        Ok(())
    }
}
