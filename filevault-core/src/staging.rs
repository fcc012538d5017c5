/*!
Content staging between memory and local temporary files.

The stager converts records between inline content and a staged local file
in both directions, and runs the create/update pipeline that resolves
compression and prepares a record's content for its backend. It owns the
temp-file lifetime policy: files staged for an imminent backend write are
handed to an external [`CleanupScheduler`] with a fixed retention window;
the core only requests scheduling, it never implements the timer.
*/

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::compression;
use crate::record::{CompressionMode, ContentLocation, FileRecord, InlineContent, PersistenceKind};
use crate::Result;

/// Retention window after which a staged temp file may be reaped if not
/// otherwise consumed.
pub const STAGING_RETENTION: Duration = Duration::from_secs(600);

/// Boundary to the external temp-file reaper.
///
/// Implementations typically hand the path to a background timer; the core
/// never deletes scheduled files itself and never relies on finalization.
#[cfg_attr(test, mockall::automock)]
pub trait CleanupScheduler: Send + Sync {
    /// Request deletion of `path` once `retain_for` has elapsed.
    fn schedule_removal(&self, path: &Path, retain_for: Duration);
}

/// Scheduler that never reaps anything, for embedders that manage temp
/// hygiene themselves.
#[derive(Debug, Clone, Default)]
pub struct NoCleanup;

impl CleanupScheduler for NoCleanup {
    fn schedule_removal(&self, path: &Path, retain_for: Duration) {
        debug!(
            path = %path.display(),
            retain_secs = retain_for.as_secs(),
            "cleanup scheduling disabled, file left on disk"
        );
    }
}

/// Reserve a path for a file named `name` inside a fresh unique temporary
/// directory. The file itself is not created; the directory is not tracked
/// for automatic deletion.
///
/// Staged files must keep their display name (archive entries and backend
/// uploads are named after it), so each one gets its own directory rather
/// than a mangled unique filename.
pub(crate) fn named_temp_path(name: &str) -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("filevault-")
        .tempdir()?
        .into_path();
    Ok(dir.join(name))
}

/// Converts record content between memory and staged local files and runs
/// the content-assignment pipeline.
#[derive(Clone)]
pub struct ContentStager {
    scheduler: Arc<dyn CleanupScheduler>,
}

impl Default for ContentStager {
    fn default() -> Self {
        Self::new(Arc::new(NoCleanup))
    }
}

impl ContentStager {
    pub fn new(scheduler: Arc<dyn CleanupScheduler>) -> Self {
        Self { scheduler }
    }

    /// Move inline content into a newly created staged file.
    ///
    /// The file is written under a fresh temp directory, keeps the record's
    /// display name, and is scheduled for removal after
    /// [`STAGING_RETENTION`] in case nothing consumes it. No-op when the
    /// record has no (non-empty) inline content or is already staged, so an
    /// already-converged record passes through unchanged.
    pub fn stage_to_file(&self, record: &mut FileRecord) -> Result<()> {
        let payload = match &record.content {
            ContentLocation::Inline(inline) if !inline.payload.is_empty() => &inline.payload,
            _ => return Ok(()),
        };

        let path = named_temp_path(&record.name)?;
        fs::write(&path, payload)?;
        self.scheduler.schedule_removal(&path, STAGING_RETENTION);

        debug!(name = %record.name, path = %path.display(), "staged inline content to file");
        record.content = ContentLocation::Staged(path);
        Ok(())
    }

    /// Move staged file content back into memory, the inverse of
    /// [`stage_to_file`](Self::stage_to_file).
    ///
    /// Reads the staged file fully, populates inline content and drops the
    /// staged path. No-op when no staged path exists.
    pub fn unstage_to_inline(&self, record: &mut FileRecord) -> Result<()> {
        let path = match &record.content {
            ContentLocation::Staged(path) => path.clone(),
            _ => return Ok(()),
        };

        let payload = fs::read(&path)?;
        debug!(name = %record.name, path = %path.display(), "read staged file back into memory");
        record.content = ContentLocation::Inline(InlineContent::new(payload));
        Ok(())
    }

    /// Assign raw content to a record, resolving compression and preparing
    /// the content location for the record's backend.
    ///
    /// For inline records the (possibly archived) bytes are placed in
    /// memory. For object-store records the stored representation is written
    /// to a staged file, a fresh external uuid is generated and the version
    /// token is cleared so the router will post the new content.
    pub fn assign_content(
        &self,
        record: &mut FileRecord,
        content: Vec<u8>,
        encoding: Option<&str>,
    ) -> Result<()> {
        record.modified_at = Utc::now();
        record.encoding = encoding.map(Into::into);

        let resolution = compression::resolve(&record.name, &content, record.compression)?;

        match record.kind {
            PersistenceKind::Inline => {
                let stored = match &resolution.archive {
                    Some(archive) => {
                        let bytes = fs::read(archive)?;
                        compression::discard_artifact(archive);
                        bytes
                    }
                    None => content,
                };
                record.size = stored.len() as u64;
                record.content = ContentLocation::Inline(InlineContent::new(stored));
            }
            PersistenceKind::ObjectStore => {
                let staged = match resolution.archive {
                    Some(archive) => archive,
                    None => {
                        let path = named_temp_path(&record.name)?;
                        fs::write(&path, &content)?;
                        path
                    }
                };
                record.size = fs::metadata(&staged)?.len();
                record.content = ContentLocation::Staged(staged);
                record.external_uuid = Some(Uuid::new_v4().to_string());
                // None is the router's signal that this content revision
                // still has to be posted to the backend.
                record.external_version = None;
            }
        }

        record.compression = resolution.mode;
        Ok(())
    }

    /// Build a record for fresh binary content, ready to persist (inline) or
    /// to post to the object store.
    ///
    /// Pass [`CompressionMode::Unresolved`] to let the trial-compression
    /// heuristic decide.
    pub fn new_record<S: Into<String>>(
        &self,
        kind: PersistenceKind,
        name: S,
        content: Vec<u8>,
        encoding: Option<&str>,
        compression: CompressionMode,
    ) -> Result<FileRecord> {
        let mut record = FileRecord::new(name, kind).with_compression(compression);
        self.assign_content(&mut record, content, encoding)?;
        Ok(record)
    }

    /// Build a record from UTF-8 text content.
    pub fn new_text_record<S: Into<String>>(
        &self,
        kind: PersistenceKind,
        name: S,
        text: &str,
        compression: CompressionMode,
    ) -> Result<FileRecord> {
        self.new_record(kind, name, text.as_bytes().to_vec(), Some("UTF-8"), compression)
    }
}

impl std::fmt::Debug for ContentStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CompressionMode;
    use mockall::predicate;

    fn inline_record(name: &str, payload: &[u8]) -> FileRecord {
        let mut record = FileRecord::new(name, PersistenceKind::Inline);
        record.content = ContentLocation::Inline(InlineContent::new(payload.to_vec()));
        record
    }

    #[test]
    fn stage_then_unstage_reproduces_original_bytes() {
        let stager = ContentStager::default();
        let original = b"round trip payload \x00\x01\x02";
        let mut record = inline_record("payload.bin", original);

        stager.stage_to_file(&mut record).unwrap();
        let staged = record.staged_path().expect("content staged").to_path_buf();
        assert!(staged.exists());
        assert!(staged.ends_with("payload.bin"));
        assert!(record.inline_payload().is_none());

        stager.unstage_to_inline(&mut record).unwrap();
        assert_eq!(record.inline_payload(), Some(original.as_ref()));
        assert!(record.staged_path().is_none());
    }

    #[test]
    fn stage_is_a_noop_without_inline_content() {
        let stager = ContentStager::default();
        let mut record = FileRecord::new("a.txt", PersistenceKind::ObjectStore);

        stager.stage_to_file(&mut record).unwrap();
        assert_eq!(record.content, ContentLocation::None);

        record.content = ContentLocation::Inline(InlineContent::new(Vec::new()));
        stager.stage_to_file(&mut record).unwrap();
        assert!(record.staged_path().is_none());
    }

    #[test]
    fn stage_is_a_noop_when_already_staged() {
        let stager = ContentStager::default();
        let mut record = inline_record("a.txt", b"data");
        stager.stage_to_file(&mut record).unwrap();
        let first = record.staged_path().unwrap().to_path_buf();

        stager.stage_to_file(&mut record).unwrap();
        assert_eq!(record.staged_path().unwrap(), first);
    }

    #[test]
    fn unstage_is_a_noop_without_a_staged_path() {
        let stager = ContentStager::default();
        let mut record = inline_record("a.txt", b"data");

        stager.unstage_to_inline(&mut record).unwrap();
        assert_eq!(record.inline_payload(), Some(b"data".as_ref()));
    }

    #[test]
    fn staging_requests_the_retention_window() {
        let mut scheduler = MockCleanupScheduler::new();
        scheduler
            .expect_schedule_removal()
            .with(predicate::always(), predicate::eq(STAGING_RETENTION))
            .times(1)
            .return_const(());

        let stager = ContentStager::new(Arc::new(scheduler));
        let mut record = inline_record("a.txt", b"data");
        stager.stage_to_file(&mut record).unwrap();
    }

    #[test]
    fn assign_content_keeps_small_inline_content_uncompressed() {
        let stager = ContentStager::default();
        let mut record = FileRecord::new("a.txt", PersistenceKind::Inline);

        stager.assign_content(&mut record, b"hello".to_vec(), Some("UTF-8")).unwrap();

        assert_eq!(record.compression, CompressionMode::None);
        assert_eq!(record.size, 5);
        assert_eq!(record.inline_payload(), Some(b"hello".as_ref()));
        assert_eq!(record.encoding.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn assign_content_stores_the_archive_for_compressible_inline_content() {
        let stager = ContentStager::default();
        let mut record = FileRecord::new("big.log", PersistenceKind::Inline);

        stager.assign_content(&mut record, vec![0u8; 10_000], None).unwrap();

        assert_eq!(record.compression, CompressionMode::Maximum);
        assert!(record.size < 10_000);
        let payload = record.inline_payload().unwrap();
        assert_eq!(payload.len() as u64, record.size);
        // Stored representation is a zip archive.
        assert_eq!(&payload[..2], b"PK");
    }

    #[test]
    fn assign_content_stages_object_store_content_and_marks_it_unposted() {
        let stager = ContentStager::default();
        let mut record = FileRecord::new("big.log", PersistenceKind::ObjectStore);
        record.external_version = Some("stale-version".to_string());

        stager.assign_content(&mut record, vec![0u8; 10_000], None).unwrap();

        assert_eq!(record.compression, CompressionMode::Maximum);
        assert!(record.external_uuid.is_some());
        assert!(record.external_version.is_none());

        let staged = record.staged_path().unwrap();
        assert!(staged.exists());
        assert!(staged.to_string_lossy().ends_with("big.zip"));
        assert_eq!(record.size, fs::metadata(staged).unwrap().len());
    }

    #[test]
    fn assign_content_stages_raw_bytes_when_compression_is_off() {
        let stager = ContentStager::default();
        let mut record =
            FileRecord::new("photo.jpg", PersistenceKind::ObjectStore).with_compression(CompressionMode::None);
        let content = b"\xff\xd8\xff\xe0 not really a jpeg".to_vec();

        stager.assign_content(&mut record, content.clone(), None).unwrap();

        let staged = record.staged_path().unwrap();
        assert!(staged.ends_with("photo.jpg"));
        assert_eq!(fs::read(staged).unwrap(), content);
        assert_eq!(record.size, content.len() as u64);
    }

    #[test]
    fn new_text_record_sets_the_encoding_label() {
        let stager = ContentStager::default();
        let record = stager
            .new_text_record(
                PersistenceKind::Inline,
                "notes.txt",
                "hello",
                CompressionMode::Unresolved,
            )
            .unwrap();

        assert_eq!(record.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(record.compression, CompressionMode::None);
        assert_eq!(record.inline_payload(), Some(b"hello".as_ref()));
    }
}
