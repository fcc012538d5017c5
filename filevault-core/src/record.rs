/*!
Logical file record model.

A [`FileRecord`] describes one file's metadata and persistence state: which
backend owns its content, how the content is compressed, and where the
canonical bytes currently live (in memory, in a staged local file, or only
behind the backend).
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Storage destination for a record's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistenceKind {
    /// Content is stored inline as a byte blob in the embedded database.
    Inline,
    /// Content is stored in the remote object store, referenced by a
    /// generated key and a backend-issued version token.
    ObjectStore,
}

/// Compression state of a record's stored content.
///
/// `Unresolved` means "not yet decided": the selector will measure a trial
/// archive and pick [`CompressionMode::None`] or [`CompressionMode::Maximum`]
/// before anything is persisted. Keeping the undecided state as its own
/// variant means it can never be confused with a resolved "no compression"
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionMode {
    #[default]
    Unresolved,
    None,
    Maximum,
}

impl CompressionMode {
    /// Whether the mode has been decided.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, CompressionMode::Unresolved)
    }

    /// Stable label used for backend object tags.
    pub fn label(&self) -> &'static str {
        match self {
            CompressionMode::Unresolved => "unresolved",
            CompressionMode::None => "none",
            CompressionMode::Maximum => "maximum-compression",
        }
    }
}

impl std::fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Content held directly in memory, exclusively owned by one record.
///
/// `id` is the identity of the backing content row when the payload was
/// loaded from (or already persisted to) the database; a fresh payload has
/// no id until persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineContent {
    pub id: Option<i64>,
    pub payload: Vec<u8>,
}

impl InlineContent {
    /// Wrap a fresh, not-yet-persisted payload.
    pub fn new(payload: Vec<u8>) -> Self {
        Self { id: None, payload }
    }
}

/// Where a record's canonical bytes currently live.
///
/// A record carries at most one authoritative location at a time; making
/// this a single tagged field (rather than two independently nullable ones)
/// makes the invariant structurally impossible to violate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentLocation {
    /// No local content; for object-store records this is the normal state
    /// once the content has been written to the backend.
    #[default]
    None,
    /// Content held in memory.
    Inline(InlineContent),
    /// Content staged in a local temporary file.
    Staged(PathBuf),
}

/// One file's metadata and persistence state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Record identifier; None until first persisted.
    pub id: Option<i64>,

    /// Display filename. Must resolve to a valid extension when the object
    /// key is derived from it.
    pub name: String,

    /// Which backend owns the content.
    pub kind: PersistenceKind,

    /// Compression state; always resolved before persistence.
    pub compression: CompressionMode,

    /// Text encoding label. Informational only; no processing keys off it.
    pub encoding: Option<String>,

    /// Byte length of the stored (post-compression) representation.
    pub size: u64,

    /// Optional key prefix for object-store keys. Must end with `/` when set.
    pub base_path: Option<String>,

    /// Object identity once staged for the object store; generated once.
    pub external_uuid: Option<String>,

    /// Backend-issued version token. None means the content has not yet
    /// been written to the backend.
    pub external_version: Option<String>,

    /// Where the canonical bytes currently live.
    pub content: ContentLocation,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// Create an empty record for the given backend. Content, compression
    /// and sizing are filled in by the staging pipeline.
    pub fn new<S: Into<String>>(name: S, kind: PersistenceKind) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.into(),
            kind,
            compression: CompressionMode::Unresolved,
            encoding: None,
            size: 0,
            base_path: None,
            external_uuid: None,
            external_version: None,
            content: ContentLocation::None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Set the object-store key prefix. Must end with a path separator.
    pub fn with_base_path<S: Into<String>>(mut self, base_path: S) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// Request a specific compression mode instead of the automatic
    /// trial-compression decision.
    pub fn with_compression(mut self, compression: CompressionMode) -> Self {
        self.compression = compression;
        self
    }

    /// The in-memory payload, if content is currently inline.
    pub fn inline_payload(&self) -> Option<&[u8]> {
        match &self.content {
            ContentLocation::Inline(inline) => Some(&inline.payload),
            _ => None,
        }
    }

    /// Identity of the backing content row, if known.
    pub fn content_row_id(&self) -> Option<i64> {
        match &self.content {
            ContentLocation::Inline(inline) => inline.id,
            _ => None,
        }
    }

    /// Path of the staged local file, if content is currently staged.
    pub fn staged_path(&self) -> Option<&Path> {
        match &self.content {
            ContentLocation::Staged(path) => Some(path),
            _ => None,
        }
    }

    /// Whether the record carries content a backend write could consume:
    /// either a staged file or a non-empty inline payload.
    pub fn has_content(&self) -> bool {
        match &self.content {
            ContentLocation::None => false,
            ContentLocation::Inline(inline) => !inline.payload.is_empty(),
            ContentLocation::Staged(_) => true,
        }
    }
}
