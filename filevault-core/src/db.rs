/*!
Database adapter boundary.

The relational data-access layer is an external collaborator; this module
defines the trait the persistence core consumes plus the query filter used
for stale content-row reconciliation. An in-memory implementation backs the
unit tests.
*/

use crate::record::{FileRecord, InlineContent};
use crate::Result;

/// Filter for locating content rows by their owning record, optionally
/// excluding one row (the live one) from the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    pub record_id: i64,
    pub exclude_content_id: Option<i64>,
}

/// Row-level access the persistence core needs from the database layer.
///
/// Implementations own transactional behavior and row mapping; the core
/// only sequences the calls. `persist_record` writes the record and, for
/// inline records, its content row, returning the record with identifiers
/// assigned.
pub trait DatabaseAdapter: Send + Sync {
    /// Write or replace the record (and any inline content it carries),
    /// returning the stored form with `id` (and content-row id) set.
    ///
    /// `full_refresh` asks the layer to treat the record as completely
    /// loaded and replace all columns rather than patching.
    fn persist_record(&self, record: &FileRecord, full_refresh: bool) -> Result<FileRecord>;

    /// Load a record by id.
    fn find_record(&self, id: i64) -> Result<Option<FileRecord>>;

    /// Delete a record row.
    fn delete_record(&self, id: i64) -> Result<()>;

    /// Find one content row matching the filter, or `None`. When several
    /// rows match (orphans from partial prior writes), any one of them is
    /// returned; callers reconcile by deleting and querying again.
    fn find_unique_content(&self, filter: &ContentFilter) -> Result<Option<InlineContent>>;

    /// Delete a content row.
    fn delete_content(&self, content_id: i64) -> Result<()>;
}

/// In-memory database for testing.
#[cfg(test)]
pub struct MemoryDatabase {
    inner: std::sync::Mutex<MemoryInner>,
}

#[cfg(test)]
#[derive(Default)]
struct MemoryInner {
    records: std::collections::HashMap<i64, FileRecord>,
    // content id -> (owning record id, row)
    contents: std::collections::BTreeMap<i64, (i64, InlineContent)>,
    next_record_id: i64,
    next_content_id: i64,
}

#[cfg(test)]
impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(MemoryInner {
                next_record_id: 1,
                next_content_id: 1,
                ..MemoryInner::default()
            }),
        }
    }

    /// Insert a content row directly, bypassing `persist_record`. Returns
    /// the new row id. Used to fabricate orphaned rows in tests.
    pub fn seed_content_row(&self, record_id: i64, payload: Vec<u8>) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_content_id;
        inner.next_content_id += 1;
        inner.contents.insert(
            id,
            (
                record_id,
                InlineContent {
                    id: Some(id),
                    payload,
                },
            ),
        );
        id
    }

    /// Content-row ids currently associated with a record.
    pub fn content_rows_for(&self, record_id: i64) -> Vec<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .contents
            .iter()
            .filter(|(_, (owner, _))| *owner == record_id)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }
}

#[cfg(test)]
impl DatabaseAdapter for MemoryDatabase {
    fn persist_record(&self, record: &FileRecord, _full_refresh: bool) -> Result<FileRecord> {
        use crate::record::ContentLocation;

        let mut inner = self.inner.lock().unwrap();
        let mut stored = record.clone();

        let record_id = match stored.id {
            Some(id) => id,
            None => {
                let id = inner.next_record_id;
                inner.next_record_id += 1;
                stored.id = Some(id);
                id
            }
        };

        match &mut stored.content {
            ContentLocation::Inline(inline) => {
                let content_id = match inline.id {
                    Some(id) => id,
                    None => {
                        let id = inner.next_content_id;
                        inner.next_content_id += 1;
                        inline.id = Some(id);
                        id
                    }
                };
                inner
                    .contents
                    .insert(content_id, (record_id, inline.clone()));
            }
            // A staged temp path is process-local state, not a column.
            ContentLocation::Staged(_) => stored.content = ContentLocation::None,
            ContentLocation::None => {}
        }

        inner.records.insert(record_id, stored.clone());
        Ok(stored)
    }

    fn find_record(&self, id: i64) -> Result<Option<FileRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.get(&id).cloned())
    }

    fn delete_record(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.records.remove(&id);
        Ok(())
    }

    fn find_unique_content(&self, filter: &ContentFilter) -> Result<Option<InlineContent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .contents
            .values()
            .find(|(owner, row)| {
                *owner == filter.record_id
                    && match filter.exclude_content_id {
                        Some(excluded) => row.id != Some(excluded),
                        None => true,
                    }
            })
            .map(|(_, row)| row.clone()))
    }

    fn delete_content(&self, content_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.contents.remove(&content_id);
        Ok(())
    }
}
