/*!
Backend key construction.

Object-store keys are derived from record state alone so that retrieval
never needs a side-channel lookup: `base_path` (when set) + `external_uuid`
+ `.` + an extension chosen by the resolved compression mode.
*/

use crate::record::{CompressionMode, FileRecord};
use crate::{FileVaultError, Result};

/// Build the object-store key for a record.
///
/// The key is `{base_path?}{external_uuid}.{ext}` where `ext` is `zip` for
/// maximum compression and the original file's extension otherwise. Calling
/// this twice on an unmodified record yields an identical key; changing the
/// compression mode changes only the extension segment.
///
/// # Errors
/// * `Configuration` - `base_path` is set but does not end with `/`
/// * `Validation` - missing `external_uuid`, unresolved compression, or a
///   name without an extension when the original extension is needed
pub fn object_key(record: &FileRecord) -> Result<String> {
    let mut key = String::new();

    if let Some(base) = &record.base_path {
        if !base.ends_with('/') {
            return Err(FileVaultError::configuration(format!(
                "base path '{base}' must end with '/'"
            )));
        }
        key.push_str(base);
    }

    let uuid = record.external_uuid.as_deref().ok_or_else(|| {
        FileVaultError::validation("external uuid is required to build an object key")
    })?;
    key.push_str(uuid);
    key.push('.');

    match record.compression {
        CompressionMode::Maximum => key.push_str("zip"),
        CompressionMode::None => {
            let ext = file_extension(&record.name).ok_or_else(|| {
                FileVaultError::validation(format!(
                    "file name '{}' does not resolve to an extension",
                    record.name
                ))
            })?;
            key.push_str(ext);
        }
        CompressionMode::Unresolved => {
            return Err(FileVaultError::validation(
                "compression must be resolved before building an object key",
            ));
        }
    }

    Ok(key)
}

/// Extension of a display filename, without the dot. `None` for names with
/// no usable extension (no dot, leading dot only, or trailing dot).
pub fn file_extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// Filename with its extension removed. Names without a usable extension
/// are returned unchanged.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => stem,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PersistenceKind;

    fn object_store_record(name: &str) -> FileRecord {
        let mut record = FileRecord::new(name, PersistenceKind::ObjectStore);
        record.external_uuid = Some("3f2504e0-4f89-11d3-9a0c-0305e82c3301".to_string());
        record
    }

    #[test]
    fn key_is_deterministic() {
        let record = object_store_record("report.txt").with_compression(CompressionMode::None);

        let first = object_key(&record).unwrap();
        let second = object_key(&record).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "3f2504e0-4f89-11d3-9a0c-0305e82c3301.txt");
    }

    #[test]
    fn compression_changes_only_the_extension() {
        let plain = object_store_record("report.txt").with_compression(CompressionMode::None);
        let packed = object_store_record("report.txt").with_compression(CompressionMode::Maximum);

        let plain_key = object_key(&plain).unwrap();
        let packed_key = object_key(&packed).unwrap();

        assert_eq!(plain_key.rsplit_once('.').unwrap().0, packed_key.rsplit_once('.').unwrap().0);
        assert!(plain_key.ends_with(".txt"));
        assert!(packed_key.ends_with(".zip"));
    }

    #[test]
    fn base_path_is_prepended() {
        let record = object_store_record("big.log")
            .with_base_path("logs/")
            .with_compression(CompressionMode::Maximum);

        let key = object_key(&record).unwrap();
        assert_eq!(key, "logs/3f2504e0-4f89-11d3-9a0c-0305e82c3301.zip");
    }

    #[test]
    fn base_path_without_trailing_separator_is_a_configuration_error() {
        let record = object_store_record("big.log")
            .with_base_path("logs")
            .with_compression(CompressionMode::Maximum);

        let err = object_key(&record).unwrap_err();
        assert!(matches!(err, FileVaultError::Configuration(_)));
    }

    #[test]
    fn missing_uuid_is_a_validation_error() {
        let mut record = object_store_record("a.txt").with_compression(CompressionMode::None);
        record.external_uuid = None;

        let err = object_key(&record).unwrap_err();
        assert!(matches!(err, FileVaultError::Validation(_)));
    }

    #[test]
    fn unresolved_compression_is_rejected() {
        let record = object_store_record("a.txt");
        assert!(object_key(&record).is_err());
    }

    #[test]
    fn extensionless_name_is_rejected_for_uncompressed_keys() {
        let record = object_store_record("README").with_compression(CompressionMode::None);
        let err = object_key(&record).unwrap_err();
        assert!(matches!(err, FileVaultError::Validation(_)));
    }

    #[test]
    fn filename_helpers() {
        assert_eq!(file_extension("archive.tar.gz"), Some("gz"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension(".gitignore"), None);
        assert_eq!(file_extension("trailing."), None);
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem("README"), "README");
        assert_eq!(file_stem(".gitignore"), ".gitignore");
    }
}
