/*!
Compression selection and the single-entry archive codec.

The selector decides between no compression and maximum compression for a
content payload. An explicit request is honored without measurement; an
unresolved mode triggers a trial compression (single-entry zip archive at
the maximum deflate level) whose size is compared against the raw content.
The trial artifact is kept and reused for the actual write so the work is
never done twice.
*/

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::read::ZipArchive;
use zip::result::ZipError;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::keys::file_stem;
use crate::record::CompressionMode;
use crate::staging::named_temp_path;
use crate::{FileVaultError, Result};

/// Deflate level used for trial and final archives.
const MAX_DEFLATE_LEVEL: i32 = 9;

/// Outcome of compression selection.
///
/// `archive` is the single-entry archive artifact when one was produced
/// (always for `Maximum`, never for `None`); the caller consumes it as the
/// stored representation instead of re-archiving.
#[derive(Debug)]
pub struct Resolution {
    pub mode: CompressionMode,
    pub archive: Option<PathBuf>,
}

/// Resolve the compression mode for a content payload.
///
/// * `None` and `Maximum` requests are honored without measurement; only a
///   `Maximum` request produces the archive artifact (it is the payload that
///   will be stored).
/// * `Unresolved` builds the trial archive and chooses `Maximum` iff the
///   archive is strictly smaller than the raw content. Zero-length content
///   goes through the same comparison; an empty archive is never smaller
///   than zero bytes, so `None` falls out naturally.
///
/// Re-resolving with an already-resolved mode returns that mode unchanged.
pub fn resolve(entry_name: &str, content: &[u8], requested: CompressionMode) -> Result<Resolution> {
    match requested {
        CompressionMode::None => Ok(Resolution {
            mode: CompressionMode::None,
            archive: None,
        }),
        CompressionMode::Maximum => {
            let archive = write_single_entry_archive(entry_name, content)?;
            Ok(Resolution {
                mode: CompressionMode::Maximum,
                archive: Some(archive),
            })
        }
        CompressionMode::Unresolved => {
            let archive = write_single_entry_archive(entry_name, content)?;
            let archived_len = fs::metadata(&archive)?.len();

            if archived_len < content.len() as u64 {
                debug!(
                    entry = entry_name,
                    raw = content.len(),
                    archived = archived_len,
                    "trial compression won, keeping archive"
                );
                Ok(Resolution {
                    mode: CompressionMode::Maximum,
                    archive: Some(archive),
                })
            } else {
                discard_artifact(&archive);
                Ok(Resolution {
                    mode: CompressionMode::None,
                    archive: None,
                })
            }
        }
    }
}

/// Write `content` as the single entry `entry_name` of a fresh zip archive
/// at the maximum deflate level. Returns the archive path; the file lives in
/// its own temporary directory and is named after the entry's stem.
pub fn write_single_entry_archive(entry_name: &str, content: &[u8]) -> Result<PathBuf> {
    let archive_path = named_temp_path(&format!("{}.zip", file_stem(entry_name)))?;

    let file = File::create(&archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(MAX_DEFLATE_LEVEL));

    writer
        .start_file(entry_name, options)
        .map_err(|e| archive_error("start archive entry", entry_name, e))?;
    writer.write_all(content)?;
    writer
        .finish()
        .map_err(|e| archive_error("finish archive", entry_name, e))?;

    Ok(archive_path)
}

/// Extract the entry `entry_name` from `archive` into the file `dest`.
///
/// # Errors
/// * `Archive` - the entry is missing or the archive is corrupted
/// * `Io` - the archive or destination cannot be read/written
pub fn extract_entry(archive: &Path, entry_name: &str, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file).map_err(|e| archive_error("open archive", entry_name, e))?;

    let mut entry = match zip.by_name(entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(FileVaultError::archive(format!(
                "entry '{}' not found in archive {}",
                entry_name,
                archive.display()
            )));
        }
        Err(e) => return Err(archive_error("read archive entry", entry_name, e)),
    };

    let mut out = File::create(dest)?;
    io::copy(&mut entry, &mut out)?;
    Ok(())
}

/// Best-effort removal of a trial artifact that lost the size comparison,
/// together with its scratch directory.
pub(crate) fn discard_artifact(archive: &Path) {
    if let Err(e) = fs::remove_file(archive) {
        debug!(path = %archive.display(), error = %e, "failed to remove trial archive");
        return;
    }
    if let Some(parent) = archive.parent() {
        let _ = fs::remove_dir(parent);
    }
}

fn archive_error(op: &str, entry_name: &str, e: ZipError) -> FileVaultError {
    FileVaultError::archive(format!("failed to {op} for '{entry_name}': {e}"))
}
