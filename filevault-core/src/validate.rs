/*!
Validation framework boundary.

Business-rule validation runs before any persistence write. Richer rule
engines (database-backed uniqueness checks, per-tenant policies) plug in
behind [`RecordValidator`]; the crate ships a field-level implementation
covering the structural rules every record must satisfy.
*/

use crate::record::FileRecord;
use crate::{FileVaultError, Result};

/// Hook invoked by the persistence router before every write.
pub trait RecordValidator: Send + Sync {
    /// Raise on any rule violation; returning `Ok` clears the record for
    /// persistence.
    fn validate_for_persist(&self, record: &FileRecord) -> Result<()>;
}

/// Field-level validation of the record structure itself.
#[derive(Debug, Clone, Default)]
pub struct StandardValidator;

impl RecordValidator for StandardValidator {
    fn validate_for_persist(&self, record: &FileRecord) -> Result<()> {
        if record.name.trim().is_empty() {
            return Err(FileVaultError::validation("file name is required"));
        }
        if let Some(base) = &record.base_path {
            if !base.ends_with('/') {
                return Err(FileVaultError::configuration(format!(
                    "base path '{base}' must end with '/'"
                )));
            }
        }
        Ok(())
    }
}
