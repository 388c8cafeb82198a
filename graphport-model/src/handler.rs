use crate::{Entity, FieldMap};

/// Optional per-type hook run once an import has materialized its records.
///
/// Most types do NOT need one; the importer works purely from the
/// [`TypeSchema`](crate::TypeSchema). Implement it for:
/// - validation that needs the whole record (cross-field rules)
/// - derived fields that must be recomputed after links are in place
pub trait ImportHandler: Send + Sync {
    /// Validate a record after import.
    /// Return `Err(message)` to abort the import.
    fn validate(&self, entity: &Entity) -> Result<(), String> {
        let _ = entity;
        Ok(())
    }

    /// Derived field values to write back, if any.
    fn recompute(&self, entity: &Entity) -> Option<FieldMap> {
        let _ = entity;
        None
    }
}
