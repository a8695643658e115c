use crate::{ClassConfig, ClassMetadata, ConfigResult, FieldConfig};
use changeset_types::ClassId;

/// Lookup seam between the listener and wherever declarations live.
///
/// [`ConfigRegistry`](crate::ConfigRegistry) is the standard implementation.
/// Implementations are pure lookups and hold no per-flush state.
pub trait ConfigResolver: Send + Sync {
    /// Class-level declaration, or `None` when the class is not tracked.
    fn resolve_class_config(&self, class: &ClassId) -> Option<&ClassConfig>;

    /// Field-level declaration, or `Ok(None)` when the field exists but is
    /// not declared.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownField`](crate::ConfigError::UnknownField) when
    /// the class has no such field, and
    /// [`ConfigError::UnknownClass`](crate::ConfigError::UnknownClass) when
    /// the class has no mapping metadata at all.
    fn resolve_field_config(&self, class: &ClassId, field: &str)
    -> ConfigResult<Option<&FieldConfig>>;

    /// Mapping metadata for the class, if it is mapped.
    fn class_metadata(&self, class: &ClassId) -> Option<&ClassMetadata>;
}
