//! Init-time configuration table.
//!
//! Declarations are registered once at startup, either through
//! [`RegistryBuilder`] calls or from a JSON [`RegistryDocument`], and
//! validated as a whole before any lookup is served.

use crate::{
    AssociationSide, ClassConfig, ClassMetadata, ConfigError, ConfigResolver, ConfigResult,
    FieldConfig,
};
use changeset_types::ClassId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Serialized form of a registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub classes: Vec<ClassDocument>,
}

/// One class: its mapping metadata, class-level declarations and per-field
/// declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDocument {
    #[serde(flatten)]
    pub metadata: ClassMetadata,
    #[serde(flatten)]
    pub config: ClassConfig,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub field_config: IndexMap<String, FieldConfig>,
}

#[derive(Debug, Clone)]
struct ClassEntry {
    metadata: ClassMetadata,
    config: ClassConfig,
    fields: HashMap<String, FieldConfig>,
}

/// The standard [`ConfigResolver`]: a validated table keyed by class.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    classes: HashMap<ClassId, ClassEntry>,
}

impl ConfigRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Loads and validates a registry from a JSON document.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let document: RegistryDocument = serde_json::from_str(json)?;
        Self::from_document(document)
    }

    /// Loads and validates a registry from a JSON file.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_document(document: RegistryDocument) -> ConfigResult<Self> {
        RegistryBuilder {
            classes: document.classes,
        }
        .build()
    }

    /// Serializes the table back into document form, classes sorted by name.
    pub fn to_document(&self) -> RegistryDocument {
        let mut classes: Vec<ClassDocument> = self
            .classes
            .values()
            .map(|entry| {
                let mut field_config: IndexMap<String, FieldConfig> = entry
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                field_config.sort_keys();
                ClassDocument {
                    metadata: entry.metadata.clone(),
                    config: entry.config.clone(),
                    field_config,
                }
            })
            .collect();
        classes.sort_by(|a, b| a.metadata.class.cmp(&b.metadata.class));
        RegistryDocument { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassId> {
        self.classes.keys()
    }
}

impl ConfigResolver for ConfigRegistry {
    fn resolve_class_config(&self, class: &ClassId) -> Option<&ClassConfig> {
        self.classes
            .get(class)
            .map(|entry| &entry.config)
            .filter(|config| !config.is_empty())
    }

    fn resolve_field_config(
        &self,
        class: &ClassId,
        field: &str,
    ) -> ConfigResult<Option<&FieldConfig>> {
        let entry = self
            .classes
            .get(class)
            .ok_or_else(|| ConfigError::UnknownClass(class.clone()))?;
        if !entry.metadata.has_field(field) {
            return Err(ConfigError::UnknownField {
                class: class.clone(),
                field: field.to_string(),
            });
        }
        Ok(entry.fields.get(field))
    }

    fn class_metadata(&self, class: &ClassId) -> Option<&ClassMetadata> {
        self.classes.get(class).map(|entry| &entry.metadata)
    }
}

/// Collects class declarations; [`RegistryBuilder::build`] validates them.
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    classes: Vec<ClassDocument>,
}

impl RegistryBuilder {
    /// Registers a class with its class-level declarations.
    pub fn class(mut self, metadata: ClassMetadata, config: ClassConfig) -> Self {
        self.classes.push(ClassDocument {
            metadata,
            config,
            field_config: IndexMap::new(),
        });
        self
    }

    /// Declares field-level participation on an already registered class.
    /// Declarations for unregistered classes are reported by `build`.
    pub fn field(
        mut self,
        class: impl Into<ClassId>,
        field: impl Into<String>,
        config: FieldConfig,
    ) -> Self {
        let class = class.into();
        let field = field.into();
        match self
            .classes
            .iter_mut()
            .rev()
            .find(|doc| doc.metadata.class == class)
        {
            Some(doc) => {
                doc.field_config.insert(field, config);
            }
            None => {
                let mut field_config = IndexMap::new();
                field_config.insert(field, config);
                self.classes.push(ClassDocument {
                    metadata: ClassMetadata::new(class),
                    config: ClassConfig::default(),
                    field_config,
                });
            }
        }
        self
    }

    /// Validates every declaration and freezes the table.
    pub fn build(self) -> ConfigResult<ConfigRegistry> {
        let mut classes: HashMap<ClassId, ClassEntry> = HashMap::new();

        for doc in self.classes {
            let class = doc.metadata.class.clone();
            if classes.contains_key(&class) {
                return Err(ConfigError::InvalidMapping(format!(
                    "class {class} registered twice"
                )));
            }

            for field in doc.metadata.identifier.iter().chain(doc.field_config.keys()) {
                if !doc.metadata.has_field(field) {
                    return Err(ConfigError::UnknownField {
                        class: class.clone(),
                        field: field.clone(),
                    });
                }
            }

            if let Some(update) = &doc.config.update {
                if update.monitor_owning == Some(false) {
                    warn!(
                        "Class {} sets deprecated monitor_owning = false; owning-side changes are always monitored",
                        class
                    );
                }
            }

            debug!(
                "Registered class {} ({} fields, {} associations)",
                class,
                doc.metadata.fields.len(),
                doc.metadata.associations.len()
            );
            classes.insert(
                class,
                ClassEntry {
                    metadata: doc.metadata,
                    config: doc.config,
                    fields: doc.field_config.into_iter().collect(),
                },
            );
        }

        validate_associations(&classes)?;
        Ok(ConfigRegistry { classes })
    }
}

/// Every bidirectional association must be declared consistently on both
/// sides: the owning side's `inversed_by` names an inverse field whose
/// `mapped_by` points back, and vice versa.
fn validate_associations(classes: &HashMap<ClassId, ClassEntry>) -> ConfigResult<()> {
    for entry in classes.values() {
        let class = &entry.metadata.class;
        for (field, mapping) in &entry.metadata.associations {
            let (mirror, expected_owning) = match &mapping.side {
                AssociationSide::Owning {
                    inversed_by: Some(inverse),
                } => (inverse, false),
                AssociationSide::Owning { inversed_by: None } => continue,
                AssociationSide::Inverse { mapped_by } => (mapped_by, true),
            };

            let target = classes.get(&mapping.target).ok_or_else(|| {
                ConfigError::InvalidMapping(format!(
                    "{class}.{field} targets unregistered class {}",
                    mapping.target
                ))
            })?;
            let other = target.metadata.association_for(mirror).ok_or_else(|| {
                ConfigError::InvalidMapping(format!(
                    "{class}.{field} mirrors {}.{mirror}, which is not an association",
                    mapping.target
                ))
            })?;

            let points_back = other.target == *class
                && match &other.side {
                    AssociationSide::Owning { inversed_by } => {
                        expected_owning && inversed_by.as_deref() == Some(field.as_str())
                    }
                    AssociationSide::Inverse { mapped_by } => {
                        !expected_owning && mapped_by == field
                    }
                };
            if !points_back {
                return Err(ConfigError::InvalidMapping(format!(
                    "{class}.{field} and {}.{mirror} do not mirror each other",
                    mapping.target
                )));
            }
        }
    }
    Ok(())
}
