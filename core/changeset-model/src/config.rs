use changeset_types::EventKind;
use serde::{Deserialize, Serialize};

/// Event name and payload type overrides for one tracked change kind.
///
/// Both default to the per-kind built-ins when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<String>,
}

impl EventConfig {
    /// Shorthand for an entry dispatched under a custom event name.
    pub fn named(event_name: impl Into<String>) -> Self {
        Self {
            event_name: Some(event_name.into()),
            payload_type: None,
        }
    }

    pub fn with_payload_type(mut self, payload_type: impl Into<String>) -> Self {
        self.payload_type = Some(payload_type.into());
        self
    }

    /// The configured event name, or the default for `kind`.
    pub fn event_name_for(&self, kind: EventKind) -> &str {
        self.event_name
            .as_deref()
            .unwrap_or_else(|| kind.default_event_name())
    }

    /// The configured payload type, or the built-in one for `kind`.
    pub fn payload_type_for(&self, kind: EventKind) -> &str {
        self.payload_type
            .as_deref()
            .unwrap_or_else(|| kind.default_payload_type())
    }
}

/// Class-level update tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(flatten)]
    pub event: EventConfig,

    /// Whether collection changes are folded into the update payload.
    #[serde(default = "default_true")]
    pub monitor_collections: bool,

    /// Deprecated. Owning-side changes are always monitored; the value is
    /// accepted for compatibility and otherwise ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_owning: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            event: EventConfig::default(),
            monitor_collections: true,
            monitor_owning: None,
        }
    }
}

impl UpdateConfig {
    pub fn named(event_name: impl Into<String>) -> Self {
        Self {
            event: EventConfig::named(event_name),
            ..Self::default()
        }
    }

    pub fn without_collections(mut self) -> Self {
        self.monitor_collections = false;
        self
    }

    /// Always true; see [`UpdateConfig::monitor_owning`].
    pub fn monitors_owning_side(&self) -> bool {
        true
    }
}

/// Class-level participation: which lifecycle changes of the class emit events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<EventConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<EventConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateConfig>,
}

impl ClassConfig {
    pub fn with_create(mut self, config: EventConfig) -> Self {
        self.create = Some(config);
        self
    }

    pub fn with_delete(mut self, config: EventConfig) -> Self {
        self.delete = Some(config);
        self
    }

    pub fn with_update(mut self, config: UpdateConfig) -> Self {
        self.update = Some(config);
        self
    }

    /// Create, delete and update all tracked under default names.
    pub fn all() -> Self {
        Self {
            create: Some(EventConfig::default()),
            delete: Some(EventConfig::default()),
            update: Some(UpdateConfig::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_none() && self.delete.is_none() && self.update.is_none()
    }
}

/// Field-level participation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Emit a property (or collection) change event for this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<EventConfig>,

    /// Leave this field out of the class-level update payload.
    #[serde(default)]
    pub ignore_class_updates: bool,
}

impl FieldConfig {
    /// Property-change tracking under the default event name.
    pub fn tracked() -> Self {
        Self {
            change: Some(EventConfig::default()),
            ignore_class_updates: false,
        }
    }

    pub fn with_change(config: EventConfig) -> Self {
        Self {
            change: Some(config),
            ignore_class_updates: false,
        }
    }

    /// No change event, and excluded from class-level updates.
    pub fn ignored() -> Self {
        Self {
            change: None,
            ignore_class_updates: true,
        }
    }

    pub fn ignoring_class_updates(mut self) -> Self {
        self.ignore_class_updates = true;
        self
    }
}
