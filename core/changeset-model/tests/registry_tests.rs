use changeset_model::{
    AssociationMapping, ClassConfig, ClassMetadata, ConfigError, ConfigRegistry, ConfigResolver,
    EventConfig, FieldConfig, UpdateConfig,
};
use changeset_types::ClassId;
use pretty_assertions::assert_eq;
use std::io::Write;

fn user_metadata() -> ClassMetadata {
    ClassMetadata::new("User")
        .identifier(["id"])
        .fields(["name", "email"])
        .association("mentor", AssociationMapping::to_one("User").inversed_by("mentoring"))
        .association("mentoring", AssociationMapping::to_one("User").mapped_by("mentor"))
        .association("friends", AssociationMapping::to_many("User").inversed_by("friend_of"))
        .association("friend_of", AssociationMapping::to_many("User").mapped_by("friends"))
}

fn make_registry() -> ConfigRegistry {
    ConfigRegistry::builder()
        .class(user_metadata(), ClassConfig::default().with_update(UpdateConfig::default()))
        .field("User", "name", FieldConfig::tracked())
        .field("User", "email", FieldConfig::ignored())
        .build()
        .unwrap()
}

fn user() -> ClassId {
    ClassId::from("User")
}

// ── Class-level lookups ──────────────────────────────────────────

#[test]
fn class_lookup_returns_declaration() {
    let registry = make_registry();
    let config = registry.resolve_class_config(&user()).unwrap();
    assert!(config.update.is_some());
    assert!(config.create.is_none());
}

#[test]
fn class_lookup_for_unregistered_class_is_absent() {
    let registry = make_registry();
    assert!(registry.resolve_class_config(&ClassId::from("Post")).is_none());
}

#[test]
fn class_lookup_for_class_without_declarations_is_absent() {
    let registry = ConfigRegistry::builder()
        .class(ClassMetadata::new("Tag").fields(["label"]), ClassConfig::default())
        .build()
        .unwrap();
    assert!(registry.resolve_class_config(&ClassId::from("Tag")).is_none());
    assert!(registry.class_metadata(&ClassId::from("Tag")).is_some());
}

// ── Field-level lookups ──────────────────────────────────────────

#[test]
fn field_lookup_returns_declaration() {
    let registry = make_registry();
    let name = registry.resolve_field_config(&user(), "name").unwrap().unwrap();
    assert_eq!(name.change, Some(EventConfig::default()));

    let email = registry.resolve_field_config(&user(), "email").unwrap().unwrap();
    assert!(email.ignore_class_updates);
}

#[test]
fn field_lookup_for_undeclared_field_is_silent() {
    let registry = make_registry();
    assert!(registry.resolve_field_config(&user(), "friends").unwrap().is_none());
    assert!(registry.resolve_field_config(&user(), "id").unwrap().is_none());
}

#[test]
fn field_lookup_for_missing_field_is_configuration_error() {
    let registry = make_registry();
    let err = registry.resolve_field_config(&user(), "nickname").unwrap_err();
    assert!(matches!(
        err,
        ConfigError::UnknownField { ref class, ref field } if class.as_str() == "User" && field == "nickname"
    ));
}

#[test]
fn field_lookup_for_unmapped_class_is_error() {
    let registry = make_registry();
    let err = registry
        .resolve_field_config(&ClassId::from("Post"), "title")
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownClass(_)));
}

// ── Build-time validation ────────────────────────────────────────

#[test]
fn declaring_unknown_field_fails_build() {
    let err = ConfigRegistry::builder()
        .class(user_metadata(), ClassConfig::default())
        .field("User", "nickname", FieldConfig::tracked())
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownField { .. }));
}

#[test]
fn duplicate_class_fails_build() {
    let err = ConfigRegistry::builder()
        .class(ClassMetadata::new("Tag"), ClassConfig::default())
        .class(ClassMetadata::new("Tag"), ClassConfig::default())
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMapping(_)));
}

#[test]
fn inverse_pointing_at_unregistered_class_fails_build() {
    let err = ConfigRegistry::builder()
        .class(
            ClassMetadata::new("Post")
                .association("author", AssociationMapping::to_one("User").inversed_by("posts")),
            ClassConfig::default(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMapping(_)));
}

#[test]
fn mismatched_inverse_fails_build() {
    let err = ConfigRegistry::builder()
        .class(
            ClassMetadata::new("User")
                .association("friends", AssociationMapping::to_many("User").inversed_by("friend_of"))
                .association("friend_of", AssociationMapping::to_many("User").mapped_by("mentor")),
            ClassConfig::default(),
        )
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMapping(_)));
}

#[test]
fn unidirectional_association_needs_no_inverse() {
    let registry = ConfigRegistry::builder()
        .class(
            ClassMetadata::new("Post").association("tags", AssociationMapping::to_many("Tag")),
            ClassConfig::all(),
        )
        .build()
        .unwrap();
    assert_eq!(registry.len(), 1);
}

// ── JSON documents ───────────────────────────────────────────────

const REGISTRY_JSON: &str = r#"{
  "classes": [
    {
      "class": "User",
      "identifier": ["name"],
      "fields": ["email"],
      "associations": {
        "friends": {"target": "User", "cardinality": "to_many", "side": "owning", "inversed_by": "friend_of"},
        "friend_of": {"target": "User", "cardinality": "to_many", "side": "inverse", "mapped_by": "friends"}
      },
      "create": {},
      "delete": {"event_name": "user.deleted"},
      "update": {"monitor_collections": false},
      "field_config": {
        "email": {"change": {"payload_type": "EmailChanged"}}
      }
    }
  ]
}"#;

#[test]
fn registry_loads_from_json() {
    let registry = ConfigRegistry::from_json(REGISTRY_JSON).unwrap();
    let config = registry.resolve_class_config(&user()).unwrap();
    assert_eq!(config.create, Some(EventConfig::default()));
    assert_eq!(config.delete, Some(EventConfig::named("user.deleted")));
    assert!(!config.update.as_ref().unwrap().monitor_collections);

    let email = registry.resolve_field_config(&user(), "email").unwrap().unwrap();
    assert_eq!(email.change.as_ref().unwrap().payload_type.as_deref(), Some("EmailChanged"));

    let metadata = registry.class_metadata(&user()).unwrap();
    assert_eq!(metadata.identifier, vec!["name".to_string()]);
    assert!(metadata.association_for("friends").unwrap().is_owning());
    assert_eq!(
        metadata.association_for("friends").unwrap().inverse_field(),
        Some("friend_of")
    );
}

#[test]
fn registry_loads_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(REGISTRY_JSON.as_bytes()).unwrap();
    let registry = ConfigRegistry::from_path(file.path()).unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn registry_from_missing_path_is_io_error() {
    let err = ConfigRegistry::from_path(std::path::Path::new("/nonexistent/registry.json"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn registry_from_malformed_json_is_serialization_error() {
    let err = ConfigRegistry::from_json("{not json").unwrap_err();
    assert!(matches!(err, ConfigError::Serialization(_)));
}

#[test]
fn registry_document_roundtrip() {
    let registry = ConfigRegistry::from_json(REGISTRY_JSON).unwrap();
    let json = serde_json::to_string(&registry.to_document()).unwrap();
    let reloaded = ConfigRegistry::from_json(&json).unwrap();
    assert_eq!(
        reloaded.resolve_class_config(&user()),
        registry.resolve_class_config(&user())
    );
    assert_eq!(reloaded.class_metadata(&user()), registry.class_metadata(&user()));
}
