use changeset_engine::{Dispatcher, DispatcherConfig, EventLog, SyncEventBus};
use changeset_listener::{ChangeListener, EntityState, ListenerError, UnitOfWork};
use changeset_model::{
    AssociationMapping, ClassConfig, ClassMetadata, ConfigError, ConfigRegistry, FieldConfig,
    UpdateConfig,
};
use changeset_types::{
    CollectionDelta, EntityRef, Event, FieldChange, PropertyChangeSet, UpdatedEvent, Value,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn user_metadata() -> ClassMetadata {
    ClassMetadata::new("User")
        .identifier(["name"])
        .fields(["email", "bio"])
        .association("mentor", AssociationMapping::to_one("User").inversed_by("mentoring"))
        .association("mentoring", AssociationMapping::to_one("User").mapped_by("mentor"))
        .association("friends", AssociationMapping::to_many("User").inversed_by("friend_of"))
        .association("friend_of", AssociationMapping::to_many("User").mapped_by("friends"))
}

fn registry_with(update: UpdateConfig) -> ConfigRegistry {
    ConfigRegistry::builder()
        .class(user_metadata(), ClassConfig::all().with_update(update))
        .field("User", "mentoring", FieldConfig::tracked())
        .field("User", "friends", FieldConfig::tracked())
        .field("User", "friend_of", FieldConfig::tracked())
        .field("User", "email", FieldConfig::ignored())
        .build()
        .unwrap()
}

fn setup_with(registry: ConfigRegistry, auto_dispatch: bool) -> (ChangeListener, Arc<EventLog>) {
    let log = Arc::new(EventLog::new());
    let dispatcher = Arc::new(Dispatcher::new(log.clone(), DispatcherConfig { auto_dispatch }));
    (ChangeListener::new(Arc::new(registry), dispatcher), log)
}

fn setup() -> (ChangeListener, Arc<EventLog>) {
    setup_with(registry_with(UpdateConfig::default()), true)
}

fn changes(field: &str, old: impl Into<Value>, new: impl Into<Value>) -> PropertyChangeSet {
    let mut set = PropertyChangeSet::new();
    set.insert(field.to_string(), FieldChange::new(old, new));
    set
}

fn updated_for(log: &EventLog, entity: &EntityRef) -> Vec<UpdatedEvent> {
    log.named("updated")
        .iter()
        .filter_map(Event::as_updated)
        .filter(|e| &e.entity == entity)
        .cloned()
        .collect()
}

/// Event names published for entities, ignoring `pre_auto_dispatch`.
fn entity_event_names(log: &EventLog) -> Vec<String> {
    log.names()
        .into_iter()
        .filter(|n| n != "pre_auto_dispatch")
        .collect()
}

// ── Scalar updates ───────────────────────────────────────────────

#[test]
fn scalar_update_produces_one_update_payload() {
    let (listener, log) = setup();
    let user = EntityRef::new("User");

    listener
        .on_pre_update(&user, &changes("name", "foo", "bar"))
        .unwrap();
    listener.on_post_flush().unwrap();

    let updates = updated_for(&log, &user);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].properties, changes("name", "foo", "bar"));
    assert!(updates[0].has_changed_field("name"));
    assert!(!updates[0].has_changed_field("email"));
    assert_eq!(updates[0].old_value("name").unwrap(), &Value::from("foo"));
    assert!(updates[0].old_value("missing_field").is_err());
}

#[test]
fn repeated_updates_in_one_flush_merge() {
    let (listener, log) = setup();
    let user = EntityRef::new("User");

    let work = UnitOfWork::new()
        .set(user.clone(), "name", "foo", "bar")
        .set(user.clone(), "bio", Value::Null, "hello")
        .set(user.clone(), "name", "bar", "baz");
    listener.flush(&work).unwrap();

    let updates = updated_for(&log, &user);
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].changed_properties().collect::<Vec<_>>(),
        vec!["name", "bio"]
    );
    assert_eq!(updates[0].new_value("name").unwrap(), &Value::from("baz"));
    assert_eq!(updates[0].old_value("name").unwrap(), &Value::from("bar"));
}

#[test]
fn ignored_field_is_left_out_of_class_update() {
    let (listener, log) = setup();
    let user = EntityRef::new("User");

    listener
        .on_pre_update(&user, &changes("email", "a@x", "b@x"))
        .unwrap();
    assert_eq!(listener.on_post_flush().unwrap(), 0);
    assert!(entity_event_names(&log).is_empty());
}

#[test]
fn unknown_field_is_a_configuration_error() {
    let (listener, _log) = setup();
    let user = EntityRef::new("User");

    let err = listener
        .on_pre_update(&user, &changes("nickname", "a", "b"))
        .unwrap_err();
    assert!(matches!(
        err,
        ListenerError::Config(ConfigError::UnknownField { ref field, .. }) if field == "nickname"
    ));
}

#[test]
fn unmapped_class_is_ignored() {
    let (listener, log) = setup();
    let post = EntityRef::new("Post");

    listener.on_create(&post, &EntityState::new()).unwrap();
    listener
        .on_pre_update(&post, &changes("title", "a", "b"))
        .unwrap();
    listener
        .on_collection_update(&post, "tags", &CollectionDelta::inserted("rust"))
        .unwrap();
    listener.on_delete(&post, &EntityState::new()).unwrap();

    assert!(listener.dispatcher().pending().is_empty());
    listener.on_post_flush().unwrap();
    assert!(entity_event_names(&log).is_empty());
}

// ── To-one inverse side ──────────────────────────────────────────

#[test]
fn setting_mentor_mirrors_onto_mentoring() {
    let (listener, log) = setup();
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    listener
        .on_pre_update(&a, &changes("mentor", Value::Null, &b))
        .unwrap();
    listener.on_post_flush().unwrap();

    let property_changes = log.named("property_changed");
    assert_eq!(property_changes.len(), 1);
    let mirrored = property_changes[0].as_property_changed().unwrap();
    assert_eq!(mirrored.entity, b);
    assert_eq!(mirrored.property, "mentoring");
    assert_eq!(mirrored.old_value, Value::Null);
    assert_eq!(mirrored.new_value, Value::from(&a));

    let a_updates = updated_for(&log, &a);
    assert_eq!(a_updates.len(), 1);
    assert_eq!(a_updates[0].properties, changes("mentor", Value::Null, &b));

    let b_updates = updated_for(&log, &b);
    assert_eq!(b_updates.len(), 1);
    assert_eq!(b_updates[0].properties, changes("mentoring", Value::Null, &a));
}

#[test]
fn changing_mentor_unlinks_previous_one() {
    let (listener, log) = setup();
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");
    let c = EntityRef::new("User");

    listener.on_pre_update(&a, &changes("mentor", &b, &c)).unwrap();
    listener.on_post_flush().unwrap();

    let mirrored: Vec<_> = log
        .named("property_changed")
        .into_iter()
        .filter_map(|e| e.as_property_changed().cloned())
        .map(|e| (e.entity, e.old_value, e.new_value))
        .collect();
    assert_eq!(
        mirrored,
        vec![
            (b.clone(), Value::from(&a), Value::Null),
            (c.clone(), Value::Null, Value::from(&a)),
        ]
    );
}

#[test]
fn deleting_entity_unlinks_its_mentor() {
    let (listener, log) = setup();
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    let state = EntityState::new().field("name", "toto").field("mentor", &b);
    listener.on_delete(&a, &state).unwrap();
    listener.on_post_flush().unwrap();

    assert_eq!(
        entity_event_names(&log),
        vec!["deleted", "updated", "property_changed"]
    );
    let mirrored = log.named("property_changed");
    let mirrored = mirrored[0].as_property_changed().unwrap();
    assert_eq!(mirrored.entity, b);
    assert_eq!(mirrored.old_value, Value::from(&a));
    assert_eq!(mirrored.new_value, Value::Null);
}

// ── Creation and deletion ────────────────────────────────────────

#[test]
fn deletion_carries_identifier_values() {
    let (listener, log) = setup();
    let user = EntityRef::new("User");

    listener
        .on_delete(&user, &EntityState::new().field("name", "toto"))
        .unwrap();
    listener.on_post_flush().unwrap();

    let deleted = log.named("deleted");
    let deleted = deleted[0].as_deleted().unwrap();
    assert_eq!(deleted.entity, user);
    assert_eq!(deleted.identifier().len(), 1);
    assert_eq!(deleted.identifier()["name"], Value::from("toto"));
}

#[test]
fn missing_identifier_value_is_null() {
    let (listener, log) = setup();
    let user = EntityRef::new("User");

    listener.on_delete(&user, &EntityState::new()).unwrap();
    listener.on_post_flush().unwrap();

    let deleted = log.named("deleted");
    assert_eq!(
        deleted[0].as_deleted().unwrap().identifier()["name"],
        Value::Null
    );
}

#[test]
fn creation_keeps_entity_state_as_raw_args() {
    let (listener, _log) = setup_with(registry_with(UpdateConfig::default()), false);
    let user = EntityRef::new("User");

    listener
        .on_create(&user, &EntityState::new().field("name", "toto"))
        .unwrap();

    listener.dispatcher().with_changes(|changes| {
        let creation = &changes.creations()[0];
        assert_eq!(creation.entity, user);
        assert_eq!(
            creation.raw_args["fields"]["name"]["value"],
            serde_json::json!("toto")
        );
    });
}

#[test]
fn creation_links_initial_friends() {
    let (listener, log) = setup();
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    listener
        .on_create(&a, &EntityState::new().collection("friends", [&b]))
        .unwrap();
    listener.on_post_flush().unwrap();

    assert_eq!(
        entity_event_names(&log),
        vec!["created", "updated", "collection_changed"]
    );
    let changed = log.named("collection_changed");
    let changed = changed[0].as_collection_changed().unwrap();
    assert_eq!(changed.entity, b);
    assert_eq!(changed.property, "friend_of");
    assert_eq!(changed.inserted_elements, vec![Value::from(&a)]);
}

// ── To-many inverse side ─────────────────────────────────────────

#[test]
fn self_referencing_friends_are_not_double_counted() {
    let (listener, log) = setup();
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    let work = UnitOfWork::new()
        .update_collection(a.clone(), "friends", CollectionDelta::inserted(&b))
        // Host reports the inverse side too; it is derived, never observed.
        .update_collection(b.clone(), "friend_of", CollectionDelta::inserted(&a));
    listener.flush(&work).unwrap();

    let changed: Vec<_> = log
        .named("collection_changed")
        .into_iter()
        .filter_map(|e| e.as_collection_changed().cloned())
        .map(|e| (e.entity, e.property, e.inserted_elements))
        .collect();
    assert_eq!(
        changed,
        vec![
            (a.clone(), "friends".to_string(), vec![Value::from(&b)]),
            (b.clone(), "friend_of".to_string(), vec![Value::from(&a)]),
        ]
    );

    let a_updates = updated_for(&log, &a);
    assert_eq!(a_updates.len(), 1);
    assert_eq!(
        a_updates[0].inserted_elements("friends").unwrap(),
        &[Value::from(&b)]
    );
    let b_updates = updated_for(&log, &b);
    assert_eq!(b_updates.len(), 1);
    assert_eq!(
        b_updates[0].inserted_elements("friend_of").unwrap(),
        &[Value::from(&a)]
    );
}

#[test]
fn same_edge_reported_twice_is_mirrored_once() {
    let (listener, log) = setup();
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    let work = UnitOfWork::new()
        .insert(a.clone(), EntityState::new().collection("friends", [&b]))
        .update_collection(a.clone(), "friends", CollectionDelta::inserted(&b));
    listener.flush(&work).unwrap();

    let mirrored: Vec<_> = log
        .named("collection_changed")
        .into_iter()
        .filter_map(|e| e.as_collection_changed().cloned())
        .filter(|e| e.entity == b)
        .collect();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].inserted_elements, vec![Value::from(&a)]);

    let b_updates = updated_for(&log, &b);
    assert_eq!(
        b_updates[0].inserted_elements("friend_of").unwrap(),
        &[Value::from(&a)]
    );
}

#[test]
fn relinking_friend_mirrors_every_change() {
    let (listener, log) = setup();
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    let work = UnitOfWork::new()
        .update_collection(a.clone(), "friends", CollectionDelta::inserted(&b))
        .update_collection(a.clone(), "friends", CollectionDelta::deleted(&b))
        .update_collection(a.clone(), "friends", CollectionDelta::inserted(&b));
    listener.flush(&work).unwrap();

    let changed: Vec<_> = log
        .named("collection_changed")
        .into_iter()
        .filter_map(|e| e.as_collection_changed().cloned())
        .map(|e| (e.entity, e.deleted_elements.len(), e.inserted_elements.len()))
        .collect();
    assert_eq!(changed, vec![(a.clone(), 1, 2), (b.clone(), 1, 2)]);

    let b_updates = updated_for(&log, &b);
    assert_eq!(b_updates.len(), 1);
    assert_eq!(
        b_updates[0].deleted_elements("friend_of").unwrap(),
        &[Value::from(&a)]
    );
    assert_eq!(
        b_updates[0].inserted_elements("friend_of").unwrap(),
        &[Value::from(&a), Value::from(&a)]
    );
}

#[test]
fn state_edges_are_forgotten_after_the_flush() {
    let (listener, log) = setup_with(registry_with(UpdateConfig::default()), false);
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    listener
        .flush(&UnitOfWork::new().insert(a.clone(), EntityState::new().collection("friends", [&b])))
        .unwrap();
    // A later flush reporting the same edge is a new change.
    listener
        .flush(&UnitOfWork::new().update_collection(
            a.clone(),
            "friends",
            CollectionDelta::inserted(&b),
        ))
        .unwrap();
    listener.dispatcher().dispatch_all().unwrap();

    let b_updates = updated_for(&log, &b);
    assert_eq!(
        b_updates[0].inserted_elements("friend_of").unwrap(),
        &[Value::from(&a), Value::from(&a)]
    );
}

#[test]
fn removing_friend_mirrors_deletion() {
    let (listener, log) = setup();
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    listener
        .on_collection_update(&a, "friends", &CollectionDelta::deleted(&b))
        .unwrap();
    listener.on_post_flush().unwrap();

    let mirrored: Vec<_> = log
        .named("collection_changed")
        .into_iter()
        .filter_map(|e| e.as_collection_changed().cloned())
        .filter(|e| e.entity == b)
        .collect();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].deleted_elements, vec![Value::from(&a)]);
    assert!(mirrored[0].inserted_elements.is_empty());
}

#[test]
fn collections_not_folded_when_not_monitored() {
    let (listener, log) = setup_with(
        registry_with(UpdateConfig::default().without_collections()),
        true,
    );
    let a = EntityRef::new("User");
    let b = EntityRef::new("User");

    listener
        .on_collection_update(&a, "friends", &CollectionDelta::inserted(&b))
        .unwrap();
    listener.on_post_flush().unwrap();

    assert!(log.named("updated").is_empty());
    assert_eq!(log.named("collection_changed").len(), 2);
}

// ── Flush lifecycle ──────────────────────────────────────────────

#[test]
fn flush_replays_in_host_order() {
    let (listener, log) = setup();
    let created = EntityRef::new("User");
    let updated = EntityRef::new("User");
    let deleted = EntityRef::new("User");

    let work = UnitOfWork::new()
        .delete(deleted.clone(), EntityState::new().field("name", "gone"))
        .set(updated.clone(), "bio", "a", "b")
        .insert(created.clone(), EntityState::new());
    let delivered = listener.flush(&work).unwrap();

    assert_eq!(delivered, 3);
    assert_eq!(
        log.names(),
        vec!["pre_auto_dispatch", "created", "deleted", "updated"]
    );
}

#[test]
fn flush_from_pre_auto_dispatch_subscriber_does_not_republish() {
    let bus = Arc::new(SyncEventBus::new());
    let dispatcher = Arc::new(Dispatcher::new(bus.clone(), DispatcherConfig::default()));
    let listener = ChangeListener::new(
        Arc::new(registry_with(UpdateConfig::default())),
        dispatcher.clone(),
    );

    let hooks = Arc::new(AtomicUsize::new(0));
    let hooks_clone = hooks.clone();
    dispatcher.set_pre_dispatch_hook(move |_| {
        hooks_clone.fetch_add(1, Ordering::SeqCst);
    });

    let announced = Arc::new(AtomicUsize::new(0));
    let announced_clone = announced.clone();
    let created = Arc::new(AtomicUsize::new(0));
    let created_clone = created.clone();
    let nested = listener.clone();
    bus.subscribe("pre_auto_dispatch", move |_| {
        if announced_clone.fetch_add(1, Ordering::SeqCst) == 0 {
            nested.flush(&UnitOfWork::new().insert(EntityRef::new("User"), EntityState::new()))?;
        }
        Ok(())
    });
    bus.subscribe("created", move |_| {
        created_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    listener
        .flush(&UnitOfWork::new().insert(EntityRef::new("User"), EntityState::new()))
        .unwrap();

    assert_eq!(hooks.load(Ordering::SeqCst), 1);
    assert_eq!(announced.load(Ordering::SeqCst), 1);
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn manual_dispatch_keeps_records_until_asked() {
    let (listener, log) = setup_with(registry_with(UpdateConfig::default()), false);
    let user = EntityRef::new("User");

    let delivered = listener
        .flush(&UnitOfWork::new().set(user.clone(), "bio", "a", "b"))
        .unwrap();
    assert_eq!(delivered, 0);
    assert!(log.is_empty());
    assert_eq!(listener.dispatcher().pending().updates, 1);

    assert_eq!(listener.dispatcher().dispatch_all().unwrap(), 1);
    assert_eq!(log.names(), vec!["updated"]);
}

#[test]
fn rollback_discards_the_cycle() {
    let (listener, log) = setup_with(registry_with(UpdateConfig::default()), false);
    let user = EntityRef::new("User");

    listener
        .on_pre_update(&user, &changes("bio", "a", "b"))
        .unwrap();
    let dropped = listener.rollback();
    assert_eq!(dropped.updates, 1);

    listener.dispatcher().set_auto_dispatch(true);
    assert_eq!(listener.on_post_flush().unwrap(), 0);
    assert!(entity_event_names(&log).is_empty());
}

#[test]
fn record_without_flush_leaves_records_pending() {
    let (listener, log) = setup();
    let user = EntityRef::new("User");

    listener
        .record(&UnitOfWork::new().insert(user.clone(), EntityState::new()))
        .unwrap();
    assert!(log.is_empty());
    assert_eq!(listener.dispatcher().pending().creations, 1);
}
