//! Unit-of-work script format.
//!
//! ```json
//! {
//!   "entities": { "alice": "User", "bob": "User" },
//!   "flushes": [
//!     {
//!       "insertions": [{ "entity": "alice", "fields": { "name": "alice" } }],
//!       "updates": [{ "entity": "alice", "changes": { "mentor": { "old": null, "new": { "$ref": "bob" } } } }],
//!       "collection_updates": [{ "owner": "alice", "field": "friends", "inserted": [{ "$ref": "bob" }] }],
//!       "deletions": [{ "entity": "bob", "fields": { "name": "bob" } }]
//!     }
//!   ]
//! }
//! ```
//!
//! Entities are named by alias. A value written as `{"$ref": "alias"}` is a
//! reference to that entity; any other JSON value is a plain field value.

use anyhow::{Context, Result, anyhow};
use changeset_listener::{EntityState, UnitOfWork};
use changeset_types::{CollectionDelta, EntityRef, FieldChange, PropertyChangeSet, Value};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;

type Json = serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    /// Alias -> class name.
    #[serde(default)]
    pub entities: IndexMap<String, String>,
    #[serde(default)]
    pub flushes: Vec<FlushScript>,
}

/// One unit-of-work. With `rollback` set, the changes are recorded and then
/// discarded instead of flushed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlushScript {
    pub insertions: Vec<StateEntry>,
    pub updates: Vec<UpdateEntry>,
    pub collection_updates: Vec<CollectionEntry>,
    pub deletions: Vec<StateEntry>,
    pub rollback: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateEntry {
    pub entity: String,
    #[serde(default)]
    pub fields: IndexMap<String, Json>,
    #[serde(default)]
    pub collections: IndexMap<String, Vec<Json>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateEntry {
    pub entity: String,
    pub changes: IndexMap<String, ChangeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEntry {
    #[serde(default)]
    pub old: Json,
    #[serde(default)]
    pub new: Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionEntry {
    pub owner: String,
    pub field: String,
    #[serde(default)]
    pub deleted: Vec<Json>,
    #[serde(default)]
    pub inserted: Vec<Json>,
}

/// Entity handles allocated for the script's aliases.
#[derive(Debug, Default)]
pub struct Entities {
    refs: HashMap<String, EntityRef>,
}

impl Entities {
    pub fn allocate(aliases: &IndexMap<String, String>) -> Self {
        let refs = aliases
            .iter()
            .map(|(alias, class)| (alias.clone(), EntityRef::new(class.as_str())))
            .collect();
        Self { refs }
    }

    pub fn get(&self, alias: &str) -> Result<&EntityRef> {
        self.refs
            .get(alias)
            .ok_or_else(|| anyhow!("unknown entity alias: {alias}"))
    }

    pub fn value(&self, json: &Json) -> Result<Value> {
        if let Some(alias) = reference(json) {
            return Ok(Value::from(self.get(alias)?));
        }
        Ok(Value::from_json(json.clone()))
    }

    fn values(&self, json: &[Json]) -> Result<Vec<Value>> {
        json.iter().map(|v| self.value(v)).collect()
    }

    fn state(&self, entry: &StateEntry) -> Result<EntityState> {
        let mut state = EntityState::new();
        for (field, json) in &entry.fields {
            state = state.field(field.as_str(), self.value(json)?);
        }
        for (field, elements) in &entry.collections {
            state = state.collection(field.as_str(), self.values(elements)?);
        }
        Ok(state)
    }

    /// Resolves every alias of `flush` into a [`UnitOfWork`].
    pub fn unit_of_work(&self, flush: &FlushScript) -> Result<UnitOfWork> {
        let mut work = UnitOfWork::new();

        for entry in &flush.insertions {
            let entity = self.get(&entry.entity)?.clone();
            work = work.insert(entity, self.state(entry)?);
        }
        for entry in &flush.updates {
            let entity = self.get(&entry.entity)?.clone();
            let mut changes = PropertyChangeSet::new();
            for (field, change) in &entry.changes {
                let change = FieldChange::new(self.value(&change.old)?, self.value(&change.new)?);
                changes.insert(field.clone(), change);
            }
            work = work.update(entity, changes);
        }
        for entry in &flush.collection_updates {
            let owner = self
                .get(&entry.owner)
                .with_context(|| format!("collection update of {}", entry.field))?
                .clone();
            let delta =
                CollectionDelta::new(self.values(&entry.deleted)?, self.values(&entry.inserted)?);
            work = work.update_collection(owner, entry.field.as_str(), delta);
        }
        for entry in &flush.deletions {
            let entity = self.get(&entry.entity)?.clone();
            work = work.delete(entity, self.state(entry)?);
        }
        Ok(work)
    }
}

fn reference(json: &Json) -> Option<&str> {
    match json {
        Json::Object(map) if map.len() == 1 => map.get("$ref").and_then(Json::as_str),
        _ => None,
    }
}
