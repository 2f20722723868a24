//! Identity cache: hydrated entities indexed by named column sets.
//!
//! Each repository owns the cache for its entity type, so two types can never share
//! entries. Entries hold strong references and are not invalidated when key columns
//! change afterwards; `refresh` is the only way to reconcile with storage.
//!
//! Every registration remembers the primary key it was stored for. A secondary key
//! only identifies an entity when that primary key matches too, so colliding or stale
//! secondary keys never merge two rows.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::core::{PersistError, Result, Value};
use crate::entity::{Entity, EntityType};

/// Shared handle to a hydrated entity.
pub type EntityRef<T> = Rc<RefCell<Entity<T>>>;

struct Registration<T: EntityType> {
    id: Value,
    entity: EntityRef<T>,
}

pub struct IdentityCache<T: EntityType> {
    /// `None` while disabled.
    criteria: Option<Vec<&'static [&'static str]>>,
    entries: HashMap<String, HashMap<String, Registration<T>>>,
}

impl<T: EntityType> IdentityCache<T> {
    pub fn new(criteria: &[&'static [&'static str]]) -> Self {
        Self {
            criteria: Some(criteria.to_vec()),
            entries: HashMap::new(),
        }
    }

    /// Enabled with the criteria `T` declares.
    pub fn for_type() -> Self {
        Self::new(T::CACHE_CRITERIA)
    }

    pub fn disabled() -> Self {
        Self {
            criteria: None,
            entries: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.criteria.is_some()
    }

    /// Stops caching for the rest of the run and drops every entry.
    pub fn disable(&mut self) {
        self.criteria = None;
        self.entries.clear();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Name of a criteria set: its columns joined with `.`.
    pub fn criteria_key(columns: &[&str]) -> String {
        columns.join(".")
    }

    /// Key of `entity` under `columns`: the current values joined with `.`.
    pub fn key_for(entity: &Entity<T>, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|col| entity.get(col).map(Value::key_fragment).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Registers `entity` under every criteria set, replacing whatever was registered
    /// under the same keys. No-op while disabled or for an entity without primary key.
    pub fn store(&mut self, entity: &EntityRef<T>) {
        let Some(criteria) = &self.criteria else {
            return;
        };
        let current = entity.borrow();
        let Some(id) = current.id() else {
            return;
        };
        for columns in criteria {
            let key = Self::key_for(&current, columns);
            self.entries
                .entry(Self::criteria_key(columns))
                .or_default()
                .insert(
                    key,
                    Registration {
                        id: id.clone(),
                        entity: Rc::clone(entity),
                    },
                );
        }
    }

    /// The registered entity for the same row as `entity`: a criteria key matches and
    /// it was registered under the same primary key.
    pub fn find(&self, entity: &Entity<T>) -> Option<EntityRef<T>> {
        let criteria = self.criteria.as_ref()?;
        let id = entity.id()?;
        criteria.iter().find_map(|columns| {
            self.entries
                .get(&Self::criteria_key(columns))?
                .get(&Self::key_for(entity, columns))
                .filter(|registration| registration.id == *id)
                .map(|registration| Rc::clone(&registration.entity))
        })
    }

    /// Drops every registration made for primary key `id`.
    pub fn evict(&mut self, id: &Value) {
        for by_key in self.entries.values_mut() {
            by_key.retain(|_, registration| registration.id != *id);
        }
        self.entries.retain(|_, by_key| !by_key.is_empty());
    }

    /// Looks up `key` under the criteria set named `criteria_key`.
    ///
    /// A miss is not necessarily an error: callers usually load from storage instead.
    pub fn get(&self, criteria_key: &str, key: &str) -> Result<EntityRef<T>> {
        if !self.is_enabled() {
            return Err(PersistError::cache_miss(criteria_key, key));
        }
        self.entries
            .get(criteria_key)
            .and_then(|by_key| by_key.get(key))
            .map(|registration| Rc::clone(&registration.entity))
            .ok_or_else(|| PersistError::cache_miss(criteria_key, key))
    }

    /// [`IdentityCache::get`] with the key built from typed values.
    pub fn get_by(&self, columns: &[&str], values: &[Value]) -> Result<EntityRef<T>> {
        let key = values
            .iter()
            .map(Value::key_fragment)
            .collect::<Vec<_>>()
            .join(".");
        self.get(&Self::criteria_key(columns), &key)
    }

    /// Number of (criteria, key) registrations.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: EntityType> fmt::Debug for IdentityCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<(&String, Vec<&String>)> = self
            .entries
            .iter()
            .map(|(criteria, by_key)| {
                let mut keys: Vec<&String> = by_key.keys().collect();
                keys.sort();
                (criteria, keys)
            })
            .collect();
        keys.sort();
        f.debug_struct("IdentityCache")
            .field("table", &T::TABLE)
            .field("enabled", &self.is_enabled())
            .field("entries", &keys)
            .finish()
    }
}
