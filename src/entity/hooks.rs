//! Lifecycle hooks supplied when a repository is built.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use super::{Diff, Entity, EntityType};
use crate::core::{PersistError, Result, Value};

/// Optional callbacks around the entity lifecycle. Every method defaults to a no-op.
pub trait EntityHooks<T: EntityType> {
    /// After a row was loaded into the entity (hydrate and refresh).
    fn on_load(&self, _entity: &mut Entity<T>) {}

    /// Before the INSERT is generated; an error aborts the insert.
    fn before_insert(&self, _entity: &mut Entity<T>) -> Result<()> {
        Ok(())
    }

    /// Extra changes before a write. Must return `true` when it changed anything.
    fn before_save(&self, _entity: &mut Entity<T>) -> bool {
        false
    }

    /// After a successful INSERT or UPDATE, with what was written.
    fn after_change(&self, _entity: &Entity<T>, _changes: &Diff) {}

    /// After a soft delete was saved.
    fn on_delete(&self, _entity: &Entity<T>) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<T: EntityType> EntityHooks<T> for NoHooks {}

/// Change-history capability: receives every diff that reached storage.
pub trait HistoryLogger<T: EntityType> {
    fn log_changes(&self, entity: &Entity<T>, changes: &Diff) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub table: &'static str,
    pub id: Value,
    pub changes: serde_json::Value,
}

/// Keeps history entries in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingHistory {
    entries: Rc<RefCell<Vec<HistoryEntry>>>,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// One JSON document per entry.
    pub fn to_json_lines(&self) -> Result<String> {
        let mut out = String::new();
        for entry in self.entries.borrow().iter() {
            let line = serde_json::to_string(entry).map_err(|err| {
                PersistError::InvalidOperation(format!("serialize history entry: {}", err))
            })?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}

impl<T: EntityType> HistoryLogger<T> for RecordingHistory {
    fn log_changes(&self, entity: &Entity<T>, changes: &Diff) -> Result<()> {
        self.entries.borrow_mut().push(HistoryEntry {
            table: T::TABLE,
            id: entity.id().cloned().unwrap_or(Value::Null),
            changes: changes.to_json(),
        });
        Ok(())
    }
}
