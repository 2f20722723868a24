//! Entity records and their per-type declarations.

pub mod diff;
pub mod hooks;

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::core::{FromValue, PersistError, Result, Row, Value};

pub use diff::{Diff, FieldChange};
pub use hooks::{EntityHooks, HistoryEntry, HistoryLogger, NoHooks, RecordingHistory};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";
/// Legacy integer soft-delete flag; prefer `deleted_at`.
pub const DELETED: &str = "deleted";

/// Static description of one table-backed entity type.
///
/// `COLUMNS` is the complete persistence surface: only these columns are hydrated,
/// diffed, inserted and updated. Use [`entity_type!`](crate::entity_type) to declare one.
pub trait EntityType: 'static {
    const TABLE: &'static str;

    /// Auto-increment primary key column.
    const ID_COLUMN: &'static str = "id";

    const COLUMNS: &'static [&'static str];

    /// Column sets the identity cache indexes hydrated entities by.
    const CACHE_CRITERIA: &'static [&'static [&'static str]] = &[];

    fn tracks(column: &str) -> bool {
        Self::COLUMNS.contains(&column)
    }
}

/// Tri-state tracked field: never assigned, or assigned a value (which may be `Null`).
///
/// The change tracker skips `Unset` fields entirely, so "not loaded" and "NULL" stay distinct.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Field {
    #[default]
    Unset,
    Set(Value),
}

impl Field {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Unset => None,
            Self::Set(value) => Some(value),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No primary key yet.
    Transient,
    Persisted,
    /// Persisted with the deletion marker set.
    SoftDeleted,
    /// Row physically removed; the entity lost its primary key.
    Purged,
}

/// One row of `T::TABLE` held in memory, with the baseline it was last persisted as.
pub struct Entity<T: EntityType> {
    id: Option<Value>,
    fields: Vec<Field>,
    untracked: BTreeMap<String, Value>,
    baseline: Row,
    last_diff: Diff,
    just_inserted: bool,
    purged: bool,
    date_triggers: bool,
    id_to_assign: Option<Value>,
    legacy_deleted: i64,
    marker: PhantomData<fn() -> T>,
}

impl<T: EntityType> Entity<T> {
    pub fn new() -> Self {
        let fields = T::COLUMNS
            .iter()
            .map(|&col| {
                if col == DELETED {
                    Field::Set(Value::Integer(0))
                } else {
                    Field::Unset
                }
            })
            .collect();

        Self {
            id: None,
            fields,
            untracked: BTreeMap::new(),
            baseline: Row::new(),
            last_diff: Diff::default(),
            just_inserted: false,
            purged: false,
            date_triggers: true,
            id_to_assign: None,
            legacy_deleted: 0,
            marker: PhantomData,
        }
    }

    /// An un-inserted copy of `existing`: every tracked field except the primary key.
    pub fn new_from_existing(existing: &Self) -> Self {
        let mut copy = Self::new();
        for (idx, &col) in T::COLUMNS.iter().enumerate() {
            if col != T::ID_COLUMN {
                copy.fields[idx] = existing.fields[idx].clone();
            }
        }
        copy.date_triggers = existing.date_triggers;
        copy
    }

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// `true` once the entity has a primary key.
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    pub fn state(&self) -> LifecycleState {
        match (&self.id, self.purged) {
            (None, true) => LifecycleState::Purged,
            (None, false) => LifecycleState::Transient,
            (Some(_), _) if self.is_deleted() => LifecycleState::SoftDeleted,
            (Some(_), _) => LifecycleState::Persisted,
        }
    }

    /// The current value of a tracked or untracked column. `None` when unset.
    pub fn get(&self, column: &str) -> Option<&Value> {
        if column == T::ID_COLUMN {
            return self.id.as_ref();
        }
        match self.index_of(column) {
            Some(idx) => self.fields[idx].value(),
            None => self.untracked.get(column),
        }
    }

    /// Typed read; `Ok(None)` for unset and `NULL` alike.
    pub fn get_as<V: FromValue>(&self, column: &str) -> Result<Option<V>> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => V::from_value(value).map(Some),
        }
    }

    /// Tri-state view of a tracked column, `Unset` for anything not tracked.
    pub fn field(&self, column: &str) -> Field {
        if column == T::ID_COLUMN {
            return self.id.clone().map_or(Field::Unset, Field::Set);
        }
        self.index_of(column)
            .map(|idx| self.fields[idx].clone())
            .unwrap_or_default()
    }

    /// Assigns a column. Columns outside `T::COLUMNS` are kept on the entity but never persisted.
    ///
    /// The primary key is managed by the repository; see [`Entity::assign_id_on_insert`].
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        if column == T::ID_COLUMN {
            return Err(PersistError::InvalidOperation(format!(
                "primary key '{}' of '{}' cannot be assigned directly",
                column,
                T::TABLE
            )));
        }
        match self.index_of(column) {
            Some(idx) => self.fields[idx] = Field::Set(value.into()),
            None => {
                self.untracked.insert(column.to_string(), value.into());
            }
        }
        Ok(())
    }

    pub fn set_null(&mut self, column: &str) -> Result<()> {
        self.set(column, Value::Null)
    }

    /// Returns a tracked column to the never-assigned state.
    pub fn unset(&mut self, column: &str) {
        if let Some(idx) = self.index_of(column) {
            self.fields[idx] = Field::Unset;
        } else {
            self.untracked.remove(column);
        }
    }

    /// Last values this process believes are stored.
    pub fn baseline(&self) -> &Row {
        &self.baseline
    }

    /// Recomputes the pending changes and keeps them as the entity's diff snapshot.
    pub fn preview_changes(&mut self) -> Diff {
        self.last_diff = diff::compute(self);
        self.last_diff.clone()
    }

    /// Diff snapshot from the last preview, insert or save.
    pub fn last_diff(&self) -> &Diff {
        &self.last_diff
    }

    pub fn is_changed(&mut self) -> bool {
        !self.preview_changes().is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        if T::tracks(DELETED_AT) {
            return self.get(DELETED_AT).is_some_and(|v| !v.is_null());
        }
        self.deleted_flag() != 0
    }

    /// Whether the last save was an insert. Asking before any insert is a caller error.
    pub fn is_inserted(&self) -> Result<bool> {
        if self.just_inserted {
            return Ok(true);
        }
        if !self.exists() {
            return Err(PersistError::InvalidOperation(
                "no insert was called (or it failed)".to_string(),
            ));
        }
        Ok(false)
    }

    pub fn disable_date_triggers(&mut self) {
        self.date_triggers = false;
    }

    pub fn date_triggers_enabled(&self) -> bool {
        self.date_triggers
    }

    /// Primary key to write on the next insert instead of letting storage generate one.
    pub fn assign_id_on_insert(&mut self, id: impl Into<Value>) {
        self.id_to_assign = Some(id.into());
    }

    pub fn id_to_assign(&self) -> Option<&Value> {
        self.id_to_assign.as_ref().filter(|id| !id.is_null())
    }

    pub fn debug_title(&self) -> String {
        match &self.id {
            Some(id) => id.to_string(),
            None => "[NEW]".to_string(),
        }
    }

    fn index_of(&self, column: &str) -> Option<usize> {
        T::COLUMNS.iter().position(|&c| c == column)
    }

    fn deleted_flag(&self) -> i64 {
        if T::tracks(DELETED) {
            return self.get(DELETED).and_then(Value::as_i64).unwrap_or(0);
        }
        self.legacy_deleted
    }

    pub(crate) fn set_deleted_flag(&mut self, flag: i64) {
        match self.index_of(DELETED) {
            Some(idx) => self.fields[idx] = Field::Set(Value::Integer(flag)),
            None => self.legacy_deleted = flag,
        }
    }

    /// Snapshot of `deleted_at`, `deleted` and the entity-side legacy flag.
    pub(crate) fn deletion_markers(&self) -> (Field, Field, i64) {
        (self.field(DELETED_AT), self.field(DELETED), self.legacy_deleted)
    }

    pub(crate) fn restore_deletion_markers(
        &mut self,
        (deleted_at, deleted, legacy): (Field, Field, i64),
    ) {
        for (column, field) in [(DELETED_AT, deleted_at), (DELETED, deleted)] {
            if let Some(idx) = self.index_of(column) {
                self.fields[idx] = field;
            }
        }
        self.legacy_deleted = legacy;
    }

    pub(crate) fn set_date_triggers(&mut self, enabled: bool) {
        self.date_triggers = enabled;
    }

    /// Writes a tracked column without the primary-key guard of [`Entity::set`].
    pub(crate) fn write_tracked(&mut self, column: &str, value: impl Into<Value>) {
        if let Some(idx) = self.index_of(column) {
            self.fields[idx] = Field::Set(value.into());
        }
    }

    /// Copies tracked columns present in `row`; absent columns keep their value.
    pub(crate) fn load_row(&mut self, row: &Row, include_id: bool) {
        for (idx, &col) in T::COLUMNS.iter().enumerate() {
            let Some(value) = row.get(col) else {
                continue;
            };
            if col == T::ID_COLUMN {
                if include_id && !value.is_null() {
                    self.id = Some(value.clone());
                }
            } else {
                self.fields[idx] = Field::Set(value.clone());
            }
        }
        if include_id && !T::tracks(T::ID_COLUMN) {
            if let Some(id) = row.get(T::ID_COLUMN).filter(|v| !v.is_null()) {
                self.id = Some(id.clone());
            }
        }
    }

    pub(crate) fn replace_baseline(&mut self, row: Row) {
        self.baseline = row;
    }

    /// Folds written values into the baseline after a confirmed UPDATE.
    pub(crate) fn commit_update(&mut self, written: &Diff) {
        for change in written.iter() {
            self.baseline
                .insert(change.column.to_string(), change.new.clone());
        }
        self.last_diff = written.clone();
    }

    /// Records a confirmed INSERT: primary key, baseline of every tracked column, full diff.
    pub(crate) fn commit_insert(&mut self, id: Value) {
        self.id = Some(id);
        self.id_to_assign = None;
        self.purged = false;

        let mut changes = Diff::default();
        for &col in T::COLUMNS {
            match self.get(col).filter(|v| !v.is_null()).cloned() {
                Some(value) => {
                    changes.push(col, Value::Null, value.clone());
                    self.baseline.insert(col.to_string(), value);
                }
                None => {
                    self.baseline.insert(col.to_string(), Value::Null);
                }
            }
        }
        self.last_diff = changes;
        self.just_inserted = true;
    }

    pub(crate) fn reset_just_inserted(&mut self) {
        self.just_inserted = false;
    }

    pub(crate) fn commit_purge(&mut self) {
        self.id = None;
        self.just_inserted = false;
        self.purged = true;
    }
}

impl<T: EntityType> Default for Entity<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EntityType> fmt::Debug for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: BTreeMap<&str, &Field> = T::COLUMNS
            .iter()
            .copied()
            .zip(self.fields.iter())
            .filter(|(col, _)| *col != T::ID_COLUMN)
            .collect();
        f.debug_struct("Entity")
            .field("table", &T::TABLE)
            .field("id", &self.id)
            .field("fields", &fields)
            .field("just_inserted", &self.just_inserted)
            .finish()
    }
}
