//! Change tracking against the persisted baseline.

use serde_json::{Map, json};

use super::{Entity, EntityType};
use crate::core::Value;

/// One changed column: the baseline value and the value that would be written.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub column: &'static str,
    pub old: Value,
    pub new: Value,
}

/// Changed columns in declaration order. May be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    changes: Vec<FieldChange>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, column: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.column == column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changes.iter().map(|c| c.column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    /// `{"column": [old, new], ...}`
    pub fn to_json(&self) -> serde_json::Value {
        let map: Map<String, serde_json::Value> = self
            .changes
            .iter()
            .map(|c| (c.column.to_string(), json!([c.old, c.new])))
            .collect();
        serde_json::Value::Object(map)
    }

    pub(crate) fn push(&mut self, column: &'static str, old: Value, new: Value) {
        self.changes.push(FieldChange { column, old, new });
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a FieldChange;
    type IntoIter = std::slice::Iter<'a, FieldChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Computes what a save would write.
///
/// Unset fields never contribute. A transient entity reports every non-null value;
/// a persisted one reports columns present in the baseline whose value differs.
pub fn compute<T: EntityType>(entity: &Entity<T>) -> Diff {
    let mut diff = Diff::default();
    let baseline = entity.baseline();
    let persisted = entity.exists();

    for &column in T::COLUMNS {
        let Some(current) = entity.get(column) else {
            continue;
        };
        let stored = baseline.get(column);

        if !persisted {
            if !current.is_null() {
                diff.push(column, stored.cloned().unwrap_or(Value::Null), current.clone());
            }
        } else if let Some(stored) = stored {
            if stored != current {
                diff.push(column, stored.clone(), current.clone());
            }
        }
    }
    diff
}
