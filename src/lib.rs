//! # rowkeep
//!
//! Entity persistence for single-row records: hydrate from a row, track field
//! changes against what was last stored, and write back only what changed.
//!
//! ```
//! use rowkeep::{MemoryConnection, Repository, Value};
//!
//! rowkeep::entity_type! {
//!     pub struct Widget {
//!         table: "widget",
//!         columns: [id, name, price],
//!     }
//! }
//!
//! # fn main() -> rowkeep::Result<()> {
//! let conn = MemoryConnection::mysql().with_table("widget", "id");
//! let mut repo = Repository::<Widget, _>::new(conn)?;
//!
//! let mut widget = repo.new_entity();
//! widget.set("name", "bolt")?;
//! widget.set("price", 12i64)?;
//! repo.insert(&mut widget)?;
//! assert_eq!(widget.id(), Some(&Value::Integer(1)));
//!
//! widget.set("price", 15i64)?;
//! repo.save(&mut widget, false)?;
//! let last = repo.connection().executed().last().map(|s| s.sql.clone());
//! assert_eq!(
//!     last.as_deref(),
//!     Some("UPDATE `widget` SET `price` = :price WHERE `id` = :id")
//! );
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod connection;
pub mod core;
pub mod entity;
mod macros;
pub mod persist;
pub mod schema;

pub use cache::{EntityRef, IdentityCache};
pub use connection::{Connection, ExecutedStatement, MemoryConnection, Statement};
pub use crate::core::{FromValue, Params, PersistError, Result, Row, TIMESTAMP_FORMAT, Value};
pub use entity::{
    Diff, Entity, EntityHooks, EntityType, Field, FieldChange, HistoryEntry, HistoryLogger,
    LifecycleState, NoHooks, RecordingHistory,
};
pub use persist::{Clock, FixedClock, PersistConfig, Repository, SystemClock};
pub use schema::{Driver, Schema};
