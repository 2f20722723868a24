//! Database connection contract.
//!
//! The persistence engine talks to storage only through [`Connection`] and the
//! [`Statement`]s it prepares. Implementations wrap a real driver; [`MemoryConnection`]
//! is an in-process implementation for tests and local experiments.

pub mod memory;

use crate::core::{Params, Result, Row, Value};

pub use memory::{ExecutedStatement, MemoryConnection};

/// A prepared statement bound to its connection.
pub trait Statement {
    /// Executes the statement with named parameters (names without the leading colon).
    fn execute(&mut self, params: &Params) -> Result<()>;

    /// Returns the next row of the last execution, if any.
    fn fetch_one(&mut self) -> Result<Option<Row>>;
}

/// A single logical, blocking database connection.
pub trait Connection {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement + '_>>;

    /// Runs a statement without parameters, returning the affected row count.
    fn exec(&mut self, sql: &str) -> Result<u64>;

    /// Identity generated by the most recent INSERT.
    fn last_insert_id(&self) -> Result<Value>;

    /// Driver identifier such as `mysql` or `pgsql`.
    fn driver_name(&self) -> &str;
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        (**self).prepare(sql)
    }

    fn exec(&mut self, sql: &str) -> Result<u64> {
        (**self).exec(sql)
    }

    fn last_insert_id(&self) -> Result<Value> {
        (**self).last_insert_id()
    }

    fn driver_name(&self) -> &str {
        (**self).driver_name()
    }
}
