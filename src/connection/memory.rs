//! In-process [`Connection`] that understands the single-row statement shapes the
//! repository generates.
//!
//! Every statement that completes is recorded, so tests can assert on the exact
//! SQL and parameters that reached "storage".

use std::collections::HashMap;

use tracing::trace;

use super::{Connection, Statement};
use crate::core::{Params, PersistError, Result, Row, Value};

/// A statement that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Params,
}

impl ExecutedStatement {
    /// Upper-cased leading keyword (`SELECT`, `INSERT`, ...).
    pub fn verb(&self) -> String {
        self.sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase()
    }

    pub fn is_write(&self) -> bool {
        matches!(self.verb().as_str(), "INSERT" | "UPDATE" | "DELETE")
    }
}

#[derive(Debug)]
struct MemoryTable {
    id_column: String,
    rows: Vec<Row>,
    next_id: i64,
}

impl MemoryTable {
    fn position(&self, column: &str, key: &Value) -> Option<usize> {
        self.rows.iter().position(|row| row.get(column) == Some(key))
    }

    fn insert(&mut self, mut row: Row) -> Result<Value> {
        let id = match row.get(&self.id_column) {
            Some(id) if !id.is_null() => {
                if self.position(&self.id_column, id).is_some() {
                    return Err(PersistError::Connection(format!(
                        "duplicate key {} for column '{}'",
                        id, self.id_column
                    )));
                }
                if let Some(explicit) = id.as_i64() {
                    self.next_id = self.next_id.max(explicit + 1);
                }
                id.clone()
            }
            _ => {
                let id = Value::Integer(self.next_id);
                self.next_id += 1;
                row.insert(self.id_column.clone(), id.clone());
                id
            }
        };
        self.rows.push(row);
        Ok(id)
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    driver: String,
    tables: HashMap<String, MemoryTable>,
    log: Vec<ExecutedStatement>,
    last_insert_id: Value,
    fail_writes: bool,
    locked_table: Option<String>,
}

impl MemoryConnection {
    /// Creates an empty connection reporting `driver` as its driver name.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            tables: HashMap::new(),
            log: Vec::new(),
            last_insert_id: Value::Null,
            fail_writes: false,
            locked_table: None,
        }
    }

    pub fn mysql() -> Self {
        Self::new("mysql")
    }

    pub fn pgsql() -> Self {
        Self::new("pgsql")
    }

    /// Registers `table` with auto-increment primary key `id_column`.
    pub fn create_table(&mut self, table: &str, id_column: &str) {
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                id_column: id_column.to_string(),
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    pub fn with_table(mut self, table: &str, id_column: &str) -> Self {
        self.create_table(table, id_column);
        self
    }

    /// Stores a row directly, bypassing the statement log. Returns its primary key.
    pub fn seed_row(&mut self, table: &str, row: Row) -> Result<Value> {
        self.table_mut(table)?.insert(row)
    }

    pub fn row(&self, table: &str, id: &Value) -> Option<&Row> {
        let table = self.tables.get(table)?;
        table
            .position(&table.id_column, id)
            .map(|idx| &table.rows[idx])
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables
            .get(table)
            .map(|t| t.rows.as_slice())
            .unwrap_or_default()
    }

    /// Overwrites one stored column, simulating a write from another process.
    pub fn set_column(
        &mut self,
        table: &str,
        id: &Value,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let table_name = table;
        let table = self.table_mut(table_name)?;
        let idx = table
            .position(&table.id_column, id)
            .ok_or_else(|| PersistError::not_found(table_name, format!("id = \"{}\"", id)))?;
        table.rows[idx].insert(column.to_string(), value.into());
        Ok(())
    }

    /// Removes a stored row without logging a statement.
    pub fn remove_row(&mut self, table: &str, id: &Value) -> bool {
        let Some(table) = self.tables.get_mut(table) else {
            return false;
        };
        match table.position(&table.id_column, id) {
            Some(idx) => {
                table.rows.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Makes every subsequent INSERT/UPDATE/DELETE fail until switched off.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn executed(&self) -> &[ExecutedStatement] {
        &self.log
    }

    pub fn writes(&self) -> impl Iterator<Item = &ExecutedStatement> {
        self.log.iter().filter(|s| s.is_write())
    }

    pub fn locked_table(&self) -> Option<&str> {
        self.locked_table.as_deref()
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| PersistError::Connection(format!("no such table: {}", table)))
    }

    fn run(&mut self, sql: &str, params: &Params) -> Result<Option<Row>> {
        let tokens: Vec<&str> = sql.split_whitespace().collect();
        let verb = tokens
            .first()
            .map(|t| t.to_ascii_uppercase())
            .unwrap_or_default();

        if self.fail_writes && matches!(verb.as_str(), "INSERT" | "UPDATE" | "DELETE") {
            return Err(PersistError::Connection(format!(
                "write rejected: {}",
                sql
            )));
        }

        let fetched = match verb.as_str() {
            "SELECT" => {
                let table = self.table_mut(&identifier_after(&tokens, "FROM")?)?;
                let (column, key) = where_clause(&tokens, params)?;
                table
                    .position(&column, &key)
                    .map(|idx| table.rows[idx].clone())
            }
            "INSERT" => {
                let table = self.table_mut(&identifier_after(&tokens, "INTO")?)?;
                let row: Row = params
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.clone()))
                    .collect();
                self.last_insert_id = table.insert(row)?;
                None
            }
            "UPDATE" => {
                let table = self.table_mut(&identifier_after(&tokens, "UPDATE")?)?;
                let (column, key) = where_clause(&tokens, params)?;
                let assignments = set_clause(&tokens, params)?;
                if let Some(idx) = table.position(&column, &key) {
                    for (col, value) in assignments {
                        table.rows[idx].insert(col, value);
                    }
                }
                None
            }
            "DELETE" => {
                let table = self.table_mut(&identifier_after(&tokens, "FROM")?)?;
                let (column, key) = where_clause(&tokens, params)?;
                table.rows.retain(|row| row.get(&column) != Some(&key));
                None
            }
            _ => {
                return Err(PersistError::Connection(format!(
                    "unsupported statement: {}",
                    sql
                )));
            }
        };

        self.log.push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.clone(),
        });
        Ok(fetched)
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::mysql()
    }
}

fn unquote(token: &str) -> String {
    token
        .trim_matches(|c| matches!(c, '`' | '"' | ',' | '(' | ')'))
        .to_string()
}

fn identifier_after(tokens: &[&str], keyword: &str) -> Result<String> {
    tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case(keyword))
        .and_then(|idx| tokens.get(idx + 1))
        .map(|t| unquote(t))
        .ok_or_else(|| PersistError::Connection(format!("missing identifier after {}", keyword)))
}

fn param_value(token: &str, params: &Params) -> Result<Value> {
    let name = unquote(token.trim_start_matches(':'));
    params
        .get(&name)
        .cloned()
        .ok_or_else(|| PersistError::Connection(format!("unbound parameter :{}", name)))
}

/// `WHERE <col> = :param` → (col, bound value).
fn where_clause(tokens: &[&str], params: &Params) -> Result<(String, Value)> {
    let idx = tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case("WHERE"))
        .ok_or_else(|| PersistError::Connection("statement has no WHERE clause".to_string()))?;
    match tokens.get(idx + 1..idx + 4) {
        Some([column, "=", param]) => Ok((unquote(column), param_value(param, params)?)),
        _ => Err(PersistError::Connection("malformed WHERE clause".to_string())),
    }
}

/// `SET <col> = :param, ...` up to WHERE.
fn set_clause(tokens: &[&str], params: &Params) -> Result<Vec<(String, Value)>> {
    let start = tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case("SET"))
        .ok_or_else(|| PersistError::Connection("UPDATE without SET".to_string()))?;
    let end = tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case("WHERE"))
        .unwrap_or(tokens.len());

    tokens[start + 1..end]
        .chunks(3)
        .map(|chunk| match chunk {
            [column, "=", param] => Ok((unquote(column), param_value(param, params)?)),
            _ => Err(PersistError::Connection("malformed SET clause".to_string())),
        })
        .collect()
}

struct MemoryStatement<'a> {
    conn: &'a mut MemoryConnection,
    sql: String,
    fetched: Option<Row>,
}

impl Statement for MemoryStatement<'_> {
    fn execute(&mut self, params: &Params) -> Result<()> {
        self.fetched = self.conn.run(&self.sql, params)?;
        Ok(())
    }

    fn fetch_one(&mut self) -> Result<Option<Row>> {
        Ok(self.fetched.take())
    }
}

impl Connection for MemoryConnection {
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        trace!(sql, "prepare");
        Ok(Box::new(MemoryStatement {
            conn: self,
            sql: sql.to_string(),
            fetched: None,
        }))
    }

    fn exec(&mut self, sql: &str) -> Result<u64> {
        let tokens: Vec<&str> = sql.split_whitespace().collect();
        match tokens.as_slice() {
            [lock, table_kw, table, write]
                if lock.eq_ignore_ascii_case("LOCK")
                    && table_kw.eq_ignore_ascii_case("TABLE")
                    && write.eq_ignore_ascii_case("WRITE") =>
            {
                self.locked_table = Some(unquote(table));
            }
            [unlock, tables]
                if unlock.eq_ignore_ascii_case("UNLOCK") && tables.eq_ignore_ascii_case("TABLES") =>
            {
                self.locked_table = None;
            }
            _ => {
                return Err(PersistError::Connection(format!(
                    "unsupported statement: {}",
                    sql
                )));
            }
        }
        self.log.push(ExecutedStatement {
            sql: sql.to_string(),
            params: Params::new(),
        });
        Ok(0)
    }

    fn last_insert_id(&self) -> Result<Value> {
        Ok(self.last_insert_id.clone())
    }

    fn driver_name(&self) -> &str {
        &self.driver
    }
}
