//! Identifier quoting per database driver.
//!
//! Quoting wraps the identifier in the driver's quote character and nothing else:
//! embedded quote characters are not escaped, so identifiers must come from trusted
//! entity declarations, never from user input.

use std::fmt;
use std::str::FromStr;

use crate::core::{PersistError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    MySql,
    PgSql,
}

impl Driver {
    /// The identifier a connection reports for this driver.
    pub fn name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PgSql => "pgsql",
        }
    }

    fn quote_characters(self) -> (char, char) {
        match self {
            Self::MySql => ('`', '`'),
            Self::PgSql => ('"', '"'),
        }
    }
}

impl FromStr for Driver {
    type Err = PersistError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "mysql" => Ok(Self::MySql),
            "pgsql" => Ok(Self::PgSql),
            other => Err(PersistError::Configuration(format!(
                "Not supported database: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quoting strategy resolved from a driver identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    driver: Driver,
    table_quote: char,
    column_quote: char,
}

impl Schema {
    /// Resolves the strategy for `driver_name`; unknown drivers are a configuration error.
    pub fn for_driver(driver_name: &str) -> Result<Self> {
        Ok(Self::new(driver_name.parse()?))
    }

    pub fn new(driver: Driver) -> Self {
        let (table_quote, column_quote) = driver.quote_characters();
        Self {
            driver,
            table_quote,
            column_quote,
        }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn quote_table(&self, table: &str) -> String {
        wrap(self.table_quote, table)
    }

    pub fn quote_column(&self, column: &str) -> String {
        wrap(self.column_quote, column)
    }
}

fn wrap(quote: char, identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push(quote);
    quoted.push_str(identifier);
    quoted.push(quote);
    quoted
}
