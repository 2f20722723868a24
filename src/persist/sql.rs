//! Single-row statement text for one table.

use crate::schema::Schema;

/// Parameter name the primary key is bound to in WHERE clauses.
pub const ID_PARAM: &str = "id";

#[derive(Debug, Clone, Copy)]
pub struct TableStatements<'a> {
    schema: &'a Schema,
    table: &'a str,
    id_column: &'a str,
}

impl<'a> TableStatements<'a> {
    pub fn new(schema: &'a Schema, table: &'a str, id_column: &'a str) -> Self {
        Self {
            schema,
            table,
            id_column,
        }
    }

    fn where_id(&self) -> String {
        format!("{} = :{}", self.schema.quote_column(self.id_column), ID_PARAM)
    }

    pub fn select_by_id(&self) -> String {
        format!(
            "SELECT * FROM {} WHERE {}",
            self.schema.quote_table(self.table),
            self.where_id()
        )
    }

    pub fn insert(&self, columns: &[&str]) -> String {
        let quoted: Vec<String> = columns
            .iter()
            .map(|col| self.schema.quote_column(col))
            .collect();
        let placeholders: Vec<String> = columns.iter().map(|col| format!(":{}", col)).collect();

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.schema.quote_table(self.table),
            quoted.join(", "),
            placeholders.join(", ")
        )
    }

    pub fn update(&self, columns: &[&str]) -> String {
        let assignments: Vec<String> = columns
            .iter()
            .map(|col| format!("{} = :{}", self.schema.quote_column(col), col))
            .collect();

        format!(
            "UPDATE {} SET {} WHERE {}",
            self.schema.quote_table(self.table),
            assignments.join(", "),
            self.where_id()
        )
    }

    pub fn delete_by_id(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            self.schema.quote_table(self.table),
            self.where_id()
        )
    }

    pub fn lock(&self) -> String {
        format!("LOCK TABLE {} WRITE", self.schema.quote_table(self.table))
    }

    pub fn unlock(&self) -> String {
        "UNLOCK TABLES".to_string()
    }
}
