//! Schema and metadata types.

use crate::error::{LoadError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Reference to a source table or view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema name.
    pub schema: String,

    /// Table or view name.
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.name`, splitting on the first `.`.
    ///
    /// An unqualified name lands in `default_schema`. Square brackets around
    /// either part are stripped.
    pub fn parse(qualified: &str, default_schema: &str) -> Self {
        let qualified = qualified.trim();
        match qualified.split_once('.') {
            Some((schema, name)) => Self::new(unbracket(schema), unbracket(name)),
            None => Self::new(default_schema, unbracket(qualified)),
        }
    }

    /// Bracket-quoted form for use in T-SQL.
    pub fn quoted(&self) -> String {
        format!("[{}].[{}]", self.schema, self.name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

fn unbracket(part: &str) -> &str {
    part.trim().trim_start_matches('[').trim_end_matches(']')
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Native data type (e.g., "int", "nvarchar", "datetime2").
    pub data_type: String,

    /// Character length; -1 for `(max)`.
    pub max_length: Option<i32>,

    /// Numeric precision.
    pub precision: Option<i32>,

    /// Numeric scale.
    pub scale: Option<i32>,

    /// Whether the column is nullable.
    pub is_nullable: bool,

    /// Ordinal position in the table (1-based).
    pub ordinal_pos: i32,
}

impl Column {
    /// Convenience constructor for a column without length or precision.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal_pos: i32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            precision: None,
            scale: None,
            is_nullable: true,
            ordinal_pos,
        }
    }

    pub fn with_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}

/// Ordered column list of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    table: TableRef,
    columns: Vec<Column>,
}

impl TableSchema {
    /// Build a schema, checking that names are unique and ordinals strictly
    /// increase.
    pub fn new(table: TableRef, columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(LoadError::SchemaNotFound(table.to_string()));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        let mut last_ordinal = 0;
        for col in &columns {
            if col.ordinal_pos <= last_ordinal {
                return Err(LoadError::InvalidSchema(format!(
                    "{}: column {} has ordinal {} after {}",
                    table, col.name, col.ordinal_pos, last_ordinal
                )));
            }
            if !seen.insert(col.name.to_lowercase()) {
                return Err(LoadError::InvalidSchema(format!(
                    "{}: duplicate column {}",
                    table, col.name
                )));
            }
            last_ordinal = col.ordinal_pos;
        }

        Ok(Self { table, columns })
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
