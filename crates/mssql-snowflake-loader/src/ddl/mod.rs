//! Snowflake `CREATE TABLE` generation from introspected source schemas.
//!
//! Generation is pure text: nothing here talks to either database.

use crate::config::{CreateMode, JobConfig, NullabilityMode};
use crate::error::{LoadError, Result};
use crate::source::{Column, TableSchema};
use crate::typemap::mssql_to_snowflake;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::warn;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const INDENT: &str = "    ";

/// Fully qualified target table in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TargetTable {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// Options that shape the generated statement.
#[derive(Debug, Clone, Default)]
pub struct DdlOptions {
    pub create_mode: CreateMode,
    pub nullability: NullabilityMode,
    /// Column name -> Snowflake type, replacing the mapped type.
    pub column_overrides: BTreeMap<String, String>,
}

impl DdlOptions {
    pub fn for_job(job: &JobConfig) -> Self {
        Self {
            create_mode: job.create_mode,
            nullability: job.nullability,
            column_overrides: job.column_overrides.clone(),
        }
    }

    fn override_for(&self, column: &str) -> Option<&str> {
        self.column_overrides
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, ty)| ty.as_str())
    }
}

/// Generate the `CREATE TABLE` statement for `schema` in `target`.
///
/// Columns keep source ordinal order, one per line, under their ASCII-folded
/// names; two columns folding to the same name are an
/// [`LoadError::InvalidSchema`]. In
/// [`NullabilityMode::Relaxed`] nullable columns carry ` NULL` and NOT NULL
/// columns carry no constraint at all.
pub fn generate_ddl(schema: &TableSchema, target: &TargetTable, options: &DdlOptions) -> Result<String> {
    for name in options.column_overrides.keys() {
        if schema.column(name).is_none() {
            warn!(
                "Type override for {} ignored: no such column in {}",
                name,
                schema.table()
            );
        }
    }

    let mut emitted: HashMap<String, &str> = HashMap::with_capacity(schema.len());
    let mut lines = Vec::with_capacity(schema.len());
    for column in schema.columns() {
        let name = normalize_identifier(&column.name);
        if let Some(previous) = emitted.insert(name.to_ascii_uppercase(), &column.name) {
            return Err(LoadError::InvalidSchema(format!(
                "columns {} and {} of {} both map to {}",
                previous,
                column.name,
                schema.table(),
                name
            )));
        }
        lines.push(column_line(column, &name, options)?);
    }

    Ok(render_body(target, options.create_mode, &lines.join(",\n")))
}

/// Render a user-supplied column block into the same statement shell.
///
/// Each non-blank line of `columns_ddl` is re-indented; the block itself is
/// taken as-is.
pub fn render_custom_ddl(target: &TargetTable, mode: CreateMode, columns_ddl: &str) -> String {
    let body = columns_ddl
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("{}{}", INDENT, line))
        .collect::<Vec<_>>()
        .join("\n");
    render_body(target, mode, &body)
}

/// Fold an identifier to ASCII (`Données` -> `Donnees`, `Straße` -> `Strasse`).
///
/// Accents are stripped through NFD, letters without a decomposition are
/// spelled out, and anything still outside ASCII becomes `_`.
pub fn normalize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii() {
            out.push(c);
        } else if let Some(folded) = fold_letter(c) {
            out.push_str(folded);
        } else {
            out.push('_');
        }
    }
    out
}

fn fold_letter(c: char) -> Option<&'static str> {
    let folded = match c {
        'Æ' => "AE",
        'æ' => "ae",
        'Œ' => "OE",
        'œ' => "oe",
        'Ø' => "O",
        'ø' => "o",
        'ß' => "ss",
        'Ł' => "L",
        'ł' => "l",
        'Đ' | 'Ð' => "D",
        'đ' | 'ð' => "d",
        'Þ' => "TH",
        'þ' => "th",
        'Ħ' => "H",
        'ħ' => "h",
        'ı' => "i",
        'Ŀ' => "L",
        'ŀ' => "l",
        'Ŧ' => "T",
        'ŧ' => "t",
        _ => return None,
    };
    Some(folded)
}

fn column_line(column: &Column, name: &str, options: &DdlOptions) -> Result<String> {
    let sf_type = match options.override_for(&column.name) {
        Some(ty) if ty.trim().is_empty() => {
            return Err(LoadError::Config(format!(
                "empty type override for column {}",
                column.name
            )))
        }
        Some(ty) => ty.trim().to_string(),
        None => mssql_to_snowflake(
            &column.data_type,
            column.max_length,
            column.precision,
            column.scale,
        ),
    };

    let suffix = match (column.is_nullable, options.nullability) {
        (true, _) => " NULL",
        (false, NullabilityMode::Relaxed) => "",
        (false, NullabilityMode::Strict) => " NOT NULL",
    };

    Ok(format!(
        "{}{} {}{}",
        INDENT, name, sf_type, suffix
    ))
}

fn render_body(target: &TargetTable, mode: CreateMode, body: &str) -> String {
    let head = match mode {
        CreateMode::OrReplace => "CREATE OR REPLACE TABLE",
        CreateMode::IfNotExists => "CREATE TABLE IF NOT EXISTS",
    };
    format!("{} {} (\n{}\n)", head, target, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TableRef;

    fn three_columns() -> TableSchema {
        TableSchema::new(
            TableRef::new("dbo", "T"),
            vec![
                Column::new("id", "int", 1).not_null(),
                Column::new("name", "varchar", 2).with_length(50),
                Column::new("created_at", "datetime2", 3),
            ],
        )
        .unwrap()
    }

    fn target() -> TargetTable {
        TargetTable::new("D", "S", "T")
    }

    #[test]
    fn test_three_column_ddl_exact() {
        let ddl = generate_ddl(&three_columns(), &target(), &DdlOptions::default()).unwrap();
        assert_eq!(
            ddl,
            "CREATE OR REPLACE TABLE D.S.T (\n    id NUMBER(10,0),\n    name VARCHAR(50) NULL,\n    created_at TIMESTAMP_NTZ NULL\n)"
        );
    }

    #[test]
    fn test_commas_on_all_but_last_line() {
        let columns = (1..=6)
            .map(|i| Column::new(format!("c{}", i), "int", i))
            .collect();
        let schema = TableSchema::new(TableRef::new("dbo", "Wide"), columns).unwrap();
        let ddl = generate_ddl(&schema, &target(), &DdlOptions::default()).unwrap();

        let body: Vec<&str> = ddl.lines().skip(1).take(6).collect();
        assert_eq!(body.len(), 6);
        for (i, line) in body.iter().enumerate() {
            assert!(line.starts_with(&format!("    c{} ", i + 1)));
            assert_eq!(line.ends_with(','), i < 5, "line {}: {}", i, line);
        }
        assert_eq!(ddl.lines().last(), Some(")"));
    }

    #[test]
    fn test_explicit_decimal_precision_used() {
        let schema = TableSchema::new(
            TableRef::new("dbo", "T"),
            vec![Column::new("amount", "decimal", 1).with_precision(18, 2)],
        )
        .unwrap();
        let ddl = generate_ddl(&schema, &target(), &DdlOptions::default()).unwrap();
        assert!(ddl.contains("    amount NUMBER(18,2) NULL\n"));
    }

    #[test]
    fn test_column_override_replaces_mapped_type() {
        let mut options = DdlOptions::default();
        options
            .column_overrides
            .insert("NAME".to_string(), "NUMBER(38,6)".to_string());
        options
            .column_overrides
            .insert("missing".to_string(), "NUMBER(38,6)".to_string());

        let ddl = generate_ddl(&three_columns(), &target(), &options).unwrap();
        assert!(ddl.contains("    name NUMBER(38,6) NULL,"));
    }

    #[test]
    fn test_strict_nullability_and_if_not_exists() {
        let options = DdlOptions {
            create_mode: CreateMode::IfNotExists,
            nullability: NullabilityMode::Strict,
            ..DdlOptions::default()
        };
        let ddl = generate_ddl(&three_columns(), &target(), &options).unwrap();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS D.S.T (\n"));
        assert!(ddl.contains("    id NUMBER(10,0) NOT NULL,"));
    }

    #[test]
    fn test_accented_names_are_normalized() {
        assert_eq!(normalize_identifier("Données"), "Donnees");
        assert_eq!(normalize_identifier("Qté_En_Stock"), "Qte_En_Stock");
        assert_eq!(normalize_identifier("plain_name"), "plain_name");
    }

    #[test]
    fn test_letters_without_decomposition_are_folded() {
        assert_eq!(normalize_identifier("Œuvre"), "OEuvre");
        assert_eq!(normalize_identifier("Søren"), "Soren");
        assert_eq!(normalize_identifier("Straße"), "Strasse");
        assert_eq!(normalize_identifier("Łódź"), "Lodz");
        assert_eq!(normalize_identifier("Prix_€"), "Prix__");

        for name in ["Œuvre", "Søren", "Straße", "Łódź", "Æsir", "đồng", "Prix_€", "数量"] {
            assert!(normalize_identifier(name).is_ascii(), "{}", name);
        }
    }

    #[test]
    fn test_names_colliding_after_folding_are_rejected() {
        let schema = TableSchema::new(
            TableRef::new("dbo", "T"),
            vec![
                Column::new("Donnees", "int", 1),
                Column::new("Données", "int", 2),
            ],
        )
        .unwrap();

        let err = generate_ddl(&schema, &target(), &DdlOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidSchema(_)));
        assert!(err.to_string().contains("Donnees"));
    }

    #[test]
    fn test_folded_names_in_ddl() {
        let schema = TableSchema::new(
            TableRef::new("dbo", "T"),
            vec![Column::new("Qté_Œuvre", "int", 1)],
        )
        .unwrap();
        let ddl = generate_ddl(&schema, &target(), &DdlOptions::default()).unwrap();
        assert!(ddl.contains("    Qte_OEuvre NUMBER(10,0) NULL\n"));
        assert!(ddl.is_ascii());
    }

    #[test]
    fn test_render_custom_ddl() {
        let ddl = render_custom_ddl(
            &target(),
            CreateMode::OrReplace,
            "\n  id NUMBER(10,0),\n  label VARCHAR(20)\n",
        );
        assert_eq!(
            ddl,
            "CREATE OR REPLACE TABLE D.S.T (\n    id NUMBER(10,0),\n    label VARCHAR(20)\n)"
        );
    }
}
