//! Statement builders for Snowflake load objects.

use crate::config::{LoadConfig, OnError};

/// File format and stage names owned by one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadObjects {
    pub file_format: String,
    pub stage: String,
}

impl LoadObjects {
    /// `<JOB>_CSV_FORMAT` / `<JOB>_STAGE`, uppercased with anything outside
    /// `[A-Z0-9_]` replaced by `_`.
    pub fn for_job(job_name: &str) -> Self {
        let mut base: String = job_name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        if base.starts_with(|c: char| c.is_ascii_digit()) {
            base.insert(0, '_');
        }
        Self {
            file_format: format!("{}_CSV_FORMAT", base),
            stage: format!("{}_STAGE", base),
        }
    }
}

/// CSV parsing options for the file format object.
#[derive(Debug, Clone)]
pub struct FileFormatOptions {
    pub delimiter: String,
    pub skip_header: u32,
    pub quote_char: char,
    pub null_if: Vec<String>,
    pub empty_field_as_null: bool,
    pub error_on_column_count_mismatch: bool,
}

impl FileFormatOptions {
    pub fn new(delimiter: &str, load: &LoadConfig) -> Self {
        Self {
            delimiter: delimiter.to_string(),
            skip_header: load.skip_header,
            quote_char: load.quote_char,
            null_if: load.null_if.clone(),
            empty_field_as_null: load.empty_field_as_null,
            error_on_column_count_mismatch: load.error_on_column_count_mismatch,
        }
    }
}

/// Escape a SQL string literal value: `O'Brien` -> `O''Brien`.
fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

fn bool_sql(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

pub fn create_file_format(name: &str, options: &FileFormatOptions) -> String {
    let null_if = options
        .null_if
        .iter()
        .map(|v| format!("'{}'", escape_literal(v)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE FILE FORMAT IF NOT EXISTS {name} \
         TYPE = CSV \
         FIELD_DELIMITER = '{delim}' \
         SKIP_HEADER = {skip} \
         FIELD_OPTIONALLY_ENCLOSED_BY = '{quote}' \
         NULL_IF = ({null_if}) \
         EMPTY_FIELD_AS_NULL = {empty} \
         ERROR_ON_COLUMN_COUNT_MISMATCH = {mismatch}",
        name = name,
        delim = escape_literal(&options.delimiter),
        skip = options.skip_header,
        quote = escape_literal(&options.quote_char.to_string()),
        null_if = null_if,
        empty = bool_sql(options.empty_field_as_null),
        mismatch = bool_sql(options.error_on_column_count_mismatch),
    )
}

pub fn create_stage(stage: &str, file_format: &str) -> String {
    format!(
        "CREATE STAGE IF NOT EXISTS {} FILE_FORMAT = {}",
        stage, file_format
    )
}

/// `PUT` a local file into the stage. Backslashes become forward slashes.
pub fn put(local_path: &str, stage: &str, auto_compress: bool) -> String {
    format!(
        "PUT 'file://{}' @{} AUTO_COMPRESS = {} OVERWRITE = TRUE",
        escape_literal(&local_path.replace('\\', "/")),
        stage,
        bool_sql(auto_compress)
    )
}

pub fn copy_into(table: &str, stage: &str, file_format: &str, load: &LoadConfig) -> String {
    let on_error = match load.on_error {
        OnError::Abort => "ABORT_STATEMENT",
        OnError::Continue => "CONTINUE",
    };
    format!(
        "COPY INTO {} FROM @{} FILE_FORMAT = (FORMAT_NAME = {}) ON_ERROR = '{}' PURGE = {}",
        table,
        stage,
        file_format,
        on_error,
        bool_sql(load.purge)
    )
}

pub fn list_stage(stage: &str) -> String {
    format!("LIST @{}", stage)
}

pub fn count_rows(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_objects_are_job_scoped() {
        let objects = LoadObjects::for_job("inventory-parts ops");
        assert_eq!(objects.file_format, "INVENTORY_PARTS_OPS_CSV_FORMAT");
        assert_eq!(objects.stage, "INVENTORY_PARTS_OPS_STAGE");

        assert_ne!(
            LoadObjects::for_job("equipment").stage,
            LoadObjects::for_job("tiers_dashboard").stage
        );
        assert_eq!(LoadObjects::for_job("2024").stage, "_2024_STAGE");
    }

    #[test]
    fn test_create_file_format_defaults() {
        let options = FileFormatOptions::new(",", &LoadConfig::default());
        assert_eq!(
            create_file_format("EQUIPMENT_CSV_FORMAT", &options),
            "CREATE FILE FORMAT IF NOT EXISTS EQUIPMENT_CSV_FORMAT TYPE = CSV \
             FIELD_DELIMITER = ',' SKIP_HEADER = 0 FIELD_OPTIONALLY_ENCLOSED_BY = '\"' \
             NULL_IF = ('NULL', '') EMPTY_FIELD_AS_NULL = TRUE \
             ERROR_ON_COLUMN_COUNT_MISMATCH = TRUE"
        );
    }

    #[test]
    fn test_stage_and_put() {
        assert_eq!(
            create_stage("EQUIPMENT_STAGE", "EQUIPMENT_CSV_FORMAT"),
            "CREATE STAGE IF NOT EXISTS EQUIPMENT_STAGE FILE_FORMAT = EQUIPMENT_CSV_FORMAT"
        );
        assert_eq!(
            put(r"C:\exports\equipment.csv", "EQUIPMENT_STAGE", true),
            "PUT 'file://C:/exports/equipment.csv' @EQUIPMENT_STAGE AUTO_COMPRESS = TRUE OVERWRITE = TRUE"
        );
    }

    #[test]
    fn test_copy_into_on_error_and_purge() {
        let mut load = LoadConfig::default();
        assert_eq!(
            copy_into("DB.SC.T", "T_STAGE", "T_CSV_FORMAT", &load),
            "COPY INTO DB.SC.T FROM @T_STAGE FILE_FORMAT = (FORMAT_NAME = T_CSV_FORMAT) \
             ON_ERROR = 'ABORT_STATEMENT' PURGE = TRUE"
        );

        load.on_error = OnError::Continue;
        load.purge = false;
        let sql = copy_into("DB.SC.T", "T_STAGE", "T_CSV_FORMAT", &load);
        assert!(sql.ends_with("ON_ERROR = 'CONTINUE' PURGE = FALSE"));
    }

    #[test]
    fn test_list_and_count() {
        assert_eq!(list_stage("T_STAGE"), "LIST @T_STAGE");
        assert_eq!(count_rows("DB.SC.T"), "SELECT COUNT(*) FROM DB.SC.T");
    }
}
