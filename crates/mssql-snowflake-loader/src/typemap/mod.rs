//! Type mapping from MSSQL to Snowflake.

/// Widest VARCHAR Snowflake accepts; target for `(max)` and legacy text types.
pub const MAX_VARCHAR_WIDTH: i32 = 16_777_216;

/// Width used for character columns whose length the catalog did not report.
pub const DEFAULT_VARCHAR_WIDTH: i32 = 255;

/// Catalog sentinel for `varchar(max)` / `nvarchar(max)`.
pub const UNBOUNDED_LENGTH: i32 = -1;

/// Type used for native types with no known equivalent.
pub const FALLBACK_TYPE: &str = "VARCHAR(500)";

/// Default for decimal/numeric when the catalog supplies no precision.
const DEFAULT_DECIMAL: &str = "NUMBER(38,6)";

/// Map an MSSQL data type to Snowflake.
///
/// `precision` and `scale` only matter for `decimal`/`numeric`; when both are
/// present they replace the wide default.
pub fn mssql_to_snowflake(
    mssql_type: &str,
    max_length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> String {
    match mssql_type.trim().to_lowercase().as_str() {
        // Boolean
        "bit" => "BOOLEAN".to_string(),

        // Integer types
        "tinyint" => "NUMBER(3,0)".to_string(),
        "smallint" => "NUMBER(5,0)".to_string(),
        "int" => "NUMBER(10,0)".to_string(),
        "bigint" => "NUMBER(19,0)".to_string(),

        // Decimal/numeric
        "decimal" | "numeric" => match (precision, scale) {
            (Some(p), Some(s)) if p > 0 => format!("NUMBER({},{})", p, s),
            _ => DEFAULT_DECIMAL.to_string(),
        },
        "money" => "NUMBER(19,4)".to_string(),
        "smallmoney" => "NUMBER(10,4)".to_string(),

        // Floating point
        "float" | "real" => "FLOAT".to_string(),

        // Date/time types
        "date" => "DATE".to_string(),
        "datetime" | "datetime2" | "smalldatetime" => "TIMESTAMP_NTZ".to_string(),
        "datetimeoffset" => "TIMESTAMP_TZ".to_string(),
        "time" => "TIME".to_string(),

        // String types
        "char" | "varchar" | "nchar" | "nvarchar" => varchar(max_length),
        "text" | "ntext" => format!("VARCHAR({})", MAX_VARCHAR_WIDTH),

        // Binary types
        "binary" | "varbinary" | "image" => "BINARY".to_string(),

        // GUID
        "uniqueidentifier" => "VARCHAR(36)".to_string(),

        // Semi-structured and spatial
        "xml" => "VARIANT".to_string(),
        "geography" => "GEOGRAPHY".to_string(),
        "geometry" => "GEOMETRY".to_string(),

        // Default fallback
        _ => FALLBACK_TYPE.to_string(),
    }
}

/// Returns true for the native types whose precision/scale are meaningful.
pub fn is_decimal(mssql_type: &str) -> bool {
    matches!(
        mssql_type.trim().to_lowercase().as_str(),
        "decimal" | "numeric"
    )
}

fn varchar(max_length: Option<i32>) -> String {
    match max_length {
        Some(UNBOUNDED_LENGTH) => format!("VARCHAR({})", MAX_VARCHAR_WIDTH),
        Some(len) if len > 0 => format!("VARCHAR({})", len.min(MAX_VARCHAR_WIDTH)),
        _ => format!("VARCHAR({})", DEFAULT_VARCHAR_WIDTH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(t: &str) -> String {
        mssql_to_snowflake(t, None, None, None)
    }

    #[test]
    fn test_integer_types() {
        assert_eq!(map("tinyint"), "NUMBER(3,0)");
        assert_eq!(map("smallint"), "NUMBER(5,0)");
        assert_eq!(map("int"), "NUMBER(10,0)");
        assert_eq!(map("bigint"), "NUMBER(19,0)");
        assert_eq!(map("bit"), "BOOLEAN");
    }

    #[test]
    fn test_numeric_types() {
        assert_eq!(map("decimal"), "NUMBER(38,6)");
        assert_eq!(map("numeric"), "NUMBER(38,6)");
        assert_eq!(map("money"), "NUMBER(19,4)");
        assert_eq!(map("smallmoney"), "NUMBER(10,4)");
        assert_eq!(map("float"), "FLOAT");
        assert_eq!(map("real"), "FLOAT");
    }

    #[test]
    fn test_decimal_precision_overrides_default() {
        assert_eq!(
            mssql_to_snowflake("decimal", None, Some(25), Some(2)),
            "NUMBER(25,2)"
        );
        assert_eq!(
            mssql_to_snowflake("NUMERIC", None, Some(10), Some(0)),
            "NUMBER(10,0)"
        );
        // Precision without scale keeps the default
        assert_eq!(
            mssql_to_snowflake("decimal", None, Some(18), None),
            "NUMBER(38,6)"
        );
    }

    #[test]
    fn test_datetime_types() {
        assert_eq!(map("date"), "DATE");
        assert_eq!(map("datetime"), "TIMESTAMP_NTZ");
        assert_eq!(map("datetime2"), "TIMESTAMP_NTZ");
        assert_eq!(map("smalldatetime"), "TIMESTAMP_NTZ");
        assert_eq!(map("datetimeoffset"), "TIMESTAMP_TZ");
        assert_eq!(map("time"), "TIME");
    }

    #[test]
    fn test_string_types() {
        for t in ["char", "varchar", "nchar", "nvarchar"] {
            assert_eq!(mssql_to_snowflake(t, Some(50), None, None), "VARCHAR(50)");
            assert_eq!(
                mssql_to_snowflake(t, Some(UNBOUNDED_LENGTH), None, None),
                "VARCHAR(16777216)"
            );
            assert_eq!(mssql_to_snowflake(t, None, None, None), "VARCHAR(255)");
        }
        assert_eq!(map("text"), "VARCHAR(16777216)");
        assert_eq!(map("ntext"), "VARCHAR(16777216)");
    }

    #[test]
    fn test_special_types() {
        assert_eq!(map("uniqueidentifier"), "VARCHAR(36)");
        assert_eq!(map("varbinary"), "BINARY");
        assert_eq!(map("image"), "BINARY");
        assert_eq!(map("xml"), "VARIANT");
        assert_eq!(map("geography"), "GEOGRAPHY");
        assert_eq!(map("geometry"), "GEOMETRY");
    }

    #[test]
    fn test_case_insensitive_and_fallback() {
        assert_eq!(map("INT"), "NUMBER(10,0)");
        assert_eq!(map("DateTime2"), "TIMESTAMP_NTZ");
        assert_eq!(map("sql_variant"), FALLBACK_TYPE);
        assert_eq!(map("hierarchyid"), FALLBACK_TYPE);
    }
}
