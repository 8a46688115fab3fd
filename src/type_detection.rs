//! Type detection for CSV cells using optimized string operations.

use std::sync::LazyLock;

use regex::Regex;

use crate::field_type::Type;
use crate::value::{parse_float, parse_int};

/// ISO 8601 datetime (YYYY-MM-DD[T ]HH:MM[:SS[.f]][Z|±HH:MM]).
static DATETIME_ISO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}[-/]\d{1,2}[-/]\d{1,2}[T ]\d{1,2}:\d{2}(:\d{2})?(\.\d+)?(Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("Invalid ISO datetime pattern")
});

/// ISO 8601 date (YYYY-MM-DD or YYYY/MM/DD).
static DATE_ISO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}[-/]\d{1,2}[-/]\d{1,2}$").expect("Invalid ISO date pattern")
});

/// US or European date with an optional time (MM/DD/YYYY, DD.MM.YYYY HH:MM).
static DATE_LOCAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,2}[-/.]\d{1,2}[-/.]\d{4}( \d{1,2}:\d{2}(:\d{2})?)?$")
        .expect("Invalid local date pattern")
});

/// Check for NULL-like values using string matching instead of regex.
/// This is a hot path optimization - called for every cell.
#[inline]
pub fn is_null_token(s: &str) -> bool {
    matches!(
        s,
        "" | "#N/A"
            | "#N/A N/A"
            | "#NA"
            | "-1.#IND"
            | "-1.#QNAN"
            | "-NaN"
            | "-nan"
            | "1.#IND"
            | "1.#QNAN"
            | "<NA>"
            | "N/A"
            | "NA"
            | "NULL"
            | "NaN"
            | "None"
            | "n/a"
            | "nan"
            | "null"
    )
}

/// Returns true if the value looks like a date or datetime.
pub fn is_temporal(s: &str) -> bool {
    DATETIME_ISO_PATTERN.is_match(s) || DATE_ISO_PATTERN.is_match(s) || DATE_LOCAL_PATTERN.is_match(s)
}

/// Detect the type of a single cell value.
pub fn detect_cell_type(value: &str) -> Type {
    let trimmed = value.trim();

    if is_null_token(trimmed) {
        return Type::Null;
    }

    if parse_int(trimmed).is_some() {
        return Type::Int;
    }

    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return Type::Bool;
    }

    if parse_float(trimmed).is_some() {
        return Type::Float;
    }

    if is_temporal(trimmed) {
        return Type::DateTime;
    }

    Type::Text
}

/// Infer the type of each of `num_cols` columns from raw string rows.
///
/// Every row is expected to have exactly `num_cols` fields.
pub fn infer_column_types<R: AsRef<[String]>>(rows: &[R], num_cols: usize) -> Vec<Type> {
    let mut types = vec![Type::Null; num_cols];
    for row in rows {
        for (merged, cell) in types.iter_mut().zip(row.as_ref()) {
            // Text absorbs everything, no need to look further
            if *merged != Type::Text {
                *merged = merged.merge(detect_cell_type(cell));
            }
        }
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_cell_type() {
        assert_eq!(detect_cell_type("123"), Type::Int);
        assert_eq!(detect_cell_type("-123"), Type::Int);
        assert_eq!(detect_cell_type("12.34"), Type::Float);
        assert_eq!(detect_cell_type("1e3"), Type::Float);
        assert_eq!(detect_cell_type("True"), Type::Bool);
        assert_eq!(detect_cell_type("2023-12-31"), Type::DateTime);
        assert_eq!(detect_cell_type("2023-12-31T12:30:45"), Type::DateTime);
        assert_eq!(detect_cell_type("31/12/2023 08:00"), Type::DateTime);
        assert_eq!(detect_cell_type("12,50"), Type::Text);
        assert_eq!(detect_cell_type("hello"), Type::Text);
        assert_eq!(detect_cell_type(""), Type::Null);
        assert_eq!(detect_cell_type("NULL"), Type::Null);
        assert_eq!(detect_cell_type("99999999999999999999"), Type::Float);
    }

    #[test]
    fn test_infer_column_types() {
        let rows = vec![
            vec!["1".to_string(), "hello".to_string(), "2023-01-01".to_string(), "".to_string()],
            vec!["2".to_string(), "world".to_string(), "2023-01-02".to_string(), "1.5".to_string()],
            vec!["".to_string(), "test".to_string(), "NA".to_string(), "2".to_string()],
        ];

        let types = infer_column_types(&rows, 4);
        assert_eq!(types, vec![Type::Int, Type::Text, Type::DateTime, Type::Float]);
    }

    #[test]
    fn test_all_null_column() {
        let rows = vec![vec!["".to_string()], vec!["NA".to_string()]];
        assert_eq!(infer_column_types(&rows, 1), vec![Type::Null]);
    }
}
