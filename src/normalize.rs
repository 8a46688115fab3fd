//! Column coercions applied once after parsing.
//!
//! Each rule targets a named column and is skipped when the column is
//! missing. A value that cannot be coerced becomes null; nothing here fails.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::field_type::Type;
use crate::table::Table;
use crate::value::{Value, parse_float, parse_int};

/// Date format preference for ambiguous numeric dates such as `01/02/2024`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePreference {
    /// Day-Month-Year format (e.g., 31/12/2023).
    DmyFormat,
    /// Month-Day-Year format (e.g., 12/31/2023).
    #[default]
    MdyFormat,
}

impl DatePreference {
    /// Returns true if day comes before month in ambiguous dates.
    pub fn is_dmy(&self) -> bool {
        matches!(self, DatePreference::DmyFormat)
    }
}

/// Which columns get which coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeRules {
    /// Parsed into canonical timestamp text.
    pub date_column: String,
    /// Decimal-comma text coerced to float.
    pub money_column: String,
    /// Coerced to nullable integer.
    pub quantity_column: String,
    pub date_preference: DatePreference,
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self {
            date_column: "date_purchase".to_string(),
            money_column: "gmv_success".to_string(),
            quantity_column: "total_tickets_quantity_success".to_string(),
            date_preference: DatePreference::default(),
        }
    }
}

/// Apply every rule whose column exists in `table`.
pub fn normalize(table: &mut Table, rules: &NormalizeRules) {
    if table.is_empty() {
        return;
    }
    if let Some(idx) = table.column_index(&rules.date_column) {
        normalize_dates(table, idx, rules.date_preference);
    }
    if let Some(idx) = table.column_index(&rules.money_column) {
        normalize_money(table, idx);
    }
    if let Some(idx) = table.column_index(&rules.quantity_column) {
        normalize_quantity(table, idx);
    }
}

fn normalize_dates(table: &mut Table, idx: usize, preference: DatePreference) {
    let parsed: Vec<Option<NaiveDateTime>> = table
        .column_values(idx)
        .map(|v| {
            if v.is_null() {
                None
            } else {
                parse_timestamp(&v.to_text(), preference)
            }
        })
        .collect();

    let invalid = table
        .column_values(idx)
        .zip(&parsed)
        .filter(|(v, p)| !v.is_null() && p.is_none())
        .count();
    if invalid > 0 {
        tracing::warn!(column = %table.columns()[idx].name, invalid, "unparseable dates set to null");
    }

    // Date-only text when no value carries a time of day
    let with_time = parsed.iter().flatten().any(|ts| !is_midnight(ts));
    let format = if with_time { "%Y-%m-%d %H:%M:%S%.f" } else { "%Y-%m-%d" };

    let values = parsed
        .into_iter()
        .map(|ts| ts.map_or(Value::Null, |ts| Value::Text(ts.format(format).to_string())))
        .collect();
    table.replace_column(idx, Type::DateTime, values);
}

fn normalize_money(table: &mut Table, idx: usize) {
    if !matches!(table.columns()[idx].ty, Type::Text | Type::DateTime) {
        return;
    }
    let values = table
        .column_values(idx)
        .map(|v| match v {
            Value::Text(s) => parse_float(&s.trim().replace(',', ".")).map_or(Value::Null, Value::Float),
            _ => Value::Null,
        })
        .collect();
    table.replace_column(idx, Type::Float, values);
}

fn normalize_quantity(table: &mut Table, idx: usize) {
    let values = table.column_values(idx).map(to_nullable_int).collect();
    table.replace_column(idx, Type::Int, values);
}

fn to_nullable_int(value: &Value) -> Value {
    match value {
        Value::Int(i) => Value::Int(*i),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Float(f) => float_to_int(*f),
        Value::Text(s) => {
            let s = s.trim();
            match parse_int(s) {
                Some(i) => Value::Int(i),
                None => parse_float(s).map_or(Value::Null, float_to_int),
            }
        }
        Value::Null => Value::Null,
    }
}

fn float_to_int(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::Int(f as i64)
    } else {
        Value::Null
    }
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const MDY_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M", "%m/%d/%Y", "%m-%d-%Y"];

const DMY_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M", "%d/%m/%Y", "%d-%m-%Y"];

const DOTTED_FORMATS: &[&str] = &["%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M", "%d.%m.%Y"];

/// Parse a timestamp in any of the accepted layouts.
///
/// Offsets are converted to UTC. Ambiguous `a/b/yyyy` dates are read in the
/// preferred order first and in the other order if that fails.
pub fn parse_timestamp(s: &str, preference: DatePreference) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(naive) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        return parse_naive(naive, DATETIME_FORMATS);
    }

    if let Some(ts) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
    {
        return Some(ts.naive_utc());
    }

    if let Some(ts) = parse_naive(s, DATETIME_FORMATS) {
        return Some(ts);
    }

    if let Some(ts) = parse_naive(s, DATE_FORMATS).or_else(|| parse_naive(s, DOTTED_FORMATS)) {
        return Some(ts);
    }

    let (first, second) = if preference.is_dmy() {
        (DMY_FORMATS, MDY_FORMATS)
    } else {
        (MDY_FORMATS, DMY_FORMATS)
    };
    parse_naive(s, first).or_else(|| parse_naive(s, second))
}

/// Try each format as a datetime, then as a bare date at midnight.
fn parse_naive(s: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(s, fmt).ok().map(|d| d.and_time(NaiveTime::MIN)))
    })
}

fn is_midnight(ts: &NaiveDateTime) -> bool {
    ts.num_seconds_from_midnight() == 0 && ts.nanosecond() == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s, DatePreference::MdyFormat).unwrap()
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        assert_eq!(ts("2024-03-15").to_string(), "2024-03-15 00:00:00");
        assert_eq!(ts("2024/03/15").to_string(), "2024-03-15 00:00:00");
        assert_eq!(ts("2024-03-15 10:30:00").to_string(), "2024-03-15 10:30:00");
        assert_eq!(ts("2024-03-15T10:30").to_string(), "2024-03-15 10:30:00");
        assert_eq!(ts("2024-03-15T10:30:00Z").to_string(), "2024-03-15 10:30:00");
        assert_eq!(ts("2024-03-15T10:30:00-03:00").to_string(), "2024-03-15 13:30:00");
        assert_eq!(ts("15.03.2024").to_string(), "2024-03-15 00:00:00");
        assert!(is_midnight(&ts("2024-03-15")));
    }

    #[test]
    fn test_ambiguous_dates_follow_preference() {
        let mdy = parse_timestamp("01/02/2024", DatePreference::MdyFormat).unwrap();
        let dmy = parse_timestamp("01/02/2024", DatePreference::DmyFormat).unwrap();
        assert_eq!(mdy.date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(dmy.date(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());

        // Only valid day-first
        let swapped = parse_timestamp("31/12/2023", DatePreference::MdyFormat).unwrap();
        assert_eq!(swapped.date(), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_parse_timestamp_garbage() {
        assert!(parse_timestamp("not a date", DatePreference::MdyFormat).is_none());
        assert!(parse_timestamp("2024-13-45", DatePreference::MdyFormat).is_none());
    }

    fn table(columns: &[(&str, Type)], rows: Vec<Vec<Value>>) -> Table {
        Table::new(
            columns.iter().map(|(n, t)| Column::new(*n, *t)).collect(),
            rows,
        )
    }

    #[test]
    fn test_dates_canonical_text() {
        let mut t = table(
            &[("date_purchase", Type::DateTime)],
            vec![
                vec![Value::Text("2024-03-15".into())],
                vec![Value::Text("garbage".into())],
                vec![Value::Null],
            ],
        );
        normalize(&mut t, &NormalizeRules::default());
        assert_eq!(
            t.column_values(0).cloned().collect::<Vec<_>>(),
            vec![Value::Text("2024-03-15".into()), Value::Null, Value::Null]
        );
        assert_eq!(t.columns()[0].ty, Type::DateTime);
    }

    #[test]
    fn test_dates_with_time_keep_time_for_whole_column() {
        let mut t = table(
            &[("date_purchase", Type::DateTime)],
            vec![
                vec![Value::Text("2024-03-15".into())],
                vec![Value::Text("2024-03-16 08:05:00".into())],
            ],
        );
        normalize(&mut t, &NormalizeRules::default());
        assert_eq!(t.rows()[0][0], Value::Text("2024-03-15 00:00:00".into()));
        assert_eq!(t.rows()[1][0], Value::Text("2024-03-16 08:05:00".into()));
    }

    #[test]
    fn test_money_decimal_comma() {
        let mut t = table(
            &[("gmv_success", Type::Text)],
            vec![
                vec![Value::Text("12,50".into())],
                vec![Value::Text("abc".into())],
                vec![Value::Text("7".into())],
                vec![Value::Null],
            ],
        );
        normalize(&mut t, &NormalizeRules::default());
        assert_eq!(t.columns()[0].ty, Type::Float);
        assert_eq!(
            t.column_values(0).cloned().collect::<Vec<_>>(),
            vec![Value::Float(12.5), Value::Null, Value::Float(7.0), Value::Null]
        );
    }

    #[test]
    fn test_numeric_money_untouched() {
        let mut t = table(&[("gmv_success", Type::Int)], vec![vec![Value::Int(3)]]);
        normalize(&mut t, &NormalizeRules::default());
        assert_eq!(t.columns()[0].ty, Type::Int);
        assert_eq!(t.rows()[0][0], Value::Int(3));
    }

    #[test]
    fn test_quantity_nullable_int() {
        let mut t = table(
            &[("total_tickets_quantity_success", Type::Text)],
            vec![
                vec![Value::Text("2".into())],
                vec![Value::Text("3.0".into())],
                vec![Value::Text("1.5".into())],
                vec![Value::Text("x".into())],
                vec![Value::Null],
            ],
        );
        normalize(&mut t, &NormalizeRules::default());
        assert_eq!(t.columns()[0].ty, Type::Int);
        assert_eq!(
            t.column_values(0).cloned().collect::<Vec<_>>(),
            vec![Value::Int(2), Value::Int(3), Value::Null, Value::Null, Value::Null]
        );
    }

    #[test]
    fn test_missing_columns_noop() {
        let mut t = table(&[("other", Type::Text)], vec![vec![Value::Text("12,50".into())]]);
        let before = t.clone();
        normalize(&mut t, &NormalizeRules::default());
        assert_eq!(t, before);
    }
}
