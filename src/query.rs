//! Filter, project and paginate a table without copying cells.

use std::borrow::Cow;
use std::fmt;
use std::num::IntErrorKind;

use crate::table::Table;

/// Response encoding requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A single JSON array of row objects.
    #[default]
    Json,
    /// One JSON object per line.
    Ndjson,
}

impl OutputFormat {
    /// Anything other than `ndjson` (case-insensitive) is array JSON.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("ndjson") {
            OutputFormat::Ndjson
        } else {
            OutputFormat::Json
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Json => "application/json",
            OutputFormat::Ndjson => "application/x-ndjson",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Ndjson => write!(f, "ndjson"),
        }
    }
}

/// Parameters of a data query. Empty strings mean "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    /// Exact match against the key column.
    pub cliente: String,
    /// Prefix match against the date column.
    pub data: String,
    /// Comma-separated projection.
    pub cols: String,
    /// 0 means unbounded.
    pub limit: usize,
    pub offset: usize,
    pub format: OutputFormat,
}

impl QueryParams {
    /// Parse an URL query string (without the leading `?`).
    ///
    /// Unknown keys are ignored, the last occurrence of a key wins and
    /// malformed numbers read as 0.
    pub fn from_query_string(query: &str) -> Self {
        let mut params = QueryParams::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key);
            let value = decode_component(value);
            match &*key {
                "cliente" => params.cliente = value.into_owned(),
                "data" => params.data = value.into_owned(),
                "cols" => params.cols = value.into_owned(),
                "limit" => params.limit = lenient_usize(&value),
                "offset" => params.offset = lenient_usize(&value),
                "format" => params.format = OutputFormat::parse(&value),
                _ => {}
            }
        }
        params
    }

    /// Requested column names in order: trimmed, non-empty, deduplicated.
    pub fn requested_columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.cols.split(',').map(str::trim) {
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// `+` is a space in form encoding; invalid escapes are kept as written.
fn decode_component(s: &str) -> Cow<'_, str> {
    let spaced: Cow<'_, str> = if s.contains('+') {
        Cow::Owned(s.replace('+', " "))
    } else {
        Cow::Borrowed(s)
    };
    match urlencoding::decode(&spaced) {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(_) => spaced,
    }
}

/// Negative or non-numeric values read as 0; values too large saturate.
fn lenient_usize(s: &str) -> usize {
    match s.trim().parse::<i64>() {
        Ok(n) => usize::try_from(n).unwrap_or(0),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => usize::MAX,
        Err(_) => 0,
    }
}

/// Names of the columns the filters apply to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryColumns {
    pub key: String,
    pub date: String,
}

impl Default for QueryColumns {
    fn default() -> Self {
        Self {
            key: "fk_contact".to_string(),
            date: "date_purchase".to_string(),
        }
    }
}

/// Selected rows and columns of a table, by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowView {
    pub columns: Vec<usize>,
    pub rows: Vec<usize>,
}

impl RowView {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Run the pipeline: exact filter, prefix filter, projection, pagination.
pub fn run(table: &Table, params: &QueryParams, names: &QueryColumns) -> RowView {
    let mut rows: Vec<usize> = (0..table.num_rows()).collect();

    if !params.cliente.is_empty()
        && let Some(key) = table.column_index(&names.key)
    {
        rows.retain(|&r| table.rows()[r][key].to_text() == params.cliente.as_str());
    }

    if !params.data.is_empty()
        && let Some(date) = table.column_index(&names.date)
    {
        rows.retain(|&r| {
            let value = &table.rows()[r][date];
            !value.is_null() && value.to_text().starts_with(params.data.as_str())
        });
    }

    let columns = if params.cols.is_empty() {
        (0..table.num_columns()).collect()
    } else {
        params
            .requested_columns()
            .into_iter()
            .filter_map(|name| table.column_index(name))
            .collect()
    };

    let rows = rows
        .into_iter()
        .skip(params.offset)
        .take(if params.limit == 0 { usize::MAX } else { params.limit })
        .collect();

    RowView { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::Type;
    use crate::table::Column;
    use crate::value::Value;

    fn sample() -> Table {
        let columns = vec![
            Column::new("fk_contact", Type::Int),
            Column::new("date_purchase", Type::DateTime),
            Column::new("gmv_success", Type::Float),
        ];
        let rows = (0..10)
            .map(|i| {
                vec![
                    Value::Int(i % 3),
                    if i == 9 {
                        Value::Null
                    } else {
                        Value::Text(format!("2024-0{}-1{}", 1 + i % 2, i))
                    },
                    Value::Float(i as f64),
                ]
            })
            .collect();
        Table::new(columns, rows)
    }

    fn query(q: &str) -> RowView {
        run(&sample(), &QueryParams::from_query_string(q), &QueryColumns::default())
    }

    #[test]
    fn test_from_query_string() {
        let p = QueryParams::from_query_string("cliente=%2042&cols=a,b&limit=5&offset=-2&format=NDJSON&x=1");
        assert_eq!(p.cliente, " 42");
        assert_eq!(p.cols, "a,b");
        assert_eq!(p.limit, 5);
        assert_eq!(p.offset, 0);
        assert_eq!(p.format, OutputFormat::Ndjson);

        let p = QueryParams::from_query_string("limit=abc&data=2024-01&format=csv");
        assert_eq!(p.limit, 0);
        assert_eq!(p.data, "2024-01");
        assert_eq!(p.format, OutputFormat::Json);

        assert_eq!(QueryParams::from_query_string(""), QueryParams::default());
        assert_eq!(QueryParams::from_query_string("cols=a+b").cols, "a b");
    }

    #[test]
    fn test_no_params_selects_everything() {
        let view = query("");
        assert_eq!(view.rows, (0..10).collect::<Vec<_>>());
        assert_eq!(view.columns, vec![0, 1, 2]);
    }

    #[test]
    fn test_exact_filter() {
        assert_eq!(query("cliente=1").rows, vec![1, 4, 7]);
        assert!(query("cliente=does-not-exist").is_empty());
    }

    #[test]
    fn test_prefix_filter_skips_nulls() {
        assert_eq!(query("data=2024-02").rows, vec![1, 3, 5, 7]);
        assert_eq!(query("data=2024").len(), 9);
    }

    #[test]
    fn test_filters_compose() {
        assert_eq!(query("cliente=0&data=2024-01").rows, vec![0, 6]);
    }

    #[test]
    fn test_pagination() {
        assert_eq!(query("offset=3&limit=4").rows, vec![3, 4, 5, 6]);
        assert_eq!(query("offset=8&limit=4").rows, vec![8, 9]);
        assert!(query("offset=50").is_empty());
        assert_eq!(query("limit=2").rows, vec![0, 1]);
    }

    #[test]
    fn test_exact_filter_keeps_whitespace() {
        let table = Table::new(
            vec![Column::new("fk_contact", Type::Text)],
            vec![
                vec![Value::Text(" A1".into())],
                vec![Value::Text("A1".into())],
                vec![Value::Text("B2".into())],
            ],
        );
        let rows = |q: &str| run(&table, &QueryParams::from_query_string(q), &QueryColumns::default()).rows;
        assert_eq!(rows("cliente=%20A1"), vec![0]);
        assert_eq!(rows("cliente=A1"), vec![1]);
        assert_eq!(rows("cliente=A1%20"), Vec::<usize>::new());
    }

    #[test]
    fn test_oversized_numbers_saturate() {
        let p = QueryParams::from_query_string("offset=99999999999999999999&limit=-99999999999999999999");
        assert_eq!(p.offset, usize::MAX);
        assert_eq!(p.limit, 0);
        assert!(query("offset=99999999999999999999").is_empty());
        assert_eq!(query("limit=99999999999999999999").len(), 10);
        assert_eq!(QueryParams::from_query_string("offset=12x").offset, 0);
    }

    #[test]
    fn test_projection() {
        assert_eq!(query("cols=gmv_success, fk_contact").columns, vec![2, 0]);
        assert_eq!(query("cols=gmv_success,nope,gmv_success").columns, vec![2]);
        assert!(query("cols=nope").columns.is_empty());
        assert_eq!(query("cols=nope").len(), 10);
        assert!(query("cols=%20").columns.is_empty());
        assert!(query("cols=,,").columns.is_empty());
        assert_eq!(query("cols=").columns, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_filter_column_is_noop() {
        let table = Table::new(vec![Column::new("other", Type::Int)], vec![vec![Value::Int(1)]]);
        let view = run(
            &table,
            &QueryParams::from_query_string("cliente=2&data=2024"),
            &QueryColumns::default(),
        );
        assert_eq!(view.rows, vec![0]);
    }

    #[test]
    fn test_empty_table() {
        let view = run(&Table::empty(), &QueryParams::default(), &QueryColumns::default());
        assert!(view.is_empty());
        assert!(view.columns.is_empty());
    }
}
