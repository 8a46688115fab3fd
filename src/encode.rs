//! JSON array and newline-delimited JSON encoders over a [`RowView`].

use std::io::{self, Read};
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::cache::Dataset;
use crate::error::Result;
use crate::query::RowView;
use crate::table::Table;

/// One row as a JSON object, keys in view column order.
pub struct RowRef<'a> {
    table: &'a Table,
    columns: &'a [usize],
    row: usize,
}

impl<'a> RowRef<'a> {
    pub fn new(table: &'a Table, columns: &'a [usize], row: usize) -> Self {
        Self {
            table,
            columns,
            row,
        }
    }
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let cells = &self.table.rows()[self.row];
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for &c in self.columns {
            map.serialize_entry(&self.table.columns()[c].name, &cells[c])?;
        }
        map.end()
    }
}

struct RowsRef<'a> {
    table: &'a Table,
    view: &'a RowView,
}

impl Serialize for RowsRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.view.len()))?;
        for &row in &self.view.rows {
            seq.serialize_element(&RowRef::new(self.table, &self.view.columns, row))?;
        }
        seq.end()
    }
}

/// Encode the view as a single JSON array of objects.
pub fn to_json_array(table: &Table, view: &RowView) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(view.len() * 64 + 2);
    serde_json::to_writer(&mut out, &RowsRef { table, view })?;
    Ok(out)
}

/// Lazily serialized NDJSON, one row per line.
///
/// Holds its own dataset snapshot, so it can outlive the request that built
/// it and is unaffected by a concurrent reload. Consumed once.
pub struct NdjsonStream {
    dataset: Arc<Dataset>,
    view: RowView,
    next: usize,
    buf: Vec<u8>,
    pos: usize,
}

impl NdjsonStream {
    pub fn new(dataset: Arc<Dataset>, view: RowView) -> Self {
        Self {
            dataset,
            view,
            next: 0,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Rows not yet emitted.
    pub fn remaining(&self) -> usize {
        self.view.len() - self.next
    }

    fn encode_next(&mut self, out: &mut Vec<u8>) -> Option<serde_json::Result<()>> {
        let &row = self.view.rows.get(self.next)?;
        self.next += 1;
        let row = RowRef::new(&self.dataset.table, &self.view.columns, row);
        Some(serde_json::to_writer(&mut *out, &row).map(|()| out.push(b'\n')))
    }
}

impl Iterator for NdjsonStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let mut line = Vec::new();
            match self.encode_next(&mut line)? {
                // serde_json only writes valid UTF-8
                Ok(()) => return Some(String::from_utf8_lossy(&line).into_owned()),
                Err(e) => tracing::error!(error = %e, "skipping row that failed to encode"),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl Read for NdjsonStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.buf.len() {
            let mut buf = std::mem::take(&mut self.buf);
            buf.clear();
            self.pos = 0;
            let encoded = self.encode_next(&mut buf);
            self.buf = buf;
            match encoded {
                None => return Ok(0),
                Some(r) => r.map_err(io::Error::other)?,
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::Type;
    use crate::table::Column;
    use crate::value::Value;
    use serde_json::json;

    fn dataset() -> Arc<Dataset> {
        let table = Table::new(
            vec![
                Column::new("nome", Type::Text),
                Column::new("valor", Type::Float),
                Column::new("qtd", Type::Int),
            ],
            vec![
                vec![Value::Text("São Paulo".into()), Value::Float(12.5), Value::Int(2)],
                vec![Value::Null, Value::Float(f64::NAN), Value::Null],
            ],
        );
        Arc::new(Dataset::new(table))
    }

    fn full_view(d: &Dataset) -> RowView {
        RowView {
            columns: (0..d.table.num_columns()).collect(),
            rows: (0..d.table.num_rows()).collect(),
        }
    }

    #[test]
    fn test_json_array() {
        let d = dataset();
        let bytes = to_json_array(&d.table, &full_view(&d)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            r#"[{"nome":"São Paulo","valor":12.5,"qtd":2},{"nome":null,"valor":null,"qtd":null}]"#
        );
    }

    #[test]
    fn test_projection_order() {
        let d = dataset();
        let view = RowView {
            columns: vec![2, 0],
            rows: vec![0],
        };
        let bytes = to_json_array(&d.table, &view).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"[{"qtd":2,"nome":"São Paulo"}]"#);
    }

    #[test]
    fn test_empty_view() {
        let d = dataset();
        let bytes = to_json_array(&d.table, &RowView::default()).unwrap();
        assert_eq!(bytes, b"[]");
        assert_eq!(NdjsonStream::new(d, RowView::default()).count(), 0);
    }

    #[test]
    fn test_ndjson_matches_array() {
        let d = dataset();
        let view = full_view(&d);
        let array: serde_json::Value =
            serde_json::from_slice(&to_json_array(&d.table, &view).unwrap()).unwrap();

        let lines: Vec<String> = NdjsonStream::new(Arc::clone(&d), view).collect();
        assert!(lines.iter().all(|l| l.ends_with('\n')));
        let rows: Vec<serde_json::Value> =
            lines.iter().map(|l| serde_json::from_str(l).unwrap()).collect();

        assert_eq!(serde_json::Value::Array(rows), array);
        assert_eq!(array[0], json!({"nome": "São Paulo", "valor": 12.5, "qtd": 2}));
    }

    #[test]
    fn test_ndjson_read_small_buffer() {
        let d = dataset();
        let view = full_view(&d);
        let expected: String = NdjsonStream::new(Arc::clone(&d), view.clone()).collect();

        let mut stream = NdjsonStream::new(d, view);
        let mut out = Vec::new();
        let mut chunk = [0u8; 7];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }
}
