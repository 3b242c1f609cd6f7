//! In-memory tabular results returned by the engine.
//!
//! A `TabularResult` is an ordered sequence of rows sharing one ordered list of
//! column names. Cells are carried as text: the output format is CSV and the
//! engine's typed values are rendered by the connector. `NULL` is the empty
//! string.

use std::io::Write;

use csv::{Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A single row of cell values, in column order.
pub type Row = Vec<String>;

/// Rows plus the column names they share.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl TabularResult {
    /// Creates a result, checking every row has one cell per column.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidArgument` if a row is ragged.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, AppError> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(AppError::InvalidArgument(format!(
                "Row {} has {} cells, expected {}",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Creates a result with columns and no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the first cell of the first row, if any.
    pub fn first_cell(&self) -> Option<&str> {
        self.rows.first().and_then(|r| r.first()).map(String::as_str)
    }

    /// Writes the header line followed by every row as comma-separated text,
    /// each line terminated by `\n`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Artifact` if serialization or the underlying write fails.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), AppError> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(out);

        writer
            .write_record(&self.columns)
            .map_err(|e| AppError::Artifact(format!("Failed to write header: {}", e)))?;

        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| AppError::Artifact(format!("Failed to write row: {}", e)))?;
        }

        writer
            .flush()
            .map_err(|e| AppError::Artifact(format!("Failed to flush CSV writer: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let result = TabularResult::new(cols(&["a", "b"]), vec![cols(&["1"])]);
        match result {
            Err(AppError::InvalidArgument(msg)) => assert!(msg.contains("expected 2")),
            other => panic!("Expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn write_csv_emits_header_then_rows() {
        let table = TabularResult::new(
            cols(&["id", "name"]),
            vec![cols(&["1", "Alice"]), cols(&["2", "Bob"])],
        )
        .unwrap();

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "id,name\n1,Alice\n2,Bob\n");
    }

    #[test]
    fn write_csv_quotes_special_characters() {
        let table = TabularResult::new(
            cols(&["id", "note"]),
            vec![
                cols(&["1", "Contains, comma"]),
                cols(&["2", "Has \"quotes\""]),
                cols(&["3", "Multi\nline"]),
            ],
        )
        .unwrap();

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let records: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(|s| s.to_string()).collect())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0][1], "Contains, comma");
        assert_eq!(records[1][1], "Has \"quotes\"");
        assert_eq!(records[2][1], "Multi\nline");
    }

    #[test]
    fn empty_table_writes_header_only() {
        let table = TabularResult::empty(cols(&["a", "b"]));
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        assert_eq!(buf, b"a,b\n");
        assert!(table.is_empty());
        assert_eq!(table.first_cell(), None);
    }
}
