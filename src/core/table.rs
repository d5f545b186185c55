//! Tabular payload data

use crate::core::types::TypeError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A rectangular table of JSON values with named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from column names and rows, checking row widths
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, TypeError> {
        let table = Self { columns, rows };
        table.check_shape()?;
        Ok(table)
    }

    /// Parse CSV text; the first record is the header
    ///
    /// Cells are typed the way a data-frame reader would: integers and floats
    /// become numbers, empty cells become null, everything else stays text.
    pub fn from_csv(text: &str) -> Result<Self, TypeError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());

        let columns = reader
            .headers()
            .map_err(|e| TypeError::InvalidTable(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| TypeError::InvalidTable(e.to_string()))?;
            rows.push(record.iter().map(infer_cell).collect());
        }

        Self::from_rows(columns, rows)
    }

    /// Render as CSV with a header row
    pub fn to_csv(&self) -> Result<String, TypeError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|e| TypeError::InvalidTable(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(render_cell))
                .map_err(|e| TypeError::InvalidTable(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| TypeError::InvalidTable(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| TypeError::InvalidTable(e.to_string()))
    }

    /// Accept either CSV text or a structured `{columns, rows}` value
    pub fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::String(text) => Self::from_csv(text),
            Value::Object(_) => {
                let table: Table = serde_json::from_value(value.clone())
                    .map_err(|e| TypeError::InvalidTable(e.to_string()))?;
                table.check_shape()?;
                Ok(table)
            }
            other => Err(TypeError::Mismatch {
                expected: "table".to_string(),
                found: other.to_string(),
            }),
        }
    }

    pub fn into_value(self) -> Value {
        json!({ "columns": self.columns, "rows": self.rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Replace a column's values, appending the column if it does not exist
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), TypeError> {
        if values.len() != self.rows.len() {
            return Err(TypeError::InvalidTable(format!(
                "column '{}' has {} value(s) but the table has {} row(s)",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        match self.column_index(name) {
            Some(index) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Required columns this table does not offer
    pub fn missing_columns(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|c| !self.columns.contains(c))
            .cloned()
            .collect()
    }

    /// First `rows` rows of the table
    pub fn head(&self, rows: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(rows).cloned().collect(),
        }
    }

    fn check_shape(&self) -> Result<(), TypeError> {
        let width = self.columns.len();
        if let Some((i, row)) = self.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(TypeError::InvalidTable(format!(
                "row {} has {} cell(s), expected {}",
                i,
                row.len(),
                width
            )));
        }
        Ok(())
    }
}

fn infer_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    Value::String(cell.to_string())
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
