//! In-memory tables: string-valued metadata cells and dense feature rows.
//!
//! [`Table`] is a minimal row-major frame with just the operations the
//! evaluation pipeline needs (projection, filtering, semi/inner joins).
//! [`FeatureMatrix`] holds the numeric profile vectors, one row per item.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cells spelled like this are read as missing.
const MISSING_TOKENS: &[&str] = &["", "NA", "NaN", "nan", "None", "null"];

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// A single metadata cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Missing,
    Text(String),
    /// Sorted, deduplicated set of labels (a multi-label field).
    Labels(Vec<String>),
}

impl Value {
    /// Interpret a raw text cell, mapping the usual NA spellings to `Missing`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if MISSING_TOKENS.contains(&trimmed) {
            Self::Missing
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    /// Split a delimited string into a label set. Empty tokens are dropped.
    pub fn labels(raw: &str, separator: char) -> Self {
        let mut labels: Vec<String> = raw
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        labels.sort();
        labels.dedup();
        Self::Labels(labels)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Labels of a multi-label cell. A text cell is treated as a one-label set.
    pub fn label_set(&self) -> &[String] {
        match self {
            Self::Labels(labels) => labels,
            Self::Text(s) => std::slice::from_ref(s),
            Self::Missing => &[],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Text(s) => write!(f, "{s}"),
            Self::Labels(labels) => write!(f, "{}", labels.join("|")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Named columns of [`Value`]s, stored row-major.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table, checking that every row matches the header width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidData(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a column; `values` must have one entry per row.
    pub fn push_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(Error::InvalidData(format!(
                "column '{name}' has {} values, table has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        if self.columns.iter().any(|c| c == name) {
            return Err(Error::InvalidData(format!("duplicate column '{name}'")));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Re-read a text column as `separator`-delimited label sets. Missing
    /// cells become empty sets.
    pub fn parse_labels(&mut self, name: &str, separator: char) -> Result<()> {
        let c = self.column_index(name)?;
        for row in &mut self.rows {
            let labels = match &row[c] {
                Value::Text(s) => Value::labels(s, separator),
                Value::Missing => Value::Labels(Vec::new()),
                Value::Labels(_) => continue,
            };
            row[c] = labels;
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::missing_column(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn row(&self, i: usize) -> &[Value] {
        &self.rows[i]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn value(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }

    /// Keep rows for which `keep` returns true.
    pub fn filter_rows(mut self, mut keep: impl FnMut(&[Value]) -> bool) -> Self {
        self.rows.retain(|row| keep(row.as_slice()));
        self
    }

    /// Keep rows whose `key` cell is text contained in `ids`.
    pub fn semi_join(self, key: &str, ids: &HashSet<String>) -> Result<Self> {
        let k = self.column_index(key)?;
        Ok(self.filter_rows(|row| row[k].as_text().is_some_and(|id| ids.contains(id))))
    }

    /// Project onto `names`, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let idx: Vec<usize> = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<_>>()?;
        Ok(Self {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| idx.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Inner join on `key`: left row order is kept; each left row is followed
    /// by one output row per matching right row, in right order. The right key
    /// column is dropped. Rows with a missing key never match.
    pub fn inner_join(&self, other: &Table, key: &str) -> Result<Self> {
        let lk = self.column_index(key)?;
        let rk = other.column_index(key)?;

        let right_cols: Vec<usize> = (0..other.columns.len()).filter(|&c| c != rk).collect();
        for &c in &right_cols {
            if self.has_column(&other.columns[c]) {
                return Err(Error::InvalidData(format!(
                    "join on '{key}' would duplicate column '{}'",
                    other.columns[c]
                )));
            }
        }

        let mut index: HashMap<&Value, Vec<usize>> = HashMap::new();
        for (i, row) in other.rows.iter().enumerate() {
            if !row[rk].is_missing() {
                index.entry(&row[rk]).or_default().push(i);
            }
        }

        let mut columns = self.columns.clone();
        columns.extend(right_cols.iter().map(|&c| other.columns[c].clone()));

        let mut rows = Vec::new();
        for row in &self.rows {
            let Some(matches) = index.get(&row[lk]) else {
                continue;
            };
            for &m in matches {
                let mut joined = row.clone();
                joined.extend(right_cols.iter().map(|&c| other.rows[m][c].clone()));
                rows.push(joined);
            }
        }

        Ok(Self { columns, rows })
    }
}

// ---------------------------------------------------------------------------
// Feature matrix
// ---------------------------------------------------------------------------

/// Dense row-major `f64` matrix, one row per item.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_cols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            data: Vec::new(),
        }
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::new(n_cols);
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.n_cols {
            return Err(Error::InvalidData(format!(
                "feature row has {} values, expected {}",
                row.len(),
                self.n_cols
            )));
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        if self.n_cols == 0 {
            0
        } else {
            self.data.len() / self.n_cols
        }
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }
}
