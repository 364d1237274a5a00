//! Replicate consolidation and the metadata / feature split.
//!
//! Columns whose name starts with [`METADATA_PREFIX`] are metadata; every
//! other column is a numeric feature.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::table::{FeatureMatrix, Table, Value};

/// Marks metadata columns in profile tables.
pub const METADATA_PREFIX: &str = "Metadata_";

pub fn is_metadata(column: &str) -> bool {
    column.starts_with(METADATA_PREFIX)
}

fn parse_feature(value: &Value, column: &str) -> Result<f64> {
    let text = value
        .as_text()
        .ok_or_else(|| Error::InvalidData(format!("feature '{column}' has a missing value")))?;
    let x: f64 = text
        .parse()
        .map_err(|_| Error::InvalidData(format!("feature '{column}' value '{text}' is not numeric")))?;
    if !x.is_finite() {
        return Err(Error::InvalidData(format!(
            "feature '{column}' value '{text}' is not finite"
        )));
    }
    Ok(x)
}

/// Median of a non-empty slice (mean of the two middle values when even).
pub fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// One row per distinct `key` value, in first-appearance order.
///
/// Feature columns become the median over the group's rows; metadata columns
/// keep the group's first row. Rows with a missing key are dropped.
pub fn consensus(table: &Table, key: &str) -> Result<Table> {
    let k = table.column_index(key)?;
    let feature_cols: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !is_metadata(c))
        .map(|(i, _)| i)
        .collect();

    let mut order: Vec<&Value> = Vec::new();
    let mut groups: HashMap<&Value, Vec<usize>> = HashMap::new();
    for (i, row) in table.rows().enumerate() {
        if row[k].is_missing() {
            continue;
        }
        let members = groups.entry(&row[k]).or_default();
        if members.is_empty() {
            order.push(&row[k]);
        }
        members.push(i);
    }

    let mut out = Table::new(table.columns().to_vec());
    let mut buf = Vec::new();
    for key_value in order {
        let members = &groups[key_value];
        let mut row = table.row(members[0]).to_vec();
        for &c in &feature_cols {
            buf.clear();
            for &m in members {
                buf.push(parse_feature(table.value(m, c), &table.columns()[c])?);
            }
            row[c] = Value::Text(median(&mut buf).to_string());
        }
        out.push_row(row)?;
    }

    log::info!(
        "consensus on {key}: {} rows -> {} profiles",
        table.n_rows(),
        out.n_rows()
    );
    Ok(out)
}

/// Separate metadata columns from the numeric feature matrix.
pub fn split_metadata_features(table: &Table) -> Result<(Table, FeatureMatrix)> {
    let meta_names: Vec<&str> = table
        .columns()
        .iter()
        .filter(|c| is_metadata(c))
        .map(String::as_str)
        .collect();
    let feature_cols: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !is_metadata(c))
        .map(|(i, _)| i)
        .collect();
    if feature_cols.is_empty() {
        return Err(Error::empty("feature columns"));
    }

    let meta = table.select(&meta_names)?;
    let mut feats = FeatureMatrix::new(feature_cols.len());
    let mut row = Vec::with_capacity(feature_cols.len());
    for r in 0..table.n_rows() {
        row.clear();
        for &c in &feature_cols {
            row.push(parse_feature(table.value(r, c), &table.columns()[c])?);
        }
        feats.push_row(&row)?;
    }
    log::debug!(
        "split {} metadata and {} feature columns",
        meta_names.len(),
        feature_cols.len()
    );
    Ok((meta, feats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replicates() -> Table {
        let cols = ["Metadata_gene", "Metadata_well", "f1", "f2"];
        let rows = [
            ["g1", "A01", "1.0", "10"],
            ["g2", "A02", "5", "0"],
            ["g1", "A03", "3.0", "20"],
            ["g1", "A04", "2.0", "-1"],
            ["g2", "A05", "7", "2"],
        ];
        Table::from_rows(
            cols.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| Value::parse(c)).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_consensus_median_and_first_metadata() {
        let c = consensus(&replicates(), "Metadata_gene").unwrap();
        assert_eq!(c.n_rows(), 2);
        assert_eq!(c.value(0, 0), &Value::from("g1"));
        assert_eq!(c.value(0, 1), &Value::from("A01"));
        let (_, f) = split_metadata_features(&c).unwrap();
        assert_eq!(f.row(0), &[2.0, 10.0]);
        assert_eq!(f.row(1), &[6.0, 1.0]);
    }

    #[test]
    fn test_split_rejects_bad_features() {
        let mut t = replicates();
        t.push_row(vec![
            Value::from("g3"),
            Value::from("A06"),
            Value::from("abc"),
            Value::from("1"),
        ])
        .unwrap();
        assert!(split_metadata_features(&t).is_err());

        let mut t = replicates();
        t.push_row(vec![
            Value::from("g3"),
            Value::from("A06"),
            Value::from("inf"),
            Value::from("1"),
        ])
        .unwrap();
        assert!(split_metadata_features(&t).is_err());
    }

    #[test]
    fn test_split_without_features_is_error() {
        let t = replicates().select(&["Metadata_gene"]).unwrap();
        assert!(matches!(
            split_metadata_features(&t),
            Err(Error::EmptyInput { .. })
        ));
    }

    #[test]
    fn test_split_keeps_metadata_order() {
        let (m, f) = split_metadata_features(&replicates()).unwrap();
        assert_eq!(m.columns(), &["Metadata_gene".to_string(), "Metadata_well".to_string()][..]);
        assert_eq!(f.n_rows(), 5);
        assert_eq!(f.n_cols(), 2);
    }
}
