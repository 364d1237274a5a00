//! Result tables and their on-disk form.
//!
//! - `{label}_retrieval.csv`: aggregated rows of every configuration, tagged
//!   with `Profile_type`
//! - `{label}_retrieval.json`: run manifest (configuration, version, outcome
//!   of each configuration)
//! - per-item AP tables written by the `score` command

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::average_precision::ApTable;
use crate::config::PipelineConfig;
use crate::delimited::write_records;
use crate::error::{Error, Result};
use crate::map::{MapRecord, MapTable};

/// Column naming the configuration that produced a row.
pub const PROFILE_TYPE_COL: &str = "Profile_type";

fn fmt_bool(b: bool) -> String {
    if b { "True" } else { "False" }.to_string()
}

fn fmt_opt(x: Option<f64>) -> String {
    x.map(|v| v.to_string()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Aggregated rows gathered across configurations, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultAccumulator {
    key_fields: Vec<String>,
    rows: Vec<(String, MapRecord)>,
}

impl ResultAccumulator {
    pub fn new(key_fields: Vec<String>) -> Self {
        Self {
            key_fields,
            rows: Vec::new(),
        }
    }

    /// Append every row of `table`, tagged with `profile_type`.
    pub fn push(&mut self, profile_type: &str, table: &MapTable) -> Result<()> {
        if table.key_fields != self.key_fields {
            return Err(Error::InvalidData(format!(
                "result keyed by {:?} cannot join accumulator keyed by {:?}",
                table.key_fields, self.key_fields
            )));
        }
        self.rows.extend(
            table
                .rows
                .iter()
                .map(|r| (profile_type.to_string(), r.clone())),
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &MapRecord)> {
        self.rows.iter().map(|(t, r)| (t.as_str(), r))
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = self.key_fields.clone();
        header.extend(
            [
                "mean_average_precision",
                "n_items",
                "p_value",
                "corrected_p_value",
                "below_p",
                "below_corrected_p",
                "-log10(p_value)",
                PROFILE_TYPE_COL,
            ]
            .map(String::from),
        );
        header
    }

    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|(profile_type, r)| {
                let mut row = r.key.clone();
                row.extend([
                    r.mean_average_precision.to_string(),
                    r.n_items.to_string(),
                    r.p_value.to_string(),
                    r.corrected_p_value.to_string(),
                    fmt_bool(r.below_p),
                    fmt_bool(r.below_corrected_p),
                    r.neg_log10_p().to_string(),
                    profile_type.clone(),
                ]);
                row
            })
            .collect()
    }
}

/// Write the accumulated aggregated table.
pub fn write_map_results(path: &Path, results: &ResultAccumulator) -> Result<()> {
    ensure_parent(path)?;
    write_records(path, &results.header(), &results.records())?;
    log::info!("wrote {} rows to {}", results.len(), path.display());
    Ok(())
}

/// Write one run's aggregated table without a `Profile_type` column.
pub fn write_map_table(path: &Path, table: &MapTable) -> Result<()> {
    let mut acc = ResultAccumulator::new(table.key_fields.clone());
    acc.push("", table)?;
    let mut header = acc.header();
    header.pop();
    let records: Vec<Vec<String>> = acc
        .records()
        .into_iter()
        .map(|mut r| {
            r.pop();
            r
        })
        .collect();
    ensure_parent(path)?;
    write_records(path, &header, &records)
}

/// Write per-item scores with their item-level p-values.
pub fn write_ap_table(path: &Path, ap: &ApTable, item_p_values: &[Option<f64>]) -> Result<()> {
    let mut header = vec!["item_index".to_string()];
    header.extend(ap.key_fields.iter().cloned());
    header.extend(
        ["average_precision", "n_pos", "n_total", "p_value"].map(String::from),
    );
    let records: Vec<Vec<String>> = ap
        .records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut row = vec![r.item.to_string()];
            row.extend(r.key.iter().cloned());
            row.extend([
                fmt_opt(r.average_precision),
                r.n_pos.to_string(),
                r.n_total.to_string(),
                fmt_opt(item_p_values.get(i).copied().flatten()),
            ]);
            row
        })
        .collect();
    ensure_parent(path)?;
    write_records(path, &header, &records)
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Outcome of one configuration (modality x pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOutcome {
    pub modality: String,
    pub profile_type: String,
    /// Aggregated rows contributed.
    pub rows: usize,
    pub error: Option<String>,
}

impl ConfigOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Metadata written next to the results at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: String,
    pub config: PipelineConfig,
    pub outcomes: Vec<ConfigOutcome>,
    pub total_rows: usize,
    pub duration_ms: u64,
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(path, json).map_err(|e| Error::io(path, e))?;
    log::debug!("wrote manifest {}", path.display());
    Ok(())
}
