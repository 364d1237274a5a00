//! The configuration loop: every modality x pipeline through the metric.
//!
//! Per configuration: load profiles, keep phenotypically active
//! perturbations, drop controls, attach gene-group annotations, build
//! consensus profiles, split metadata from features, then score AP and
//! aggregate to mAP. Results are appended to a [`ResultAccumulator`] that
//! the caller persists once at the end.

use std::path::Path;
use std::time::Instant;

use crate::annotations::{LABEL_SEPARATOR, load_active_ids, load_annotations};
use crate::average_precision::{ApTable, RetrievalParams, average_precision};
use crate::config::{ModalityConfig, PipelineConfig, ProfileSpec};
use crate::delimited::read_table;
use crate::error::{Error, Result};
use crate::map::{MapParams, MapTable, mean_average_precision};
use crate::output::{
    ConfigOutcome, ResultAccumulator, RunManifest, write_manifest, write_map_results,
};
use crate::profiles::{consensus, split_metadata_features};
use crate::table::Table;

/// Per-item and aggregated results of one scored table.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub ap: ApTable,
    pub map: MapTable,
}

/// Score a consensus table: split, AP per item, mAP per group.
pub fn score_table(table: &Table, retrieval: &RetrievalParams, map: &MapParams) -> Result<Scored> {
    let (meta, feats) = split_metadata_features(table)?;
    let ap = average_precision(&meta, &feats, retrieval)?;
    let map = mean_average_precision(&ap, &retrieval.positive.sameby, map)?;
    Ok(Scored { ap, map })
}

/// Score a ready consensus file whose `multilabel_col` holds
/// `|`-separated labels.
pub fn score_file(path: &Path, retrieval: &RetrievalParams, map: &MapParams) -> Result<Scored> {
    let mut table = read_table(path)?;
    if let Some(col) = &retrieval.multilabel_col {
        table.parse_labels(col, LABEL_SEPARATOR)?;
    }
    if table.is_empty() {
        return Err(Error::empty(format!("profiles in {}", path.display())));
    }
    score_table(&table, retrieval, map)
}

fn non_empty(table: Table, what: impl FnOnce() -> String) -> Result<Table> {
    if table.is_empty() {
        Err(Error::empty(what()))
    } else {
        Ok(table)
    }
}

/// Run one configuration against already loaded annotations.
pub fn run_configuration(
    config: &PipelineConfig,
    spec: &ProfileSpec,
    annotations: &Table,
) -> Result<MapTable> {
    let profiles_path = config.profiles_path(spec);
    let activity_path = config.activity_path(spec);

    let profiles = read_table(&profiles_path)?;
    let n_replicates = profiles.n_rows();
    let active = load_active_ids(&activity_path, &config.id_col)?;

    let profiles = non_empty(profiles.semi_join(&config.id_col, &active)?, || {
        format!("{}: no phenotypically active profiles", spec.profile_type)
    })?;
    let pert_type = profiles.column_index(&config.pert_type_col)?;
    let profiles = non_empty(
        profiles.filter_rows(|row| row[pert_type].as_text() != Some(config.control_value.as_str())),
        || format!("{}: only control profiles", spec.profile_type),
    )?;
    let annotated = non_empty(profiles.inner_join(annotations, &config.id_col)?, || {
        format!("{}: no annotated profiles", spec.profile_type)
    })?;
    log::info!(
        "{}: {} replicate profiles, {} active and annotated",
        spec.profile_type,
        n_replicates,
        annotated.n_rows()
    );

    let merged = consensus(&annotated, &config.consensus_col)?;
    let scored = score_table(&merged, &config.retrieval_params(), &config.map_params())?;
    Ok(scored.map)
}

/// Outcome of the configuration loop.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: ResultAccumulator,
    pub outcomes: Vec<ConfigOutcome>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn n_failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failed()).count()
    }
}

fn run_modality(
    config: &PipelineConfig,
    modality: &ModalityConfig,
    report: &mut RunReport,
    fail_fast: bool,
) -> Result<()> {
    let annotations = load_annotations(
        &modality.annotations,
        &config.id_col,
        &config.annotation_col,
        &config.multilabel_col,
    );

    for spec in &modality.profiles {
        log::info!("Profile type: {}", spec.profile_type);
        let result = annotations
            .as_ref()
            .map_err(|e| Error::InvalidData(format!("annotations unavailable: {e}")))
            .and_then(|a| run_configuration(config, spec, a))
            .and_then(|map| {
                report.results.push(&spec.profile_type, &map)?;
                Ok(map.rows.len())
            });

        let outcome = match result {
            Ok(rows) => ConfigOutcome {
                modality: modality.name.clone(),
                profile_type: spec.profile_type.clone(),
                rows,
                error: None,
            },
            Err(e) => {
                log::error!("{} ({}) failed: {e}", spec.profile_type, modality.name);
                if fail_fast {
                    return Err(e);
                }
                ConfigOutcome {
                    modality: modality.name.clone(),
                    profile_type: spec.profile_type.clone(),
                    rows: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        report.outcomes.push(outcome);
    }
    Ok(())
}

/// Run every configured modality and pipeline.
///
/// A failing configuration is logged and recorded; the loop moves on unless
/// `fail_fast` is set, in which case its error is returned.
pub fn run_all(config: &PipelineConfig, fail_fast: bool) -> Result<RunReport> {
    config.validate()?;
    let start = Instant::now();
    let mut report = RunReport {
        results: ResultAccumulator::new(config.pos_sameby.clone()),
        ..Default::default()
    };
    for modality in &config.modalities {
        run_modality(config, modality, &mut report, fail_fast)?;
    }
    report.duration_ms = start.elapsed().as_millis() as u64;
    log::info!(
        "{} configurations, {} failed, {} result rows",
        report.outcomes.len(),
        report.n_failed(),
        report.results.len()
    );
    Ok(report)
}

/// Write the aggregated table and the run manifest.
pub fn persist(config: &PipelineConfig, report: &RunReport, output: &Path) -> Result<()> {
    write_map_results(output, &report.results)?;
    let manifest = RunManifest {
        version: crate::VERSION.to_string(),
        config: config.clone(),
        outcomes: report.outcomes.clone(),
        total_rows: report.results.len(),
        duration_ms: report.duration_ms,
    };
    write_manifest(&output.with_extension("json"), &manifest)
}
