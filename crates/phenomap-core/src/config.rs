//! Run configuration: which profiles to score and how.
//!
//! A [`PipelineConfig`] names the input layout, the metadata columns and the
//! metric parameters, and lists the modalities (annotation source plus profile
//! pipelines) to evaluate. Every field has a default, so a JSON file only needs
//! the values it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::average_precision::RetrievalParams;
use crate::error::{Error, Result};
use crate::map::{MapParams, PValueMethod};
use crate::matcher::PairPredicate;

/// One profile-processing pipeline to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSpec {
    /// Label written to the `Profile_type` column.
    pub profile_type: String,
    /// Pipeline name used in `profiles_{pipeline}` and
    /// `phenotypic-activity-{pipeline}` file names.
    pub pipeline: String,
}

impl ProfileSpec {
    pub fn new(profile_type: &str, pipeline: &str) -> Self {
        Self {
            profile_type: profile_type.to_string(),
            pipeline: pipeline.to_string(),
        }
    }
}

/// A perturbation modality: its annotation file and the pipelines scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalityConfig {
    pub name: String,
    /// Annotation table mapping identifiers to gene groups.
    pub annotations: PathBuf,
    pub profiles: Vec<ProfileSpec>,
}

/// Full configuration of a retrieval run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name of the grouping being retrieved; prefixes output files.
    pub retrieval_label: String,
    /// Perturbation identifier shared by profiles, activity and annotations.
    pub id_col: String,
    /// Raw `|`-separated group annotation.
    pub annotation_col: String,
    /// Parsed label set derived from `annotation_col`.
    pub multilabel_col: String,
    /// Replicates sharing this value are merged into one consensus profile.
    pub consensus_col: String,
    pub pert_type_col: String,
    /// Rows whose `pert_type_col` equals this are dropped.
    pub control_value: String,
    /// Upper bound on ordered item pairs examined per block.
    pub batch_size: usize,
    /// Samples per null distribution.
    pub null_size: usize,
    /// FDR level for the Benjamini-Hochberg correction.
    pub fdr: f64,
    pub seed: u64,
    pub p_value_method: PValueMethod,
    pub pos_sameby: Vec<String>,
    pub pos_diffby: Vec<String>,
    pub neg_sameby: Vec<String>,
    pub neg_diffby: Vec<String>,
    /// Directory holding `profiles_{pipeline}.csv.gz`.
    pub profiles_dir: PathBuf,
    /// Directory holding `phenotypic-activity-{pipeline}.csv.gz`.
    pub activity_dir: PathBuf,
    pub output_dir: PathBuf,
    pub modalities: Vec<ModalityConfig>,
}

const ANNOTATIONS_DIR: &str = "../00.download-and-process-annotations/output";

impl Default for PipelineConfig {
    fn default() -> Self {
        let multilabel = "Metadata_gene_group_list".to_string();
        Self {
            retrieval_label: "gene-group".into(),
            id_col: "Metadata_JCP2022".into(),
            annotation_col: "Metadata_gene_group_id".into(),
            multilabel_col: multilabel.clone(),
            consensus_col: "Metadata_NCBI_Gene_ID".into(),
            pert_type_col: "Metadata_pert_type".into(),
            control_value: "control".into(),
            batch_size: 20_000,
            null_size: 20_000,
            fdr: 0.05,
            seed: 12527,
            p_value_method: PValueMethod::PooledNull,
            pos_sameby: vec![multilabel.clone()],
            pos_diffby: Vec::new(),
            neg_sameby: Vec::new(),
            neg_diffby: vec![multilabel],
            profiles_dir: PathBuf::from("../profiles"),
            activity_dir: PathBuf::from("output"),
            output_dir: PathBuf::from("output"),
            modalities: vec![
                ModalityConfig {
                    name: "ORF".into(),
                    annotations: Path::new(ANNOTATIONS_DIR).join("orf_metadata.tsv.gz"),
                    profiles: vec![
                        ProfileSpec::new(
                            "ORF",
                            "wellpos_cc_var_mad_outlier_featselect_sphering_harmony",
                        ),
                        ProfileSpec::new(
                            "ORF-CRISPR-pipeline",
                            "wellpos_var_mad_int_featselect_harmony_PCA",
                        ),
                    ],
                },
                ModalityConfig {
                    name: "CRISPR".into(),
                    annotations: Path::new(ANNOTATIONS_DIR).join("crispr_metadata.tsv.gz"),
                    profiles: vec![
                        ProfileSpec::new(
                            "CRISPR",
                            "wellpos_var_mad_int_featselect_harmony_PCA_corrected",
                        ),
                        ProfileSpec::new(
                            "CRISPR-ORF-pipeline",
                            "wellpos_cc_var_mad_outlier_featselect_sphering_harmony_PCA_corrected",
                        ),
                    ],
                },
            ],
        }
    }
}

impl PipelineConfig {
    /// Read a JSON configuration; absent fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if self.null_size == 0 {
            return Err(Error::InvalidConfig("null_size must be positive".into()));
        }
        if !(self.fdr > 0.0 && self.fdr < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "fdr must lie in (0, 1), got {}",
                self.fdr
            )));
        }
        if self.pos_sameby.is_empty() {
            return Err(Error::InvalidConfig("pos_sameby must name at least one field".into()));
        }
        Ok(())
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            positive: PairPredicate {
                sameby: self.pos_sameby.clone(),
                diffby: self.pos_diffby.clone(),
            },
            negative: PairPredicate {
                sameby: self.neg_sameby.clone(),
                diffby: self.neg_diffby.clone(),
            },
            batch_size: self.batch_size,
            multilabel_col: Some(self.multilabel_col.clone()),
        }
    }

    pub fn map_params(&self) -> MapParams {
        MapParams {
            null_size: self.null_size,
            threshold: self.fdr,
            seed: self.seed,
            method: self.p_value_method,
        }
    }

    /// `{profiles_dir}/profiles_{pipeline}.csv.gz`, or `.csv` when only that exists.
    pub fn profiles_path(&self, spec: &ProfileSpec) -> PathBuf {
        prefer_existing(&self.profiles_dir, &format!("profiles_{}", spec.pipeline))
    }

    /// `{activity_dir}/phenotypic-activity-{pipeline}.csv.gz`, or `.csv`.
    pub fn activity_path(&self, spec: &ProfileSpec) -> PathBuf {
        prefer_existing(
            &self.activity_dir,
            &format!("phenotypic-activity-{}", spec.pipeline),
        )
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_retrieval.csv", self.retrieval_label))
    }
}

fn prefer_existing(dir: &Path, stem: &str) -> PathBuf {
    let gz = dir.join(format!("{stem}.csv.gz"));
    let plain = dir.join(format!("{stem}.csv"));
    if !gz.exists() && plain.exists() { plain } else { gz }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let c = PipelineConfig::default();
        c.validate().unwrap();
        assert_eq!(c.modalities.len(), 2);
        assert_eq!(c.pos_sameby, vec![c.multilabel_col.clone()]);
        assert_eq!(c.output_path(), PathBuf::from("output/gene-group_retrieval.csv"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let c: PipelineConfig =
            serde_json::from_str(r#"{"null_size": 100, "p_value_method": "fisher"}"#).unwrap();
        assert_eq!(c.null_size, 100);
        assert_eq!(c.p_value_method, PValueMethod::Fisher);
        assert_eq!(c.batch_size, 20_000);
        assert_eq!(c.seed, 12527);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = PipelineConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
        c.batch_size = 10;
        c.fdr = 0.0;
        assert!(c.validate().is_err());
        c.fdr = 0.1;
        c.pos_sameby.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_input_paths_follow_pipeline_name() {
        let c = PipelineConfig::default();
        let spec = ProfileSpec::new("X", "abc");
        assert_eq!(
            c.activity_path(&spec),
            PathBuf::from("output/phenotypic-activity-abc.csv.gz")
        );
        assert_eq!(c.profiles_path(&spec), PathBuf::from("../profiles/profiles_abc.csv.gz"));
    }

    #[test]
    fn test_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let c = PipelineConfig {
            seed: 7,
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_string_pretty(&c).unwrap()).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), c);
    }
}
