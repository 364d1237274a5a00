//! # phenomap-core
//!
//! **Does profile similarity recover shared gene-group membership?**
//!
//! `phenomap-core` scores perturbation profiles with a retrieval metric:
//! each item queries its positive partners (same gene group) against its
//! negative partners (disjoint groups), ranked by cosine similarity. Average
//! precision per item is averaged per group into a mean average precision
//! (mAP) and calibrated against a permutation null.
//!
//! ## Quick Start
//!
//! ```no_run
//! use phenomap_core::{PipelineConfig, run_all};
//!
//! let config = PipelineConfig::default();
//! let report = run_all(&config, false).unwrap();
//! println!("{} groups scored", report.results.len());
//! ```
//!
//! ## Architecture
//!
//! Profiles → activity filter → annotations → consensus → split →
//! [`average_precision()`] → [`mean_average_precision()`] → accumulator
//!
//! - `matcher`: positive / negative pair classification, with set
//!   intersection for the multi-label group field
//! - `average_precision`: per-item AP over cosine-ranked partners, in
//!   query blocks bounded by `batch_size`
//! - `null`: per-shape null distributions behind a seedable [`RandomSource`]
//! - `map`: group mAP, group p-values and Benjamini-Hochberg correction
//!
//! The surrounding glue (delimited I/O, annotations, consensus profiles,
//! configuration, result files) lives in the remaining modules.

pub mod annotations;
pub mod average_precision;
pub mod config;
pub mod delimited;
pub mod error;
pub mod map;
pub mod matcher;
pub mod null;
pub mod output;
pub mod pipeline;
pub mod profiles;
pub mod table;

pub use annotations::{LABEL_SEPARATOR, load_active_ids, load_annotations};
pub use average_precision::{
    ApRecord, ApTable, RetrievalParams, average_precision, cosine_similarity,
    ranked_average_precision,
};
pub use config::{ModalityConfig, PipelineConfig, ProfileSpec};
pub use delimited::{read_table, write_records};
pub use error::{Error, Result};
pub use map::{
    MapParams, MapRecord, MapTable, PValueMethod, mean_average_precision,
    mean_average_precision_with,
};
pub use matcher::{FieldKind, Matcher, PairKind, PairPredicate, QueryMatches, query_batches};
pub use null::{NullCache, NullShape, RandomSource, SeededSource, null_distribution};
pub use output::{
    ConfigOutcome, PROFILE_TYPE_COL, ResultAccumulator, RunManifest, write_ap_table,
    write_manifest, write_map_results, write_map_table,
};
pub use pipeline::{RunReport, Scored, persist, run_all, run_configuration, score_file, score_table};
pub use profiles::{METADATA_PREFIX, consensus, split_metadata_features};
pub use table::{FeatureMatrix, Table, Value};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
