//! Mean average precision per group, calibrated against a permutation null.
//!
//! Scored [`ApRecord`]s are grouped by their key, averaged into a mAP and
//! given a group-level p-value. P-values are then Benjamini-Hochberg corrected
//! across all groups of the run.
//!
//! Two group p-value methods are available:
//! - [`PValueMethod::PooledNull`] (default): the null of a group is the
//!   element-wise mean of its members' null distributions, and the p-value
//!   counts pooled samples strictly above the observed mAP.
//! - [`PValueMethod::Fisher`]: Fisher's method over the members' item-level
//!   p-values.

use std::collections::BTreeMap;

use phenomap_stats::{
    exceedance_p_value, fdr_control, fisher_combined, neg_log10, permutation_p_value,
};
use serde::{Deserialize, Serialize};

use crate::average_precision::{ApRecord, ApTable};
use crate::error::{Error, Result};
use crate::null::{NullCache, NullShape, RandomSource, SeededSource};

/// How member p-values become one group p-value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PValueMethod {
    #[default]
    PooledNull,
    Fisher,
}

impl std::fmt::Display for PValueMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PooledNull => write!(f, "pooled_null"),
            Self::Fisher => write!(f, "fisher"),
        }
    }
}

/// Parameters of the aggregation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapParams {
    /// Samples per null distribution.
    pub null_size: usize,
    /// FDR level; also the raw p-value cut for `below_p`.
    pub threshold: f64,
    pub seed: u64,
    #[serde(default)]
    pub method: PValueMethod,
}

impl MapParams {
    pub fn validate(&self) -> Result<()> {
        if self.null_size == 0 {
            return Err(Error::InvalidConfig("null_size must be positive".into()));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "threshold must lie in (0, 1), got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Aggregated result of one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRecord {
    /// Group values, aligned with [`MapTable::key_fields`].
    pub key: Vec<String>,
    pub mean_average_precision: f64,
    /// Member records averaged.
    pub n_items: usize,
    pub p_value: f64,
    pub corrected_p_value: f64,
    pub below_p: bool,
    pub below_corrected_p: bool,
}

impl MapRecord {
    pub fn neg_log10_p(&self) -> f64 {
        neg_log10(self.p_value)
    }
}

/// Per-group rows, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapTable {
    pub key_fields: Vec<String>,
    pub rows: Vec<MapRecord>,
    /// Item-level p-value of each input record (same order as
    /// [`ApTable::records`]); `None` for unscored or uncalibrated records.
    pub item_p_values: Vec<Option<f64>>,
}

impl MapTable {
    pub fn n_significant(&self) -> usize {
        self.rows.iter().filter(|r| r.below_corrected_p).count()
    }
}

fn shape_of(record: &ApRecord) -> NullShape {
    NullShape::new(record.n_pos, record.n_total)
}

/// Aggregate `ap` by `sameby` using nulls seeded from `params.seed`.
pub fn mean_average_precision(
    ap: &ApTable,
    sameby: &[String],
    params: &MapParams,
) -> Result<MapTable> {
    mean_average_precision_with(ap, sameby, params, &SeededSource::new(params.seed))
}

/// Aggregate with an explicit random source.
///
/// `sameby` must be a subset of `ap.key_fields`. Records without a score, or
/// whose shape has no null distribution, do not join any group; groups left
/// without members are omitted.
pub fn mean_average_precision_with<S: RandomSource>(
    ap: &ApTable,
    sameby: &[String],
    params: &MapParams,
    source: &S,
) -> Result<MapTable> {
    params.validate()?;
    let slots: Vec<usize> = sameby
        .iter()
        .map(|f| {
            ap.key_fields
                .iter()
                .position(|k| k == f)
                .ok_or_else(|| Error::missing_column(f))
        })
        .collect::<Result<_>>()?;

    let cache = NullCache::build(ap.scored().map(shape_of), params.null_size, source);

    let item_p_values: Vec<Option<f64>> = ap
        .records
        .iter()
        .map(|r| {
            let observed = r.average_precision.filter(|_| r.n_pos > 0)?;
            let null = cache.get(shape_of(r))?;
            Some(permutation_p_value(observed, null))
        })
        .collect();

    let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for (idx, record) in ap.records.iter().enumerate() {
        if item_p_values[idx].is_none() {
            continue;
        }
        let key = slots.iter().map(|&s| record.key[s].clone()).collect();
        groups.entry(key).or_default().push(idx);
    }

    let mut stats = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let scores: Vec<f64> = members
            .iter()
            .filter_map(|&i| ap.records[i].average_precision)
            .collect();
        let map = scores.iter().sum::<f64>() / scores.len() as f64;
        let p_value = match params.method {
            PValueMethod::PooledNull => {
                let pooled = pooled_null(&cache, members.iter().map(|&i| &ap.records[i]));
                exceedance_p_value(map, &pooled)
            }
            PValueMethod::Fisher => {
                let ps: Vec<f64> = members.iter().filter_map(|&i| item_p_values[i]).collect();
                fisher_combined(&ps).unwrap_or(1.0)
            }
        };
        stats.push((key, map, members.len(), p_value));
    }

    let p_values: Vec<f64> = stats.iter().map(|s| s.3).collect();
    let significance = fdr_control(&p_values, params.threshold);
    let rows: Vec<MapRecord> = stats
        .into_iter()
        .zip(significance)
        .map(|((key, map, n_items, _), sig)| MapRecord {
            key,
            mean_average_precision: map,
            n_items,
            p_value: sig.p_value,
            corrected_p_value: sig.corrected_p_value,
            below_p: sig.below_p,
            below_corrected_p: sig.below_corrected_p,
        })
        .collect();

    let table = MapTable {
        key_fields: sameby.to_vec(),
        rows,
        item_p_values,
    };
    log::info!(
        "mAP: {} groups ({} below corrected p < {}) via {}",
        table.rows.len(),
        table.n_significant(),
        params.threshold,
        params.method
    );
    Ok(table)
}

/// Element-wise mean of the members' null distributions.
fn pooled_null<'a>(cache: &NullCache, members: impl Iterator<Item = &'a ApRecord>) -> Vec<f64> {
    let mut pooled = vec![0.0; cache.null_size()];
    let mut n = 0usize;
    for record in members {
        if let Some(null) = cache.get(shape_of(record)) {
            for (acc, v) in pooled.iter_mut().zip(null) {
                *acc += v;
            }
            n += 1;
        }
    }
    if n == 0 {
        return Vec::new();
    }
    for acc in &mut pooled {
        *acc /= n as f64;
    }
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(item: usize, key: &str, ap: Option<f64>, n_pos: usize, n_total: usize) -> ApRecord {
        ApRecord {
            item,
            key: vec![key.to_string()],
            average_precision: ap,
            n_pos,
            n_total,
        }
    }

    fn table(records: Vec<ApRecord>) -> ApTable {
        ApTable {
            key_fields: vec!["Metadata_group".into()],
            records,
        }
    }

    fn params(null_size: usize) -> MapParams {
        MapParams {
            null_size,
            threshold: 0.05,
            seed: 12527,
            method: PValueMethod::PooledNull,
        }
    }

    fn group() -> Vec<String> {
        vec!["Metadata_group".to_string()]
    }

    #[test]
    fn test_perfect_groups_hit_floor_p_value() {
        let ap = table(vec![
            record(0, "A", Some(1.0), 1, 3),
            record(1, "A", Some(1.0), 1, 3),
            record(2, "B", Some(1.0), 1, 3),
            record(3, "B", Some(1.0), 1, 3),
        ]);
        let res = mean_average_precision(&ap, &group(), &params(1000)).unwrap();
        assert_eq!(res.rows.len(), 2);
        assert_eq!(res.rows[0].key, vec!["A".to_string()]);
        assert_eq!(res.rows[1].key, vec!["B".to_string()]);
        for row in &res.rows {
            assert_eq!(row.mean_average_precision, 1.0);
            assert!((row.p_value - 1.0 / 1001.0).abs() < 1e-12);
            assert!(row.below_corrected_p);
        }
    }

    #[test]
    fn test_map_is_mean_of_member_scores() {
        let ap = table(vec![
            record(0, "A", Some(0.5), 1, 4),
            record(1, "A", Some(1.0), 1, 4),
            record(2, "A", Some(0.25), 2, 6),
            record(3, "B", Some(0.75), 1, 3),
        ]);
        let res = mean_average_precision(&ap, &group(), &params(200)).unwrap();
        let a = &res.rows[0];
        assert_eq!(a.n_items, 3);
        assert!((a.mean_average_precision - (0.5 + 1.0 + 0.25) / 3.0).abs() < 1e-12);
        assert_eq!(res.rows[1].n_items, 1);
    }

    #[test]
    fn test_unscored_records_are_absent() {
        let ap = table(vec![
            record(0, "A", Some(1.0), 1, 3),
            record(1, "B", None, 0, 2),
            record(2, "C", Some(1.0), 1, 1),
        ]);
        let res = mean_average_precision(&ap, &group(), &params(50)).unwrap();
        let keys: Vec<&str> = res.rows.iter().map(|r| r.key[0].as_str()).collect();
        assert_eq!(keys, vec!["A"]);
        assert_eq!(res.item_p_values.len(), 3);
        assert!(res.item_p_values[0].is_some());
        assert!(res.item_p_values[1].is_none());
        // n_total < 2 has no null
        assert!(res.item_p_values[2].is_none());
    }

    #[test]
    fn test_item_p_values_monotone_in_score() {
        let ap = table(vec![
            record(0, "A", Some(0.3), 2, 8),
            record(1, "A", Some(0.6), 2, 8),
            record(2, "A", Some(0.9), 2, 8),
        ]);
        let res = mean_average_precision(&ap, &group(), &params(500)).unwrap();
        let p: Vec<f64> = res.item_p_values.iter().map(|p| p.unwrap()).collect();
        assert!(p[2] <= p[1] && p[1] <= p[0], "{p:?}");
    }

    #[test]
    fn test_same_seed_same_output() {
        let ap = table(vec![
            record(0, "A", Some(0.4), 1, 5),
            record(1, "A", Some(0.7), 2, 5),
            record(2, "B", Some(0.2), 1, 5),
        ]);
        let a = mean_average_precision(&ap, &group(), &params(300)).unwrap();
        let b = mean_average_precision(&ap, &group(), &params(300)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fisher_method() {
        let ap = table(vec![
            record(0, "A", Some(1.0), 1, 10),
            record(1, "A", Some(1.0), 1, 10),
            record(2, "B", Some(0.1), 1, 10),
        ]);
        let mut p = params(500);
        p.method = PValueMethod::Fisher;
        let res = mean_average_precision(&ap, &group(), &p).unwrap();
        let (a, b) = (&res.rows[0], &res.rows[1]);
        assert!(a.p_value < b.p_value);
        assert!(a.p_value > 0.0 && b.p_value <= 1.0);
        assert!(a.corrected_p_value >= a.p_value);
    }

    #[test]
    fn test_corrected_flags_never_exceed_raw() {
        let ap = table(
            (0..12)
                .map(|i| record(i, &format!("G{}", i % 6), Some(0.2 + 0.06 * i as f64), 1, 6))
                .collect(),
        );
        let res = mean_average_precision(&ap, &group(), &params(400)).unwrap();
        let raw = res.rows.iter().filter(|r| r.below_p).count();
        assert!(res.n_significant() <= raw);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let ap = table(vec![record(0, "A", Some(1.0), 1, 3)]);
        assert!(mean_average_precision(&ap, &group(), &params(0)).is_err());
        let mut p = params(10);
        p.threshold = 1.5;
        assert!(mean_average_precision(&ap, &group(), &p).is_err());
        let unknown = vec!["Metadata_other".to_string()];
        assert!(matches!(
            mean_average_precision(&ap, &unknown, &params(10)),
            Err(Error::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_pooled_null_averages_members() {
        let cache = NullCache::build([NullShape::new(1, 2)], 100, &SeededSource::new(3));
        let members = [record(0, "A", Some(1.0), 1, 2), record(1, "A", Some(1.0), 1, 2)];
        let pooled = pooled_null(&cache, members.iter());
        assert_eq!(pooled.as_slice(), cache.get(NullShape::new(1, 2)).unwrap());
    }
}
