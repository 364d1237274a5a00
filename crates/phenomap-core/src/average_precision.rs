//! Per-item average precision over cosine-ranked positive/negative partners.
//!
//! For each query item the engine ranks its valid partners (see
//! [`crate::matcher`]) by descending cosine similarity and scores how early the
//! positives appear. Ties keep ascending item order (stable sort), so scores
//! are reproducible.
//!
//! When the multi-label field is part of `pos_sameby`, an item is scored once
//! per label it carries, against the partners sharing that label. Each score
//! becomes an [`ApRecord`] keyed by that label.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matcher::{Matcher, PairPredicate, QueryMatches, query_batches};
use crate::table::{FeatureMatrix, Table};

/// Parameters of an average-precision run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalParams {
    pub positive: PairPredicate,
    pub negative: PairPredicate,
    /// Upper bound on ordered pairs examined per query block.
    pub batch_size: usize,
    /// Set-valued field compared by intersection.
    pub multilabel_col: Option<String>,
}

/// Average precision of one query item (under one label for multi-label runs).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApRecord {
    /// Row of the item in the metadata table.
    pub item: usize,
    /// Values of the `pos_sameby` fields, aligned with [`ApTable::key_fields`].
    pub key: Vec<String>,
    /// `None` when the item has no positive partner.
    pub average_precision: Option<f64>,
    pub n_pos: usize,
    /// Positives plus negatives ranked.
    pub n_total: usize,
}

/// Per-item results plus the names of their key fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApTable {
    pub key_fields: Vec<String>,
    pub records: Vec<ApRecord>,
}

impl ApTable {
    /// Records with a defined score.
    pub fn scored(&self) -> impl Iterator<Item = &ApRecord> {
        self.records
            .iter()
            .filter(|r| r.n_pos > 0 && r.average_precision.is_some())
    }
}

// ---------------------------------------------------------------------------
// Similarity and ranking
// ---------------------------------------------------------------------------

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Cosine similarity given precomputed norms; zero-norm vectors score 0.
pub fn cosine_with_norms(a: &[f64], b: &[f64], norm_a: f64, norm_b: f64) -> f64 {
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    cosine_with_norms(a, b, norm(a), norm(b))
}

/// Average precision of a ranked relevance list (true = positive).
///
/// Mean over positive ranks `k` of `hits_so_far / k`. `None` when the list
/// holds no positive.
pub fn ranked_average_precision(relevance: impl IntoIterator<Item = bool>) -> Option<f64> {
    let mut hits = 0usize;
    let mut sum = 0.0;
    for (k, relevant) in relevance.into_iter().enumerate() {
        if relevant {
            hits += 1;
            sum += hits as f64 / (k + 1) as f64;
        }
    }
    (hits > 0).then(|| sum / hits as f64)
}

/// Rank `(item, similarity, is_positive)` candidates and score them.
///
/// Candidates are ordered by item first so that the stable descending sort
/// breaks similarity ties by ascending item index.
fn score_candidates(candidates: &mut [(usize, f64, bool)]) -> Option<f64> {
    candidates.sort_by_key(|c| c.0);
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked_average_precision(candidates.iter().map(|c| c.2))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compute per-item average precision for every scorable item.
///
/// Items without any negative partner are skipped entirely. Items with
/// negatives but no positives yield a record with `average_precision = None`.
pub fn average_precision(
    meta: &Table,
    feats: &FeatureMatrix,
    params: &RetrievalParams,
) -> Result<ApTable> {
    if meta.n_rows() != feats.n_rows() {
        return Err(Error::InvalidData(format!(
            "metadata has {} rows but feature matrix has {}",
            meta.n_rows(),
            feats.n_rows()
        )));
    }

    let matcher = Matcher::new(
        meta,
        &params.positive,
        &params.negative,
        params.multilabel_col.as_deref(),
    )?;
    let batches = query_batches(meta.n_rows(), params.batch_size)?;

    let key_cols: Vec<usize> = params
        .positive
        .sameby
        .iter()
        .map(|f| meta.column_index(f))
        .collect::<Result<_>>()?;
    let label_slot = matcher
        .multilabel_col()
        .and_then(|ml| key_cols.iter().position(|&c| c == ml));

    let norms: Vec<f64> = (0..feats.n_rows()).map(|i| norm(feats.row(i))).collect();
    let sim = |i: usize, j: usize| cosine_with_norms(feats.row(i), feats.row(j), norms[i], norms[j]);

    let mut table = ApTable {
        key_fields: params.positive.sameby.clone(),
        records: Vec::new(),
    };
    let mut without_negatives = 0usize;

    for (b, rows) in batches.into_iter().enumerate() {
        log::debug!("AP batch {b}: queries {}..{}", rows.start, rows.end);
        for QueryMatches {
            query,
            positives,
            negatives,
        } in matcher.batch_matches(rows)
        {
            if negatives.is_empty() {
                without_negatives += 1;
                continue;
            }
            let neg_scored: Vec<(usize, f64, bool)> =
                negatives.iter().map(|&j| (j, sim(query, j), false)).collect();
            let pos_scored: Vec<(usize, f64, bool)> =
                positives.iter().map(|&j| (j, sim(query, j), true)).collect();

            let base_key: Vec<String> = key_cols
                .iter()
                .map(|&c| meta.value(query, c).to_string())
                .collect();

            match (label_slot, matcher.multilabel_col()) {
                (Some(slot), Some(ml)) => {
                    for label in meta.value(query, ml).label_set() {
                        let mut candidates: Vec<(usize, f64, bool)> = pos_scored
                            .iter()
                            .filter(|c| meta.value(c.0, ml).label_set().contains(label))
                            .copied()
                            .collect();
                        let n_pos = candidates.len();
                        candidates.extend_from_slice(&neg_scored);
                        let mut key = base_key.clone();
                        key[slot] = label.clone();
                        table.records.push(ApRecord {
                            item: query,
                            key,
                            average_precision: score_candidates(&mut candidates),
                            n_pos,
                            n_total: candidates.len(),
                        });
                    }
                }
                _ => {
                    let mut candidates = pos_scored;
                    let n_pos = candidates.len();
                    candidates.extend_from_slice(&neg_scored);
                    table.records.push(ApRecord {
                        item: query,
                        key: base_key,
                        average_precision: score_candidates(&mut candidates),
                        n_pos,
                        n_total: candidates.len(),
                    });
                }
            }
        }
    }

    log::info!(
        "average precision: {} records from {} items ({} items without negatives skipped, {} records without positives)",
        table.records.len(),
        meta.n_rows(),
        without_negatives,
        table.records.iter().filter(|r| r.n_pos == 0).count()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    const GROUP: &str = "Metadata_group";

    fn params(batch_size: usize) -> RetrievalParams {
        RetrievalParams {
            positive: PairPredicate::new(&[GROUP], &[]),
            negative: PairPredicate::new(&[], &[GROUP]),
            batch_size,
            multilabel_col: Some(GROUP.to_string()),
        }
    }

    fn dataset(groups: &[&str], feats: &[Vec<f64>]) -> (Table, FeatureMatrix) {
        let mut t = Table::new(vec!["Metadata_id".into(), GROUP.into()]);
        for (i, g) in groups.iter().enumerate() {
            t.push_row(vec![Value::Text(format!("g{i}")), Value::labels(g, '|')])
                .unwrap();
        }
        (t, FeatureMatrix::from_rows(feats).unwrap())
    }

    #[test]
    fn test_ranked_average_precision() {
        assert_eq!(ranked_average_precision([true, true, false]), Some(1.0));
        // positives at ranks 2 and 3: (1/2 + 2/3) / 2
        let ap = ranked_average_precision([false, true, true]).unwrap();
        assert!((ap - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert_eq!(ranked_average_precision([false, false]), None);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_ties_keep_item_order() {
        let mut c = vec![(3, 0.5, true), (1, 0.5, false), (2, 0.9, false)];
        // order: 2 (0.9), 1 (0.5), 3 (0.5) -> positive at rank 3
        let ap = score_candidates(&mut c).unwrap();
        assert!((ap - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_separation_scores_one() {
        let (t, f) = dataset(
            &["A", "A", "B", "B"],
            &[
                vec![1.0, 0.0],
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.0, 1.0],
            ],
        );
        let res = average_precision(&t, &f, &params(100)).unwrap();
        assert_eq!(res.records.len(), 4);
        for r in &res.records {
            assert_eq!(r.average_precision, Some(1.0));
            assert_eq!(r.n_pos, 1);
            assert_eq!(r.n_total, 3);
        }
        assert_eq!(res.records[0].key, vec!["A".to_string()]);
        assert_eq!(res.records[2].key, vec!["B".to_string()]);
    }

    #[test]
    fn test_multilabel_item_scored_per_label() {
        let (t, f) = dataset(
            &["A|B", "A", "B", "C"],
            &[
                vec![1.0, 1.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        );
        let res = average_precision(&t, &f, &params(100)).unwrap();
        let item0: Vec<&ApRecord> = res.records.iter().filter(|r| r.item == 0).collect();
        assert_eq!(item0.len(), 2);
        assert_eq!(item0[0].key, vec!["A".to_string()]);
        assert_eq!(item0[1].key, vec!["B".to_string()]);
        // only item 3 is disjoint from {A, B}
        assert!(item0.iter().all(|r| r.n_pos == 1 && r.n_total == 2));
    }

    #[test]
    fn test_items_without_negatives_are_skipped() {
        let (t, f) = dataset(&["A", "A"], &[vec![1.0], vec![2.0]]);
        let res = average_precision(&t, &f, &params(10)).unwrap();
        assert!(res.records.is_empty());
    }

    #[test]
    fn test_items_without_positives_have_no_score() {
        let (t, f) = dataset(&["A", "B"], &[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let res = average_precision(&t, &f, &params(10)).unwrap();
        assert_eq!(res.records.len(), 2);
        assert!(res.records.iter().all(|r| r.average_precision.is_none()));
        assert_eq!(res.scored().count(), 0);
    }

    #[test]
    fn test_batch_size_does_not_change_results() {
        let groups = ["A", "B|A", "B", "C", "C|A", "B"];
        let feats: Vec<Vec<f64>> = (0..6)
            .map(|i| vec![(i as f64).sin(), (i as f64 * 0.7).cos(), i as f64 / 6.0])
            .collect();
        let (t, f) = dataset(&groups, &feats);
        let full = average_precision(&t, &f, &params(1_000_000)).unwrap();
        for bs in [1, 5, 13] {
            assert_eq!(average_precision(&t, &f, &params(bs)).unwrap(), full);
        }
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let (t, _) = dataset(&["A", "B"], &[vec![1.0], vec![2.0]]);
        let f = FeatureMatrix::from_rows(&[vec![1.0]]).unwrap();
        assert!(average_precision(&t, &f, &params(10)).is_err());
    }

    #[test]
    fn test_ap_bounded() {
        let groups = ["A", "A", "B", "B", "A", "C"];
        let feats: Vec<Vec<f64>> = (0..6)
            .map(|i| vec![((i * 7) % 5) as f64 - 2.0, ((i * 3) % 4) as f64 - 1.5])
            .collect();
        let (t, f) = dataset(&groups, &feats);
        let res = average_precision(&t, &f, &params(100)).unwrap();
        for r in res.scored() {
            let ap = r.average_precision.unwrap();
            assert!((0.0..=1.0).contains(&ap), "{ap}");
        }
    }
}
