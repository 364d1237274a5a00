//! Significance primitives for permutation-calibrated retrieval metrics.
//!
//! Provides one-sided permutation p-values against an empirical null, the
//! Benjamini-Hochberg step-up correction, and Fisher's method for combining
//! independent p-values. [`SignificanceResult`] bundles a raw and a corrected
//! p-value with their threshold flags.

use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::cmp::Ordering;

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw and FDR-corrected significance of a single test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignificanceResult {
    pub p_value: f64,
    pub corrected_p_value: f64,
    pub below_p: bool,
    pub below_corrected_p: bool,
}

impl SignificanceResult {
    /// Flag both p-values against `threshold` (strictly below counts).
    pub fn new(p_value: f64, corrected_p_value: f64, threshold: f64) -> Self {
        Self {
            p_value,
            corrected_p_value,
            below_p: p_value < threshold,
            below_corrected_p: corrected_p_value < threshold,
        }
    }

    /// `-log10(p)`, the usual volcano-plot scale.
    pub fn neg_log10_p(&self) -> f64 {
        neg_log10(self.p_value)
    }
}

/// `-log10(p)`; zero or negative input maps to `+inf`.
pub fn neg_log10(p: f64) -> f64 {
    if p <= 0.0 {
        f64::INFINITY
    } else {
        -p.log10()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permutation p-values
// ═══════════════════════════════════════════════════════════════════════════════

/// One-sided permutation p-value: fraction of null values `>= observed`.
///
/// Uses the Phipson-Smyth `+1` correction so the result is never zero:
/// `(count + 1) / (len + 1)`. An empty null returns `1.0`.
pub fn permutation_p_value(observed: f64, null_values: &[f64]) -> f64 {
    if null_values.is_empty() {
        return 1.0;
    }
    let ge = null_values.iter().filter(|&&v| v >= observed).count() as f64;
    (ge + 1.0) / (null_values.len() as f64 + 1.0)
}

/// Like [`permutation_p_value`] but counts only null values strictly greater
/// than `observed`. A maximal observation therefore sits at `1 / (len + 1)`.
pub fn exceedance_p_value(observed: f64, null_values: &[f64]) -> f64 {
    if null_values.is_empty() {
        return 1.0;
    }
    let gt = null_values.iter().filter(|&&v| v > observed).count() as f64;
    (gt + 1.0) / (null_values.len() as f64 + 1.0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Multiple testing
// ═══════════════════════════════════════════════════════════════════════════════

/// Benjamini-Hochberg adjusted p-values, returned in input order.
///
/// Step-up procedure: `q_(i) = min_{j >= i} p_(j) * m / j`, clamped to 1.
/// Ties are ranked by input position so the output is deterministic.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    if p_values.is_empty() {
        return Vec::new();
    }
    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&i, &j| {
        p_values[i]
            .partial_cmp(&p_values[j])
            .unwrap_or(Ordering::Equal)
            .then(i.cmp(&j))
    });

    let mut q = vec![1.0; m];
    let mut prev = 1.0_f64;
    for (rank0, &idx) in order.iter().enumerate().rev() {
        let rank = rank0 + 1;
        let adj = (p_values[idx] * m as f64 / rank as f64).min(1.0);
        prev = prev.min(adj);
        q[idx] = prev;
    }
    q
}

/// Apply BH correction and flag each test against `threshold`.
pub fn fdr_control(p_values: &[f64], threshold: f64) -> Vec<SignificanceResult> {
    let q = benjamini_hochberg(p_values);
    p_values
        .iter()
        .zip(q)
        .map(|(&p, q)| SignificanceResult::new(p, q, threshold))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Combination
// ═══════════════════════════════════════════════════════════════════════════════

/// Fisher's combined p-value: `X = -2 Σ ln p_i ~ χ²(2k)`.
///
/// Returns `None` for an empty input. Zero p-values are floored at
/// `f64::MIN_POSITIVE` so the statistic stays finite.
pub fn fisher_combined(p_values: &[f64]) -> Option<f64> {
    if p_values.is_empty() {
        return None;
    }
    let statistic: f64 = p_values
        .iter()
        .map(|&p| -2.0 * p.clamp(f64::MIN_POSITIVE, 1.0).ln())
        .sum();
    let dist = ChiSquared::new(2.0 * p_values.len() as f64).ok()?;
    Some(dist.sf(statistic).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_p_value_counts_ties() {
        let null = [0.1, 0.5, 0.5, 0.9];
        // two values >= 0.5 plus 0.9
        assert!((permutation_p_value(0.5, &null) - 4.0 / 5.0).abs() < 1e-12);
        assert!((permutation_p_value(1.0, &null) - 1.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_permutation_p_value_empty_null() {
        assert_eq!(permutation_p_value(0.3, &[]), 1.0);
        assert_eq!(exceedance_p_value(0.3, &[]), 1.0);
    }

    #[test]
    fn test_exceedance_p_value_is_strict() {
        let null = [1.0, 1.0, 0.2];
        assert!((exceedance_p_value(1.0, &null) - 0.25).abs() < 1e-12);
        assert!((permutation_p_value(1.0, &null) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_p_value_monotone_in_observed() {
        let null: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let mut prev = f64::INFINITY;
        for k in 0..=20 {
            let p = permutation_p_value(k as f64 / 20.0, &null);
            assert!(p <= prev);
            prev = p;
        }
    }

    #[test]
    fn test_benjamini_hochberg_known_values() {
        let p = [0.01, 0.04, 0.03, 0.20];
        let q = benjamini_hochberg(&p);
        assert!((q[0] - 0.04).abs() < 1e-12);
        assert!((q[1] - 0.04 * 4.0 / 3.0).abs() < 1e-12);
        assert!((q[2] - 0.04 * 4.0 / 3.0).abs() < 1e-12);
        assert!((q[3] - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_benjamini_hochberg_never_below_raw() {
        let p = [0.001, 0.2, 0.03, 0.5, 0.049, 0.9];
        let q = benjamini_hochberg(&p);
        for (raw, adj) in p.iter().zip(&q) {
            assert!(adj >= raw);
            assert!(*adj <= 1.0);
        }
    }

    #[test]
    fn test_fdr_control_is_conservative() {
        let p = [0.001, 0.02, 0.03, 0.04, 0.045];
        let results = fdr_control(&p, 0.05);
        let raw = results.iter().filter(|r| r.below_p).count();
        let corrected = results.iter().filter(|r| r.below_corrected_p).count();
        assert_eq!(raw, 5);
        assert!(corrected <= raw);
    }

    #[test]
    fn test_benjamini_hochberg_empty() {
        assert!(benjamini_hochberg(&[]).is_empty());
    }

    #[test]
    fn test_fisher_single_value_is_identity() {
        let p = fisher_combined(&[0.2]).unwrap();
        assert!((p - 0.2).abs() < 1e-9, "got {p}");
    }

    #[test]
    fn test_fisher_combines_evidence() {
        let one = fisher_combined(&[0.04]).unwrap();
        let two = fisher_combined(&[0.04, 0.04]).unwrap();
        assert!(two < one);
        assert!(fisher_combined(&[]).is_none());
    }

    #[test]
    fn test_neg_log10() {
        let r = SignificanceResult::new(0.001, 0.01, 0.05);
        assert!((r.neg_log10_p() - 3.0).abs() < 1e-12);
        assert!(r.below_p && r.below_corrected_p);
        assert!(neg_log10(0.0).is_infinite());
    }
}
