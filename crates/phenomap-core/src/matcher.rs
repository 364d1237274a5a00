//! Pairwise matching of items under sameby / diffby predicates.
//!
//! Every ordered pair of distinct items is classified as a positive pair, a
//! negative pair, or neither. Scalar fields compare by equality; the declared
//! multi-label field compares by set intersection.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::table::{Table, Value};

// ---------------------------------------------------------------------------
// Field comparison
// ---------------------------------------------------------------------------

/// How two cells of a field are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Same when equal and present.
    Scalar,
    /// Same when the label sets share at least one label.
    MultiLabel,
}

impl FieldKind {
    pub fn same(self, a: &Value, b: &Value) -> bool {
        match self {
            Self::Scalar => !a.is_missing() && a == b,
            Self::MultiLabel => intersects(a.label_set(), b.label_set()),
        }
    }

    pub fn differ(self, a: &Value, b: &Value) -> bool {
        !self.same(a, b)
    }
}

/// Non-empty intersection of two sorted label slices.
fn intersects(a: &[String], b: &[String]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Fields that must match (`sameby`) and must differ (`diffby`) for a pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairPredicate {
    #[serde(default)]
    pub sameby: Vec<String>,
    #[serde(default)]
    pub diffby: Vec<String>,
}

impl PairPredicate {
    pub fn new(sameby: &[&str], diffby: &[&str]) -> Self {
        Self {
            sameby: sameby.iter().map(|s| s.to_string()).collect(),
            diffby: diffby.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ResolvedField {
    col: usize,
    kind: FieldKind,
}

#[derive(Debug, Clone)]
struct ResolvedPredicate {
    sameby: Vec<ResolvedField>,
    diffby: Vec<ResolvedField>,
}

impl ResolvedPredicate {
    fn resolve(table: &Table, pred: &PairPredicate, multilabel: Option<usize>) -> Result<Self> {
        let field = |name: &String| -> Result<ResolvedField> {
            let col = table.column_index(name)?;
            let kind = if Some(col) == multilabel {
                FieldKind::MultiLabel
            } else {
                FieldKind::Scalar
            };
            Ok(ResolvedField { col, kind })
        };
        Ok(Self {
            sameby: pred.sameby.iter().map(&field).collect::<Result<_>>()?,
            diffby: pred.diffby.iter().map(&field).collect::<Result<_>>()?,
        })
    }

    fn holds(&self, a: &[Value], b: &[Value]) -> bool {
        self.sameby
            .iter()
            .all(|f| f.kind.same(&a[f.col], &b[f.col]))
            && self
                .diffby
                .iter()
                .all(|f| f.kind.differ(&a[f.col], &b[f.col]))
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Classification of an ordered item pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKind {
    Positive,
    Negative,
    Neither,
}

/// Valid positive and negative partners of one query item, ascending by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMatches {
    pub query: usize,
    pub positives: Vec<usize>,
    pub negatives: Vec<usize>,
}

/// Classifies item pairs of a metadata table.
pub struct Matcher<'a> {
    table: &'a Table,
    positive: ResolvedPredicate,
    negative: ResolvedPredicate,
    multilabel: Option<usize>,
}

impl<'a> Matcher<'a> {
    /// Resolve both predicates against `table`. Unknown fields are an error.
    pub fn new(
        table: &'a Table,
        positive: &PairPredicate,
        negative: &PairPredicate,
        multilabel_col: Option<&str>,
    ) -> Result<Self> {
        let multilabel = multilabel_col
            .map(|name| table.column_index(name))
            .transpose()?;
        Ok(Self {
            table,
            positive: ResolvedPredicate::resolve(table, positive, multilabel)?,
            negative: ResolvedPredicate::resolve(table, negative, multilabel)?,
            multilabel,
        })
    }

    pub fn n_items(&self) -> usize {
        self.table.n_rows()
    }

    /// Column index of the multi-label field, if one was declared.
    pub fn multilabel_col(&self) -> Option<usize> {
        self.multilabel
    }

    /// Classify the ordered pair `(i, j)`. Self-pairs are never matched, and a
    /// pair satisfying both predicates counts as positive only.
    pub fn classify(&self, i: usize, j: usize) -> PairKind {
        if i == j {
            return PairKind::Neither;
        }
        let (a, b) = (self.table.row(i), self.table.row(j));
        if self.positive.holds(a, b) {
            PairKind::Positive
        } else if self.negative.holds(a, b) {
            PairKind::Negative
        } else {
            PairKind::Neither
        }
    }

    /// All positive and negative partners of `query`.
    pub fn query_matches(&self, query: usize) -> QueryMatches {
        let mut out = QueryMatches {
            query,
            ..Default::default()
        };
        for j in 0..self.n_items() {
            match self.classify(query, j) {
                PairKind::Positive => out.positives.push(j),
                PairKind::Negative => out.negatives.push(j),
                PairKind::Neither => {}
            }
        }
        out
    }

    /// Matches for a contiguous block of query rows.
    pub fn batch_matches(&self, rows: Range<usize>) -> Vec<QueryMatches> {
        rows.map(|i| self.query_matches(i)).collect()
    }
}

/// Split `0..n_items` into contiguous query blocks so that each block examines
/// at most `batch_size` ordered pairs (never fewer than one query per block).
pub fn query_batches(n_items: usize, batch_size: usize) -> Result<Vec<Range<usize>>> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be positive".into()));
    }
    let per_block = (batch_size / n_items.max(1)).max(1);
    Ok((0..n_items)
        .step_by(per_block)
        .map(|start| start..(start + per_block).min(n_items))
        .collect())
}
