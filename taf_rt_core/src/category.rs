use std::fmt;

use serde::{Deserialize, Serialize};

/// Approximate-equality tolerance for probability bin lookup.
pub const PROB_BIN_TOLERANCE: f64 = 0.001;

/// Half-open interval `[lower_bound, upper_bound)` of a meteorological value.
///
/// The last category built by [`Category::from_thresholds`] is unbounded above and
/// also holds `+inf` (the "no restriction" visibility / cloud base).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub lower_bound: f64,
    #[serde(with = "unbounded")]
    pub upper_bound: f64,
}

impl Category {
    /// Category from `lower_bound` (inclusive) to `upper_bound` (exclusive).
    pub fn new(lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// Build `thresholds.len() + 1` contiguous categories with implicit bounds of 0
    /// and `+inf`. `thresholds` must be sorted ascending.
    pub fn from_thresholds(thresholds: &[f64]) -> Vec<Category> {
        let mut cats = Vec::with_capacity(thresholds.len() + 1);
        for i in 0..=thresholds.len() {
            let lower = if i == 0 { 0.0 } else { thresholds[i - 1] };
            let upper = thresholds.get(i).copied().unwrap_or(f64::INFINITY);
            cats.push(Category::new(lower, upper));
        }
        cats
    }

    /// Whether `value` falls in the category. `+inf` belongs to the unbounded one.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        if value.is_infinite() && self.upper_bound.is_infinite() {
            return true;
        }
        self.lower_bound <= value && value < self.upper_bound
    }

    pub fn is_unbounded(&self) -> bool {
        self.upper_bound.is_infinite()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.upper_bound.is_finite() {
            write!(f, "{} <= x < {}", self.lower_bound, self.upper_bound)
        } else {
            write!(f, "x >= {}", self.lower_bound)
        }
    }
}

/// Index of the category containing `value`, if any.
pub fn category_index(categories: &[Category], value: f64) -> Option<usize> {
    categories.iter().position(|c| c.contains(value))
}

/// Ordered registry of the probabilities a reliability table is binned by.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbBins {
    probs: Vec<f64>,
}

impl ProbBins {
    /// Registry over `probs`, which must ascend from 0.0.
    pub fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Bins of the plain table: everything a TAF group can assert directly.
    pub fn plain() -> Self {
        Self::new(vec![0.0, 0.3, 0.4, 0.6, 0.7, 1.0])
    }

    /// Twenty-one bins in steps of 0.05 for the uncertainty-penalizing table.
    pub fn uncertainty() -> Self {
        Self::new((0..=20).map(|i| i as f64 * 0.05).collect())
    }

    /// Position of the bin within [`PROB_BIN_TOLERANCE`] of `prob`.
    pub fn index_of(&self, prob: f64) -> Option<usize> {
        self.probs
            .iter()
            .position(|p| (p - prob).abs() < PROB_BIN_TOLERANCE)
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }
}

/// Serde for values that may be `+inf`: written as `null`, read back as `+inf`.
pub(crate) mod unbounded {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_infinite() && v.is_sign_positive() {
            s.serialize_none()
        } else {
            s.serialize_some(v)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}
