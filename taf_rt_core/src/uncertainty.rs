//! Uncertainty-penalizing probabilities.
//!
//! Instead of matching observations, each section is given a fixed distribution over
//! the main category, the alternative category of the active change group and every
//! category in between. Longer groups, and groups further from main, spread their
//! probability more thinly.

use crate::component::ChangeType;

/// Closed-form probabilities of one change group against the main category.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UncertaintySplit {
    pub main: f64,
    pub alternative: Option<f64>,
    /// Probability given to *each* category strictly between main and alternative.
    pub intermediate: Option<f64>,
}

impl UncertaintySplit {
    pub const CERTAIN: UncertaintySplit = UncertaintySplit {
        main: 1.0,
        alternative: None,
        intermediate: None,
    };
}

/// Probabilities for a group of type `change_type` lasting `n` hours that forecasts
/// `alt_cat` while `main_cat` is the baseline.
pub fn uncertainty_split(
    n: f64,
    change_type: ChangeType,
    main_cat: usize,
    alt_cat: usize,
) -> UncertaintySplit {
    if main_cat == alt_cat {
        return UncertaintySplit::CERTAIN;
    }
    let k = (main_cat.abs_diff(alt_cat) - 1) as f64;

    let (main, alternative, intermediate) = match change_type {
        ChangeType::Init | ChangeType::Fm => return UncertaintySplit::CERTAIN,
        ChangeType::Tempo | ChangeType::Prob30Tempo | ChangeType::Prob40Tempo => {
            let (a, i) = if k == 0.0 {
                ((n + 1.0) / (4.0 * n), 0.0)
            } else {
                ((n + 3.0) / (8.0 * n), (n - 1.0) / (8.0 * n * k))
            };
            if change_type == ChangeType::Tempo {
                ((3.0 * n - 1.0) / (4.0 * n), a, Some(i))
            } else {
                let p = change_type.prob();
                (1.0 - p * (n + 1.0) / (4.0 * n), p * a, Some(p * i))
            }
        }
        ChangeType::Becmg => {
            let m = (2.0 * n - 1.0) / (4.0 * n * (k + 1.0));
            let a = (2.0 * n + 1.0) / (4.0 * n);
            (m, a, (k > 0.0).then_some(m))
        }
        ChangeType::Prob30 | ChangeType::Prob40 => {
            let p = change_type.prob();
            if k == 0.0 {
                (1.0 - p, p, None)
            } else {
                (
                    1.0 - p,
                    p * (2.0 * n + 1.0) / (4.0 * n),
                    Some(p * (2.0 * n - 1.0) / (4.0 * n * k)),
                )
            }
        }
    };

    UncertaintySplit {
        main,
        alternative: Some(alternative),
        intermediate: intermediate.filter(|i| *i != 0.0),
    }
}

#[inline]
fn round_to(x: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (x * scale).round() / scale
}

/// Put `p` into the nearest 0.05 bin; `x.25` and `x.75` (in tenths) round up.
pub fn snap_probability(p: f64) -> f64 {
    let big = round_to(p, 6) * 10.0;
    let whole = big.trunc();
    let snapped = if big < whole + 0.25 {
        whole / 10.0
    } else if big < whole + 0.75 {
        (whole + 0.5) / 10.0
    } else {
        (whole + 1.0) / 10.0
    };
    round_to(snapped, 2)
}

/// Unsnapped `(category, probability)` pairs: main, alternative, then each
/// intermediate category in ascending order.
pub fn distribution(
    main_cat: usize,
    alt_cat: Option<usize>,
    split: &UncertaintySplit,
) -> Vec<(usize, f64)> {
    let mut dist = vec![(main_cat, split.main)];
    let Some(alt_cat) = alt_cat else {
        return dist;
    };
    if let Some(a) = split.alternative {
        dist.push((alt_cat, a));
    }
    if let Some(i) = split.intermediate {
        let (lo, hi) = if main_cat < alt_cat {
            (main_cat, alt_cat)
        } else {
            (alt_cat, main_cat)
        };
        dist.extend((lo + 1..hi).map(|cat| (cat, i)));
    }
    dist
}

/// Fix a snapped distribution that no longer sums to 1.00 by moving its largest
/// entry. Returns whether a correction was made.
pub fn correct_rounding(dist: &mut [(usize, f64)]) -> bool {
    let sum: f64 = dist.iter().map(|(_, p)| p).sum();
    if round_to(sum, 2) == 1.0 {
        return false;
    }
    dist.sort_by(|a, b| a.1.total_cmp(&b.1));
    if let Some(last) = dist.last_mut() {
        tracing::debug!(sum, category = last.0, "correcting rounded probabilities");
        last.1 = round_to(last.1 - (sum - 1.0), 2);
    }
    true
}

/// Binned distribution for one section: snapped to 0.05 steps and corrected to sum
/// to one.
pub fn snapped_distribution(
    main_cat: usize,
    alt_cat: Option<usize>,
    split: &UncertaintySplit,
) -> Vec<(usize, f64)> {
    let mut dist: Vec<(usize, f64)> = distribution(main_cat, alt_cat, split)
        .into_iter()
        .map(|(cat, p)| (cat, snap_probability(p)))
        .collect();
    correct_rounding(&mut dist);
    tracing::debug!(?dist, "uncertainty distribution");
    dist
}
