//! Assigning observations to forecast categories within one section.
//!
//! Observations are matched as closely as the WMO/ICAO definitions of the change
//! groups allow: each group must verify as often as its term demands, no group may
//! take more observations than its term permits, and what is left is matched to
//! whichever category is closest.

use std::cmp::Ordering;

use crate::component::{ForecastComponent, ObservationComponent, ObservationId};

/// The lowest- and highest-valued observations of a section (the same observation
/// when all values are equal).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extremes {
    pub min: ObservationId,
    pub max: ObservationId,
}

/// Rule that picked the target category in [`match_pair`]. Order is precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetRule {
    /// Last chance for the component to verify exactly.
    ExactOutstanding,
    SectionMinimum,
    SectionMaximum,
    /// Observation lies between the component and main categories.
    Intermediate,
    ClampBelowMain,
    ClampAboveMain,
    Forced,
    Closer,
}

#[inline]
fn exact_outstanding(comp: &ForecastComponent) -> bool {
    comp.exact_matched_count == 0 && comp.remaining_metars == 0.0
}

/// Pick the category part of `ob` should be committed to for `comp`, or `None` when
/// it should not be matched at all.
pub fn select_target(
    ob: &ObservationComponent,
    comp: &ForecastComponent,
    main: &ForecastComponent,
    extremes: &Extremes,
    force_match: bool,
) -> Option<(TargetRule, usize)> {
    let o = ob.category as i64;
    let c = comp.category as i64;
    let m = main.category as i64;
    let comp_below_main = m > c;
    let comp_above_main = c > m;

    if comp.required_matches_this_section == 1.0 && exact_outstanding(comp) {
        // Observations run to the end of the group: one must verify it exactly.
        Some((TargetRule::ExactOutstanding, comp.category))
    } else if o >= c && ob.id == extremes.min && exact_outstanding(comp) {
        Some((TargetRule::SectionMinimum, comp.category))
    } else if o <= c && ob.id == extremes.max && exact_outstanding(comp) {
        Some((TargetRule::SectionMaximum, comp.category))
    } else if (o - c) * (o - m) < 0 {
        Some((TargetRule::Intermediate, ob.category))
    } else if comp_below_main && o >= m && force_match {
        Some((TargetRule::ClampBelowMain, main.category - 1))
    } else if comp_above_main && o <= m && force_match {
        Some((TargetRule::ClampAboveMain, main.category + 1))
    } else if force_match {
        Some((TargetRule::Forced, comp.category))
    } else if (o - c).abs() < (o - m).abs() {
        Some((TargetRule::Closer, comp.category))
    } else {
        None
    }
}

/// Try to commit part of one observation's probability to one component.
///
/// Returns `false` without touching either side when the component is full, the
/// observation is fully allocated, the pair was already matched, or no rule applies.
pub fn match_pair(
    ob: &mut ObservationComponent,
    comp: &mut ForecastComponent,
    main: &ForecastComponent,
    extremes: &Extremes,
    force_match: bool,
) -> bool {
    if comp.at_capacity() {
        return false;
    }
    if ob.allocated_probability >= 1.0 {
        return false;
    }
    if ob.is_matched_to(comp.id) {
        return false;
    }

    let Some((rule, target)) = select_target(ob, comp, main, extremes, force_match) else {
        return false;
    };

    let mut amount = comp.prob;
    if ob.allocated_probability + amount > 1.0 {
        amount = 1.0 - ob.allocated_probability;
    }
    if amount <= 0.0 {
        return false;
    }

    ob.already_matched_to.push(comp.id);
    ob.matches.push((target, amount));
    ob.allocated_probability += amount;
    comp.matched_count += 1;
    comp.update_required();
    if comp.category == target {
        comp.exact_matched_count += 1;
    }
    tracing::trace!(
        observation = %ob,
        change_type = %comp.change_type,
        ?rule,
        target,
        amount,
        "matched"
    );
    true
}

fn by_value_ascending(obs: &[ObservationComponent], a: usize, b: usize) -> Ordering {
    obs[a]
        .value
        .total_cmp(&obs[b].value)
        .then(obs[a].issue_time.cmp(&obs[b].issue_time))
}

fn by_value_descending(obs: &[ObservationComponent], a: usize, b: usize) -> Ordering {
    obs[b]
        .value
        .total_cmp(&obs[a].value)
        .then(obs[a].issue_time.cmp(&obs[b].issue_time))
}

/// Distance between two values; two unbounded values are zero apart.
#[inline]
fn value_distance(a: f64, b: f64) -> f64 {
    if a.is_infinite() && b.is_infinite() && a.signum() == b.signum() {
        0.0
    } else {
        (a - b).abs()
    }
}

#[inline]
fn category_distance(a: usize, b: usize) -> usize {
    a.abs_diff(b)
}

/// Match the observations of one section to the active components and a
/// section-scoped copy of `main`.
///
/// Mutates the observations' allocations and the components' counters in place;
/// `observations` keeps its order.
pub fn match_section(
    observations: &mut [ObservationComponent],
    mut components: Vec<&mut ForecastComponent>,
    main: &ForecastComponent,
    observations_in_section: f64,
) {
    if observations.is_empty() {
        return;
    }

    // Observations may have been matched before; start clean.
    for ob in observations.iter_mut() {
        ob.reset_allocation();
    }

    // Working order over `observations`, re-sorted between passes.
    let mut order: Vec<usize> = (0..observations.len()).collect();
    order.sort_by(|&a, &b| by_value_ascending(observations, a, b));
    let lowest = &observations[order[0]];
    let highest = &observations[order[order.len() - 1]];
    let extremes = Extremes {
        min: lowest.id,
        max: if lowest.value == highest.value {
            lowest.id
        } else {
            highest.id
        },
    };

    if components.is_empty() {
        return;
    }

    for comp in components.iter_mut() {
        comp.remaining_metars -= observations_in_section;
        comp.update_required();
    }

    let mut section_main = main.section_copy(observations_in_section);
    components.sort_by(|a, b| a.prob.total_cmp(&b.prob));
    let mut comps: Vec<&mut ForecastComponent> = Vec::with_capacity(components.len() + 1);
    comps.push(&mut section_main);
    comps.extend(components);

    // Components that need every observation get them unconditionally.
    let total = observations.len() as f64;
    let mut deferred: Vec<usize> = Vec::new();
    for ci in 0..comps.len() {
        if comps[ci].required_matches_this_section >= total {
            for &oi in &order {
                match_pair(&mut observations[oi], &mut *comps[ci], main, &extremes, true);
            }
        } else {
            deferred.push(ci);
        }
    }

    if deferred.len() <= 1 {
        return;
    }

    deferred.sort_by(|&a, &b| comps[a].value.total_cmp(&comps[b].value));
    let min_c = deferred[0];
    let max_c = deferred[deferred.len() - 1];

    order.sort_by(|&a, &b| by_value_ascending(observations, a, b));
    for &oi in &order {
        if comps[min_c].required_matches_this_section > 0.0
            && observations[oi].value < comps[min_c].value
        {
            match_pair(&mut observations[oi], &mut *comps[min_c], main, &extremes, true);
        }
    }
    order.sort_by(|&a, &b| by_value_descending(observations, a, b));
    for &oi in &order {
        if comps[max_c].required_matches_this_section > 0.0
            && observations[oi].value > comps[max_c].value
        {
            match_pair(&mut observations[oi], &mut *comps[max_c], main, &extremes, true);
        }
    }

    // Probabilistic groups first, then the certain ones.
    for limit in [0.5, 1.0] {
        for &ci in &deferred {
            if comps[ci].prob > limit {
                continue;
            }
            let (cat, value) = (comps[ci].category, comps[ci].value);
            order.sort_by(|&a, &b| {
                category_distance(observations[a].category, cat)
                    .cmp(&category_distance(observations[b].category, cat))
                    .then(
                        value_distance(observations[a].value, value)
                            .total_cmp(&value_distance(observations[b].value, value)),
                    )
            });
            for &oi in &order {
                let comp = &comps[ci];
                let still_needed = comp.required_matches_this_section > 0.0
                    || (comp.min_matches > 0.0 && exact_outstanding(comp));
                if still_needed {
                    match_pair(&mut observations[oi], &mut *comps[ci], main, &extremes, true);
                }
            }
        }

        if comps[min_c].prob <= limit {
            order.sort_by(|&a, &b| by_value_ascending(observations, a, b));
            for &oi in &order {
                if observations[oi].value < comps[min_c].value {
                    match_pair(&mut observations[oi], &mut *comps[min_c], main, &extremes, true);
                }
            }
        }
        if comps[max_c].prob <= limit {
            order.sort_by(|&a, &b| by_value_descending(observations, a, b));
            for &oi in &order {
                if observations[oi].value > comps[max_c].value {
                    match_pair(&mut observations[oi], &mut *comps[max_c], main, &extremes, true);
                }
            }
        }

        // Exact category matches, closest value first.
        for &ci in &deferred {
            if comps[ci].prob > limit {
                continue;
            }
            let (cat, value) = (comps[ci].category, comps[ci].value);
            let mut exact: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&oi| observations[oi].category == cat)
                .collect();
            exact.sort_by(|&a, &b| {
                value_distance(observations[a].value, value)
                    .total_cmp(&value_distance(observations[b].value, value))
            });
            for oi in exact {
                match_pair(&mut observations[oi], &mut *comps[ci], main, &extremes, true);
            }
        }
    }

    // Whatever is left goes to the closest remaining group, without quotas.
    if min_c == 0 {
        order.sort_by(|&a, &b| by_value_descending(observations, a, b));
        deferred.sort_by(|&a, &b| comps[b].value.total_cmp(&comps[a].value));
    } else {
        order.sort_by(|&a, &b| by_value_ascending(observations, a, b));
        deferred.sort_by(|&a, &b| comps[a].value.total_cmp(&comps[b].value));
    }
    for &oi in &order {
        for &ci in &deferred {
            match_pair(&mut observations[oi], &mut *comps[ci], main, &extremes, false);
        }
    }
}
