//! Splitting a forecast's validity window into sections.
//!
//! A section is a maximal run of consecutive observations that all see the same set
//! of active change groups. Matching is done one section at a time.

use std::ops::Range;

use chrono::{Duration, NaiveDateTime};

use crate::component::{hours_between, ChangeType, ObservationComponent};
use crate::error::RejectionReason;
use crate::forecast::Forecast;

/// Longest tolerated interval between consecutive observations.
pub const MAX_OBSERVATION_GAP_HOURS: i64 = 2;
/// The last observation must fall within this long of validity end.
pub const FINAL_OBSERVATION_HOURS: i64 = 1;

/// Which component is the deterministic baseline of a section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainComponent {
    Init,
    /// Index into `Forecast::components` (a BECMG group that has completed).
    Component(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    /// Indices into the forecast's (de-duplicated, time-ordered) observations.
    pub observations: Range<usize>,
    /// Indices into `Forecast::components`, in forecast order.
    pub active_components: Vec<usize>,
    pub main: MainComponent,
    pub length_hours: f64,
}

#[derive(Clone, Copy, Debug)]
struct Window {
    start: NaiveDateTime,
    end: NaiveDateTime,
    becmg: bool,
}

/// Lazy, single-pass sequence of sections.
///
/// Holds its own copy of the timing data so the forecast can be mutated while
/// sections are consumed.
#[derive(Clone, Debug)]
pub struct Sections {
    windows: Vec<Window>,
    times: Vec<NaiveDateTime>,
    end: NaiveDateTime,
    cutoff: Option<NaiveDateTime>,
    cursor: usize,
    main: MainComponent,
    section_start: NaiveDateTime,
    done: bool,
}

impl Sections {
    fn active_at(&self, t: NaiveDateTime) -> Vec<usize> {
        self.windows
            .iter()
            .enumerate()
            .filter(|(_, w)| w.start <= t && t <= w.end)
            .map(|(i, _)| i)
            .collect()
    }

    fn past_cutoff(&self, i: usize) -> bool {
        self.cutoff.is_some_and(|c| self.times[i] > c)
    }
}

impl Iterator for Sections {
    type Item = Section;

    fn next(&mut self) -> Option<Section> {
        if self.done {
            return None;
        }
        let first = self.cursor;
        if first >= self.times.len() || self.past_cutoff(first) {
            self.done = true;
            return None;
        }

        let active = self.active_at(self.times[first]);
        let mut i = first + 1;
        while i < self.times.len() && !self.past_cutoff(i) {
            let next_active = self.active_at(self.times[i]);
            if next_active != active {
                let boundary = match next_active.iter().find(|c| !active.contains(*c)) {
                    Some(&c) => self.windows[c].start,
                    // Sets differ and nothing started, so something ended.
                    None => active
                        .iter()
                        .find(|c| !next_active.contains(*c))
                        .map_or(self.times[i], |&c| self.windows[c].end),
                };
                let section = Section {
                    observations: first..i,
                    active_components: active.clone(),
                    main: self.main,
                    length_hours: hours_between(self.section_start, boundary),
                };
                tracing::debug!(
                    observations = i - first,
                    active = active.len(),
                    boundary = %boundary,
                    length_hours = section.length_hours,
                    "section boundary"
                );

                // A completed BECMG becomes the baseline for the rest of the forecast.
                for &c in &active {
                    let w = self.windows[c];
                    if w.becmg && w.end == boundary {
                        self.main = MainComponent::Component(c);
                    }
                }
                self.section_start = boundary;
                self.cursor = i;
                return Some(section);
            }
            i += 1;
        }

        self.done = true;
        Some(Section {
            observations: first..i,
            active_components: active,
            main: self.main,
            length_hours: hours_between(self.section_start, self.end),
        })
    }
}

impl Forecast {
    /// Validate observation coverage, de-duplicate the observations and return the
    /// sections of this forecast.
    ///
    /// Observations issued after `cutoff` are not consumed.
    pub fn sections(
        &mut self,
        cutoff: Option<NaiveDateTime>,
    ) -> Result<Sections, RejectionReason> {
        if self.observations.is_empty() {
            return Err(RejectionReason::NoObservations);
        }
        self.observations.sort_by_key(|ob| ob.issue_time);

        let mut prev = self.start();
        for ob in &self.observations {
            if ob.issue_time - prev > Duration::hours(MAX_OBSERVATION_GAP_HOURS) {
                return Err(RejectionReason::ObservationGap {
                    from: prev,
                    to: ob.issue_time,
                });
            }
            prev = ob.issue_time;
        }
        let last = prev;
        if self.end() - last > Duration::hours(FINAL_OBSERVATION_HOURS) {
            return Err(RejectionReason::NoFinalHourObservation {
                last,
                end: self.end(),
            });
        }

        self.remove_duplicate_observations();

        Ok(Sections {
            windows: self
                .components
                .iter()
                .map(|c| Window {
                    start: c.start,
                    end: c.end,
                    becmg: c.change_type == ChangeType::Becmg,
                })
                .collect(),
            times: self.observations.iter().map(|ob| ob.issue_time).collect(),
            end: self.end(),
            cutoff,
            cursor: 0,
            main: MainComponent::Init,
            section_start: self.init.start,
            done: false,
        })
    }

    /// Keep one observation per `(issue_time, station, parameter)`, preferring a
    /// manual report, then a special, then an automated one.
    pub fn remove_duplicate_observations(&mut self) {
        let mut kept: Vec<ObservationComponent> = Vec::with_capacity(self.observations.len());
        for ob in self.observations.drain(..) {
            let dup = kept.iter_mut().find(|k| {
                k.issue_time == ob.issue_time
                    && k.station == ob.station
                    && k.parameter == ob.parameter
            });
            match dup {
                Some(k) if ob.origin < k.origin => {
                    tracing::debug!(
                        "using observation issued {} {}, rather than {} {}",
                        ob.issue_time,
                        ob.origin,
                        k.issue_time,
                        k.origin
                    );
                    *k = ob;
                }
                Some(k) => {
                    tracing::debug!(
                        "using observation issued {} {}, rather than {} {}",
                        k.issue_time,
                        k.origin,
                        ob.issue_time,
                        ob.origin
                    );
                }
                None => kept.push(ob),
            }
        }
        self.observations = kept;
    }
}
