use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Forecast element being verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parameter {
    Visibility,
    CloudBase,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parameter::Visibility => "VIS",
            Parameter::CloudBase => "CLB",
        })
    }
}

/// TAF change-group type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Init,
    Fm,
    Tempo,
    Becmg,
    Prob30,
    Prob40,
    Prob30Tempo,
    Prob40Tempo,
}

impl ChangeType {
    /// Probability the group asserts for its category.
    pub fn prob(self) -> f64 {
        match self {
            ChangeType::Init | ChangeType::Fm | ChangeType::Tempo | ChangeType::Becmg => 1.0,
            ChangeType::Prob30 | ChangeType::Prob30Tempo => 0.3,
            ChangeType::Prob40 | ChangeType::Prob40Tempo => 0.4,
        }
    }

    pub fn is_tempo(self) -> bool {
        matches!(
            self,
            ChangeType::Tempo | ChangeType::Prob30Tempo | ChangeType::Prob40Tempo
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Init => "INIT",
            ChangeType::Fm => "FM",
            ChangeType::Tempo => "TEMPO",
            ChangeType::Becmg => "BECMG",
            ChangeType::Prob30 => "PROB30",
            ChangeType::Prob40 => "PROB40",
            ChangeType::Prob30Tempo => "PROB30 TEMPO",
            ChangeType::Prob40Tempo => "PROB40 TEMPO",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("change type \"{0}\" not known")]
pub struct UnknownChangeType(pub String);

impl FromStr for ChangeType {
    type Err = UnknownChangeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c.to_ascii_uppercase() })
            .collect();
        let norm = norm.split_whitespace().collect::<Vec<_>>().join(" ");
        match norm.as_str() {
            "INIT" => Ok(ChangeType::Init),
            "FM" => Ok(ChangeType::Fm),
            "TEMPO" => Ok(ChangeType::Tempo),
            "BECMG" => Ok(ChangeType::Becmg),
            "PROB30" => Ok(ChangeType::Prob30),
            "PROB40" => Ok(ChangeType::Prob40),
            "PROB30 TEMPO" => Ok(ChangeType::Prob30Tempo),
            "PROB40 TEMPO" => Ok(ChangeType::Prob40Tempo),
            _ => Err(UnknownChangeType(s.to_string())),
        }
    }
}

/// Where an observation came from. Declaration order is de-duplication preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObservationOrigin {
    /// MANL
    Manual,
    /// SPEC
    Special,
    /// AUTO
    Auto,
}

impl fmt::Display for ObservationOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObservationOrigin::Manual => "MANL",
            ObservationOrigin::Special => "SPEC",
            ObservationOrigin::Auto => "AUTO",
        })
    }
}

/// Identity of a forecast component within its forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub usize);

impl ComponentId {
    /// Reserved for the per-section copy of the main component.
    pub const SECTION_MAIN: ComponentId = ComponentId(usize::MAX);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservationId(pub usize);

/// Fields shared by every component of one issued TAF.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastIssue {
    pub station: String,
    pub issue_station: String,
    pub issue_time: NaiveDateTime,
    pub origin: String,
    pub status: String,
    pub parameter: Parameter,
}

/// Matching quotas of a component, in observations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quotas {
    pub min_matches: f64,
    pub max_matches: f64,
    /// Observations the component spans in total.
    pub span: f64,
}

impl Quotas {
    /// WMO/ICAO reading of each group: a TEMPO must verify at least once and for at
    /// most half its period, a BECMG at least once, a plain PROB group throughout.
    pub fn for_change_type(change_type: ChangeType, length_hours: f64, metars_per_hour: f64) -> Self {
        let span = metars_per_hour * length_hours;
        let min_matches = match change_type {
            ChangeType::Init | ChangeType::Fm => 0.0,
            ChangeType::Tempo | ChangeType::Prob30Tempo | ChangeType::Prob40Tempo => 1.0,
            ChangeType::Becmg => 1.0,
            ChangeType::Prob30 | ChangeType::Prob40 => span,
        };
        let max_matches = if change_type.is_tempo() { span / 2.0 } else { span };
        Self {
            min_matches,
            max_matches,
            span,
        }
    }
}

/// One change group (or the initial conditions) of a TAF, with its matching state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForecastComponent {
    pub id: ComponentId,
    pub issue: ForecastIssue,
    pub change_type: ChangeType,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(with = "crate::category::unbounded")]
    pub value: f64,
    pub category: usize,
    pub prob: f64,
    pub min_matches: f64,
    pub max_matches: f64,

    // Per-run state; see `reset`.
    pub matched_count: u32,
    pub exact_matched_count: u32,
    pub remaining_metars: f64,
    pub required_matches_this_section: f64,
}

impl ForecastComponent {
    pub fn new(
        issue: ForecastIssue,
        change_type: ChangeType,
        start: NaiveDateTime,
        end: NaiveDateTime,
        value: f64,
        category: usize,
        metars_per_hour: f64,
    ) -> Self {
        let length_hours = hours_between(start, end);
        let q = Quotas::for_change_type(change_type, length_hours, metars_per_hour);
        Self {
            id: ComponentId(0),
            issue,
            change_type,
            start,
            end,
            value,
            category,
            prob: change_type.prob(),
            min_matches: q.min_matches,
            max_matches: q.max_matches,
            matched_count: 0,
            exact_matched_count: 0,
            remaining_metars: q.span,
            required_matches_this_section: 0.0,
        }
    }

    /// Validity length in (fractional) hours.
    pub fn length_hours(&self) -> f64 {
        hours_between(self.start, self.end)
    }

    /// Zero the matching state. Must run before a component takes part in a new
    /// verification run.
    pub fn reset(&mut self, metars_per_hour: f64) {
        self.matched_count = 0;
        self.exact_matched_count = 0;
        self.remaining_metars = metars_per_hour * self.length_hours();
        self.required_matches_this_section = 0.0;
    }

    /// Recompute how many of the section's observations the component still needs.
    #[inline]
    pub fn update_required(&mut self) {
        self.required_matches_this_section =
            self.min_matches - self.matched_count as f64 - self.remaining_metars;
    }

    /// Copy standing in for `self` for the length of one section only.
    pub fn section_copy(&self, observations_in_section: f64) -> Self {
        let mut copy = self.clone();
        copy.id = ComponentId::SECTION_MAIN;
        copy.min_matches = 0.0;
        copy.max_matches = observations_in_section;
        copy.matched_count = 0;
        copy.exact_matched_count = 0;
        copy.remaining_metars = 0.0;
        copy.required_matches_this_section = 0.0;
        copy
    }

    /// No further matches allowed.
    #[inline]
    pub fn at_capacity(&self) -> bool {
        self.matched_count as f64 >= self.max_matches
    }

    #[inline]
    pub fn is_active_at(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }
}

/// One observed value with its allocation state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObservationComponent {
    pub id: ObservationId,
    pub station: String,
    pub parameter: Parameter,
    pub origin: ObservationOrigin,
    pub issue_time: NaiveDateTime,
    #[serde(with = "crate::category::unbounded")]
    pub value: f64,
    pub category: usize,

    pub allocated_probability: f64,
    /// `(forecast category, probability)` pairs committed so far.
    pub matches: Vec<(usize, f64)>,
    pub already_matched_to: Vec<ComponentId>,
}

impl ObservationComponent {
    pub fn new(
        station: impl Into<String>,
        parameter: Parameter,
        origin: ObservationOrigin,
        issue_time: NaiveDateTime,
        value: f64,
        category: usize,
    ) -> Self {
        Self {
            id: ObservationId(0),
            station: station.into(),
            parameter,
            origin,
            issue_time,
            value,
            category,
            allocated_probability: 0.0,
            matches: Vec::new(),
            already_matched_to: Vec::new(),
        }
    }

    pub fn reset_allocation(&mut self) {
        self.allocated_probability = 0.0;
        self.matches.clear();
        self.already_matched_to.clear();
    }

    pub fn is_matched_to(&self, id: ComponentId) -> bool {
        self.already_matched_to.contains(&id)
    }
}

impl fmt::Display for ObservationComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} @ {}, {}: {}>",
            self.parameter, self.issue_time, self.station, self.value
        )
    }
}

pub(crate) fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}
