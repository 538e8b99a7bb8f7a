use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Why a forecast was left out of the reliability tables.
///
/// Every variant is terminal for the forecast it was raised on and harmless to the
/// rest of a batch. The conditions are deterministic, so nothing is retried.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum RejectionReason {
    /// No observations fall inside the validity window.
    #[error("no observations found")]
    NoObservations,
    /// Two consecutive observations (or validity start and the first one) are more
    /// than two hours apart.
    #[error("observation gap of more than two hours ({from}, {to})")]
    ObservationGap {
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
    /// The last observation is more than an hour before validity end.
    #[error("final observation {last} isn't in the last hour before {end}")]
    NoFinalHourObservation {
        last: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// Validity length differs from the verification period.
    #[error("wrong length of {actual_hours}h, should be {expected_hours}h")]
    WrongLength {
        actual_hours: f64,
        expected_hours: f64,
    },
    /// A component or observation carries a category that does not hold its value
    /// under the verification thresholds.
    #[error("value {value} does not belong to category {category}")]
    Miscategorised { category: usize, value: f64 },
    #[error("too complex: {0}")]
    TooComplex(Complexity),
}

/// Ways a forecast can exceed what the table builders support.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum Complexity {
    /// A matched probability has no bin in the registry.
    #[error("unknown probability {0}")]
    UnknownProbability(f64),
    /// Too many (or incompatible) change groups overlap in one section.
    #[error("overlapping change groups are: {0}")]
    OverlappingChangeGroups(String),
    /// A matched category has no row in the table.
    #[error("category {0} is outside the table")]
    UnknownCategory(usize),
}

impl RejectionReason {
    /// Short stable name, handy for tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectionReason::NoObservations => "no_observations",
            RejectionReason::ObservationGap { .. } => "observation_gap",
            RejectionReason::NoFinalHourObservation { .. } => "no_final_hour_observation",
            RejectionReason::WrongLength { .. } => "wrong_length",
            RejectionReason::Miscategorised { .. } => "miscategorised",
            RejectionReason::TooComplex(_) => "too_complex",
        }
    }
}

impl From<Complexity> for RejectionReason {
    fn from(c: Complexity) -> Self {
        RejectionReason::TooComplex(c)
    }
}

/// Errors from loading or validating a [`crate::cfg::VerificationCfg`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{name} thresholds must be strictly ascending and positive")]
    Thresholds { name: &'static str },
    #[error("{name} probability bins must be ascending within [0, 1] and start at 0.0")]
    ProbabilityBins { name: &'static str },
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Two reliability tables with different axes cannot be combined.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("table shape mismatch: {ours:?} vs {theirs:?} (categories, bins)")]
pub struct ShapeMismatch {
    pub ours: (usize, usize),
    pub theirs: (usize, usize),
}
