//! Reliability-table verification of TAF visibility and cloud-base forecasts.
//!
//! A [`Forecast`] holds the initial conditions and change groups of one issued TAF
//! together with the observations in its validity window. It is split into
//! [`Section`]s, observations are matched to the active change groups, and the
//! matches are counted into a [`ReliabilityTable`]. A second table is built from
//! fixed uncertainty-penalizing distributions instead of matching.

// Vocabulary: categories and bins, config, components, rejections.
pub mod category;
pub mod cfg;
pub mod component;
pub mod error;

// Engine: a forecast is split into sections, matched or given a fixed
// distribution, and counted into tables.
pub mod forecast;
pub mod section;
pub mod matching;
pub mod uncertainty;
pub mod table;

pub use category::{category_index, Category, ProbBins, PROB_BIN_TOLERANCE};
pub use cfg::VerificationCfg;
pub use component::{
    ChangeType, ComponentId, ForecastComponent, ForecastIssue, ObservationComponent,
    ObservationId, ObservationOrigin, Parameter, Quotas, UnknownChangeType,
};
pub use error::{Complexity, ConfigError, RejectionReason, ShapeMismatch};

pub use forecast::Forecast;
pub use section::{MainComponent, Section, Sections};
pub use matching::{match_pair, match_section, Extremes, TargetRule};
pub use uncertainty::{snap_probability, uncertainty_split, UncertaintySplit};
pub use table::ReliabilityTable;
