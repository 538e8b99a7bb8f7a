//! Grouping loose components into forecasts.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use taf_rt_core::{ChangeType, Forecast, ForecastComponent, ObservationComponent, ObservationOrigin};

use crate::adapter::RawForecastText;

fn default_true() -> bool {
    true
}

fn default_longest_wins() -> Vec<String> {
    vec!["EGLC".to_string()]
}

fn default_shards() -> usize {
    1
}

/// Settings of one batch run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchCfg {
    /// Forecasts whose validity starts inside `[window_start, window_end]` are verified.
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
    #[serde(default = "default_true")]
    pub use_auto_metars: bool,
    #[serde(default)]
    pub use_specis: bool,
    /// Stations where a longer forecast is kept over a later-issued shorter one.
    #[serde(default = "default_longest_wins")]
    pub longest_wins_stations: Vec<String>,
    #[serde(default = "default_shards")]
    pub shards: usize,
}

impl BatchCfg {
    pub fn new(window_start: NaiveDateTime, window_end: NaiveDateTime) -> Self {
        Self {
            window_start,
            window_end,
            use_auto_metars: true,
            use_specis: false,
            longest_wins_stations: default_longest_wins(),
            shards: default_shards(),
        }
    }

    /// Manual reports are always used.
    pub fn accepts_origin(&self, origin: ObservationOrigin) -> bool {
        match origin {
            ObservationOrigin::Manual => true,
            ObservationOrigin::Auto => self.use_auto_metars,
            ObservationOrigin::Special => self.use_specis,
        }
    }

    fn longest_wins(&self, station: &str) -> bool {
        self.longest_wins_stations.iter().any(|s| s == station)
    }

    fn seeds(&self, comp: &ForecastComponent) -> bool {
        comp.change_type == ChangeType::Init
            && self.window_start <= comp.start
            && comp.start <= self.window_end
            && comp.start >= comp.issue.issue_time
    }
}

fn same_slot(a: &Forecast, b: &Forecast) -> bool {
    a.start() == b.start() && a.station() == b.station() && a.parameter() == b.parameter()
}

/// Build the forecasts of a batch from loose components, observations and raw texts.
///
/// Only the latest issue per `(start, station, parameter)` is kept, returned in order
/// of validity start.
pub fn assemble_forecasts(
    cfg: &BatchCfg,
    components: Vec<ForecastComponent>,
    mut observations: Vec<ObservationComponent>,
    raw: &[RawForecastText<'_>],
) -> Vec<Forecast> {
    let (inits, changes): (Vec<_>, Vec<_>) = components.into_iter().partition(|c| cfg.seeds(c));

    let mut candidates: Vec<Forecast> = inits.into_iter().map(Forecast::new).collect();
    candidates.sort_by(|a, b| b.issue_time().cmp(&a.issue_time()));

    let mut forecasts: Vec<Forecast> = Vec::with_capacity(candidates.len());
    for fc in candidates {
        match forecasts.iter_mut().find(|kept| same_slot(kept, &fc)) {
            Some(kept) if cfg.longest_wins(fc.station()) && fc.length() > kept.length() => {
                tracing::debug!(kept = %fc, dropped = %kept, "using longer forecast");
                *kept = fc;
            }
            Some(kept) => {
                tracing::debug!(
                    "using forecast issued {}, rather than {}",
                    kept.issue_time(),
                    fc.issue_time()
                );
            }
            None => forecasts.push(fc),
        }
    }
    forecasts.sort_by_key(|fc| fc.start());

    for comp in changes {
        match forecasts.iter_mut().find(|fc| fc.contains_component(&comp)) {
            Some(fc) => fc.add_component(comp),
            None => tracing::trace!(
                change_type = %comp.change_type,
                station = %comp.issue.station,
                issue_time = %comp.issue.issue_time,
                "change group has no forecast"
            ),
        }
    }

    observations.retain(|ob| cfg.accepts_origin(ob.origin));
    observations.sort_by_key(|ob| ob.issue_time);
    for fc in &mut forecasts {
        let lo = observations.partition_point(|ob| ob.issue_time < fc.start());
        let hi = observations.partition_point(|ob| ob.issue_time <= fc.end());
        for ob in &observations[lo..hi] {
            if fc.contains_observation(ob) {
                fc.add_observation(ob.clone());
            }
        }
        fc.raw_text = raw
            .iter()
            .find(|r| r.start == fc.start() && r.station == fc.station())
            .map(|r| r.trimmed().to_string());
    }

    tracing::info!(forecasts = forecasts.len(), "assembled forecasts");
    forecasts
}
