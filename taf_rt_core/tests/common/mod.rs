#![allow(dead_code)]

use std::sync::Once;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use taf_rt_core::*;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub const MPH: f64 = 2.0;

/// Validity start of every test forecast.
pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .unwrap()
}

pub fn at(minutes: i64) -> NaiveDateTime {
    t0() + Duration::minutes(minutes)
}

pub fn vis_category(value: f64) -> usize {
    category_index(&VerificationCfg::default().categories(Parameter::Visibility), value).unwrap()
}

pub fn issue() -> ForecastIssue {
    ForecastIssue {
        station: "EGLL".to_string(),
        issue_station: "EGRR".to_string(),
        issue_time: at(-60),
        origin: "MANL".to_string(),
        status: "NORM".to_string(),
        parameter: Parameter::Visibility,
    }
}

pub fn component(change_type: ChangeType, from: i64, to: i64, value: f64) -> ForecastComponent {
    ForecastComponent::new(
        issue(),
        change_type,
        at(from),
        at(to),
        value,
        vis_category(value),
        MPH,
    )
}

pub fn observation(minutes: i64, value: f64) -> ObservationComponent {
    ObservationComponent::new(
        "EGLL",
        Parameter::Visibility,
        ObservationOrigin::Auto,
        at(minutes),
        value,
        vis_category(value),
    )
}

/// Forecast valid for `hours` from `t0` with initial value `init_value`.
pub fn forecast(hours: i64, init_value: f64) -> Forecast {
    Forecast::new(component(ChangeType::Init, 0, hours * 60, init_value))
}

pub fn with_observations(mut fc: Forecast, obs: &[(i64, f64)]) -> Forecast {
    for &(minutes, value) in obs {
        fc.add_observation(observation(minutes, value));
    }
    fc
}

pub fn cfg_hours(hours: i64) -> VerificationCfg {
    VerificationCfg {
        verification_period_hours: hours,
        ..VerificationCfg::default()
    }
}
