//! Record adapter layer: turn flat forecast and observation rows into
//! `taf_rt_core` components.
//!
//! No IO happens here. Callers extract rows however they like and hand them over as
//! borrowed or owned strings; a `ComponentBuilder` does the unit conversion and
//! categorisation.

use std::borrow::Cow;

use chrono::NaiveDateTime;

use taf_rt_core::{
    category_index, ChangeType, ForecastComponent, ForecastIssue, ObservationComponent,
    ObservationOrigin, Parameter, UnknownChangeType, VerificationCfg,
};

/// One change group (or the initial conditions) of a TAF as stored.
#[derive(Clone, Debug)]
pub struct ForecastRecord<'a> {
    pub station: Cow<'a, str>,
    /// Office that issued the forecast.
    pub issue_station: Cow<'a, str>,
    pub issue_time: NaiveDateTime,
    pub origin: Cow<'a, str>,
    pub status: Cow<'a, str>,
    /// `VIS` or `CLB`.
    pub parameter: Cow<'a, str>,
    pub change_type: Cow<'a, str>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Raw value: metres for both elements, with the sentinel for "unlimited".
    pub value: f64,
}

/// One observed element as stored.
#[derive(Clone, Debug)]
pub struct ObservationRecord<'a> {
    pub station: Cow<'a, str>,
    /// `PVI` (prevailing visibility), `VIS` or `CLB`.
    pub parameter: Cow<'a, str>,
    /// `MANL`, `SPEC` or `AUTO`.
    pub origin: Cow<'a, str>,
    pub issue_time: NaiveDateTime,
    pub value: f64,
}

/// Issued TAF text, used only to label diagnostics.
#[derive(Clone, Debug)]
pub struct RawForecastText<'a> {
    pub station: Cow<'a, str>,
    pub start: NaiveDateTime,
    pub text: Cow<'a, str>,
}

impl RawForecastText<'_> {
    /// The text from the station identifier onwards.
    pub fn trimmed(&self) -> &str {
        match self.text.find(&*self.station) {
            Some(at) => &self.text[at..],
            None => &self.text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("\"{0}\" is not a valid variable")]
    UnknownParameter(String),
    #[error(transparent)]
    UnknownChangeType(#[from] UnknownChangeType),
    #[error("observation origin \"{0}\" not known")]
    UnknownOrigin(String),
    #[error("{parameter} value {value} is in no category")]
    Uncategorised { parameter: Parameter, value: f64 },
}

pub fn parse_parameter(s: &str) -> Result<Parameter, AdapterError> {
    match s.trim() {
        "VIS" | "PVI" => Ok(Parameter::Visibility),
        "CLB" => Ok(Parameter::CloudBase),
        other => Err(AdapterError::UnknownParameter(other.to_string())),
    }
}

pub fn parse_origin(s: &str) -> Result<ObservationOrigin, AdapterError> {
    match s.trim() {
        "MANL" => Ok(ObservationOrigin::Manual),
        "SPEC" => Ok(ObservationOrigin::Special),
        "AUTO" => Ok(ObservationOrigin::Auto),
        other => Err(AdapterError::UnknownOrigin(other.to_string())),
    }
}

/// Stored values standing for "no restriction".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InfiniteSentinels {
    pub visibility: f64,
    pub cloud_base: f64,
}

impl Default for InfiniteSentinels {
    fn default() -> Self {
        Self {
            visibility: 9999.0,
            cloud_base: 3047.0,
        }
    }
}

/// Map stored rows into core components.
pub trait ComponentBuilder {
    fn forecast_component(&self, rec: &ForecastRecord<'_>) -> Result<ForecastComponent, AdapterError>;
    fn observation_component(
        &self,
        rec: &ObservationRecord<'_>,
    ) -> Result<ObservationComponent, AdapterError>;
}

/// Builder using a `VerificationCfg` for categories, unit conversion and quotas.
///
/// Cloud base is stored in metres and converted to feet rounded to the nearest 10 ft.
#[derive(Clone, Debug)]
pub struct BasicComponentBuilder {
    pub cfg: VerificationCfg,
    pub sentinels: InfiniteSentinels,
}

impl BasicComponentBuilder {
    pub fn new(cfg: VerificationCfg) -> Self {
        Self {
            cfg,
            sentinels: InfiniteSentinels::default(),
        }
    }

    /// Converted value of a stored reading.
    pub fn value(&self, parameter: Parameter, raw: f64) -> f64 {
        match parameter {
            Parameter::Visibility if raw == self.sentinels.visibility => f64::INFINITY,
            Parameter::CloudBase if raw == self.sentinels.cloud_base => f64::INFINITY,
            Parameter::Visibility => raw,
            Parameter::CloudBase => (raw / self.cfg.ft_to_m / 10.0).round_ties_even() * 10.0,
        }
    }

    fn category(&self, parameter: Parameter, value: f64) -> Result<usize, AdapterError> {
        category_index(&self.cfg.categories(parameter), value)
            .ok_or(AdapterError::Uncategorised { parameter, value })
    }
}

impl Default for BasicComponentBuilder {
    fn default() -> Self {
        Self::new(VerificationCfg::default())
    }
}

impl ComponentBuilder for BasicComponentBuilder {
    fn forecast_component(&self, rec: &ForecastRecord<'_>) -> Result<ForecastComponent, AdapterError> {
        let parameter = parse_parameter(&rec.parameter)?;
        let change_type: ChangeType = rec.change_type.parse()?;
        let value = self.value(parameter, rec.value);
        let category = self.category(parameter, value)?;
        let issue = ForecastIssue {
            station: rec.station.to_string(),
            issue_station: rec.issue_station.to_string(),
            issue_time: rec.issue_time,
            origin: rec.origin.to_string(),
            status: rec.status.to_string(),
            parameter,
        };
        Ok(ForecastComponent::new(
            issue,
            change_type,
            rec.start,
            rec.end,
            value,
            category,
            self.cfg.metars_per_hour,
        ))
    }

    fn observation_component(
        &self,
        rec: &ObservationRecord<'_>,
    ) -> Result<ObservationComponent, AdapterError> {
        let parameter = parse_parameter(&rec.parameter)?;
        let origin = parse_origin(&rec.origin)?;
        let value = self.value(parameter, rec.value);
        let category = self.category(parameter, value)?;
        Ok(ObservationComponent::new(
            rec.station.to_string(),
            parameter,
            origin,
            rec.issue_time,
            value,
            category,
        ))
    }
}

/// Build every forecast component that converts; the rest are logged and skipped.
pub fn build_forecast_components<B: ComponentBuilder>(
    builder: &B,
    records: &[ForecastRecord<'_>],
) -> Vec<ForecastComponent> {
    let mut out = Vec::with_capacity(records.len());
    for rec in records {
        match builder.forecast_component(rec) {
            Ok(comp) => out.push(comp),
            Err(err) => tracing::warn!(
                station = %rec.station,
                issue_time = %rec.issue_time,
                error = %err,
                "skipping forecast record"
            ),
        }
    }
    out
}

/// Build every observation that converts; the rest are logged and skipped.
pub fn build_observation_components<B: ComponentBuilder>(
    builder: &B,
    records: &[ObservationRecord<'_>],
) -> Vec<ObservationComponent> {
    let mut out = Vec::with_capacity(records.len());
    for rec in records {
        match builder.observation_component(rec) {
            Ok(ob) => out.push(ob),
            Err(err) => tracing::warn!(
                station = %rec.station,
                issue_time = %rec.issue_time,
                error = %err,
                "skipping observation record"
            ),
        }
    }
    out
}
