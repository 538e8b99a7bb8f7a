use std::fmt;

use chrono::{Duration, NaiveDateTime};

use crate::component::{
    hours_between, ComponentId, ForecastComponent, ObservationComponent, ObservationId, Parameter,
};
use crate::section::MainComponent;

/// One issued TAF: its initial conditions, change groups and the observations
/// falling in its validity window.
///
/// A forecast owns private copies of its components and observations, and every
/// table construction works on a fresh reset clone of them.
#[derive(Clone, Debug)]
pub struct Forecast {
    pub init: ForecastComponent,
    pub components: Vec<ForecastComponent>,
    pub observations: Vec<ObservationComponent>,
    /// Raw TAF text, only used in diagnostics.
    pub raw_text: Option<String>,
}

impl Forecast {
    /// Forecast with `init` as its initial conditions and nothing attached yet.
    pub fn new(mut init: ForecastComponent) -> Self {
        init.id = ComponentId(0);
        Self {
            init,
            components: Vec::new(),
            observations: Vec::new(),
            raw_text: None,
        }
    }

    pub fn station(&self) -> &str {
        &self.init.issue.station
    }

    pub fn parameter(&self) -> Parameter {
        self.init.issue.parameter
    }

    pub fn issue_time(&self) -> NaiveDateTime {
        self.init.issue.issue_time
    }

    pub fn start(&self) -> NaiveDateTime {
        self.init.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.init.end
    }

    pub fn length(&self) -> Duration {
        self.init.end - self.init.start
    }

    pub fn length_hours(&self) -> f64 {
        hours_between(self.init.start, self.init.end)
    }

    /// A change group belongs to this forecast when it was issued with it.
    pub fn contains_component(&self, comp: &ForecastComponent) -> bool {
        self.init.issue == comp.issue
    }

    /// An observation belongs to this forecast when it is for the same station and
    /// element and falls inside the validity window (both ends inclusive).
    pub fn contains_observation(&self, ob: &ObservationComponent) -> bool {
        self.station() == ob.station
            && self.parameter() == ob.parameter
            && self.start() <= ob.issue_time
            && ob.issue_time <= self.end()
    }

    /// Attach a change group, numbering it after the ones already present.
    pub fn add_component(&mut self, mut comp: ForecastComponent) {
        comp.id = ComponentId(self.components.len() + 1);
        self.components.push(comp);
    }

    pub fn add_observation(&mut self, mut ob: ObservationComponent) {
        ob.id = ObservationId(self.observations.len());
        self.observations.push(ob);
    }

    /// Put every component and observation back into its pre-run state.
    pub fn reset(&mut self, metars_per_hour: f64) {
        self.init.reset(metars_per_hour);
        for comp in &mut self.components {
            comp.reset(metars_per_hour);
        }
        for ob in &mut self.observations {
            ob.reset_allocation();
        }
    }

    /// The component acting as main for a section.
    pub fn main_component(&self, main: MainComponent) -> &ForecastComponent {
        match main {
            MainComponent::Init => &self.init,
            MainComponent::Component(i) => &self.components[i],
        }
    }
}

impl fmt::Display for Forecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} TAF, issued {} for {}, {} change sets, {} METARs>",
            self.parameter(),
            self.issue_time(),
            self.station(),
            self.components.len(),
            self.observations.len()
        )
    }
}
