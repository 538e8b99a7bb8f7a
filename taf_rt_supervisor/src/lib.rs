//! taf_rt_supervisor
//!
//! Outside-world facing orchestration layer for `taf_rt_core`.
//!
//! Responsibilities:
//! - convert stored forecast / observation rows into core components via adapters
//! - group components into forecasts for a batch window
//! - run both table builders and accumulate accepted tables per station and element
//! - snapshot / restore the accumulated tables
//!
//! Non-goals:
//! - no IO
//! - no async
//! - no verification policy (lives in core)

pub mod adapter;
pub mod assemble;
pub mod supervisor;

pub use adapter::{
    AdapterError,
    BasicComponentBuilder,
    ComponentBuilder,
    ForecastRecord,
    InfiniteSentinels,
    ObservationRecord,
    RawForecastText,
    build_forecast_components,
    build_observation_components,
};

pub use assemble::{BatchCfg, assemble_forecasts};

pub use supervisor::{
    BatchReport,
    RestoreStats,
    TableKey,
    TableSet,
    TableSnapshot,
    TableVariant,
    VariantReport,
    VerificationSupervisor,
};
