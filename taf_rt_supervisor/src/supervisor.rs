//! Sharded verification supervisor.
//!
//! Runs both table builders on every forecast of a batch and accumulates the
//! accepted tables per `(station, parameter)`:
//! - tables are merged into shards keyed by a stable hash of the table key
//! - rejections are collected per table variant, never fatal to the batch
//!
//! No IO. No async. Concurrency is achieved by sharding accumulators by key.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use taf_rt_core::{Forecast, Parameter, RejectionReason, ReliabilityTable, VerificationCfg};

use crate::adapter::{
    build_forecast_components, build_observation_components, ComponentBuilder, ForecastRecord,
    ObservationRecord, RawForecastText,
};
use crate::assemble::{assemble_forecasts, BatchCfg};

/// Accumulated tables are kept per station and element.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    pub station: String,
    pub parameter: Parameter,
}

impl TableKey {
    pub fn of(fc: &Forecast) -> Self {
        Self {
            station: fc.station().to_string(),
            parameter: fc.parameter(),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.station, self.parameter)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableVariant {
    Plain,
    Uncertainty,
}

/// The two accumulated tables of one key; a variant stays `None` until a forecast
/// is accepted for it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSet {
    pub plain: Option<ReliabilityTable>,
    pub uncertainty: Option<ReliabilityTable>,
}

impl TableSet {
    fn slot(&mut self, variant: TableVariant) -> &mut Option<ReliabilityTable> {
        match variant {
            TableVariant::Plain => &mut self.plain,
            TableVariant::Uncertainty => &mut self.uncertainty,
        }
    }

    /// Sum `table` into the variant's accumulator. On a shape mismatch the
    /// accumulator is left as it was.
    fn absorb(&mut self, variant: TableVariant, table: ReliabilityTable) -> bool {
        let slot = self.slot(variant);
        match slot.as_mut() {
            Some(acc) => match acc.merge(&table) {
                Ok(()) => true,
                Err(err) => {
                    tracing::error!(?variant, error = %err, "table not merged");
                    false
                }
            },
            None => {
                *slot = Some(table);
                true
            }
        }
    }

    fn absorb_set(&mut self, other: TableSet) {
        if let Some(t) = other.plain {
            self.absorb(TableVariant::Plain, t);
        }
        if let Some(t) = other.uncertainty {
            self.absorb(TableVariant::Uncertainty, t);
        }
    }
}

/// Outcome of one table variant over a batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantReport {
    pub accepted: usize,
    /// `(forecast label, reason)` per rejected forecast, in batch order.
    pub rejected: Vec<(String, RejectionReason)>,
}

impl VariantReport {
    /// Rejections tallied by [`RejectionReason::kind`].
    pub fn rejections_by_kind(&self) -> HashMap<&'static str, usize> {
        let mut out = HashMap::new();
        for (_, reason) in &self.rejected {
            *out.entry(reason.kind()).or_insert(0) += 1;
        }
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub plain: VariantReport,
    pub uncertainty: VariantReport,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!(
            "{} TAFs processed, {} TAFs ignored\n{} TAFs processed, {} TAFs ignored for uncertainty calculations",
            self.plain.accepted,
            self.plain.rejected.len(),
            self.uncertainty.accepted,
            self.uncertainty.rejected.len()
        )
    }
}

/// Snapshot of accumulated tables for storage-agnostic persistence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Sorted by key.
    pub tables: Vec<(TableKey, TableSet)>,
}

/// Counters returned by restore operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStats {
    /// Entries taken from the snapshot.
    pub applied: usize,
    /// Entries that replaced existing tables.
    pub overwritten: usize,
    /// Entries summed into existing tables.
    pub merged: usize,
}

#[derive(Default, Debug)]
struct Shard {
    tables: HashMap<TableKey, TableSet>,
}

/// Deterministic FNV-1a hash (stable across runs).
fn fnv1a_u64(bytes: impl IntoIterator<Item = u8>) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn shard_index(key: &TableKey, shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    let tag = match key.parameter {
        Parameter::Visibility => 0u8,
        Parameter::CloudBase => 1u8,
    };
    let bytes = key.station.bytes().chain(std::iter::once(0xff)).chain(std::iter::once(tag));
    (fnv1a_u64(bytes) as usize) % shard_count
}

/// A sharded verification supervisor.
///
/// `shards == 1` behaves like a single accumulator. The state is behind mutexes so a
/// shared supervisor can be fed from several threads; it spawns none itself.
#[derive(Debug)]
pub struct VerificationSupervisor {
    cfg: VerificationCfg,
    shards: usize,
    table_shards: Vec<std::sync::Mutex<Shard>>,
}

impl VerificationSupervisor {
    pub fn new(shards: usize, cfg: VerificationCfg) -> Self {
        let shards = shards.max(1);
        let mut table_shards = Vec::with_capacity(shards);
        for _ in 0..shards {
            table_shards.push(std::sync::Mutex::new(Shard::default()));
        }
        Self {
            cfg,
            shards,
            table_shards,
        }
    }

    pub fn from_batch_cfg(batch: &BatchCfg, cfg: VerificationCfg) -> Self {
        Self::new(batch.shards, cfg)
    }

    pub fn cfg(&self) -> &VerificationCfg {
        &self.cfg
    }

    fn lock(&self, idx: usize) -> std::sync::MutexGuard<'_, Shard> {
        self.table_shards[idx]
            .lock()
            .expect("verification supervisor shard mutex poisoned")
    }

    /// Verify a batch of forecasts and accumulate the accepted tables.
    ///
    /// Deterministic for a given input ordering.
    pub fn verify(&self, forecasts: &[Forecast]) -> BatchReport {
        let mut report = BatchReport::default();
        let mut accepted: Vec<Vec<(TableKey, TableVariant, ReliabilityTable)>> =
            vec![Vec::new(); self.shards];

        for fc in forecasts {
            let key = TableKey::of(fc);
            let idx = shard_index(&key, self.shards);

            let runs = [
                (TableVariant::Plain, fc.construct_table(&self.cfg)),
                (TableVariant::Uncertainty, fc.construct_table_uncertainty(&self.cfg)),
            ];
            for (variant, result) in runs {
                let tally = match variant {
                    TableVariant::Plain => &mut report.plain,
                    TableVariant::Uncertainty => &mut report.uncertainty,
                };
                match result {
                    Ok(table) => {
                        tracing::info!(forecast = %fc, ?variant, "accepted");
                        tally.accepted += 1;
                        accepted[idx].push((key.clone(), variant, table));
                    }
                    Err(reason) => {
                        tracing::warn!(forecast = %fc, ?variant, %reason, "rejected");
                        tally.rejected.push((fc.to_string(), reason));
                    }
                }
            }
        }

        // Lock each shard once.
        for (idx, tables) in accepted.into_iter().enumerate() {
            if tables.is_empty() {
                continue;
            }
            let mut guard = self.lock(idx);
            for (key, variant, table) in tables {
                guard.tables.entry(key).or_default().absorb(variant, table);
            }
        }

        tracing::info!("{}", report.summary());
        report
    }

    /// Convert records, assemble forecasts and verify them.
    ///
    /// Tables are built under the supervisor's own config. Forecasts whose
    /// categories `builder` drew from other thresholds are rejected as
    /// `Miscategorised`.
    pub fn ingest<B: ComponentBuilder>(
        &self,
        builder: &B,
        batch: &BatchCfg,
        forecasts: &[ForecastRecord<'_>],
        observations: &[ObservationRecord<'_>],
        raw: &[RawForecastText<'_>],
    ) -> BatchReport {
        let components = build_forecast_components(builder, forecasts);
        let obs = build_observation_components(builder, observations);
        let assembled = assemble_forecasts(batch, components, obs, raw);
        self.verify(&assembled)
    }

    pub fn tables(&self, key: &TableKey) -> Option<TableSet> {
        let idx = shard_index(key, self.shards);
        self.lock(idx).tables.get(key).cloned()
    }

    /// Export the accumulated tables.
    ///
    /// Deterministic ordering: entries are sorted by key.
    pub fn snapshot(&self) -> TableSnapshot {
        self.snapshot_filtered(|_, _| true)
    }

    /// Export only the entries `predicate` keeps.
    pub fn snapshot_filtered<F>(&self, mut predicate: F) -> TableSnapshot
    where
        F: FnMut(&TableKey, &TableSet) -> bool,
    {
        let mut out: Vec<(TableKey, TableSet)> = Vec::new();
        for idx in 0..self.shards {
            let guard = self.lock(idx);
            for (k, v) in guard.tables.iter() {
                if predicate(k, v) {
                    out.push((k.clone(), v.clone()));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        TableSnapshot { tables: out }
    }

    /// Replace all accumulated tables with the snapshot's.
    pub fn restore(&self, snap: TableSnapshot) -> RestoreStats {
        for idx in 0..self.shards {
            self.lock(idx).tables.clear();
        }

        let mut stats = RestoreStats::default();
        for (key, set) in snap.tables {
            let idx = shard_index(&key, self.shards);
            if self.lock(idx).tables.insert(key, set).is_some() {
                stats.overwritten += 1;
            }
            stats.applied += 1;
        }
        stats
    }

    /// Sum the snapshot's tables into the current ones, keeping anything accumulated
    /// since it was taken.
    pub fn restore_merge(&self, snap: TableSnapshot) -> RestoreStats {
        let mut stats = RestoreStats::default();
        for (key, set) in snap.tables {
            let idx = shard_index(&key, self.shards);
            let mut guard = self.lock(idx);
            match guard.tables.get_mut(&key) {
                Some(existing) => {
                    existing.absorb_set(set);
                    stats.merged += 1;
                }
                None => {
                    guard.tables.insert(key, set);
                }
            }
            stats.applied += 1;
        }
        stats
    }

    pub fn clear_key(&self, key: &TableKey) {
        let idx = shard_index(key, self.shards);
        self.lock(idx).tables.remove(key);
    }
}
