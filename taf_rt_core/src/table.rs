//! Reliability tables and the two ways of filling them from a forecast.

use serde::{Deserialize, Serialize};

use crate::category::{Category, ProbBins};
use crate::cfg::VerificationCfg;
use crate::component::ForecastComponent;
use crate::error::{Complexity, RejectionReason, ShapeMismatch};
use crate::forecast::Forecast;
use crate::matching::match_section;
use crate::uncertainty::{snapped_distribution, uncertainty_split, UncertaintySplit};

/// Counts of `(forecast category, observed category, probability bin)` triples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityTable {
    pub categories: Vec<Category>,
    pub bins: Vec<f64>,
    /// Row-major `[forecast][observed][bin]`.
    counts: Vec<u64>,
}

impl ReliabilityTable {
    /// Empty table over `categories` on both axes, binned by `bins`.
    pub fn new(categories: Vec<Category>, bins: &ProbBins) -> Self {
        let n = categories.len();
        Self {
            counts: vec![0; n * n * bins.len()],
            categories,
            bins: bins.as_slice().to_vec(),
        }
    }

    /// `(category count, bin count)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.categories.len(), self.bins.len())
    }

    #[inline]
    fn offset(&self, forecast: usize, observed: usize, bin: usize) -> Option<usize> {
        let (n, b) = self.shape();
        (forecast < n && observed < n && bin < b).then(|| (forecast * n + observed) * b + bin)
    }

    /// Count in one cell; zero for a cell outside the table.
    pub fn get(&self, forecast: usize, observed: usize, bin: usize) -> u64 {
        self.offset(forecast, observed, bin)
            .map_or(0, |at| self.counts[at])
    }

    /// Add one to a cell. Returns `false` and leaves the table alone when the cell is
    /// outside it.
    pub fn increment(&mut self, forecast: usize, observed: usize, bin: usize) -> bool {
        match self.offset(forecast, observed, bin) {
            Some(at) => {
                self.counts[at] += 1;
                true
            }
            None => false,
        }
    }

    /// Sum over every cell.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Count one observation against its `(forecast category, probability)` pairs.
    /// Every category the pairs leave out counts in the zero bin.
    ///
    /// Nothing is counted unless every category and probability fits the table.
    pub fn record(
        &mut self,
        observed: usize,
        matches: &[(usize, f64)],
        bins: &ProbBins,
    ) -> Result<(), RejectionReason> {
        let (n, b) = self.shape();
        if observed >= n {
            return Err(Complexity::UnknownCategory(observed).into());
        }
        let mut cells = Vec::with_capacity(matches.len());
        for &(forecast, prob) in matches {
            if forecast >= n {
                return Err(Complexity::UnknownCategory(forecast).into());
            }
            let bin = bins
                .index_of(prob)
                .filter(|&bin| bin < b)
                .ok_or(Complexity::UnknownProbability(prob))?;
            cells.push((forecast, bin));
        }

        for (forecast, bin) in cells {
            self.increment(forecast, observed, bin);
        }
        for forecast in 0..n {
            if !matches.iter().any(|(c, _)| *c == forecast) {
                self.increment(forecast, observed, 0);
            }
        }
        Ok(())
    }

    /// Element-wise sum of `other` into `self`.
    pub fn merge(&mut self, other: &ReliabilityTable) -> Result<(), ShapeMismatch> {
        if self.shape() != other.shape() {
            return Err(ShapeMismatch {
                ours: self.shape(),
                theirs: other.shape(),
            });
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        Ok(())
    }

    /// Collapse the probability axis: `[forecast][observed]` with each count weighted
    /// by its bin probability.
    pub fn to_contingency(&self) -> Vec<Vec<f64>> {
        let (n, _) = self.shape();
        (0..n)
            .map(|f| {
                (0..n)
                    .map(|o| {
                        self.bins
                            .iter()
                            .enumerate()
                            .map(|(b, p)| self.get(f, o, b) as f64 * p)
                            .sum()
                    })
                    .collect()
            })
            .collect()
    }
}

impl Forecast {
    fn check_length(&self, cfg: &VerificationCfg) -> Result<(), RejectionReason> {
        if self.length() != cfg.verification_period() {
            return Err(RejectionReason::WrongLength {
                actual_hours: self.length_hours(),
                expected_hours: cfg.verification_period_hours as f64,
            });
        }
        Ok(())
    }

    /// Every component and observation category must hold its value under `cfg`.
    fn check_categories(&self, cfg: &VerificationCfg) -> Result<(), RejectionReason> {
        let categories = cfg.categories(self.parameter());
        let values = std::iter::once(&self.init)
            .chain(&self.components)
            .map(|c| (c.category, c.value))
            .chain(self.observations.iter().map(|ob| (ob.category, ob.value)));
        for (category, value) in values {
            if !categories.get(category).is_some_and(|c| c.contains(value)) {
                return Err(RejectionReason::Miscategorised { category, value });
            }
        }
        Ok(())
    }

    /// Fresh, reset copy to run one table construction on.
    fn prepared(&self, cfg: &VerificationCfg) -> Result<Forecast, RejectionReason> {
        let mut run = self.clone();
        run.reset(cfg.metars_per_hour);
        run.check_length(cfg)?;
        run.check_categories(cfg)?;
        Ok(run)
    }

    /// Reliability table from matching observations to the change groups.
    ///
    /// Component and observation categories must come from `cfg.categories(..)`; a
    /// forecast categorised under other thresholds is rejected as
    /// [`RejectionReason::Miscategorised`].
    pub fn construct_table(&self, cfg: &VerificationCfg) -> Result<ReliabilityTable, RejectionReason> {
        let mut run = self.prepared(cfg)?;
        let bins = cfg.plain_bins();
        let mut table = ReliabilityTable::new(cfg.categories(run.parameter()), &bins);

        let cutoff = run.start() + cfg.verification_period();
        for section in run.sections(Some(cutoff))? {
            let main = run.main_component(section.main).clone();
            let Forecast {
                components,
                observations,
                ..
            } = &mut run;
            let active: Vec<&mut ForecastComponent> = components
                .iter_mut()
                .enumerate()
                .filter(|(i, _)| section.active_components.contains(i))
                .map(|(_, c)| c)
                .collect();
            let obs = &mut observations[section.observations.clone()];
            match_section(obs, active, &main, cfg.metars_per_hour * section.length_hours);

            for ob in obs.iter_mut() {
                if ob.allocated_probability < 1.0 {
                    ob.matches
                        .push((main.category, 1.0 - ob.allocated_probability));
                }
                table.record(ob.category, &ob.matches, &bins)?;
            }
        }
        tracing::debug!(forecast = %self, total = table.total(), "plain table built");
        Ok(table)
    }

    /// Reliability table from the uncertainty-penalizing distributions.
    ///
    /// Supports at most two overlapping change groups, neither of them TEMPO and not
    /// both BECMG.
    pub fn construct_table_uncertainty(
        &self,
        cfg: &VerificationCfg,
    ) -> Result<ReliabilityTable, RejectionReason> {
        let mut run = self.prepared(cfg)?;
        let bins = cfg.uncertainty_bins();
        let mut table = ReliabilityTable::new(cfg.categories(run.parameter()), &bins);

        let cutoff = run.start() + cfg.verification_period();
        for section in run.sections(Some(cutoff))? {
            let main = run.main_component(section.main);
            let active: Vec<&ForecastComponent> = section
                .active_components
                .iter()
                .map(|&i| &run.components[i])
                .collect();
            check_complexity(&active)?;

            // With two groups active the later one sets the distribution.
            let dist = match active.last() {
                None => snapped_distribution(main.category, None, &UncertaintySplit::CERTAIN),
                Some(comp) => {
                    let split = uncertainty_split(
                        comp.length_hours(),
                        comp.change_type,
                        main.category,
                        comp.category,
                    );
                    tracing::debug!(
                        change_type = %comp.change_type,
                        length_hours = comp.length_hours(),
                        main = main.category,
                        alternative = comp.category,
                        ?split,
                        "uncertainty split"
                    );
                    snapped_distribution(main.category, Some(comp.category), &split)
                }
            };

            for ob in &run.observations[section.observations.clone()] {
                table.record(ob.category, &dist, &bins)?;
            }
        }
        tracing::debug!(forecast = %self, total = table.total(), "uncertainty table built");
        Ok(table)
    }
}

fn check_complexity(active: &[&ForecastComponent]) -> Result<(), Complexity> {
    use crate::component::ChangeType;

    let too_many = active.len() > 2;
    let incompatible = active.len() == 2
        && (active.iter().any(|c| c.change_type.is_tempo())
            || active.iter().all(|c| c.change_type == ChangeType::Becmg));
    if too_many || incompatible {
        let types: Vec<&str> = active.iter().map(|c| c.change_type.as_str()).collect();
        return Err(Complexity::OverlappingChangeGroups(types.join(", ")));
    }
    Ok(())
}
