//! Per-tick compartment tallies.

use crate::error::{SimError, SimResult};
use crate::model::HealthState;
use serde::{Deserialize, Serialize};

/// Number of agents in each health state at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompartmentCounts {
    pub susceptible: usize,
    pub exposed: usize,
    pub infected: usize,
    pub recovered: usize,
    pub deceased: usize,
}

impl CompartmentCounts {
    pub fn add(&mut self, state: HealthState) {
        match state {
            HealthState::Susceptible => self.susceptible += 1,
            HealthState::Exposed => self.exposed += 1,
            HealthState::Infected => self.infected += 1,
            HealthState::Recovered => self.recovered += 1,
            HealthState::Deceased => self.deceased += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.susceptible + self.exposed + self.infected + self.recovered + self.deceased
    }

    /// Agents still carrying the disease (E + I).
    pub fn active(&self) -> usize {
        self.exposed + self.infected
    }
}

/// Ordered compartment counts, one entry per tick starting at tick 0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct History {
    entries: Vec<CompartmentCounts>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tick's counts after checking them against the previous entry.
    ///
    /// The counts must sum to `population_size`, and the terminal compartments
    /// (R, D) may never shrink.
    pub fn record(&mut self, counts: CompartmentCounts, population_size: usize) -> SimResult<()> {
        let total = counts.total();
        if total != population_size {
            return Err(SimError::InternalInvariant(format!(
                "compartments sum to {total}, expected population size {population_size}"
            )));
        }
        if let Some(prev) = self.entries.last() {
            if counts.recovered < prev.recovered || counts.deceased < prev.deceased {
                return Err(SimError::InternalInvariant(format!(
                    "terminal compartments decreased from {prev:?} to {counts:?}"
                )));
            }
        }
        self.entries.push(counts);
        Ok(())
    }

    pub fn entries(&self) -> &[CompartmentCounts] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> CompartmentCounts {
        self.entries.last().copied().unwrap_or_default()
    }

    pub fn susceptible(&self) -> Vec<usize> {
        self.series(|c| c.susceptible)
    }

    pub fn exposed(&self) -> Vec<usize> {
        self.series(|c| c.exposed)
    }

    pub fn infected(&self) -> Vec<usize> {
        self.series(|c| c.infected)
    }

    pub fn recovered(&self) -> Vec<usize> {
        self.series(|c| c.recovered)
    }

    pub fn deceased(&self) -> Vec<usize> {
        self.series(|c| c.deceased)
    }

    fn series<F: Fn(&CompartmentCounts) -> usize>(&self, f: F) -> Vec<usize> {
        self.entries.iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(s: usize, e: usize, i: usize, r: usize, d: usize) -> CompartmentCounts {
        CompartmentCounts {
            susceptible: s,
            exposed: e,
            infected: i,
            recovered: r,
            deceased: d,
        }
    }

    #[test]
    fn records_conserved_counts() {
        let mut hist = History::new();
        hist.record(counts(95, 0, 5, 0, 0), 100).unwrap();
        hist.record(counts(90, 5, 4, 1, 0), 100).unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(hist.infected(), vec![5, 4]);
        assert_eq!(hist.latest().recovered, 1);
    }

    #[test]
    fn rejects_population_drift() {
        let mut hist = History::new();
        let err = hist.record(counts(95, 0, 6, 0, 0), 100).unwrap_err();
        assert!(matches!(err, SimError::InternalInvariant(_)));
        assert!(hist.is_empty());
    }

    #[test]
    fn rejects_shrinking_terminal_compartments() {
        let mut hist = History::new();
        hist.record(counts(90, 0, 5, 5, 0), 100).unwrap();
        let err = hist.record(counts(91, 0, 5, 4, 0), 100).unwrap_err();
        assert!(matches!(err, SimError::InternalInvariant(_)));
    }
}
