use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::model::{HealthState, PeriodDist, Population};
use rand::prelude::*;
use rand_distr::Bernoulli;

/// Tally of the transitions applied by one [`Progression::apply`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressionOutcome {
    pub onsets: usize,
    pub recoveries: usize,
    pub deaths: usize,
}

/// Disease natural history: E -> I -> R or D.
#[derive(Debug, Clone)]
pub struct Progression {
    infectious_dist: PeriodDist,
    death_dist: Bernoulli,
    dt: f64,
}

impl Progression {
    pub fn new(cfg: &SimulationConfig) -> SimResult<Self> {
        let dis = &cfg.disease;
        Ok(Self {
            infectious_dist: PeriodDist::new(dis.infectious_mean, dis.infectious_std)?,
            death_dist: Bernoulli::new(dis.mortality_rate)
                .map_err(|err| SimError::Distribution(err.to_string()))?,
            dt: cfg.clock.time_step,
        })
    }

    /// Advance every agent's state clock and apply elapsed transitions.
    ///
    /// Agents that already changed state during `tick` are left untouched.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        pop: &mut Population,
        tick: u64,
        rng: &mut R,
    ) -> ProgressionOutcome {
        let mut outcome = ProgressionOutcome::default();

        for agt in pop.agents_mut() {
            if agt.transitioned_at(tick) {
                continue;
            }
            match agt.state() {
                HealthState::Exposed if agt.period_elapsed() => {
                    let period = self.infectious_dist.sample(rng);
                    agt.transition(HealthState::Infected, period, tick);
                    outcome.onsets += 1;
                }
                HealthState::Infected if agt.period_elapsed() => {
                    if self.death_dist.sample(rng) {
                        agt.transition(HealthState::Deceased, 0.0, tick);
                        outcome.deaths += 1;
                    } else {
                        agt.transition(HealthState::Recovered, 0.0, tick);
                        outcome.recoveries += 1;
                    }
                }
                _ => agt.advance_clock(self.dt),
            }
        }

        outcome
    }
}
