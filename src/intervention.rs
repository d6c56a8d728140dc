use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::model::{HealthState, Population};
use rand::prelude::*;
use rand_distr::Bernoulli;

/// Tally of one [`Intervention::apply`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterventionOutcome {
    /// Agents detected for the first time.
    pub detected: usize,
    pub isolated: usize,
}

/// Detection of infected agents and isolation of the compliant ones.
///
/// Every infected agent not yet isolated draws detection each tick, and a
/// detected agent then draws compliance. An agent that declines is drawn
/// again on later ticks.
#[derive(Debug, Clone)]
pub struct Intervention {
    detection_dist: Bernoulli,
    compliance_dist: Bernoulli,
}

impl Intervention {
    pub fn new(cfg: &SimulationConfig) -> SimResult<Self> {
        let int = &cfg.intervention;
        let detection_prob = (int.detection_probability * cfg.clock.time_step).clamp(0.0, 1.0);
        Ok(Self {
            detection_dist: Bernoulli::new(detection_prob)
                .map_err(|err| SimError::Distribution(err.to_string()))?,
            compliance_dist: Bernoulli::new(int.isolation_compliance)
                .map_err(|err| SimError::Distribution(err.to_string()))?,
        })
    }

    pub fn apply<R: Rng + ?Sized>(&self, pop: &mut Population, rng: &mut R) -> InterventionOutcome {
        let mut outcome = InterventionOutcome::default();

        for agt in pop.agents_mut() {
            if agt.state() != HealthState::Infected || agt.is_isolated() {
                continue;
            }
            if !self.detection_dist.sample(rng) {
                continue;
            }
            if agt.mark_detected() {
                outcome.detected += 1;
            }
            if self.compliance_dist.sample(rng) {
                agt.isolate();
                outcome.isolated += 1;
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, Position};
    use rand_chacha::ChaCha12Rng;

    fn config(detection_probability: f64, isolation_compliance: f64) -> SimulationConfig {
        let mut cfg = SimulationConfig::default();
        cfg.intervention.detection_probability = detection_probability;
        cfg.intervention.isolation_compliance = isolation_compliance;
        cfg.clock.time_step = 1.0;
        cfg
    }

    fn mixed_population() -> Population {
        let states = [
            HealthState::Susceptible,
            HealthState::Exposed,
            HealthState::Infected,
            HealthState::Recovered,
            HealthState::Deceased,
        ];
        let agents = states
            .iter()
            .enumerate()
            .map(|(id, &state)| {
                let mut agt = Agent::new(id, Position::default());
                if state != HealthState::Susceptible {
                    agt.transition(state, 3.0, 0);
                }
                agt
            })
            .collect();
        Population::from_agents(agents, 100.0)
    }

    #[test]
    fn full_policy_isolates_only_infected() {
        let mut pop = mixed_population();
        let model = Intervention::new(&config(1.0, 1.0)).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(0);

        let outcome = model.apply(&mut pop, &mut rng);

        assert_eq!(outcome, InterventionOutcome { detected: 1, isolated: 1 });
        for agt in pop.agents() {
            assert_eq!(agt.is_isolated(), agt.state() == HealthState::Infected);
        }
    }

    #[test]
    fn zero_compliance_detects_without_isolating() {
        let mut pop = mixed_population();
        let model = Intervention::new(&config(1.0, 0.0)).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(0);

        let outcome = model.apply(&mut pop, &mut rng);

        assert_eq!(outcome, InterventionOutcome { detected: 1, isolated: 0 });
        assert!(pop.agents()[2].is_detected());
        assert!(pop.agents().iter().all(|agt| !agt.is_isolated()));

        // A second detection of the same agent is not counted again.
        let outcome = model.apply(&mut pop, &mut rng);
        assert_eq!(outcome, InterventionOutcome::default());
    }

    #[test]
    fn declined_isolation_is_drawn_again() {
        let agents = (0..100)
            .map(|id| {
                let mut agt = Agent::new(id, Position::default());
                agt.transition(HealthState::Infected, 100.0, 0);
                agt
            })
            .collect();
        let mut pop = Population::from_agents(agents, 100.0);
        let model = Intervention::new(&config(1.0, 0.5)).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(3);

        let first = model.apply(&mut pop, &mut rng);
        assert_eq!(first.detected, 100);
        assert!(first.isolated < 100);

        let mut n_isolated = first.isolated;
        for _ in 1..40 {
            let outcome = model.apply(&mut pop, &mut rng);
            assert_eq!(outcome.detected, 0);
            n_isolated += outcome.isolated;
        }

        assert_eq!(n_isolated, 100);
        assert!(pop.agents().iter().all(|agt| agt.is_isolated()));
    }

    #[test]
    fn zero_detection_changes_nothing() {
        let mut pop = mixed_population();
        let model = Intervention::new(&config(0.0, 1.0)).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(0);

        for _ in 0..10 {
            assert_eq!(model.apply(&mut pop, &mut rng), InterventionOutcome::default());
        }
    }
}
