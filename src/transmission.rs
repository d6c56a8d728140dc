use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::model::{HealthState, PeriodDist, Population, Position};
use rand::prelude::*;
use rand_distr::Binomial;

/// Tally of the transitions applied by one [`Transmission::apply`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransmissionOutcome {
    /// S -> E transitions.
    pub new_exposures: usize,
    /// S -> R transitions through vaccination.
    pub vaccinated: usize,
}

/// Proximity-based infection followed by vaccination.
#[derive(Debug, Clone)]
pub struct Transmission {
    hazard_per_contact: f64,
    radius_sq: f64,
    incubation_dist: PeriodDist,
    vaccination_prob: f64,
    isolation_blocks_transmission: bool,
}

impl Transmission {
    pub fn new(cfg: &SimulationConfig) -> SimResult<Self> {
        let dt = cfg.clock.time_step;
        let dis = &cfg.disease;
        Ok(Self {
            hazard_per_contact: dis.infection_rate * dt,
            radius_sq: dis.interaction_radius.powi(2),
            incubation_dist: PeriodDist::new(dis.incubation_mean, dis.incubation_std)?,
            vaccination_prob: (cfg.intervention.vaccination_rate * dt).clamp(0.0, 1.0),
            isolation_blocks_transmission: cfg.intervention.isolation_blocks_transmission,
        })
    }

    /// Expose susceptibles near infectious agents, then vaccinate a fraction
    /// of those still susceptible.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        pop: &mut Population,
        tick: u64,
        rng: &mut R,
    ) -> SimResult<TransmissionOutcome> {
        let new_exposures = self.infect(pop, tick, rng);
        let vaccinated = self.vaccinate(pop, tick, rng)?;
        Ok(TransmissionOutcome {
            new_exposures,
            vaccinated,
        })
    }

    fn infect<R: Rng + ?Sized>(&self, pop: &mut Population, tick: u64, rng: &mut R) -> usize {
        let sources: Vec<Position> = pop
            .agents()
            .iter()
            .filter(|agt| agt.state() == HealthState::Infected)
            .filter(|agt| !(self.isolation_blocks_transmission && agt.is_isolated()))
            .map(|agt| agt.position)
            .collect();
        if sources.is_empty() {
            return 0;
        }

        let mut n_exposed = 0;
        for agt in pop.agents_mut() {
            if agt.state() != HealthState::Susceptible {
                continue;
            }
            let n_contacts = sources
                .iter()
                .filter(|src| src.distance_sq(&agt.position) <= self.radius_sq)
                .count();
            if n_contacts == 0 {
                continue;
            }

            // One draw per susceptible over the summed hazard of all contacts.
            let hazard = self.hazard_per_contact * n_contacts as f64;
            let prob = 1.0 - (-hazard).exp();
            if rng.random::<f64>() < prob {
                let period = self.incubation_dist.sample(rng);
                agt.transition(HealthState::Exposed, period, tick);
                n_exposed += 1;
            }
        }
        n_exposed
    }

    fn vaccinate<R: Rng + ?Sized>(
        &self,
        pop: &mut Population,
        tick: u64,
        rng: &mut R,
    ) -> SimResult<usize> {
        if self.vaccination_prob <= 0.0 {
            return Ok(0);
        }
        let i_agt_sus = pop.ids_in(HealthState::Susceptible);
        if i_agt_sus.is_empty() {
            return Ok(0);
        }

        let count_dist = Binomial::new(i_agt_sus.len() as u64, self.vaccination_prob)
            .map_err(|err| SimError::Distribution(err.to_string()))?;
        let n_vac = count_dist.sample(rng) as usize;

        let agents = pop.agents_mut();
        for &i_agt in i_agt_sus.choose_multiple(rng, n_vac) {
            agents[i_agt].transition(HealthState::Recovered, 0.0, tick);
        }
        Ok(n_vac)
    }
}
