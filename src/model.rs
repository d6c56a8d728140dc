//! Agent and population data types.

use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::history::CompartmentCounts;
use rand::prelude::*;
use rand_distr::{Normal, Uniform};
use serde::{Deserialize, Serialize};

/// Shortest incubation or infectious period an agent can draw (days).
pub const MIN_PERIOD: f64 = 0.1;

/// Health compartment of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthState {
    #[serde(rename = "S")]
    Susceptible,
    #[serde(rename = "E")]
    Exposed,
    #[serde(rename = "I")]
    Infected,
    #[serde(rename = "R")]
    Recovered,
    #[serde(rename = "D")]
    Deceased,
}

/// Point in the square world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: &Position) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }

    /// Clamp both coordinates into `[0, side]`.
    pub fn clamp(self, side: f64) -> Self {
        Self {
            x: self.x.clamp(0.0, side),
            y: self.y.clamp(0.0, side),
        }
    }
}

/// Agent of the simulation.
///
/// The id is the agent's index in its [`Population`] and never changes.
#[derive(Debug, Clone)]
pub struct Agent {
    id: usize,
    pub position: Position,
    home: Position,
    state: HealthState,
    days_in_state: f64,
    /// Residence time drawn on entering the current E or I state.
    period: f64,
    last_transition: u64,
    detected: bool,
    isolated: bool,
}

impl Agent {
    /// Create a susceptible agent whose home is its starting position.
    pub fn new(id: usize, position: Position) -> Self {
        Self {
            id,
            position,
            home: position,
            state: HealthState::Susceptible,
            days_in_state: 0.0,
            period: 0.0,
            last_transition: 0,
            detected: false,
            isolated: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn home(&self) -> Position {
        self.home
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn days_in_state(&self) -> f64 {
        self.days_in_state
    }

    /// Sampled incubation or infectious duration for the current state.
    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Whether this agent changed state during `tick`.
    pub fn transitioned_at(&self, tick: u64) -> bool {
        self.last_transition == tick
    }

    /// Deceased and isolated agents stay put.
    pub fn is_mobile(&self) -> bool {
        self.state != HealthState::Deceased && !self.isolated
    }

    /// Move to `state` at `tick`, resetting the state clock.
    ///
    /// `period` is the residence time for E or I, ignored otherwise.
    /// Leaving I lifts isolation.
    pub fn transition(&mut self, state: HealthState, period: f64, tick: u64) {
        if self.state == HealthState::Infected && state != HealthState::Infected {
            self.isolated = false;
        }
        self.state = state;
        self.days_in_state = 0.0;
        self.period = match state {
            HealthState::Exposed | HealthState::Infected => period,
            _ => 0.0,
        };
        self.last_transition = tick;
    }

    pub fn advance_clock(&mut self, dt: f64) {
        self.days_in_state += dt;
    }

    /// Whether the current E or I residence time has elapsed.
    pub fn period_elapsed(&self) -> bool {
        self.days_in_state >= self.period
    }

    /// Flag the agent as detected; `true` only the first time.
    pub fn mark_detected(&mut self) -> bool {
        !std::mem::replace(&mut self.detected, true)
    }

    /// Isolation only applies to infected agents.
    pub fn isolate(&mut self) {
        if self.state == HealthState::Infected {
            self.isolated = true;
        }
    }
}

/// Normal distribution truncated below at [`MIN_PERIOD`].
#[derive(Debug, Clone, Copy)]
pub struct PeriodDist {
    normal: Normal<f64>,
}

impl PeriodDist {
    pub fn new(mean: f64, std_dev: f64) -> SimResult<Self> {
        let normal =
            Normal::new(mean, std_dev).map_err(|err| SimError::Distribution(err.to_string()))?;
        Ok(Self { normal })
    }
}

impl Distribution<f64> for PeriodDist {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.normal.sample(rng).max(MIN_PERIOD)
    }
}

/// Arena of agents indexed by id.
#[derive(Debug, Clone)]
pub struct Population {
    agents: Vec<Agent>,
    grid_size: f64,
}

impl Population {
    /// Scatter agents uniformly over the world and seed the initial infections.
    ///
    /// Seeded agents are picked without replacement and draw an infectious period.
    pub fn generate<R: Rng + ?Sized>(cfg: &SimulationConfig, rng: &mut R) -> SimResult<Self> {
        let n_agt = cfg.population.population_size;
        let grid_size = cfg.population.grid_size;

        let coord_dist = Uniform::new_inclusive(0.0, grid_size)
            .map_err(|err| SimError::Distribution(err.to_string()))?;

        let mut agents = Vec::with_capacity(n_agt);
        for id in 0..n_agt {
            let position = Position::new(coord_dist.sample(rng), coord_dist.sample(rng));
            agents.push(Agent::new(id, position));
        }

        let infectious_dist =
            PeriodDist::new(cfg.disease.infectious_mean, cfg.disease.infectious_std)?;
        for i_agt in rand::seq::index::sample(rng, n_agt, cfg.population.initial_infected) {
            let period = infectious_dist.sample(rng);
            agents[i_agt].transition(HealthState::Infected, period, 0);
        }

        Ok(Self { agents, grid_size })
    }

    pub fn from_agents(agents: Vec<Agent>, grid_size: f64) -> Self {
        Self { agents, grid_size }
    }

    pub fn grid_size(&self) -> f64 {
        self.grid_size
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn get(&self, id: usize) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Tally agents per health state.
    pub fn counts(&self) -> CompartmentCounts {
        let mut counts = CompartmentCounts::default();
        for agt in &self.agents {
            counts.add(agt.state());
        }
        counts
    }

    /// Ids of agents in `state`, in id order.
    pub fn ids_in(&self, state: HealthState) -> Vec<usize> {
        self.agents
            .iter()
            .filter(|agt| agt.state() == state)
            .map(Agent::id)
            .collect()
    }
}
