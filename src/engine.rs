use crate::analysis::EpidemicMetrics;
use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::history::{CompartmentCounts, History};
use crate::intervention::Intervention;
use crate::model::{HealthState, Population};
use crate::movement::Movement;
use crate::progression::Progression;
use crate::registry::SimulationId;
use crate::transmission::Transmission;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Days run when a request names neither steps nor days.
pub const DEFAULT_RUN_DAYS: f64 = 100.0;

/// Lifecycle of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Created,
    Running,
    Completed,
    Error,
}

/// How far a [`RunRequest`] advances the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunLength {
    Steps(u64),
    Days(f64),
}

/// Parameters of [`Simulation::run`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub length: Option<RunLength>,
    pub stop_when_no_infected: bool,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            length: None,
            stop_when_no_infected: true,
        }
    }
}

impl RunRequest {
    pub fn steps(n_steps: u64) -> Self {
        Self {
            length: Some(RunLength::Steps(n_steps)),
            ..Self::default()
        }
    }

    pub fn days(n_days: f64) -> Self {
        Self {
            length: Some(RunLength::Days(n_days)),
            ..Self::default()
        }
    }

    pub fn stop_when_no_infected(mut self, stop: bool) -> Self {
        self.stop_when_no_infected = stop;
        self
    }

    /// Step budget for a tick length of `dt` days.
    pub fn max_steps(&self, dt: f64) -> u64 {
        let days_to_steps = |days: f64| (days / dt).floor().max(0.0) as u64;
        match self.length {
            Some(RunLength::Steps(n_steps)) => n_steps,
            Some(RunLength::Days(n_days)) => days_to_steps(n_days),
            None => days_to_steps(DEFAULT_RUN_DAYS),
        }
    }
}

/// Cooperative cancellation flag checked between ticks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Read-only view of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub state: HealthState,
    pub days_in_state: f64,
    pub is_isolated: bool,
}

/// Snapshot of a simulation handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub id: SimulationId,
    pub status: Status,
    pub tick: u64,
    pub current_day: f64,
    pub config: SimulationConfig,
    pub counts: CompartmentCounts,
    pub history: History,
    /// Instantaneous reproduction number per tick, starting at tick 0.
    pub rt_history: Vec<f64>,
    pub current_rt: f64,
    /// Cumulative vaccinations.
    pub vaccinated: usize,
    /// Cumulative detections.
    pub detected: usize,
}

/// Simulation clock.
///
/// Owns the configuration, agent population, and random number generator,
/// and advances them one tick at a time.
#[derive(Debug)]
pub struct Simulation {
    id: SimulationId,
    cfg: SimulationConfig,
    population: Population,
    rng: ChaCha12Rng,

    movement: Movement,
    transmission: Transmission,
    progression: Progression,
    intervention: Intervention,

    tick: u64,
    status: Status,
    history: History,
    rt_history: Vec<f64>,
    vaccinated: usize,
    detected: usize,
}

impl Simulation {
    /// Validate `cfg`, generate the population, and record tick 0.
    pub fn new(cfg: SimulationConfig) -> SimResult<Self> {
        Self::with_id(SimulationId::generate(), cfg)
    }

    pub fn with_id(id: SimulationId, cfg: SimulationConfig) -> SimResult<Self> {
        cfg.check()?;

        let mut rng = match cfg.clock.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng().map_err(|err| SimError::Seed(err.to_string()))?,
        };

        let population = Population::generate(&cfg, &mut rng)?;

        let mut history = History::new();
        history.record(population.counts(), cfg.population.population_size)?;

        let sim = Self {
            id,
            movement: Movement::new(&cfg)?,
            transmission: Transmission::new(&cfg)?,
            progression: Progression::new(&cfg)?,
            intervention: Intervention::new(&cfg)?,
            cfg,
            population,
            rng,
            tick: 0,
            status: Status::Created,
            history,
            rt_history: vec![0.0],
            vaccinated: 0,
            detected: 0,
        };
        log::info!("created simulation {} ({:?})", sim.id, sim.history.latest());

        Ok(sim)
    }

    pub fn id(&self) -> &SimulationId {
        &self.id
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.cfg
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn current_day(&self) -> f64 {
        self.tick as f64 * self.cfg.clock.time_step
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Snapshot the current state.
    pub fn state(&self) -> SimulationState {
        SimulationState {
            id: self.id.clone(),
            status: self.status,
            tick: self.tick,
            current_day: self.current_day(),
            config: self.cfg.clone(),
            counts: self.history.latest(),
            history: self.history.clone(),
            rt_history: self.rt_history.clone(),
            current_rt: self.rt_history.last().copied().unwrap_or(0.0),
            vaccinated: self.vaccinated,
            detected: self.detected,
        }
    }

    /// Analytics over the current history.
    ///
    /// Non-finite metrics point at a defect upstream and move the simulation
    /// to [`Status::Error`].
    pub fn metrics(&mut self) -> SimResult<EpidemicMetrics> {
        let state = self.state();
        EpidemicMetrics::from_state(&state).inspect_err(|err| {
            if err.is_fatal() {
                log::error!("simulation {} produced invalid metrics: {err}", self.id);
                self.status = Status::Error;
            }
        })
    }

    /// Agent positions and states, optionally without deceased agents.
    pub fn agents(&self, include_deceased: bool) -> Vec<AgentView> {
        self.population
            .agents()
            .iter()
            .filter(|agt| include_deceased || agt.state() != HealthState::Deceased)
            .map(|agt| AgentView {
                id: agt.id(),
                x: agt.position.x,
                y: agt.position.y,
                state: agt.state(),
                days_in_state: agt.days_in_state(),
                is_isolated: agt.is_isolated(),
            })
            .collect()
    }

    /// Advance one tick and return the new state.
    ///
    /// # Errors
    /// Rejects simulations that are completed or errored. An internal failure
    /// during the tick moves the simulation to [`Status::Error`].
    pub fn step(&mut self) -> SimResult<SimulationState> {
        self.advance()?;
        Ok(self.state())
    }

    /// Step until the budget is spent, no exposed or infected agents remain,
    /// or `cancel` is raised.
    pub fn run(&mut self, req: &RunRequest, cancel: &CancelToken) -> SimResult<SimulationState> {
        self.ensure_can_advance()?;

        let max_steps = req.max_steps(self.cfg.clock.time_step);
        const N_PROGRESS_LOGS: u64 = 10;
        let log_every = (max_steps / N_PROGRESS_LOGS).max(1);

        for i_step in 0..max_steps {
            if cancel.is_cancelled() {
                log::warn!("run of {} cancelled after {i_step} steps", self.id);
                break;
            }

            self.advance()?;

            // A completed simulation cannot step again, so completion ends the
            // run whether or not the caller asked to stop early.
            if self.status == Status::Completed {
                if !req.stop_when_no_infected {
                    log::info!(
                        "{} completed with {} of {max_steps} steps unused",
                        self.id,
                        max_steps - i_step - 1
                    );
                }
                break;
            }

            if (i_step + 1) % log_every == 0 {
                let progress = 100.0 * (i_step + 1) as f64 / max_steps as f64;
                log::info!("{}: completed {progress:06.2}%", self.id);
            }
        }

        Ok(self.state())
    }

    fn ensure_can_advance(&self) -> SimResult<()> {
        match self.status {
            Status::Created | Status::Running => Ok(()),
            status => Err(SimError::InvalidTransition {
                id: self.id.clone(),
                status,
            }),
        }
    }

    fn advance(&mut self) -> SimResult<()> {
        self.ensure_can_advance()?;
        if let Err(err) = self.perform_step() {
            log::error!("simulation {} aborted at tick {}: {err}", self.id, self.tick);
            self.status = Status::Error;
            return Err(err);
        }
        Ok(())
    }

    fn perform_step(&mut self) -> SimResult<()> {
        let prev_infected = self.history.latest().infected;
        self.tick += 1;
        let tick = self.tick;

        self.movement.apply(&mut self.population, &mut self.rng);

        let trans = self
            .transmission
            .apply(&mut self.population, tick, &mut self.rng)?;

        let prog = self
            .progression
            .apply(&mut self.population, tick, &mut self.rng);

        let int = self.intervention.apply(&mut self.population, &mut self.rng);

        self.vaccinated += trans.vaccinated;
        self.detected += int.detected;

        let counts = self.population.counts();
        self.history
            .record(counts, self.cfg.population.population_size)?;
        self.rt_history.push(self.instantaneous_rt(trans.new_exposures, prev_infected));

        log::debug!(
            "{} tick {tick}: {counts:?} ({trans:?}, {prog:?}, {int:?})",
            self.id
        );

        self.status = Status::Running;
        if counts.active() == 0 {
            self.status = Status::Completed;
            log::info!(
                "simulation {} completed on day {:.2}",
                self.id,
                self.current_day()
            );
        }

        Ok(())
    }

    /// New exposures per infectious agent-day, scaled by the infectious period.
    fn instantaneous_rt(&self, new_exposures: usize, prev_infected: usize) -> f64 {
        if prev_infected == 0 {
            return 0.0;
        }
        let dt = self.cfg.clock.time_step;
        (new_exposures as f64 / dt) / prev_infected as f64 * self.cfg.disease.infectious_mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_config(seed: u64) -> SimulationConfig {
        let mut cfg = SimulationConfig::default();
        cfg.population.population_size = 150;
        cfg.population.grid_size = 40.0;
        cfg.population.initial_infected = 5;
        cfg.disease.infection_rate = 1.5;
        cfg.clock.seed = Some(seed);
        cfg
    }

    #[test]
    fn new_records_tick_zero() {
        let sim = Simulation::new(seeded_config(1)).unwrap();
        let state = sim.state();
        assert_eq!(state.status, Status::Created);
        assert_eq!(state.tick, 0);
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.counts.infected, 5);
        assert_eq!(state.rt_history, vec![0.0]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = seeded_config(1);
        cfg.disease.infection_rate = 0.0;
        assert!(matches!(
            Simulation::new(cfg),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn step_advances_clock_and_history() {
        let mut sim = Simulation::new(seeded_config(2)).unwrap();
        let state = sim.step().unwrap();
        assert_eq!(state.tick, 1);
        assert_eq!(state.current_day, 0.5);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.rt_history.len(), 2);
        assert_ne!(state.status, Status::Created);
    }

    #[test]
    fn same_seed_same_trajectory() {
        let mut sim_a = Simulation::new(seeded_config(42)).unwrap();
        let mut sim_b = Simulation::new(seeded_config(42)).unwrap();
        let req = RunRequest::steps(40);
        let state_a = sim_a.run(&req, &CancelToken::new()).unwrap();
        let state_b = sim_b.run(&req, &CancelToken::new()).unwrap();
        assert_eq!(state_a.history, state_b.history);
        assert_eq!(sim_a.agents(true), sim_b.agents(true));
    }

    #[test]
    fn run_halts_on_completion() {
        let mut cfg = seeded_config(3);
        // Isolated agents far apart: the seeded infections burn out alone.
        cfg.population.grid_size = 500.0;
        cfg.population.population_size = 10;
        cfg.population.initial_infected = 1;
        cfg.disease.interaction_radius = 0.01;
        cfg.disease.infectious_mean = 2.0;
        cfg.disease.infectious_std = 0.0;
        let mut sim = Simulation::new(cfg).unwrap();

        let state = sim
            .run(&RunRequest::steps(1000).stop_when_no_infected(false), &CancelToken::new())
            .unwrap();

        assert_eq!(state.status, Status::Completed);
        assert!(state.tick < 1000);
        assert!(matches!(
            sim.step(),
            Err(SimError::InvalidTransition {
                status: Status::Completed,
                ..
            })
        ));
        assert!(matches!(
            sim.run(&RunRequest::default(), &CancelToken::new()),
            Err(SimError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancelled_run_takes_no_steps() {
        let mut sim = Simulation::new(seeded_config(4)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let state = sim.run(&RunRequest::steps(50), &cancel).unwrap();
        assert_eq!(state.tick, 0);
    }

    #[test]
    fn metrics_follow_history() {
        let mut cfg = seeded_config(6);
        cfg.intervention.vaccination_rate = 0.05;
        let mut sim = Simulation::new(cfg).unwrap();
        sim.run(&RunRequest::steps(30), &CancelToken::new()).unwrap();

        let state = sim.state();
        let metrics = sim.metrics().unwrap();
        let infected = state.history.infected();
        assert_eq!(metrics.current_infected, state.counts.infected);
        assert_eq!(metrics.peak_infected, infected.iter().copied().max().unwrap());
        assert_eq!(metrics.detected_cases, state.detected);
        assert_eq!(metrics.smoothed_infected.len(), infected.len());
        assert!(state.vaccinated > 0);
        assert!(metrics.vaccination_coverage > 0.0);
        assert_ne!(sim.status(), Status::Error);
    }

    #[test]
    fn days_convert_to_steps() {
        assert_eq!(RunRequest::days(10.0).max_steps(0.5), 20);
        assert_eq!(RunRequest::days(1.2).max_steps(0.5), 2);
        assert_eq!(RunRequest::steps(7).max_steps(0.5), 7);
        assert_eq!(RunRequest::default().max_steps(0.5), 200);
    }

    #[test]
    fn agent_view_can_hide_deceased() {
        let mut cfg = seeded_config(5);
        cfg.disease.mortality_rate = 1.0;
        cfg.disease.infectious_mean = 1.0;
        cfg.disease.infectious_std = 0.0;
        let mut sim = Simulation::new(cfg).unwrap();
        sim.run(&RunRequest::steps(10), &CancelToken::new()).unwrap();

        let deceased = sim.history().latest().deceased;
        assert!(deceased >= 5);
        assert_eq!(sim.agents(true).len(), 150);
        assert_eq!(sim.agents(false).len(), 150 - deceased);
    }
}
