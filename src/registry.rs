use crate::analysis::EpidemicMetrics;
use crate::config::SimulationConfig;
use crate::engine::{AgentView, CancelToken, RunRequest, Simulation, SimulationState, Status};
use crate::error::{SimError, SimResult};
use crate::history::CompartmentCounts;
use crate::stats::{Accumulator, AccumulatorReport};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};
use uuid::Uuid;

/// Opaque simulation identifier, `sim_` followed by 12 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationId(String);

impl SimulationId {
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("sim_{}", &hex[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SimulationId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// One line of [`RegistrySummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub id: SimulationId,
    pub status: Status,
    pub current_day: f64,
    pub counts: CompartmentCounts,
    pub current_rt: f64,
}

/// Overview of every registered simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub simulations: Vec<SimulationSummary>,
    /// Current Rt across simulations.
    pub rt: AccumulatorReport,
}

type Handle = Arc<Mutex<Simulation>>;

/// Thread-safe map from identifier to simulation.
///
/// The map lock is held only to insert, look up, or remove a handle. Each
/// simulation sits behind its own mutex, so calls on one identifier are
/// serialized while different identifiers advance in parallel.
#[derive(Debug, Default)]
pub struct Registry {
    sims: RwLock<HashMap<SimulationId, Handle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `cfg`, build a simulation, and register it.
    pub fn create(&self, cfg: SimulationConfig) -> SimResult<(SimulationId, SimulationState)> {
        let sim = Simulation::new(cfg)?;
        let id = sim.id().clone();
        let state = sim.state();

        self.sims
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Arc::new(Mutex::new(sim)));
        log::info!("registered {id}");

        Ok((id, state))
    }

    pub fn step(&self, id: &SimulationId) -> SimResult<SimulationState> {
        let handle = self.handle(id)?;
        lock(&handle).step()
    }

    pub fn run(&self, id: &SimulationId, req: &RunRequest) -> SimResult<SimulationState> {
        self.run_with_cancel(id, req, &CancelToken::new())
    }

    /// Like [`Registry::run`], stopping early once `cancel` is raised.
    pub fn run_with_cancel(
        &self,
        id: &SimulationId,
        req: &RunRequest,
        cancel: &CancelToken,
    ) -> SimResult<SimulationState> {
        let handle = self.handle(id)?;
        lock(&handle).run(req, cancel)
    }

    pub fn get_state(&self, id: &SimulationId) -> SimResult<SimulationState> {
        let handle = self.handle(id)?;
        let state = lock(&handle).state();
        Ok(state)
    }

    pub fn get_metrics(&self, id: &SimulationId) -> SimResult<EpidemicMetrics> {
        let handle = self.handle(id)?;
        lock(&handle).metrics()
    }

    pub fn get_agents(&self, id: &SimulationId, include_deceased: bool) -> SimResult<Vec<AgentView>> {
        let handle = self.handle(id)?;
        let agents = lock(&handle).agents(include_deceased);
        Ok(agents)
    }

    /// States of all simulations, ordered by identifier.
    pub fn list(&self) -> Vec<SimulationState> {
        let mut states: Vec<SimulationState> = self
            .handles()
            .iter()
            .map(|handle| lock(handle).state())
            .collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }

    /// Remove a simulation; `false` if it was not registered.
    pub fn delete(&self, id: &SimulationId) -> bool {
        let removed = self
            .sims
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            log::info!("deleted {id}");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sims.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> RegistrySummary {
        let mut rt_acc = Accumulator::new();
        let simulations = self
            .list()
            .into_iter()
            .map(|state| {
                rt_acc.add(state.current_rt);
                SimulationSummary {
                    id: state.id,
                    status: state.status,
                    current_day: state.current_day,
                    counts: state.counts,
                    current_rt: state.current_rt,
                }
            })
            .collect();

        RegistrySummary {
            simulations,
            rt: rt_acc.report(),
        }
    }

    fn handle(&self, id: &SimulationId) -> SimResult<Handle> {
        self.sims
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| SimError::NotFound(id.clone()))
    }

    fn handles(&self) -> Vec<Handle> {
        self.sims
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

fn lock(handle: &Handle) -> MutexGuard<'_, Simulation> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> SimulationConfig {
        let mut cfg = SimulationConfig::default();
        cfg.population.population_size = 100;
        cfg.population.grid_size = 30.0;
        cfg.clock.seed = Some(seed);
        cfg
    }

    #[test]
    fn ids_have_expected_shape() {
        let id = SimulationId::generate();
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().starts_with("sim_"));
        assert!(id.as_str()[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, SimulationId::generate());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = Registry::new();
        let id = SimulationId::from("sim_000000000000");
        assert!(matches!(registry.step(&id), Err(SimError::NotFound(_))));
        assert!(matches!(registry.get_state(&id), Err(SimError::NotFound(_))));
        assert!(matches!(registry.get_metrics(&id), Err(SimError::NotFound(_))));
        assert!(!registry.delete(&id));
    }

    #[test]
    fn invalid_config_is_not_registered() {
        let registry = Registry::new();
        let mut cfg = config(1);
        cfg.population.initial_infected = 0;
        assert!(matches!(
            registry.create(cfg),
            Err(SimError::Configuration(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn summary_covers_all_simulations() {
        let registry = Registry::new();
        let (id_a, _) = registry.create(config(1)).unwrap();
        let (id_b, _) = registry.create(config(2)).unwrap();
        registry.run(&id_a, &RunRequest::steps(5)).unwrap();

        let summary = registry.summary();
        assert_eq!(summary.simulations.len(), 2);
        assert_eq!(summary.rt.n_vals, 2);
        let ids: Vec<_> = summary.simulations.iter().map(|sim| &sim.id).collect();
        assert!(ids.contains(&&id_a) && ids.contains(&&id_b));

        assert!(registry.delete(&id_b));
        assert_eq!(registry.list().len(), 1);
    }
}
