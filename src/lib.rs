//! Agent-based SEIRD epidemic simulation.
//!
//! Agents move on a square grid, infect neighbours within an interaction
//! radius, and progress through Susceptible, Exposed, Infected, Recovered and
//! Deceased states. A [`Registry`] owns concurrently running simulations and
//! computes [`EpidemicMetrics`] from their recorded history on demand.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod intervention;
pub mod model;
pub mod movement;
pub mod progression;
pub mod registry;
pub mod stats;
pub mod transmission;

pub use analysis::{EpidemicMetrics, Trend};
pub use config::SimulationConfig;
pub use engine::{AgentView, CancelToken, RunLength, RunRequest, Simulation, SimulationState, Status};
pub use error::{SimError, SimResult};
pub use history::{CompartmentCounts, History};
pub use model::HealthState;
pub use registry::{Registry, RegistrySummary, SimulationId, SimulationSummary};
