use crate::engine::Status;
use crate::registry::SimulationId;
use thiserror::Error;

/// Errors surfaced by the simulation core.
#[derive(Debug, Error)]
pub enum SimError {
    /// The configuration failed validation; carries the first failing check.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("simulation not found: {0}")]
    NotFound(SimulationId),

    /// `step` or `run` was requested on a simulation that can no longer advance.
    #[error("simulation {id} cannot advance from status {status:?}")]
    InvalidTransition { id: SimulationId, status: Status },

    /// Population conservation or another internal invariant was violated.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("failed to construct distribution: {0}")]
    Distribution(String),

    #[error("failed to seed random number generator: {0}")]
    Seed(String),
}

impl SimError {
    /// True for errors that leave the offending simulation in the `Error` status.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InternalInvariant(_) | Self::Distribution(_))
    }
}

pub type SimResult<T> = Result<T, SimError>;
