use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::model::{Population, Position};
use rand::prelude::*;
use rand_distr::Normal;

/// Random walk with a restoring pull toward each agent's home point.
#[derive(Debug, Clone)]
pub struct Movement {
    step_dist: Normal<f64>,
    pull: f64,
}

impl Movement {
    pub fn new(cfg: &SimulationConfig) -> SimResult<Self> {
        let dt = cfg.clock.time_step;
        let std_dev = cfg.movement.random_movement * dt.sqrt();
        let step_dist =
            Normal::new(0.0, std_dev).map_err(|err| SimError::Distribution(err.to_string()))?;

        // A pull above 1 would overshoot home.
        let pull = (cfg.movement.home_attraction * dt).min(1.0);

        Ok(Self { step_dist, pull })
    }

    /// Move every mobile agent, clamping to the world boundary.
    pub fn apply<R: Rng + ?Sized>(&self, pop: &mut Population, rng: &mut R) {
        let side = pop.grid_size();
        for agt in pop.agents_mut().iter_mut().filter(|agt| agt.is_mobile()) {
            let home = agt.home();
            let pos = agt.position;
            let next = Position::new(
                pos.x + self.step_dist.sample(rng) + self.pull * (home.x - pos.x),
                pos.y + self.step_dist.sample(rng) + self.pull * (home.y - pos.y),
            );
            agt.position = next.clamp(side);
        }
    }
}
