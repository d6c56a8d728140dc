use crate::error::SimError;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`SimulationConfig::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub population: PopulationConfig,
    pub disease: DiseaseConfig,
    pub movement: MovementConfig,
    pub intervention: InterventionConfig,
    pub clock: ClockConfig,
}

/// Population and world parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopulationConfig {
    /// Number of agents.
    pub population_size: usize,
    /// Side length of the square world.
    pub grid_size: f64,
    /// Number of agents seeded as Infected.
    pub initial_infected: usize,
}

/// Disease natural-history and transmission parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiseaseConfig {
    /// Transmission rate (beta) per infectious contact per day.
    #[serde(alias = "beta")]
    pub infection_rate: f64,
    /// Mean and standard deviation of the incubation period (days).
    pub incubation_mean: f64,
    pub incubation_std: f64,
    /// Mean and standard deviation of the infectious period (days).
    pub infectious_mean: f64,
    pub infectious_std: f64,
    /// Probability that an infection ends in death.
    pub mortality_rate: f64,
    /// Contact distance within which transmission can occur.
    pub interaction_radius: f64,
}

/// Movement parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MovementConfig {
    /// Strength of the pull back toward each agent's home point.
    pub home_attraction: f64,
    /// Intensity of the random-walk displacement.
    pub random_movement: f64,
}

/// Intervention policy parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterventionConfig {
    /// Fraction of remaining susceptibles vaccinated per day.
    pub vaccination_rate: f64,
    /// Probability per day that an infected agent is detected.
    pub detection_probability: f64,
    /// Probability that a detected agent complies with isolation.
    pub isolation_compliance: f64,
    /// Whether isolated agents stop contributing to transmission.
    pub isolation_blocks_transmission: bool,
}

/// Time stepping parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Length of one tick in days.
    #[serde(alias = "dt")]
    pub time_step: f64,
    /// Seed for the run's random number generator (OS entropy if absent).
    pub seed: Option<u64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            population_size: 1000,
            grid_size: 100.0,
            initial_infected: 5,
        }
    }
}

impl Default for DiseaseConfig {
    fn default() -> Self {
        Self {
            infection_rate: 0.5,
            incubation_mean: 5.0,
            incubation_std: 1.5,
            infectious_mean: 7.0,
            infectious_std: 2.0,
            mortality_rate: 0.02,
            interaction_radius: 2.0,
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            home_attraction: 0.1,
            random_movement: 0.5,
        }
    }
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            vaccination_rate: 0.0,
            detection_probability: 0.1,
            isolation_compliance: 0.8,
            isolation_blocks_transmission: true,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            time_step: 0.5,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Load a [`SimulationConfig`] from a file.
    ///
    /// The file must be TOML-encoded. Missing sections and fields take their
    /// default values. Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: SimulationConfig =
            toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Check every parameter, failing on the first inconsistent one.
    pub fn validate(&self) -> Result<()> {
        let pop = &self.population;
        let dis = &self.disease;
        let mov = &self.movement;
        let int = &self.intervention;
        let clk = &self.clock;

        check_num(pop.population_size, 10..=10_000).context("invalid population size")?;
        check_num(pop.grid_size, 20.0..=500.0).context("invalid grid size")?;

        check_num(dis.infection_rate, 0.0..=5.0).context("invalid infection rate (beta)")?;
        if dis.infection_rate <= 0.0 {
            bail!("invalid infection rate (beta): number must be positive");
        }

        check_num(dis.incubation_mean, f64::MIN_POSITIVE..)
            .context("invalid incubation period mean")?;
        check_num(dis.incubation_std, 0.0..).context("invalid incubation period std")?;
        check_num(dis.infectious_mean, f64::MIN_POSITIVE..)
            .context("invalid infectious period mean")?;
        check_num(dis.infectious_std, 0.0..).context("invalid infectious period std")?;

        check_num(dis.mortality_rate, 0.0..=1.0).context("invalid mortality rate")?;

        check_num(int.vaccination_rate, 0.0..=1.0).context("invalid vaccination rate")?;
        check_num(int.detection_probability, 0.0..=1.0)
            .context("invalid detection probability")?;
        check_num(int.isolation_compliance, 0.0..=1.0)
            .context("invalid isolation compliance")?;

        check_num(dis.interaction_radius, f64::MIN_POSITIVE..=10.0)
            .context("invalid interaction radius")?;

        check_num(clk.time_step, f64::MIN_POSITIVE..=1.0).context("invalid time step")?;

        check_num(mov.home_attraction, 0.0..).context("invalid home attraction")?;
        check_num(mov.random_movement, 0.0..).context("invalid random movement")?;

        let duration = dis.incubation_mean + dis.infectious_mean;
        check_num(duration, ..=365.0).context("total disease duration exceeds 1 year")?;

        check_num(pop.initial_infected, 1..pop.population_size)
            .context("invalid initial number of infected")?;

        Ok(())
    }

    /// Validate and convert any failure into a [`SimError::Configuration`].
    pub fn check(&self) -> Result<(), SimError> {
        self.validate()
            .map_err(|err| SimError::Configuration(format!("{err:#}")))
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    // NaN never lies inside a range, so it is rejected here too.
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(cfg: &SimulationConfig) -> String {
        match cfg.check() {
            Err(SimError::Configuration(msg)) => msg,
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn default_config_is_valid() {
        SimulationConfig::default().check().unwrap();
    }

    #[test]
    fn rejects_grid_size_out_of_range() {
        let mut cfg = SimulationConfig::default();
        cfg.population.grid_size = 19.0;
        assert!(reason(&cfg).contains("grid size"));
        cfg.population.grid_size = 501.0;
        assert!(reason(&cfg).contains("grid size"));
    }

    #[test]
    fn rejects_zero_infection_rate() {
        let mut cfg = SimulationConfig::default();
        cfg.disease.infection_rate = 0.0;
        assert!(reason(&cfg).contains("infection rate"));
        cfg.disease.infection_rate = 5.5;
        assert!(reason(&cfg).contains("infection rate"));
    }

    #[test]
    fn rejects_non_positive_periods() {
        let mut cfg = SimulationConfig::default();
        cfg.disease.incubation_mean = 0.0;
        assert!(reason(&cfg).contains("incubation period mean"));

        let mut cfg = SimulationConfig::default();
        cfg.disease.infectious_std = -1.0;
        assert!(reason(&cfg).contains("infectious period std"));
    }

    #[test]
    fn rejects_probabilities_above_one() {
        let mut cfg = SimulationConfig::default();
        cfg.intervention.vaccination_rate = 1.5;
        assert!(reason(&cfg).contains("vaccination rate"));

        let mut cfg = SimulationConfig::default();
        cfg.intervention.detection_probability = 1.1;
        assert!(reason(&cfg).contains("detection probability"));

        let mut cfg = SimulationConfig::default();
        cfg.intervention.isolation_compliance = 1.1;
        assert!(reason(&cfg).contains("isolation compliance"));
    }

    #[test]
    fn rejects_zero_time_step_and_radius() {
        let mut cfg = SimulationConfig::default();
        cfg.clock.time_step = 0.0;
        assert!(reason(&cfg).contains("time step"));

        let mut cfg = SimulationConfig::default();
        cfg.disease.interaction_radius = -2.0;
        assert!(reason(&cfg).contains("interaction radius"));
    }

    #[test]
    fn rejects_excessive_disease_duration() {
        let mut cfg = SimulationConfig::default();
        cfg.disease.incubation_mean = 200.0;
        cfg.disease.infectious_mean = 200.0;
        assert!(reason(&cfg).contains("1 year"));
    }

    #[test]
    fn rejects_initial_infected_equal_to_population() {
        let mut cfg = SimulationConfig::default();
        cfg.population.population_size = 100;
        cfg.population.initial_infected = 100;
        assert!(reason(&cfg).contains("initial number of infected"));
        cfg.population.initial_infected = 0;
        assert!(reason(&cfg).contains("initial number of infected"));
    }

    #[test]
    fn first_failing_check_wins() {
        let mut cfg = SimulationConfig::default();
        cfg.population.population_size = 5;
        cfg.clock.time_step = 2.0;
        let msg = reason(&cfg);
        assert!(msg.contains("population size"));
        assert!(!msg.contains("time step"));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: SimulationConfig = toml::from_str(
            "[population]\npopulation_size = 200\n\n[disease]\nbeta = 1.5\n\n[clock]\nseed = 7\n",
        )
        .unwrap();
        assert_eq!(cfg.population.population_size, 200);
        assert_eq!(cfg.population.grid_size, 100.0);
        assert_eq!(cfg.disease.infection_rate, 1.5);
        assert_eq!(cfg.clock.seed, Some(7));
        cfg.check().unwrap();
    }
}
