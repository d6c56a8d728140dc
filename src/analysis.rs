//! Epidemic indicators derived from compartment time series.
//!
//! Every function here is pure: identical inputs give identical outputs, and
//! degenerate inputs (short or empty series, zero denominators) produce
//! sentinel values rather than errors.

use crate::engine::SimulationState;
use crate::error::{SimError, SimResult};
use crate::stats::{compute_mean, growth_exponent, moving_average, tail, window_steps};
use serde::{Deserialize, Serialize};

/// Look-back window for Rt, in days.
pub const RT_WINDOW_DAYS: f64 = 7.0;
/// Look-back window for the growth rate, in days.
pub const GROWTH_RATE_WINDOW_DAYS: f64 = 3.0;
/// Counts at or below this are too noisy for growth estimates.
pub const MIN_CASES_FOR_STATS: usize = 5;
/// Window of the smoothed infected curve, in ticks.
pub const SMOOTHING_WINDOW: usize = 3;

const R0_BOUNDS: (f64, f64) = (0.5, 10.0);

/// Direction of the epidemic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Cut-offs on the averaged reproduction number for [`classify_trend`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendThresholds {
    pub increasing: f64,
    pub decreasing: f64,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            increasing: 1.1,
            decreasing: 0.9,
        }
    }
}

/// Effective reproduction number from the last week of infected counts.
///
/// Returns 0 when fewer than two samples are available or the window starts
/// at zero.
pub fn effective_reproduction_number(infected: &[usize], infectious_mean: f64, dt: f64) -> f64 {
    let window = tail(infected, window_steps(RT_WINDOW_DAYS, dt));
    let n = window.len();
    if n < 2 || window[0] == 0 {
        return 0.0;
    }
    let span = (n - 1) as f64 * dt;
    let lambda = growth_exponent(window[0] as f64, window[n - 1] as f64, span);
    (1.0 + lambda * infectious_mean).max(0.0)
}

/// Basic reproduction number from the early growth phase.
///
/// Uses the first `max(min(len / 10, 20), 5)` samples and, within them, the
/// first and last indices above [`MIN_CASES_FOR_STATS`]. Returns 1 when no
/// such growth phase exists. The estimate is bounded to `[0.5, 10]`.
pub fn basic_reproduction_number(infected: &[usize], infectious_mean: f64, dt: f64) -> f64 {
    let early_len = (infected.len() / 10).clamp(5, 20).min(infected.len());
    let early = &infected[..early_len];

    let mut valid = early
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > MIN_CASES_FOR_STATS)
        .map(|(idx, _)| idx);
    let (Some(i_start), Some(i_end)) = (valid.next(), valid.last()) else {
        return 1.0;
    };

    let span = (i_end - i_start) as f64 * dt;
    let lambda = growth_exponent(early[i_start] as f64, early[i_end] as f64, span);
    (1.0 + lambda * infectious_mean).clamp(R0_BOUNDS.0, R0_BOUNDS.1)
}

/// Days for the infected count to double during a growth phase.
///
/// Scans for a strictly increasing pair `I[i-1] < I[i]` with `I[i-1]` above
/// [`MIN_CASES_FOR_STATS`], takes `I[i-1]` as the baseline, and returns the
/// time until the series first reaches twice that baseline. Later growth
/// phases are tried if an earlier one never doubles.
pub fn doubling_time(infected: &[usize], dt: f64) -> Option<f64> {
    for i in 1..infected.len() {
        let baseline = infected[i - 1];
        if !(infected[i] > baseline && baseline > MIN_CASES_FOR_STATS) {
            continue;
        }
        let target = 2 * baseline;
        if let Some(offset) = infected[i..].iter().position(|&count| count >= target) {
            let steps = i + offset - (i - 1);
            return Some(steps as f64 * dt);
        }
    }
    None
}

/// Relative change of the infected count over the last `window_days`.
///
/// Returns 0 with fewer than two samples, and 1 (unbounded growth) when the
/// window starts at zero and ends above it.
pub fn growth_rate_over(infected: &[usize], dt: f64, window_days: f64) -> f64 {
    let window = tail(infected, window_steps(window_days, dt));
    let n = window.len();
    if n < 2 {
        return 0.0;
    }
    let (first, last) = (window[0] as f64, window[n - 1] as f64);
    if window[0] == 0 {
        return if window[n - 1] > 0 { 1.0 } else { 0.0 };
    }
    (last - first) / first
}

/// [`growth_rate_over`] with the default three-day window.
pub fn growth_rate(infected: &[usize], dt: f64) -> f64 {
    growth_rate_over(infected, dt, GROWTH_RATE_WINDOW_DAYS)
}

/// Percentage of the population ever infected, in `[0, 100]`.
pub fn attack_rate(recovered: usize, deceased: usize, population_size: usize) -> f64 {
    if population_size == 0 {
        return 0.0;
    }
    let ever_infected = (recovered + deceased) as f64;
    (ever_infected / population_size as f64 * 100.0).clamp(0.0, 100.0)
}

/// Percentage of resolved infections that ended in death.
pub fn case_fatality_rate(recovered: usize, deceased: usize) -> f64 {
    let resolved = recovered + deceased;
    if resolved == 0 {
        return 0.0;
    }
    deceased as f64 / resolved as f64 * 100.0
}

/// Peak infected count and the day it first occurs.
pub fn peak(infected: &[usize], dt: f64) -> (usize, f64) {
    let mut best = (0, 0);
    for (idx, &count) in infected.iter().enumerate() {
        if count > best.1 {
            best = (idx, count);
        }
    }
    (best.1, best.0 as f64 * dt)
}

/// Days with at least one infected agent.
pub fn outbreak_duration(infected: &[usize], dt: f64) -> f64 {
    infected.iter().filter(|&&count| count >= 1).count() as f64 * dt
}

/// Classify the mean of the last three samples against `thresholds`.
///
/// Fewer than two samples are always [`Trend::Stable`].
pub fn classify_trend(samples: &[f64], thresholds: TrendThresholds) -> Trend {
    if samples.len() < 2 {
        return Trend::Stable;
    }
    let Some(avg) = compute_mean(tail(samples, 3)) else {
        return Trend::Stable;
    };
    if avg > thresholds.increasing {
        Trend::Increasing
    } else if avg < thresholds.decreasing {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Summary indicators for one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpidemicMetrics {
    pub r0: f64,
    pub rt: f64,
    pub doubling_time: Option<f64>,
    pub growth_rate: f64,
    pub attack_rate: f64,
    pub case_fatality_rate: f64,
    pub peak_infected: usize,
    pub peak_day: f64,
    pub outbreak_duration: f64,
    pub current_infected: usize,
    pub current_recovered: usize,
    pub current_deceased: usize,
    /// Percentage of the population vaccinated so far.
    pub vaccination_coverage: f64,
    /// Cumulative number of detected infections.
    pub detected_cases: usize,
    pub trend: Trend,
    pub smoothed_infected: Vec<f64>,
}

impl EpidemicMetrics {
    /// Compute every indicator from a simulation snapshot.
    ///
    /// Vaccinated agents sit in R without ever being infected, so they are
    /// excluded from the attack and case-fatality rates.
    pub fn from_state(state: &SimulationState) -> SimResult<Self> {
        Self::from_state_with(state, TrendThresholds::default())
    }

    pub fn from_state_with(state: &SimulationState, thresholds: TrendThresholds) -> SimResult<Self> {
        let cfg = &state.config;
        let dt = cfg.clock.time_step;
        let infectious_mean = cfg.disease.infectious_mean;
        let pop_size = cfg.population.population_size;

        let infected = state.history.infected();
        let latest = state.history.latest();
        let recovered_from_infection = latest.recovered.saturating_sub(state.vaccinated);

        let (peak_infected, peak_day) = peak(&infected, dt);
        let infected_f64: Vec<f64> = infected.iter().map(|&count| count as f64).collect();

        let metrics = Self {
            r0: basic_reproduction_number(&infected, infectious_mean, dt),
            rt: effective_reproduction_number(&infected, infectious_mean, dt),
            doubling_time: doubling_time(&infected, dt),
            growth_rate: growth_rate(&infected, dt),
            attack_rate: attack_rate(recovered_from_infection, latest.deceased, pop_size),
            case_fatality_rate: case_fatality_rate(recovered_from_infection, latest.deceased),
            peak_infected,
            peak_day,
            outbreak_duration: outbreak_duration(&infected, dt),
            current_infected: latest.infected,
            current_recovered: latest.recovered,
            current_deceased: latest.deceased,
            vaccination_coverage: if pop_size == 0 {
                0.0
            } else {
                state.vaccinated as f64 / pop_size as f64 * 100.0
            },
            detected_cases: state.detected,
            trend: classify_trend(&state.rt_history, thresholds),
            smoothed_infected: moving_average(&infected_f64, SMOOTHING_WINDOW),
        };
        metrics.check_finite()?;
        Ok(metrics)
    }

    /// A NaN or infinite indicator means an upstream defect.
    fn check_finite(&self) -> SimResult<()> {
        let named = [
            ("r0", self.r0),
            ("rt", self.rt),
            ("growth_rate", self.growth_rate),
            ("attack_rate", self.attack_rate),
            ("case_fatality_rate", self.case_fatality_rate),
            ("peak_day", self.peak_day),
            ("outbreak_duration", self.outbreak_duration),
            ("vaccination_coverage", self.vaccination_coverage),
            ("doubling_time", self.doubling_time.unwrap_or(0.0)),
        ];
        for (name, val) in named {
            if !val.is_finite() {
                return Err(SimError::InternalInvariant(format!(
                    "metric {name} is not finite: {val}"
                )));
            }
        }
        Ok(())
    }
}
