// src/engines/metrics/efficiency.rs
use crate::types::{Period, TimeSeries, NODATA_VALUE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Goodness-of-fit metric of a simulated series against observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Nse,
    Rsr,
    Pbias,
    Rmse,
    RSquare,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Rsr => "RSR",
            Self::Pbias => "PBIAS",
            Self::Rmse => "RMSE",
            Self::RSquare => "R-square",
        }
    }
}

/// Observed and simulated values aligned on common timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObsSimPair {
    pub observed: Vec<f64>,
    pub simulated: Vec<f64>,
}

impl ObsSimPair {
    /// Align two series inside `period`, skipping timestamps missing on either
    /// side and no-data records.
    pub fn align(observed: &TimeSeries, simulated: &TimeSeries, period: &Period) -> Self {
        let mut pair = Self::default();
        for (time, obs) in observed.within(period).points() {
            if (*obs - NODATA_VALUE).abs() < f64::EPSILON || !obs.is_finite() {
                continue;
            }
            if let Some(sim) = simulated.get(time) {
                if (sim - NODATA_VALUE).abs() < f64::EPSILON || !sim.is_finite() {
                    continue;
                }
                pair.observed.push(*obs);
                pair.simulated.push(sim);
            }
        }
        pair
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }
}

/// Efficiency statistics of one variable over one period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub nse: f64,
    pub rsr: f64,
    pub pbias: f64,
    pub rmse: f64,
    pub r_square: f64,
    pub count: usize,
}

impl EfficiencyMetrics {
    /// Returns `None` when fewer than two pairs are available or the
    /// observations have no variance, since NSE and RSR are undefined then.
    pub fn calculate(pair: &ObsSimPair) -> Option<Self> {
        let n = pair.len();
        if n < 2 {
            return None;
        }

        let obs_mean = pair.observed.iter().sum::<f64>() / n as f64;
        let sim_mean = pair.simulated.iter().sum::<f64>() / n as f64;

        let mut sse = 0.0;
        let mut obs_ss = 0.0;
        let mut sim_ss = 0.0;
        let mut cross = 0.0;
        let mut diff_sum = 0.0;
        let mut obs_sum = 0.0;

        for (&obs, &sim) in pair.observed.iter().zip(&pair.simulated) {
            sse += (obs - sim).powi(2);
            obs_ss += (obs - obs_mean).powi(2);
            sim_ss += (sim - sim_mean).powi(2);
            cross += (obs - obs_mean) * (sim - sim_mean);
            diff_sum += sim - obs;
            obs_sum += obs;
        }

        if obs_ss <= 0.0 {
            return None;
        }

        let nse = 1.0 - sse / obs_ss;
        let rsr = (sse / obs_ss).sqrt();
        let rmse = (sse / n as f64).sqrt();
        let pbias = if obs_sum.abs() > 0.0 {
            100.0 * diff_sum / obs_sum
        } else {
            f64::INFINITY
        };
        let r_square = if sim_ss > 0.0 {
            cross.powi(2) / (obs_ss * sim_ss)
        } else {
            0.0
        };

        Some(Self {
            nse,
            rsr,
            pbias,
            rmse,
            r_square,
            count: n,
        })
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Nse => self.nse,
            Metric::Rsr => self.rsr,
            Metric::Pbias => self.pbias,
            Metric::Rmse => self.rmse,
            Metric::RSquare => self.r_square,
        }
    }
}

/// Metrics of every tracked variable for one period, keyed by variable name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodEfficiency {
    pub variables: BTreeMap<String, EfficiencyMetrics>,
}

impl PeriodEfficiency {
    pub fn get(&self, variable: &str) -> Option<&EfficiencyMetrics> {
        self.variables.get(variable)
    }

    /// Tab separated header cells, e.g. `Cali-Q-NSE\tCali-Q-RSR\t...`
    pub fn output_header(variable: &str, metrics: &[Metric], tag: &str) -> String {
        metrics
            .iter()
            .map(|m| format!("{}-{}-{}\t", tag, variable, m.as_str()))
            .collect()
    }

    /// Tab separated values matching [`PeriodEfficiency::output_header`]
    pub fn output_efficiency(&self, variable: &str, metrics: &[Metric]) -> String {
        match self.variables.get(variable) {
            Some(eff) => metrics
                .iter()
                .map(|m| format!("{:.3}\t", eff.value(*m)))
                .collect(),
            None => metrics.iter().map(|_| "NaN\t".to_string()).collect(),
        }
    }
}
