//! Tweet-age observation distribution
//!
//! The configured density `f(x)` describes how likely a reaction to a
//! tweet of age `x` is, given that someone eventually reacts. It is
//! integrated over bins of geometrically growing width and normalized into
//! a per-bin observation PMF; the tweet bank multiplies a tweet's reach by
//! `pmf[age_bin]` to get its live reaction rate.

use crate::core::config::TweetObsConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::SimTime;

/// Trapezoid panels per bin when integrating the density.
const INTEGRATION_STEPS: usize = 32;

/// Upper bound on the number of age bins a configuration may produce.
const MAX_AGE_BINS: usize = 4096;

#[derive(Debug, Clone)]
pub struct ObservationModel {
    /// Bin edges in minutes of tweet age; `edges[k]..edges[k+1]` is bin k.
    /// Ages below `edges[0]` (= x_start) also count as bin 0.
    edges: Vec<f64>,
    /// Normalized observation mass per bin.
    pmf: Vec<f64>,
    /// Total live window; tweets at or past this age are evicted.
    time_span: f64,
}

fn integrate(f: impl Fn(f64) -> f64, a: f64, b: f64, panels: usize) -> f64 {
    let h = (b - a) / panels as f64;
    let mut sum = 0.5 * (f(a) + f(b));
    for i in 1..panels {
        sum += f(a + h * i as f64);
    }
    sum * h
}

impl ObservationModel {
    pub fn from_config(config: &TweetObsConfig) -> Result<Self> {
        let mut edges = vec![config.x_start];
        let mut width = config.initial_resolution;
        while *edges.last().expect("seeded") < config.x_end {
            if edges.len() > MAX_AGE_BINS {
                return Err(SimError::config(
                    "tweet_observation.initial_resolution",
                    format!("produces more than {MAX_AGE_BINS} age bins"),
                ));
            }
            let next = (edges.last().unwrap() + width).min(config.x_end);
            edges.push(next);
            width *= config.resolution_growth_factor;
        }

        let density = &config.density_function;
        let masses: Vec<f64> = edges
            .windows(2)
            .map(|w| integrate(|x| density.eval(x), w[0], w[1], INTEGRATION_STEPS))
            .collect();
        let total: f64 = masses.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(SimError::config(
                "tweet_observation.density_function",
                "density integrates to nothing over the configured bins",
            ));
        }

        Ok(Self {
            pmf: masses.iter().map(|m| m / total).collect(),
            edges,
            time_span: config.time_span,
        })
    }

    pub fn n_bins(&self) -> usize {
        self.pmf.len()
    }

    pub fn obs_prob(&self, bin: usize) -> f64 {
        self.pmf[bin]
    }

    pub fn bin_width(&self, bin: usize) -> f64 {
        self.edges[bin + 1] - self.edges[bin]
    }

    /// Per-minute rate factor while a tweet sits in `bin`: the bin's
    /// observation mass spread over its width. Reaction *times* then
    /// distribute like the configured density, and a tweet's expected
    /// lifetime reaction count equals its reach (`Σ rate × width = 1`).
    pub fn obs_rate(&self, bin: usize) -> f64 {
        self.pmf[bin] / self.bin_width(bin)
    }

    pub fn span(&self) -> SimTime {
        self.time_span
    }

    /// Bin holding a tweet of the given age, or `None` once the age has
    /// exhausted the live window.
    pub fn bin_for_age(&self, age: SimTime) -> Option<usize> {
        if age >= self.time_span {
            return None;
        }
        let k = self.edges.partition_point(|&e| e <= age);
        Some(k.saturating_sub(1).min(self.n_bins() - 1))
    }

    /// Age at which a tweet leaves `bin` — the next bin edge, clipped by
    /// the live window. A tweet in the last bin sits there until the span
    /// runs out.
    pub fn rebin_threshold(&self, bin: usize) -> SimTime {
        if bin + 1 < self.edges.len() {
            self.edges[bin + 1].min(self.time_span)
        } else {
            self.time_span
        }
    }

    /// PMF-weighted mean of the bin midpoints; the expected reaction age.
    pub fn mean_age(&self) -> f64 {
        self.edges
            .windows(2)
            .zip(&self.pmf)
            .map(|(w, p)| 0.5 * (w[0] + w[1]) * p)
            .sum()
    }
}
