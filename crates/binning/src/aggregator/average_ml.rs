//! Maximum-likelihood (log-normal) average aggregator.
//!
//! For strictly positive, right-skewed quantities such as chlorophyll
//! concentration. Statistics are accumulated on `ln(x)` and transformed
//! back with the log-normal moment formulas:
//!
//! ```text
//! mean   = exp(mu + sigma² / 2)
//! sigma  = mean * sqrt(exp(sigma²) - 1)
//! median = exp(mu)
//! mode   = exp(mu - sigma²)
//! ```
//!
//! where `mu` and `sigma²` are the pooled mean and population variance of
//! `ln(x)`. The formulas are evaluated in `f64` exactly in this order.

use super::moments::Moments;

/// Log-domain mean and spread of one variable.
///
/// | stage              | slot layout                           |
/// |--------------------|---------------------------------------|
/// | spatial, open      | `[sum_ln, sum_ln_sq, count]`          |
/// | spatial, completed | `[ln_mean, ln_sigma, count]`          |
/// | temporal           | `[count, ln_mean, ln_m2]`             |
/// | output             | `[mean, sigma, median, mode]`         |
#[derive(Debug, Clone, PartialEq)]
pub struct AverageMlAggregator {
    pub(crate) variable_index: usize,
    pub(crate) variable_name: String,
    pub(crate) output_features: Vec<String>,
}

impl AverageMlAggregator {
    pub const SPATIAL_LEN: usize = 3;
    pub const TEMPORAL_LEN: usize = 3;

    pub fn new(variable_index: usize, variable_name: impl Into<String>) -> Self {
        let variable_name = variable_name.into();
        let output_features = ["mean", "sigma", "median", "mode"]
            .iter()
            .map(|suffix| format!("{}_{}", variable_name, suffix))
            .collect();
        Self {
            variable_index,
            variable_name,
            output_features,
        }
    }

    pub(crate) fn aggregate_spatial(&self, v: &mut [f32], values: &[f32]) {
        let value = values[self.variable_index];
        if !value.is_finite() || value <= 0.0 {
            return;
        }
        let ln = (value as f64).ln() as f32;
        v[0] += ln;
        v[1] += ln * ln;
        v[2] += 1.0;
    }

    pub(crate) fn complete_spatial(&self, v: &mut [f32]) {
        let moments = Moments::from_sums(v[2] as f64, v[0] as f64, v[1] as f64);
        v[0] = moments.mean_or_nan() as f32;
        v[1] = moments.sigma() as f32;
    }

    pub(crate) fn aggregate_temporal(&self, spatial: &[f32], temporal: &mut [f32]) {
        let group =
            Moments::from_mean_sigma(spatial[2] as f64, spatial[0] as f64, spatial[1] as f64);
        Moments::read(temporal).merge(&group).write(temporal);
    }

    pub(crate) fn complete_temporal(&self, temporal: &[f32], output: &mut [f32]) {
        let moments = Moments::read(temporal);
        let (mean, sigma, median, mode) = back_transform(moments.mean_or_nan(), moments.variance());
        output[0] = mean as f32;
        output[1] = sigma as f32;
        output[2] = median as f32;
        output[3] = mode as f32;
    }
}

/// Log-normal mean, sigma, median and mode from log-domain `mu` and
/// `variance`. NaN inputs propagate to every output.
pub(crate) fn back_transform(mu: f64, variance: f64) -> (f64, f64, f64, f64) {
    let mean = (mu + 0.5 * variance).exp();
    let sigma = mean * (variance.exp() - 1.0).sqrt();
    let median = mu.exp();
    let mode = (mu - variance).exp();
    (mean, sigma, median, mode)
}
