//! Arithmetic mean and standard deviation aggregator.

use super::moments::Moments;

/// Mean and population standard deviation of one variable.
///
/// | stage              | slot layout                  |
/// |--------------------|------------------------------|
/// | spatial, open      | `[sum, sum_sq, count]`       |
/// | spatial, completed | `[mean, sigma, count]`       |
/// | temporal           | `[count, mean, m2]`          |
/// | output             | `[mean, sigma]`              |
#[derive(Debug, Clone, PartialEq)]
pub struct AverageAggregator {
    pub(crate) variable_index: usize,
    pub(crate) variable_name: String,
    pub(crate) output_features: Vec<String>,
}

impl AverageAggregator {
    pub const SPATIAL_LEN: usize = 3;
    pub const TEMPORAL_LEN: usize = 3;

    pub fn new(variable_index: usize, variable_name: impl Into<String>) -> Self {
        let variable_name = variable_name.into();
        let output_features = vec![
            format!("{}_mean", variable_name),
            format!("{}_sigma", variable_name),
        ];
        Self {
            variable_index,
            variable_name,
            output_features,
        }
    }

    pub(crate) fn aggregate_spatial(&self, v: &mut [f32], values: &[f32]) {
        let value = values[self.variable_index];
        if value.is_nan() {
            return;
        }
        v[0] += value;
        v[1] += value * value;
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
        output[0] = moments.mean_or_nan() as f32;
        output[1] = moments.sigma() as f32;
    }
}
