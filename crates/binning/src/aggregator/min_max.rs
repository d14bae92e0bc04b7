//! Minimum/maximum aggregator.

/// Tracks the extreme values of one variable.
///
/// Spatial and temporal slots are both `[min, max]`. Empty slots hold
/// `[+inf, -inf]`, which is the identity of the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxAggregator {
    pub(crate) variable_index: usize,
    pub(crate) variable_name: String,
    pub(crate) output_features: Vec<String>,
}

impl MinMaxAggregator {
    pub const SPATIAL_LEN: usize = 2;
    pub const TEMPORAL_LEN: usize = 2;

    pub fn new(variable_index: usize, variable_name: impl Into<String>) -> Self {
        let variable_name = variable_name.into();
        let output_features = vec![
            format!("{}_min", variable_name),
            format!("{}_max", variable_name),
        ];
        Self {
            variable_index,
            variable_name,
            output_features,
        }
    }

    pub(crate) fn init(&self, v: &mut [f32]) {
        v[0] = f32::INFINITY;
        v[1] = f32::NEG_INFINITY;
    }

    pub(crate) fn aggregate_spatial(&self, v: &mut [f32], values: &[f32]) {
        let value = values[self.variable_index];
        if value.is_nan() {
            return;
        }
        v[0] = v[0].min(value);
        v[1] = v[1].max(value);
    }

    pub(crate) fn aggregate_temporal(&self, spatial: &[f32], temporal: &mut [f32]) {
        temporal[0] = temporal[0].min(spatial[0]);
        temporal[1] = temporal[1].max(spatial[1]);
    }

    pub(crate) fn complete_temporal(&self, temporal: &[f32], output: &mut [f32]) {
        if temporal[0] > temporal[1] {
            // nothing was ever aggregated
            output[0] = f32::NAN;
            output[1] = f32::NAN;
        } else {
            output[0] = temporal[0];
            output[1] = temporal[1];
        }
    }
}
