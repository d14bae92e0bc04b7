//! Percentile aggregator.

/// Temporal percentile of the per-product means of one variable.
///
/// The spatial stage averages the pixels of one product. The temporal
/// stage keeps the product means themselves, up to `sample_size` of them,
/// and the output is the linearly interpolated order statistic of the
/// kept values. A single contributing product yields its own mean.
///
/// Once the sample is full a new mean replaces the kept mean with the
/// largest [`sample_key`] if its own key is smaller. The kept values are
/// then the `sample_size` means with the smallest keys, which does not
/// depend on the order products arrive in.
///
/// | stage              | slot layout                          |
/// |--------------------|--------------------------------------|
/// | spatial, open      | `[sum, count]`                       |
/// | spatial, completed | `[mean, count]`                      |
/// | temporal           | `[seen, s_0, .., s_{sample_size-1}]` |
/// | output             | `[p<percentage>]`                    |
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileAggregator {
    pub(crate) variable_index: usize,
    pub(crate) variable_name: String,
    pub(crate) output_features: Vec<String>,
    percentage: u8,
    sample_size: usize,
}

/// Pseudo-random ordering key of a sample value (splitmix64 of its bits).
fn sample_key(value: f32) -> u64 {
    let mut z = (value.to_bits() as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl PercentileAggregator {
    pub const SPATIAL_LEN: usize = 2;
    pub const DEFAULT_PERCENTAGE: u8 = 90;
    pub const DEFAULT_SAMPLE_SIZE: usize = 100;

    /// Callers validate `percentage <= 100` and `sample_size > 0`; see
    /// [`crate::config::AggregatorConfig::validate`].
    pub fn new(
        variable_index: usize,
        variable_name: impl Into<String>,
        percentage: u8,
        sample_size: usize,
    ) -> Self {
        let variable_name = variable_name.into();
        let output_features = vec![format!("{}_p{}", variable_name, percentage)];
        Self {
            variable_index,
            variable_name,
            output_features,
            percentage,
            sample_size,
        }
    }

    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn temporal_len(&self) -> usize {
        1 + self.sample_size
    }

    pub(crate) fn aggregate_spatial(&self, v: &mut [f32], values: &[f32]) {
        let value = values[self.variable_index];
        if value.is_nan() {
            return;
        }
        v[0] += value;
        v[1] += 1.0;
    }

    pub(crate) fn complete_spatial(&self, v: &mut [f32]) {
        v[0] = if v[1] > 0.0 { v[0] / v[1] } else { f32::NAN };
    }

    pub(crate) fn aggregate_temporal(&self, spatial: &[f32], temporal: &mut [f32]) {
        let mean = spatial[0];
        if spatial[1] <= 0.0 || !mean.is_finite() {
            return;
        }
        let (seen, sample) = temporal.split_at_mut(1);
        let kept = seen[0] as usize;
        if kept < self.sample_size {
            sample[kept] = mean;
        } else if let Some((slot, max_key)) = sample
            .iter()
            .map(|&s| sample_key(s))
            .enumerate()
            .max_by_key(|&(_, key)| key)
        {
            if sample_key(mean) < max_key {
                sample[slot] = mean;
            }
        }
        seen[0] += 1.0;
    }

    pub(crate) fn complete_temporal(&self, temporal: &[f32], output: &mut [f32]) {
        let kept = (temporal[0] as usize).min(self.sample_size);
        let mut sample = temporal[1..1 + kept].to_vec();
        sample.sort_by(f32::total_cmp);
        output[0] = self.order_statistic(&sample) as f32;
    }

    fn order_statistic(&self, sorted: &[f32]) -> f64 {
        let (first, last) = match (sorted.first(), sorted.last()) {
            (Some(&first), Some(&last)) => (first as f64, last as f64),
            _ => return f64::NAN,
        };
        if sorted.len() == 1 {
            return first;
        }
        let rank = self.percentage as f64 / 100.0 * (sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        match (sorted.get(lo), sorted.get(hi)) {
            (Some(&a), Some(&b)) => a as f64 + (rank - lo as f64) * (b as f64 - a as f64),
            _ => last,
        }
    }
}
