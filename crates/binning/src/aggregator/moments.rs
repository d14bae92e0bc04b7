//! Count-weighted mean/variance accumulators.

/// Observation count, mean and sum of squared deviations of a sample.
///
/// Two `Moments` merge with the pairwise update of Chan et al., which
/// pools within-group and between-group variance without ever forming a
/// large sum of squares.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Moments {
    pub count: f64,
    pub mean: f64,
    pub m2: f64,
}

impl Moments {
    /// From running sums of `x` and `x²` over `count` values.
    pub fn from_sums(count: f64, sum: f64, sum_sq: f64) -> Self {
        if count <= 0.0 {
            return Self::default();
        }
        let mean = sum / count;
        let variance = (sum_sq / count - mean * mean).max(0.0);
        Self {
            count,
            mean,
            m2: variance * count,
        }
    }

    /// From a group mean and population standard deviation.
    pub fn from_mean_sigma(count: f64, mean: f64, sigma: f64) -> Self {
        if count <= 0.0 || !mean.is_finite() {
            return Self::default();
        }
        let sigma = if sigma.is_finite() { sigma } else { 0.0 };
        Self {
            count,
            mean,
            m2: sigma * sigma * count,
        }
    }

    pub fn merge(&self, other: &Self) -> Self {
        if other.count <= 0.0 {
            return *self;
        }
        if self.count <= 0.0 {
            return *other;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        Self {
            count,
            mean: self.mean + delta * other.count / count,
            m2: self.m2 + other.m2 + delta * delta * self.count * other.count / count,
        }
    }

    /// Population variance, NaN for an empty sample.
    pub fn variance(&self) -> f64 {
        if self.count <= 0.0 {
            return f64::NAN;
        }
        (self.m2 / self.count).max(0.0)
    }

    pub fn sigma(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Mean, NaN for an empty sample.
    pub fn mean_or_nan(&self) -> f64 {
        if self.count <= 0.0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Read from a `[count, mean, m2]` slot.
    pub fn read(v: &[f32]) -> Self {
        Self {
            count: v[0] as f64,
            mean: v[1] as f64,
            m2: v[2] as f64,
        }
    }

    /// Write into a `[count, mean, m2]` slot.
    pub fn write(&self, v: &mut [f32]) {
        v[0] = self.count as f32;
        v[1] = self.mean as f32;
        v[2] = self.m2 as f32;
    }
}
