//! Per-variable statistics.
//!
//! Every aggregator works on three fixed-size slots of a bin: a spatial
//! slot filled from raw observations of one product, a temporal slot
//! merged from completed spatial slots of many products, and an output
//! slot written once when the temporal bin is completed.
//!
//! ```text
//! observation ──aggregate_spatial──► spatial slot ──complete_spatial──┐
//!                                                                    │
//!          output slot ◄──complete_temporal── temporal slot ◄─────────┘
//!                                               aggregate_temporal
//! ```
//!
//! The set of aggregators is closed. [`Aggregator`] dispatches with an
//! exhaustive `match`, so adding a kind means handling it everywhere.

mod average;
mod average_ml;
mod min_max;
mod moments;
mod percentile;

pub use average::AverageAggregator;
pub use average_ml::AverageMlAggregator;
pub use min_max::MinMaxAggregator;
pub use percentile::PercentileAggregator;

use crate::config::AggregatorConfig;
use crate::context::VariableContext;
use crate::error::{BinningError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregator kinds, named as they appear in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregatorKind {
    #[serde(rename = "MIN_MAX")]
    MinMax,
    #[serde(rename = "AVG")]
    Average,
    #[serde(rename = "AVG_ML")]
    AverageMl,
    #[serde(rename = "PERCENTILE")]
    Percentile,
}

impl AggregatorKind {
    pub const ALL: [AggregatorKind; 4] = [
        AggregatorKind::MinMax,
        AggregatorKind::Average,
        AggregatorKind::AverageMl,
        AggregatorKind::Percentile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinMax => "MIN_MAX",
            Self::Average => "AVG",
            Self::AverageMl => "AVG_ML",
            Self::Percentile => "PERCENTILE",
        }
    }
}

impl FromStr for AggregatorKind {
    type Err = BinningError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BinningError::config(format!("unknown aggregator type '{}'", s)))
    }
}

impl fmt::Display for AggregatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static shape of one registered aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatorDescriptor {
    pub kind: AggregatorKind,
    pub variables: Vec<String>,
    pub spatial_len: usize,
    pub temporal_len: usize,
    pub output_features: Vec<String>,
}

/// One configured aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregator {
    MinMax(MinMaxAggregator),
    Average(AverageAggregator),
    AverageMl(AverageMlAggregator),
    Percentile(PercentileAggregator),
}

impl Aggregator {
    /// Build an aggregator from its configuration, resolving the input
    /// variable against `variables`.
    pub fn from_config(config: &AggregatorConfig, variables: &VariableContext) -> Result<Self> {
        config.validate()?;
        let var_name = config.var_name();
        let index = variables.index_of(var_name).ok_or_else(|| {
            BinningError::config(format!(
                "{} aggregator refers to unknown variable '{}'",
                config.kind(),
                var_name
            ))
        })?;

        let aggregator = match config {
            AggregatorConfig::MinMax { .. } => Self::MinMax(MinMaxAggregator::new(index, var_name)),
            AggregatorConfig::Average { .. } => {
                Self::Average(AverageAggregator::new(index, var_name))
            }
            AggregatorConfig::AverageMl { .. } => {
                Self::AverageMl(AverageMlAggregator::new(index, var_name))
            }
            AggregatorConfig::Percentile {
                percentage,
                sample_size,
                ..
            } => Self::Percentile(PercentileAggregator::new(
                index,
                var_name,
                *percentage,
                *sample_size,
            )),
        };
        Ok(aggregator)
    }

    pub fn kind(&self) -> AggregatorKind {
        match self {
            Self::MinMax(_) => AggregatorKind::MinMax,
            Self::Average(_) => AggregatorKind::Average,
            Self::AverageMl(_) => AggregatorKind::AverageMl,
            Self::Percentile(_) => AggregatorKind::Percentile,
        }
    }

    /// Position of the input variable in each observation.
    pub fn variable_index(&self) -> usize {
        match self {
            Self::MinMax(a) => a.variable_index,
            Self::Average(a) => a.variable_index,
            Self::AverageMl(a) => a.variable_index,
            Self::Percentile(a) => a.variable_index,
        }
    }

    pub fn variable_name(&self) -> &str {
        match self {
            Self::MinMax(a) => &a.variable_name,
            Self::Average(a) => &a.variable_name,
            Self::AverageMl(a) => &a.variable_name,
            Self::Percentile(a) => &a.variable_name,
        }
    }

    pub fn spatial_len(&self) -> usize {
        match self {
            Self::MinMax(_) => MinMaxAggregator::SPATIAL_LEN,
            Self::Average(_) => AverageAggregator::SPATIAL_LEN,
            Self::AverageMl(_) => AverageMlAggregator::SPATIAL_LEN,
            Self::Percentile(_) => PercentileAggregator::SPATIAL_LEN,
        }
    }

    pub fn temporal_len(&self) -> usize {
        match self {
            Self::MinMax(_) => MinMaxAggregator::TEMPORAL_LEN,
            Self::Average(_) => AverageAggregator::TEMPORAL_LEN,
            Self::AverageMl(_) => AverageMlAggregator::TEMPORAL_LEN,
            Self::Percentile(a) => a.temporal_len(),
        }
    }

    pub fn output_feature_names(&self) -> &[String] {
        match self {
            Self::MinMax(a) => &a.output_features,
            Self::Average(a) => &a.output_features,
            Self::AverageMl(a) => &a.output_features,
            Self::Percentile(a) => &a.output_features,
        }
    }

    pub fn output_len(&self) -> usize {
        self.output_feature_names().len()
    }

    pub fn descriptor(&self) -> AggregatorDescriptor {
        AggregatorDescriptor {
            kind: self.kind(),
            variables: vec![self.variable_name().to_string()],
            spatial_len: self.spatial_len(),
            temporal_len: self.temporal_len(),
            output_features: self.output_feature_names().to_vec(),
        }
    }

    pub fn init_spatial(&self, v: &mut [f32]) {
        match self {
            Self::MinMax(a) => a.init(v),
            Self::Average(_) | Self::AverageMl(_) | Self::Percentile(_) => v.fill(0.0),
        }
    }

    /// Accumulate one observation. `values` holds every variable of the
    /// observation; the aggregator picks its own.
    pub fn aggregate_spatial(&self, v: &mut [f32], values: &[f32]) {
        match self {
            Self::MinMax(a) => a.aggregate_spatial(v, values),
            Self::Average(a) => a.aggregate_spatial(v, values),
            Self::AverageMl(a) => a.aggregate_spatial(v, values),
            Self::Percentile(a) => a.aggregate_spatial(v, values),
        }
    }

    pub fn complete_spatial(&self, v: &mut [f32]) {
        match self {
            Self::MinMax(_) => {}
            Self::Average(a) => a.complete_spatial(v),
            Self::AverageMl(a) => a.complete_spatial(v),
            Self::Percentile(a) => a.complete_spatial(v),
        }
    }

    pub fn init_temporal(&self, v: &mut [f32]) {
        match self {
            Self::MinMax(a) => a.init(v),
            Self::Average(_) | Self::AverageMl(_) | Self::Percentile(_) => v.fill(0.0),
        }
    }

    /// Merge one completed spatial slot into a temporal slot. Spatial
    /// bins without observations leave the temporal slot untouched.
    pub fn aggregate_temporal(&self, spatial: &[f32], spatial_num_obs: u32, temporal: &mut [f32]) {
        if spatial_num_obs == 0 {
            return;
        }
        match self {
            Self::MinMax(a) => a.aggregate_temporal(spatial, temporal),
            Self::Average(a) => a.aggregate_temporal(spatial, temporal),
            Self::AverageMl(a) => a.aggregate_temporal(spatial, temporal),
            Self::Percentile(a) => a.aggregate_temporal(spatial, temporal),
        }
    }

    pub fn complete_temporal(&self, temporal: &[f32], output: &mut [f32]) {
        match self {
            Self::MinMax(a) => a.complete_temporal(temporal, output),
            Self::Average(a) => a.complete_temporal(temporal, output),
            Self::AverageMl(a) => a.complete_temporal(temporal, output),
            Self::Percentile(a) => a.complete_temporal(temporal, output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variables() -> VariableContext {
        VariableContext::new(["a", "b"]).unwrap()
    }

    /// Run `values` through one spatial bin each, then merge them all.
    fn temporal_output(agg: &Aggregator, products: &[&[f32]]) -> Vec<f32> {
        let mut temporal = vec![0.0; agg.temporal_len()];
        agg.init_temporal(&mut temporal);
        for pixels in products {
            let mut spatial = vec![0.0; agg.spatial_len()];
            agg.init_spatial(&mut spatial);
            for &x in pixels.iter() {
                agg.aggregate_spatial(&mut spatial, &[0.0, x]);
            }
            agg.complete_spatial(&mut spatial);
            agg.aggregate_temporal(&spatial, pixels.len() as u32, &mut temporal);
        }
        let mut output = vec![0.0; agg.output_len()];
        agg.complete_temporal(&temporal, &mut output);
        output
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in AggregatorKind::ALL {
            assert_eq!(kind.as_str().parse::<AggregatorKind>().unwrap(), kind);
        }
        assert_eq!("avg_ml".parse::<AggregatorKind>().unwrap(), AggregatorKind::AverageMl);
        assert!("ON_MAX_LINE".parse::<AggregatorKind>().is_err());
        assert_eq!(AggregatorKind::Average.to_string(), "AVG");
    }

    #[test]
    fn test_from_config_resolves_variable() {
        let config = AggregatorConfig::Average {
            var_name: "b".to_string(),
        };
        let agg = Aggregator::from_config(&config, &variables()).unwrap();
        assert_eq!(agg.kind(), AggregatorKind::Average);
        assert_eq!(agg.variable_index(), 1);
        assert_eq!(agg.output_feature_names(), &["b_mean", "b_sigma"]);
    }

    #[test]
    fn test_from_config_unknown_variable() {
        let config = AggregatorConfig::MinMax {
            var_name: "chl".to_string(),
        };
        let err = Aggregator::from_config(&config, &variables()).unwrap_err();
        assert!(matches!(err, BinningError::Config(_)));
    }

    #[test]
    fn test_descriptor() {
        let config = AggregatorConfig::Percentile {
            var_name: "a".to_string(),
            percentage: 50,
            sample_size: 20,
        };
        let agg = Aggregator::from_config(&config, &variables()).unwrap();
        let descriptor = agg.descriptor();
        assert_eq!(descriptor.kind, AggregatorKind::Percentile);
        assert_eq!(descriptor.variables, vec!["a".to_string()]);
        assert_eq!(descriptor.spatial_len, 2);
        assert_eq!(descriptor.temporal_len, 21);
        assert_eq!(descriptor.output_features, vec!["a_p50".to_string()]);
    }

    #[test]
    fn test_min_max_merge() {
        let agg = Aggregator::MinMax(MinMaxAggregator::new(1, "b"));
        let output = temporal_output(&agg, &[&[4.0, 2.0], &[6.0], &[3.0]]);
        assert_eq!(output, vec![2.0, 6.0]);
    }

    #[test]
    fn test_average_pooled_equals_combined_sample() {
        let agg = Aggregator::Average(AverageAggregator::new(1, "b"));
        let pooled = temporal_output(&agg, &[&[4.0], &[2.0], &[6.0]]);
        let combined = temporal_output(&agg, &[&[4.0, 2.0, 6.0]]);
        assert!((pooled[0] - 4.0).abs() < 1e-6);
        assert!((pooled[1] - 1.632_993).abs() < 1e-5);
        assert!((pooled[0] - combined[0]).abs() < 1e-6);
        assert!((pooled[1] - combined[1]).abs() < 1e-6);
    }

    #[test]
    fn test_average_ml_uses_log_domain() {
        let agg = Aggregator::AverageMl(AverageMlAggregator::new(1, "b"));
        let e = std::f32::consts::E;
        let output = temporal_output(&agg, &[&[1.0], &[e * e]]);
        // ln values 0 and 2: mu = 1, variance = 1
        let (mean, sigma, median, mode) = average_ml::back_transform(1.0, 1.0);
        assert!((output[0] as f64 - mean).abs() < 1e-4);
        assert!((output[1] as f64 - sigma).abs() < 1e-4);
        assert!((output[2] as f64 - median).abs() < 1e-5);
        assert!((output[3] as f64 - mode).abs() < 1e-5);
    }

    #[test]
    fn test_empty_bins_yield_nan() {
        for agg in [
            Aggregator::MinMax(MinMaxAggregator::new(1, "b")),
            Aggregator::Average(AverageAggregator::new(1, "b")),
            Aggregator::AverageMl(AverageMlAggregator::new(1, "b")),
            Aggregator::Percentile(PercentileAggregator::new(1, "b", 90, 10)),
        ] {
            let output = temporal_output(&agg, &[]);
            assert!(output.iter().all(|v| v.is_nan()), "{} produced {:?}", agg.kind(), output);
        }
    }

    #[test]
    fn test_all_nan_variable_yields_nan() {
        let agg = Aggregator::Average(AverageAggregator::new(1, "b"));
        let output = temporal_output(&agg, &[&[f32::NAN, f32::NAN]]);
        assert!(output[0].is_nan());
        assert!(output[1].is_nan());
    }

    #[test]
    fn test_zero_obs_spatial_bin_is_ignored() {
        let agg = Aggregator::MinMax(MinMaxAggregator::new(0, "a"));
        let mut temporal = vec![0.0; 2];
        agg.init_temporal(&mut temporal);
        agg.aggregate_temporal(&[-100.0, 100.0], 0, &mut temporal);
        assert_eq!(temporal, vec![f32::INFINITY, f32::NEG_INFINITY]);
    }
}
