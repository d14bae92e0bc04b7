//! Configuration for the binning engine.
//!
//! A configuration is read from YAML, optionally overridden from the
//! environment, validated, and then turned into a [`BinningContext`]:
//!
//! ```yaml
//! num_rows: 2160
//! super_sampling: 3
//! mask_expr: "!invalid && chl > 0"
//! variables: [chl, tsm]
//! aggregators:
//!   - type: AVG_ML
//!     var_name: chl
//!   - type: PERCENTILE
//!     var_name: tsm
//!     percentage: 90
//!     sample_size: 200
//! region: { min_lon: -20.0, min_lat: 30.0, max_lon: 40.0, max_lat: 70.0 }
//! time_range: { start: "2010-06-01T00:00:00Z", end: "2010-06-30T23:59:59Z" }
//! ```

use crate::aggregator::{Aggregator, AggregatorKind, PercentileAggregator};
use crate::context::{BinningContext, VariableContext};
use crate::error::{BinningError, Result};
use crate::grid::{IsinGrid, DEFAULT_NUM_ROWS};
use crate::manager::BinManager;
use crate::time::TimeRange;
use crate::types::BoundingBox;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration of one binning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningConfig {
    /// Number of grid rows; 2160 gives bins of about 9.28 km.
    #[serde(default = "default_num_rows")]
    pub num_rows: usize,

    /// Sub-pixels per source pixel along each axis.
    #[serde(default = "default_super_sampling")]
    pub super_sampling: usize,

    /// Validity expression, evaluated by the observation source.
    pub mask_expr: String,

    /// Variables every observation carries, in order.
    pub variables: Vec<String>,

    pub aggregators: Vec<AggregatorConfig>,

    /// Only observations inside this box are binned.
    #[serde(default)]
    pub region: Option<BoundingBox>,

    /// Only observations inside this interval are binned.
    #[serde(default)]
    pub time_range: Option<TimeRange>,

    /// Number of row bands for the temporal stage.
    #[serde(default = "default_num_partitions")]
    pub num_partitions: usize,

    /// Worker threads; rayon's default when unset.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

fn default_num_rows() -> usize {
    DEFAULT_NUM_ROWS
}

fn default_super_sampling() -> usize {
    1
}

fn default_num_partitions() -> usize {
    1
}

impl BinningConfig {
    /// Parse a YAML document. The result is not yet validated.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file. The result is not yet validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
            .map_err(|e| BinningError::config(format!("{}: {}", path.display(), e)))
    }

    /// Load a file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `BINNING_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Override settings from any variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(rows) = parse_override(&lookup, "BINNING_NUM_ROWS")? {
            self.num_rows = rows;
        }
        if let Some(n) = parse_override(&lookup, "BINNING_SUPER_SAMPLING")? {
            self.super_sampling = n;
        }
        if let Some(n) = parse_override(&lookup, "BINNING_NUM_PARTITIONS")? {
            self.num_partitions = n;
        }
        if let Some(n) = parse_override(&lookup, "BINNING_NUM_THREADS")? {
            self.num_threads = Some(n);
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_rows == 0 {
            return Err(BinningError::config("num_rows must be > 0"));
        }
        if self.super_sampling == 0 {
            return Err(BinningError::config("super_sampling must be > 0"));
        }
        if self.num_partitions == 0 {
            return Err(BinningError::config("num_partitions must be > 0"));
        }
        if self.num_threads == Some(0) {
            return Err(BinningError::config("num_threads must be > 0"));
        }
        if self.mask_expr.trim().is_empty() {
            return Err(BinningError::config("mask_expr must not be empty"));
        }
        if self.aggregators.is_empty() {
            return Err(BinningError::config("at least one aggregator is required"));
        }

        let variables = VariableContext::new(self.variables.iter().cloned())?;
        for aggregator in &self.aggregators {
            aggregator.validate()?;
            if variables.index_of(aggregator.var_name()).is_none() {
                return Err(BinningError::config(format!(
                    "{} aggregator refers to unknown variable '{}'",
                    aggregator.kind(),
                    aggregator.var_name()
                )));
            }
        }

        if let Some(region) = &self.region {
            region.validate()?;
        }
        if let Some(range) = &self.time_range {
            range.validate()?;
        }
        Ok(())
    }

    /// Validate and build the shared context for a run.
    pub fn create_context(&self) -> Result<BinningContext> {
        self.validate()?;
        let grid = Arc::new(IsinGrid::new(self.num_rows)?);
        let variables = VariableContext::new(self.variables.iter().cloned())?;
        let aggregators = self
            .aggregators
            .iter()
            .map(|config| Aggregator::from_config(config, &variables))
            .collect::<Result<Vec<_>>>()?;
        let manager = BinManager::new(aggregators, variables.count())?;

        Ok(BinningContext::new(grid, variables, manager)
            .with_super_sampling(self.super_sampling)
            .with_region(self.region)
            .with_time_range(self.time_range))
    }
}

fn parse_override<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        Some(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BinningError::config(format!("{} has invalid value '{}'", name, val))),
        None => Ok(None),
    }
}

/// Configuration of one aggregator, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AggregatorConfig {
    #[serde(rename = "MIN_MAX")]
    MinMax { var_name: String },

    #[serde(rename = "AVG")]
    Average { var_name: String },

    #[serde(rename = "AVG_ML")]
    AverageMl { var_name: String },

    #[serde(rename = "PERCENTILE")]
    Percentile {
        var_name: String,
        #[serde(default = "default_percentage")]
        percentage: u8,
        #[serde(default = "default_sample_size")]
        sample_size: usize,
    },
}

fn default_percentage() -> u8 {
    PercentileAggregator::DEFAULT_PERCENTAGE
}

fn default_sample_size() -> usize {
    PercentileAggregator::DEFAULT_SAMPLE_SIZE
}

impl AggregatorConfig {
    pub fn kind(&self) -> AggregatorKind {
        match self {
            Self::MinMax { .. } => AggregatorKind::MinMax,
            Self::Average { .. } => AggregatorKind::Average,
            Self::AverageMl { .. } => AggregatorKind::AverageMl,
            Self::Percentile { .. } => AggregatorKind::Percentile,
        }
    }

    pub fn var_name(&self) -> &str {
        match self {
            Self::MinMax { var_name }
            | Self::Average { var_name }
            | Self::AverageMl { var_name }
            | Self::Percentile { var_name, .. } => var_name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.var_name().trim().is_empty() {
            return Err(BinningError::config(format!(
                "{} aggregator needs a var_name",
                self.kind()
            )));
        }
        if let Self::Percentile {
            percentage,
            sample_size,
            ..
        } = self
        {
            if *percentage > 100 {
                return Err(BinningError::config("percentage must be 0-100"));
            }
            if *sample_size == 0 {
                return Err(BinningError::config("sample_size must be > 0"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const YAML: &str = r#"
num_rows: 6
mask_expr: "valid"
variables: [a, b]
aggregators:
  - type: MIN_MAX
    var_name: a
  - type: AVG
    var_name: b
"#;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = BinningConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.num_rows, 6);
        assert_eq!(config.super_sampling, 1);
        assert_eq!(config.num_partitions, 1);
        assert_eq!(config.num_threads, None);
        assert_eq!(config.region, None);
        assert_eq!(
            config.aggregators[1],
            AggregatorConfig::Average {
                var_name: "b".to_string()
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_default_num_rows() {
        let yaml = "mask_expr: x\nvariables: [a]\naggregators: [{type: AVG, var_name: a}]\n";
        let config = BinningConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.num_rows, 2160);
    }

    #[test]
    fn test_percentile_defaults() {
        let yaml = "mask_expr: x\nvariables: [a]\naggregators: [{type: PERCENTILE, var_name: a}]\n";
        let config = BinningConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.aggregators[0],
            AggregatorConfig::Percentile {
                var_name: "a".to_string(),
                percentage: 90,
                sample_size: 100,
            }
        );
    }

    #[test]
    fn test_unknown_aggregator_type() {
        let yaml = "mask_expr: x\nvariables: [a]\naggregators: [{type: ON_MAX_LINE, var_name: a}]\n";
        let err = BinningConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, BinningError::Config(_)));
    }

    #[test]
    fn test_missing_mask_expr() {
        let yaml = "variables: [a]\naggregators: [{type: AVG, var_name: a}]\n";
        assert!(BinningConfig::from_yaml_str(yaml).is_err());

        let mut config = BinningConfig::from_yaml_str(YAML).unwrap();
        config.mask_expr = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_failures() {
        let base = BinningConfig::from_yaml_str(YAML).unwrap();

        let mut config = base.clone();
        config.num_rows = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.aggregators.push(AggregatorConfig::AverageMl {
            var_name: "chl".to_string(),
        });
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.variables.clear();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.region = Some(BoundingBox::new(10.0, 0.0, -10.0, 5.0));
        assert!(config.validate().is_err());

        let mut config = base;
        config.aggregators = vec![AggregatorConfig::Percentile {
            var_name: "a".to_string(),
            percentage: 101,
            sample_size: 10,
        }];
        assert!(config.validate().is_err());

        let mut config = BinningConfig::from_yaml_str(YAML).unwrap();
        config.aggregators = vec![AggregatorConfig::Percentile {
            var_name: "a".to_string(),
            percentage: 50,
            sample_size: 0,
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = BinningConfig::from_yaml_str(YAML).unwrap();
        config
            .apply_overrides_from(overrides(&[
                ("BINNING_NUM_ROWS", "180"),
                ("BINNING_SUPER_SAMPLING", " 3 "),
                ("BINNING_NUM_THREADS", "4"),
            ]))
            .unwrap();
        assert_eq!(config.num_rows, 180);
        assert_eq!(config.super_sampling, 3);
        assert_eq!(config.num_partitions, 1);
        assert_eq!(config.num_threads, Some(4));

        let err = config
            .apply_overrides_from(overrides(&[("BINNING_NUM_PARTITIONS", "many")]))
            .unwrap_err();
        assert!(matches!(err, BinningError::Config(_)));
    }

    #[test]
    fn test_create_context() {
        let config = BinningConfig::from_yaml_str(YAML).unwrap();
        let context = config.create_context().unwrap();
        assert_eq!(context.grid().num_bins(), 46);
        assert_eq!(context.manager().aggregator_count(), 2);
        assert_eq!(
            context.manager().output_feature_names(),
            &["a_min", "a_max", "b_mean", "b_sigma"]
        );
        assert_eq!(context.variables().index_of("b"), Some(1));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let config = BinningConfig::from_file(file.path()).unwrap();
        assert_eq!(config.variables, vec!["a".to_string(), "b".to_string()]);

        let missing = BinningConfig::from_file("/nonexistent/binning.yaml").unwrap_err();
        assert!(matches!(missing, BinningError::Io(_)));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = BinningConfig::from_yaml_str(YAML).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(BinningConfig::from_yaml_str(&yaml).unwrap(), config);
    }
}
