//! Common test fixtures for binning tests.
//!
//! Configurations are plain YAML so tests exercise the same parsing path
//! as the command-line binner.

use std::io::Write;
use tempfile::NamedTempFile;

/// Common bounding box definitions for testing.
pub mod bbox {
    use binning::BoundingBox;

    /// Whole globe
    pub const GLOBAL: BoundingBox = BoundingBox {
        min_lon: -180.0,
        min_lat: -90.0,
        max_lon: 180.0,
        max_lat: 90.0,
    };

    /// North Atlantic
    pub const NORTH_ATLANTIC: BoundingBox = BoundingBox {
        min_lon: -60.0,
        min_lat: 20.0,
        max_lon: -10.0,
        max_lat: 60.0,
    };

    /// Tropical band
    pub const TROPICS: BoundingBox = BoundingBox {
        min_lon: -180.0,
        min_lat: -23.5,
        max_lon: 180.0,
        max_lat: 23.5,
    };

    /// Invalid bbox (min > max)
    pub const INVALID: BoundingBox = BoundingBox {
        min_lon: 10.0,
        min_lat: 10.0,
        max_lon: 5.0,
        max_lat: 5.0,
    };
}

/// YAML configurations.
pub mod configs {
    /// Six-row grid (46 bins) with one averaged variable.
    pub const MINIMAL: &str = r#"
num_rows: 6
mask_expr: "valid"
variables: [chl]
aggregators:
  - type: AVG
    var_name: chl
"#;

    /// Every aggregator kind on a 180-row grid, split over three
    /// partitions.
    ///
    /// Output features, in order: `chl_mean`, `chl_sigma`, `chl_median`,
    /// `chl_mode`, `sst_min`, `sst_max`, `sst_mean`, `sst_sigma`,
    /// `chl_p90`.
    pub const ALL_AGGREGATORS: &str = r#"
num_rows: 180
super_sampling: 1
mask_expr: "chl > 0 && sst > -2"
variables: [chl, sst]
num_partitions: 3
num_threads: 2
aggregators:
  - type: AVG_ML
    var_name: chl
  - type: MIN_MAX
    var_name: sst
  - type: AVG
    var_name: sst
  - type: PERCENTILE
    var_name: chl
    percentage: 90
    sample_size: 50
"#;

    /// Regional and time-limited run over January 2024.
    pub const REGIONAL: &str = r#"
num_rows: 180
mask_expr: "valid"
variables: [sst]
num_partitions: 2
region:
  min_lon: -60.0
  min_lat: 20.0
  max_lon: -10.0
  max_lat: 60.0
time_range:
  start: "2024-01-01T00:00:00Z"
  end: "2024-01-31T23:59:59Z"
aggregators:
  - type: MIN_MAX
    var_name: sst
"#;

    /// References a variable that is not declared.
    pub const UNKNOWN_VARIABLE: &str = r#"
num_rows: 6
mask_expr: "valid"
variables: [chl]
aggregators:
  - type: AVG
    var_name: sst
"#;
}

/// Write `contents` to a temporary `.yaml` file that lives as long as the
/// returned handle.
pub fn write_config_file(contents: &str) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}
