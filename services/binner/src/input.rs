//! Product files read by the binner.
//!
//! A product file is a JSON document carrying point observations, gridded
//! tiles, or both:
//!
//! ```json
//! {
//!   "name": "S3A_OL_2_WFR_20240101",
//!   "observations": [
//!     { "lat": 15.0, "lon": 15.0, "time": "2024-01-01T10:00:00Z", "values": [0.2, 4.0] }
//!   ],
//!   "tiles": [
//!     {
//!       "width": 2, "height": 1, "time": 8766.4,
//!       "geocoding": { "west": 10.0, "north": 20.0, "lon_step": 0.5, "lat_step": 0.5 },
//!       "values": [0.2, 4.0, 0.6, 2.0],
//!       "mask": [true, false]
//!     }
//!   ]
//! }
//! ```
//!
//! Times are either MJD2000 days or RFC 3339 timestamps.

use anyhow::{bail, Context, Result};
use binning::time::to_mjd2000;
use binning::{AffineGeoCoding, BinningContext, ObservationSlice, PixelTile, ProductInput};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ProductFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub observations: Vec<PointObservation>,
    #[serde(default)]
    pub tiles: Vec<TileSpec>,
}

#[derive(Debug, Deserialize)]
pub struct PointObservation {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub time: Option<TimeValue>,
    #[serde(default = "default_valid")]
    pub valid: bool,
    pub values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct TileSpec {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub time: Option<TimeValue>,
    pub geocoding: GeoCodingSpec,
    pub values: Vec<f32>,
    /// All pixels are valid when absent.
    #[serde(default)]
    pub mask: Option<Vec<bool>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeoCodingSpec {
    pub west: f64,
    pub north: f64,
    pub lon_step: f64,
    pub lat_step: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    Mjd(f64),
    Utc(DateTime<Utc>),
}

impl TimeValue {
    pub fn as_mjd2000(&self) -> f64 {
        match self {
            TimeValue::Mjd(days) => *days,
            TimeValue::Utc(time) => to_mjd2000(*time),
        }
    }
}

fn default_valid() -> bool {
    true
}

fn mjd_or_nan(time: Option<TimeValue>) -> f64 {
    time.map(|t| t.as_mjd2000()).unwrap_or(f64::NAN)
}

impl ProductFile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse product file")
    }

    /// Convert to binner input. Tiles are expanded with the context's
    /// super-sampling; point observations form one slice ahead of them.
    pub fn into_input(self, default_name: &str, context: &BinningContext) -> Result<ProductInput> {
        let variable_count = context.variables().count();
        let name = self.name.unwrap_or_else(|| default_name.to_string());
        let mut slices = Vec::with_capacity(self.tiles.len() + 1);

        if !self.observations.is_empty() {
            let mut slice = ObservationSlice::with_capacity(variable_count, self.observations.len());
            for (i, obs) in self.observations.iter().enumerate() {
                slice
                    .push(obs.lat, obs.lon, mjd_or_nan(obs.time), obs.valid, &obs.values)
                    .with_context(|| format!("{}: observation {}", name, i))?;
            }
            slices.push(slice);
        }

        for (i, tile) in self.tiles.into_iter().enumerate() {
            let mask = match tile.mask {
                Some(mask) => mask,
                None => match tile.width.checked_mul(tile.height) {
                    Some(pixels) => vec![true; pixels],
                    None => bail!("{}: tile {} size {}x{} overflows", name, i, tile.width, tile.height),
                },
            };
            let pixels = PixelTile::new(
                tile.width,
                tile.height,
                variable_count,
                tile.values,
                mask,
                mjd_or_nan(tile.time),
            )
            .with_context(|| format!("{}: tile {}", name, i))?;
            let g = tile.geocoding;
            let geocoding = AffineGeoCoding::new(g.west, g.north, g.lon_step, g.lat_step);
            let slice = ObservationSlice::from_tile(&pixels, &geocoding, context.super_sampling())
                .with_context(|| format!("{}: tile {}", name, i))?;
            slices.push(slice);
        }

        if slices.is_empty() {
            bail!("{} contains no observations or tiles", name);
        }
        debug!(product = %name, slices = slices.len(), "Loaded product");
        Ok(ProductInput::new(name, slices))
    }
}

/// Read every product file. The file stem names products without a
/// `name` field.
pub fn load_products(paths: &[impl AsRef<Path>], context: &BinningContext) -> Result<Vec<ProductInput>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            ProductFile::from_json(&json)
                .and_then(|file| file.into_input(&stem, context))
                .with_context(|| format!("Invalid product file {}", path.display()))
        })
        .collect()
}
