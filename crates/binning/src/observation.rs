//! Pixel observations entering the engine.
//!
//! Reading product files and evaluating mask expressions happen outside
//! this crate. What arrives here is either an [`ObservationSlice`] built
//! directly, or a [`PixelTile`] of decoded pixels plus a [`GeoCoding`]
//! that places them on the globe.
//!
//! # Super-sampling
//!
//! With a super-sampling factor `N`, every source pixel `(x, y)` becomes
//! `N × N` observations at sub-pixel positions
//!
//! ```text
//! (x + (i + 0.5) / N,  y + (j + 0.5) / N)     i, j in 0..N
//! ```
//!
//! each carrying the pixel's values and mask flag. `N = 1` samples the
//! pixel centre.

use crate::error::{BinningError, Result};
use crate::types::BoundingBox;

/// One observation: a geographic position, a time, the external mask
/// decision and the values of every configured variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<'a> {
    pub lat: f64,
    pub lon: f64,
    /// Days since 2000-01-01T00:00:00Z; NaN when unknown.
    pub time: f64,
    pub valid: bool,
    pub values: &'a [f32],
}

/// A batch of observations from one product, stored column-wise with
/// all variable values in one packed buffer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationSlice {
    variable_count: usize,
    lats: Vec<f64>,
    lons: Vec<f64>,
    times: Vec<f64>,
    valid: Vec<bool>,
    values: Vec<f32>,
}

impl ObservationSlice {
    pub fn new(variable_count: usize) -> Self {
        Self::with_capacity(variable_count, 0)
    }

    pub fn with_capacity(variable_count: usize, capacity: usize) -> Self {
        Self {
            variable_count,
            lats: Vec::with_capacity(capacity),
            lons: Vec::with_capacity(capacity),
            times: Vec::with_capacity(capacity),
            valid: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity * variable_count),
        }
    }

    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    pub fn len(&self) -> usize {
        self.lats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lats.is_empty()
    }

    pub fn push(&mut self, lat: f64, lon: f64, time: f64, valid: bool, values: &[f32]) -> Result<()> {
        if values.len() != self.variable_count {
            return Err(BinningError::VariableCountMismatch {
                expected: self.variable_count,
                actual: values.len(),
            });
        }
        self.lats.push(lat);
        self.lons.push(lon);
        self.times.push(time);
        self.valid.push(valid);
        self.values.extend_from_slice(values);
        Ok(())
    }

    pub fn push_observation(&mut self, observation: &Observation<'_>) -> Result<()> {
        self.push(
            observation.lat,
            observation.lon,
            observation.time,
            observation.valid,
            observation.values,
        )
    }

    pub fn get(&self, i: usize) -> Option<Observation<'_>> {
        let start = i.checked_mul(self.variable_count)?;
        Some(Observation {
            lat: *self.lats.get(i)?,
            lon: self.lons[i],
            time: self.times[i],
            valid: self.valid[i],
            values: &self.values[start..start + self.variable_count],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Observation<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Reject the slice if any observation has a non-finite position.
    pub fn validate_coordinates(&self) -> Result<()> {
        match self
            .lats
            .iter()
            .zip(&self.lons)
            .find(|(lat, lon)| !lat.is_finite() || !lon.is_finite())
        {
            Some((&lat, &lon)) => Err(BinningError::InvalidCoordinate { lat, lon }),
            None => Ok(()),
        }
    }

    /// Expand a tile of pixels into observations, `super_sampling²` per
    /// pixel. Sub-pixels the geocoding cannot place are dropped.
    pub fn from_tile(tile: &PixelTile, geocoding: &dyn GeoCoding, super_sampling: usize) -> Result<Self> {
        if super_sampling == 0 {
            return Err(BinningError::config("super_sampling must be > 0"));
        }
        let capacity = super_sampling
            .checked_mul(super_sampling)
            .and_then(|n| n.checked_mul(tile.pixel_count()))
            .ok_or_else(|| BinningError::config("super-sampled tile size overflows"))?;
        let n = super_sampling as f64;
        let offsets: Vec<f64> = (0..super_sampling).map(|i| (i as f64 + 0.5) / n).collect();

        let mut slice = Self::with_capacity(tile.variable_count, capacity);
        for y in 0..tile.height {
            for x in 0..tile.width {
                let values = tile.pixel_values(x, y);
                let valid = tile.is_valid(x, y);
                for dy in &offsets {
                    for dx in &offsets {
                        if let Some((lat, lon)) = geocoding.geo_pos(x as f64 + dx, y as f64 + dy) {
                            slice.push(lat, lon, tile.time, valid, values)?;
                        }
                    }
                }
            }
        }
        Ok(slice)
    }
}

/// Decoded pixels of one product region with their mask flags.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTile {
    width: usize,
    height: usize,
    variable_count: usize,
    values: Vec<f32>,
    mask: Vec<bool>,
    time: f64,
}

impl PixelTile {
    /// `values` holds `variable_count` values per pixel in row-major pixel
    /// order; `mask` holds one flag per pixel.
    pub fn new(
        width: usize,
        height: usize,
        variable_count: usize,
        values: Vec<f32>,
        mask: Vec<bool>,
        time: f64,
    ) -> Result<Self> {
        let pixels = width
            .checked_mul(height)
            .ok_or_else(|| BinningError::config(format!("tile size {}x{} overflows", width, height)))?;
        let expected_values = pixels.checked_mul(variable_count).ok_or_else(|| {
            BinningError::config(format!(
                "tile of {} pixels with {} variables overflows",
                pixels, variable_count
            ))
        })?;
        if mask.len() != pixels {
            return Err(BinningError::config(format!(
                "mask has {} flags for {}x{} pixels",
                mask.len(),
                width,
                height
            )));
        }
        if values.len() != expected_values {
            return Err(BinningError::VariableCountMismatch {
                expected: expected_values,
                actual: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            variable_count,
            values,
            mask,
            time,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    pub fn pixel_count(&self) -> usize {
        self.mask.len()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn pixel_values(&self, x: usize, y: usize) -> &[f32] {
        let start = (y * self.width + x) * self.variable_count;
        &self.values[start..start + self.variable_count]
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.mask[y * self.width + x]
    }
}

/// Maps continuous pixel coordinates to geographic positions.
pub trait GeoCoding: Send + Sync {
    /// `(lat, lon)` of pixel position `(x, y)`, where `(0, 0)` is the
    /// upper-left corner of the first pixel. `None` if the position has
    /// no geolocation.
    fn geo_pos(&self, x: f64, y: f64) -> Option<(f64, f64)>;
}

/// Regular lat/lon geocoding: longitude grows with `x`, latitude falls
/// with `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineGeoCoding {
    pub west: f64,
    pub north: f64,
    pub lon_step: f64,
    pub lat_step: f64,
}

impl AffineGeoCoding {
    pub fn new(west: f64, north: f64, lon_step: f64, lat_step: f64) -> Self {
        Self {
            west,
            north,
            lon_step,
            lat_step,
        }
    }

    /// Geocoding that spreads `width × height` pixels over `bbox`.
    pub fn from_bbox(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self::new(
            bbox.min_lon,
            bbox.max_lat,
            bbox.width() / width.max(1) as f64,
            bbox.height() / height.max(1) as f64,
        )
    }
}

impl GeoCoding for AffineGeoCoding {
    fn geo_pos(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let lat = self.north - y * self.lat_step;
        let lon = self.west + x * self.lon_step;
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return None;
        }
        Some((lat, lon))
    }
}
