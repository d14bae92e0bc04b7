//! Reprojection of the temporal bin stream onto a dense raster.
//!
//! Raster rows correspond 1:1 to grid rows. Within a row, target column
//! `x` reads source column
//!
//! ```text
//! col = floor((x + 0.5) * num_cols(row) / width)
//! ```
//!
//! so equatorial rows with `num_cols == width` map one to one, and polar
//! rows repeat each bin across `width / num_cols` pixels:
//!
//! ```text
//! bins   |    0    |    1    |    2    |        row 0, 3 cols
//! raster |0|0|0|0|1|1|1|1|2|2|2|2|               width 12
//! ```
//!
//! Bins must arrive in strictly increasing index order. Rows without any
//! bin are written as missing, either when a later row arrives or in
//! [`TemporalBinReprojector::end`].

use crate::bin::TemporalBin;
use crate::error::{BinningError, Result};
use crate::grid::BinningGrid;
use crate::types::BoundingBox;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Receives reprojected pixels in row-major order.
pub trait TemporalBinProcessor {
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Pixel `(x, y)` is covered by `bin`; `output` holds its output features.
    fn process_bin(&mut self, x: usize, y: usize, bin: &TemporalBin, output: &[f32]) -> Result<()>;

    /// Pixel `(x, y)` has no data.
    fn process_missing_bin(&mut self, x: usize, y: usize) -> Result<()>;

    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sub-rectangle of the global raster that is actually written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRegion {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering a whole `width × height` raster.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Smallest region of a global `raster_width × raster_height` raster
    /// containing `bbox`.
    pub fn from_bbox(bbox: &BoundingBox, raster_width: usize, raster_height: usize) -> Result<Self> {
        bbox.validate()?;
        let x_of = |lon: f64| (lon + 180.0) / 360.0 * raster_width as f64;
        let y_of = |lat: f64| (90.0 - lat) / 180.0 * raster_height as f64;

        let x0 = (x_of(bbox.min_lon).floor() as usize).min(raster_width);
        let x1 = (x_of(bbox.max_lon).ceil() as usize).min(raster_width);
        let y0 = (y_of(bbox.max_lat).floor() as usize).min(raster_height);
        let y1 = (y_of(bbox.min_lat).ceil() as usize).min(raster_height);
        Ok(Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)))
    }

    pub fn contains_row(&self, y: usize) -> bool {
        y >= self.y && y < self.y + self.height
    }

    fn columns(&self) -> std::ops::Range<usize> {
        self.x..self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Started,
    Ended,
}

impl State {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "not started",
            Self::Started => "started",
            Self::Ended => "ended",
        }
    }
}

/// Writes an index-ordered temporal bin stream as a dense raster.
///
/// Use in the order `begin`, any number of `process_bins`, `end`.
pub struct TemporalBinReprojector<P> {
    grid: Arc<dyn BinningGrid>,
    processor: P,
    width: usize,
    region: PixelRegion,
    state: State,
    next_row: usize,
    last_index: Option<i64>,
    pending_row: Option<usize>,
    pending: Vec<TemporalBin>,
}

/// Default raster width: two pixels per grid row.
pub fn default_raster_width(grid: &dyn BinningGrid) -> usize {
    2 * grid.num_rows()
}

impl<P: TemporalBinProcessor> TemporalBinReprojector<P> {
    /// Create a reprojector for a `width × num_rows` raster, optionally
    /// restricted to `region`.
    pub fn new(
        grid: Arc<dyn BinningGrid>,
        processor: P,
        width: usize,
        region: Option<PixelRegion>,
    ) -> Result<Self> {
        if width == 0 {
            return Err(BinningError::config("raster width must be > 0"));
        }
        let height = grid.num_rows();
        let region = region.unwrap_or_else(|| PixelRegion::full(width, height));
        if region.x + region.width > width || region.y + region.height > height {
            return Err(BinningError::config(format!(
                "pixel region {:?} exceeds {}x{} raster",
                region, width, height
            )));
        }
        Ok(Self {
            grid,
            processor,
            width,
            region,
            state: State::Created,
            next_row: 0,
            last_index: None,
            pending_row: None,
            pending: Vec::new(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.grid.num_rows()
    }

    pub fn region(&self) -> PixelRegion {
        self.region
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn into_processor(self) -> P {
        self.processor
    }

    pub fn begin(&mut self) -> Result<()> {
        self.expect_state(State::Created, "begin")?;
        self.processor.begin()?;
        self.state = State::Started;
        Ok(())
    }

    /// Consume completed temporal bins in strictly increasing index order.
    pub fn process_bins<I>(&mut self, bins: I) -> Result<()>
    where
        I: IntoIterator<Item = TemporalBin>,
    {
        self.expect_state(State::Started, "process bins")?;
        for bin in bins {
            let index = bin.index();
            if !bin.is_completed() {
                return Err(BinningError::BinNotCompleted {
                    kind: "temporal",
                    index,
                });
            }
            if let Some(previous) = self.last_index {
                if index <= previous {
                    return Err(BinningError::BinOutOfOrder { index, previous });
                }
            }
            let row = self.grid.row_index(index)?;
            if row < self.next_row {
                return Err(BinningError::RowOutOfOrder {
                    row,
                    last_row: self.next_row - 1,
                });
            }
            self.last_index = Some(index);

            if self.pending_row != Some(row) {
                self.flush_pending()?;
                self.pending_row = Some(row);
            }
            self.pending.push(bin);
        }
        Ok(())
    }

    /// Write the last collected row and mark every unvisited row missing.
    pub fn end(&mut self) -> Result<()> {
        self.expect_state(State::Started, "end")?;
        self.flush_pending()?;
        let height = self.height();
        self.write_missing_rows(height)?;
        self.processor.end()?;
        self.state = State::Ended;
        Ok(())
    }

    fn expect_state(&self, expected: State, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(BinningError::InvalidState {
                operation,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        let Some(row) = self.pending_row.take() else {
            return Ok(());
        };
        let bins = std::mem::take(&mut self.pending);
        self.write_missing_rows(row)?;
        process_row_with_bins(
            self.grid.as_ref(),
            &self.region,
            row,
            &bins,
            &mut self.processor,
            self.width,
        )?;
        self.next_row = row + 1;
        Ok(())
    }

    /// Write rows `next_row..until` as missing.
    fn write_missing_rows(&mut self, until: usize) -> Result<()> {
        if self.next_row >= until {
            return Ok(());
        }
        debug!(from = self.next_row, to = until - 1, "Writing rows without bins");
        for row in self.next_row..until {
            if !self.region.contains_row(row) {
                continue;
            }
            for x in self.region.columns() {
                self.processor
                    .process_missing_bin(x - self.region.x, row - self.region.y)?;
            }
        }
        self.next_row = until;
        Ok(())
    }
}

/// Write one grid row that has at least one bin.
///
/// `bins` must all belong to `row`, in increasing index order.
pub fn process_row_with_bins<P: TemporalBinProcessor + ?Sized>(
    grid: &dyn BinningGrid,
    region: &PixelRegion,
    row: usize,
    bins: &[TemporalBin],
    processor: &mut P,
    width: usize,
) -> Result<()> {
    if bins.is_empty() {
        return Err(BinningError::EmptyRow(row));
    }
    let num_cols = grid.num_cols(row)?;
    let mut by_col: Vec<Option<&TemporalBin>> = vec![None; num_cols];
    let mut previous: Option<i64> = None;
    for bin in bins {
        if let Some(previous) = previous {
            if bin.index() <= previous {
                return Err(BinningError::BinOutOfOrder {
                    index: bin.index(),
                    previous,
                });
            }
        }
        previous = Some(bin.index());
        by_col[grid.col_index(bin.index(), row)?] = Some(bin);
    }

    if !region.contains_row(row) {
        return Ok(());
    }
    let y = row - region.y;
    for x in region.columns() {
        let col = (((x as f64 + 0.5) * num_cols as f64 / width as f64) as usize).min(num_cols - 1);
        match by_col[col] {
            Some(bin) => processor.process_bin(x - region.x, y, bin, bin.output())?,
            None => processor.process_missing_bin(x - region.x, y)?,
        }
    }
    Ok(())
}

/// Dense raster with one band per output feature and an observation
/// count band. Missing pixels hold NaN and a count of zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRaster {
    width: usize,
    height: usize,
    feature_names: Vec<String>,
    bands: Vec<Vec<f32>>,
    num_obs: Vec<u32>,
    covered: Vec<bool>,
}

/// Summary of one raster band over its covered pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandStats {
    pub name: String,
    pub covered: usize,
    pub valid: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
}

impl FeatureRaster {
    pub fn new(feature_names: Vec<String>, width: usize, height: usize) -> Self {
        let pixels = width * height;
        let bands = feature_names.iter().map(|_| vec![f32::NAN; pixels]).collect();
        Self {
            width,
            height,
            feature_names,
            bands,
            num_obs: vec![0; pixels],
            covered: vec![false; pixels],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn band(&self, name: &str) -> Option<&[f32]> {
        let i = self.feature_names.iter().position(|n| n == name)?;
        Some(&self.bands[i])
    }

    pub fn num_obs(&self) -> &[u32] {
        &self.num_obs
    }

    pub fn is_covered(&self, x: usize, y: usize) -> bool {
        self.covered[y * self.width + x]
    }

    pub fn covered_count(&self) -> usize {
        self.covered.iter().filter(|&&c| c).count()
    }

    pub fn band_stats(&self) -> Vec<BandStats> {
        self.feature_names
            .iter()
            .zip(&self.bands)
            .map(|(name, band)| {
                let values: Vec<f32> = band
                    .iter()
                    .zip(&self.covered)
                    .filter(|(v, c)| **c && v.is_finite())
                    .map(|(&v, _)| v)
                    .collect();
                let sum: f64 = values.iter().map(|&v| v as f64).sum();
                BandStats {
                    name: name.clone(),
                    covered: self.covered_count(),
                    valid: values.len(),
                    min: values.iter().copied().reduce(f32::min),
                    max: values.iter().copied().reduce(f32::max),
                    mean: (!values.is_empty()).then(|| sum / values.len() as f64),
                }
            })
            .collect()
    }

    fn offset(&self, x: usize, y: usize) -> Result<usize> {
        if x >= self.width || y >= self.height {
            return Err(BinningError::output(format!(
                "pixel ({}, {}) outside {}x{} raster",
                x, y, self.width, self.height
            )));
        }
        Ok(y * self.width + x)
    }
}

impl TemporalBinProcessor for FeatureRaster {
    fn process_bin(&mut self, x: usize, y: usize, bin: &TemporalBin, output: &[f32]) -> Result<()> {
        let offset = self.offset(x, y)?;
        if output.len() != self.bands.len() {
            return Err(BinningError::output(format!(
                "bin {} has {} output features, raster has {} bands",
                bin.index(),
                output.len(),
                self.bands.len()
            )));
        }
        for (band, &value) in self.bands.iter_mut().zip(output) {
            band[offset] = value;
        }
        self.num_obs[offset] = bin.num_obs();
        self.covered[offset] = true;
        Ok(())
    }

    fn process_missing_bin(&mut self, x: usize, y: usize) -> Result<()> {
        let offset = self.offset(x, y)?;
        for band in &mut self.bands {
            band[offset] = f32::NAN;
        }
        self.num_obs[offset] = 0;
        self.covered[offset] = false;
        Ok(())
    }
}
