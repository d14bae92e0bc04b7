//! Equal-area global binning grids.
//!
//! Bins are numbered row-major starting at the northernmost row. Each row
//! holds a number of columns proportional to the cosine of its centre
//! latitude, so every bin covers roughly the same surface area.
//!
//! ```text
//!  row 0   |  0 |  1 |  2 |                      (3 cols, near pole)
//!  row 1   | 3 | 4 | 5 | 6 | 7 | 8 | 9 | 10 |    (8 cols)
//!  row 2   |11|12|13|14|15|16|17|18|19|20|21|22| (12 cols, near equator)
//!  ...
//! ```

use std::fmt::Debug;

use crate::error::{BinningError, Result};

/// Number of rows of the standard 9.28 km grid.
pub const DEFAULT_NUM_ROWS: usize = 2160;

/// Spatial index mapping geographic positions to bin indices and back.
pub trait BinningGrid: Send + Sync + Debug {
    /// Number of latitude rows.
    fn num_rows(&self) -> usize;

    /// Total number of bins over all rows.
    fn num_bins(&self) -> i64;

    /// Number of columns in `row`.
    fn num_cols(&self, row: usize) -> Result<usize>;

    /// Index of the first (westernmost) bin in `row`.
    fn first_bin_index(&self, row: usize) -> Result<i64>;

    /// Centre latitude of `row` in degrees.
    fn center_lat(&self, row: usize) -> Result<f64>;

    /// Row containing latitude `lat`. Latitudes beyond the poles map to
    /// the polar rows.
    fn row_for_lat(&self, lat: f64) -> usize;

    /// Bin containing the position (`lat`, `lon`).
    fn bin_index(&self, lat: f64, lon: f64) -> Result<i64>;

    /// Row containing bin `bin_index`.
    fn row_index(&self, bin_index: i64) -> Result<usize>;

    /// Column of `bin_index` within `row`.
    fn col_index(&self, bin_index: i64, row: usize) -> Result<usize> {
        let first = self.first_bin_index(row)?;
        let num_cols = self.num_cols(row)?;
        let col = bin_index - first;
        if col < 0 || col >= num_cols as i64 {
            return Err(BinningError::BinNotInRow {
                index: bin_index,
                row,
            });
        }
        Ok(col as usize)
    }

    /// Centre position of `bin_index` as (lat, lon).
    fn center_lat_lon(&self, bin_index: i64) -> Result<(f64, f64)> {
        let row = self.row_index(bin_index)?;
        let col = self.col_index(bin_index, row)?;
        let num_cols = self.num_cols(row)?;
        let lat = self.center_lat(row)?;
        let lon = -180.0 + (col as f64 + 0.5) * 360.0 / num_cols as f64;
        Ok((lat, lon))
    }
}

/// Integerized sinusoidal (ISIN) grid as used for ocean colour Level-3
/// products.
#[derive(Debug, Clone)]
pub struct IsinGrid {
    num_rows: usize,
    center_lats: Vec<f64>,
    first_bins: Vec<i64>,
    num_cols: Vec<usize>,
    num_bins: i64,
}

impl IsinGrid {
    /// Build a grid with `num_rows` latitude rows.
    pub fn new(num_rows: usize) -> Result<Self> {
        if num_rows == 0 {
            return Err(BinningError::config("num_rows must be > 0"));
        }

        let mut center_lats = Vec::with_capacity(num_rows);
        let mut first_bins = Vec::with_capacity(num_rows);
        let mut num_cols = Vec::with_capacity(num_rows);
        let mut next_bin = 0i64;

        for row in 0..num_rows {
            let lat = 90.0 - (row as f64 + 0.5) * 180.0 / num_rows as f64;
            let cols = (2.0 * num_rows as f64 * lat.to_radians().cos() + 0.5) as usize;
            let cols = cols.max(1);

            center_lats.push(lat);
            first_bins.push(next_bin);
            num_cols.push(cols);
            next_bin += cols as i64;
        }

        Ok(Self {
            num_rows,
            center_lats,
            first_bins,
            num_cols,
            num_bins: next_bin,
        })
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.num_rows {
            return Err(BinningError::RowOutOfRange {
                row,
                num_rows: self.num_rows,
            });
        }
        Ok(())
    }

    fn col_for_lon(&self, lon: f64, row: usize) -> usize {
        let cols = self.num_cols[row];
        if lon <= -180.0 {
            return 0;
        }
        if lon >= 180.0 {
            return cols - 1;
        }
        (((lon + 180.0) * (cols as f64 / 360.0)) as usize).min(cols - 1)
    }
}

impl BinningGrid for IsinGrid {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_bins(&self) -> i64 {
        self.num_bins
    }

    fn num_cols(&self, row: usize) -> Result<usize> {
        self.check_row(row)?;
        Ok(self.num_cols[row])
    }

    fn first_bin_index(&self, row: usize) -> Result<i64> {
        self.check_row(row)?;
        Ok(self.first_bins[row])
    }

    fn center_lat(&self, row: usize) -> Result<f64> {
        self.check_row(row)?;
        Ok(self.center_lats[row])
    }

    fn row_for_lat(&self, lat: f64) -> usize {
        if lat <= -90.0 {
            return self.num_rows - 1;
        }
        if lat >= 90.0 {
            return 0;
        }
        let from_south = ((lat + 90.0) * (self.num_rows as f64 / 180.0)) as usize;
        (self.num_rows - 1) - from_south.min(self.num_rows - 1)
    }

    fn bin_index(&self, lat: f64, lon: f64) -> Result<i64> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(BinningError::InvalidCoordinate { lat, lon });
        }
        let row = self.row_for_lat(lat);
        Ok(self.first_bins[row] + self.col_for_lon(lon, row) as i64)
    }

    fn row_index(&self, bin_index: i64) -> Result<usize> {
        if bin_index < 0 || bin_index >= self.num_bins {
            return Err(BinningError::IndexOutOfRange {
                index: bin_index,
                num_bins: self.num_bins,
            });
        }
        // first_bins is strictly increasing and starts at 0
        Ok(self.first_bins.partition_point(|&first| first <= bin_index) - 1)
    }
}
