//! Geographic region selection.

use serde::{Deserialize, Serialize};

use crate::error::{BinningError, Result};

/// Lon/lat box in WGS84 degrees. The default covers the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Longitude extent in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Latitude extent in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Edges are inclusive, so an observation on a shared border is
    /// accepted by both neighbours.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.min_lon..=self.max_lon).contains(&lon) && (self.min_lat..=self.max_lat).contains(&lat)
    }

    fn is_on_globe(&self) -> bool {
        let lon = -180.0..=180.0;
        let lat = -90.0..=90.0;
        lon.contains(&self.min_lon)
            && lon.contains(&self.max_lon)
            && lat.contains(&self.min_lat)
            && lat.contains(&self.max_lat)
    }

    /// Reject boxes that are inverted, non-finite or outside the globe.
    pub fn validate(&self) -> Result<()> {
        let values = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(BinningError::config(format!(
                "region {:?} contains non-finite coordinates",
                self
            )));
        }
        if self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(BinningError::config(format!(
                "region {:?} is empty or inverted",
                self
            )));
        }
        if !self.is_on_globe() {
            return Err(BinningError::config(format!(
                "region {:?} exceeds [-180, 180] x [-90, 90]",
                self
            )));
        }
        Ok(())
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_contains() {
        let bbox = BoundingBox::new(-100.0, 30.0, -90.0, 40.0);
        assert!(bbox.contains(-95.0, 35.0));
        assert!(!bbox.contains(-105.0, 35.0));
        assert!(!bbox.contains(-95.0, 45.0));
        // edges are inclusive
        assert!(bbox.contains(-90.0, 40.0));
    }

    #[test]
    fn test_bbox_dimensions() {
        let bbox = BoundingBox::new(-100.0, 30.0, -90.0, 40.0);
        assert!((bbox.width() - 10.0).abs() < f64::EPSILON);
        assert!((bbox.height() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bbox_validate() {
        assert!(BoundingBox::default().validate().is_ok());
        assert!(BoundingBox::new(10.0, 0.0, 5.0, 10.0).validate().is_err());
        assert!(BoundingBox::new(0.0, 0.0, 10.0, 0.0).validate().is_err());
        assert!(BoundingBox::new(-190.0, 0.0, 10.0, 10.0).validate().is_err());
        assert!(BoundingBox::new(0.0, f64::NAN, 10.0, 10.0).validate().is_err());
    }
}
