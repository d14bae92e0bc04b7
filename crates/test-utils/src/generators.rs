//! Synthetic observation generators.
//!
//! Every generator is deterministic, so expected bin contents can be
//! derived from the inputs without a reference implementation.

use binning::{AffineGeoCoding, BoundingBox, ObservationSlice, PixelTile, ProductInput};

/// MJD2000 day used for generated observations (2024-01-01).
pub const TEST_TIME: f64 = 8766.0;

/// Creates a tile whose value at `(col, row)` is `col * 1000 + row`.
///
/// Every pixel is valid and carries a single variable.
///
/// # Example
///
/// ```
/// use test_utils::create_test_tile;
///
/// let tile = create_test_tile(10, 5);
/// assert_eq!(tile.pixel_values(0, 0), &[0.0]);
/// assert_eq!(tile.pixel_values(1, 0), &[1000.0]);
/// assert_eq!(tile.pixel_values(0, 1), &[1.0]);
/// ```
pub fn create_test_tile(width: usize, height: usize) -> PixelTile {
    let mut values = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            values.push((col * 1000 + row) as f32);
        }
    }
    PixelTile::new(width, height, 1, values, vec![true; width * height], TEST_TIME)
        .expect("tile dimensions are consistent")
}

/// Geocoding that spreads a `width × height` tile over `bbox`.
pub fn create_geocoding(bbox: &BoundingBox, width: usize, height: usize) -> AffineGeoCoding {
    AffineGeoCoding::from_bbox(bbox, width, height)
}

/// Creates a slice with one observation at the centre of every
/// `step`-degree cell of the globe.
///
/// `value(lat, lon, variable)` supplies the measurements.
///
/// # Example
///
/// ```
/// use test_utils::create_global_slice;
///
/// let slice = create_global_slice(30.0, 2, |lat, _, v| lat as f32 + v as f32);
/// assert_eq!(slice.len(), 6 * 12);
/// assert_eq!(slice.variable_count(), 2);
/// ```
pub fn create_global_slice<F>(step: f64, variable_count: usize, value: F) -> ObservationSlice
where
    F: Fn(f64, f64, usize) -> f32,
{
    create_band_slice(-90.0, 90.0, step, variable_count, value)
}

/// Like [`create_global_slice`], restricted to latitudes in
/// `[min_lat, max_lat)`. Observations run from north to south.
pub fn create_band_slice<F>(
    min_lat: f64,
    max_lat: f64,
    step: f64,
    variable_count: usize,
    value: F,
) -> ObservationSlice
where
    F: Fn(f64, f64, usize) -> f32,
{
    let rows = ((max_lat - min_lat) / step).round() as usize;
    let cols = (360.0 / step).round() as usize;
    let mut slice = ObservationSlice::with_capacity(variable_count, rows * cols);
    let mut values = vec![0.0f32; variable_count];

    for r in 0..rows {
        let lat = max_lat - (r as f64 + 0.5) * step;
        for c in 0..cols {
            let lon = -180.0 + (c as f64 + 0.5) * step;
            for (v, slot) in values.iter_mut().enumerate() {
                *slot = value(lat, lon, v);
            }
            slice
                .push(lat, lon, TEST_TIME, true, &values)
                .expect("generated values match variable count");
        }
    }
    slice
}

/// Chlorophyll-like positive values with a latitude gradient, highest at
/// the equator. Suitable for log-normal aggregation.
pub fn chlorophyll_value(lat: f64, lon: f64, variable: usize) -> f32 {
    let base = 0.05 + 2.0 * (lat.to_radians().cos()).powi(2);
    let ripple = 1.0 + 0.1 * (lon.to_radians() * 3.0).sin();
    (base * ripple * (variable as f64 + 1.0)) as f32
}

/// Creates `count` global products whose values differ by product index,
/// so that temporal aggregation has a known spread.
///
/// Product `p` carries `value(lat, lon, variable) + p` for every variable.
pub fn create_global_products<F>(
    count: usize,
    step: f64,
    variable_count: usize,
    value: F,
) -> Vec<ProductInput>
where
    F: Fn(f64, f64, usize) -> f32,
{
    (0..count)
        .map(|p| {
            let slice = create_global_slice(step, variable_count, |lat, lon, v| {
                value(lat, lon, v) + p as f32
            });
            ProductInput::new(format!("product-{}", p), vec![slice])
        })
        .collect()
}

/// Creates one product split into `slices` latitude bands from north to
/// south, the order a swath reader delivers them in.
pub fn create_swath_product<F>(
    name: &str,
    slices: usize,
    step: f64,
    variable_count: usize,
    value: F,
) -> ProductInput
where
    F: Fn(f64, f64, usize) -> f32 + Copy,
{
    let band = 180.0 / slices as f64;
    let bands = (0..slices)
        .map(|i| {
            let max_lat = 90.0 - i as f64 * band;
            create_band_slice(max_lat - band, max_lat, step, variable_count, value)
        })
        .collect();
    ProductInput::new(name, bands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_tile() {
        let tile = create_test_tile(4, 3);
        assert_eq!(tile.width(), 4);
        assert_eq!(tile.height(), 3);
        assert_eq!(tile.pixel_values(3, 2), &[3002.0]);
        assert!(tile.is_valid(3, 2));
    }

    #[test]
    fn test_global_slice_covers_globe() {
        let slice = create_global_slice(10.0, 1, |_, _, _| 1.0);
        assert_eq!(slice.len(), 18 * 36);
        slice.validate_coordinates().unwrap();

        let first = slice.get(0).unwrap();
        assert_eq!((first.lat, first.lon), (85.0, -175.0));
        let last = slice.get(slice.len() - 1).unwrap();
        assert_eq!((last.lat, last.lon), (-85.0, 175.0));
    }

    #[test]
    fn test_band_slice_values() {
        let slice = create_band_slice(0.0, 10.0, 5.0, 2, |lat, _, v| lat as f32 * 10.0 + v as f32);
        assert_eq!(slice.len(), 2 * 72);
        let first = slice.get(0).unwrap();
        assert_eq!(first.values, &[75.0, 76.0]);
    }

    #[test]
    fn test_chlorophyll_positive() {
        for lat in [-89.5, -45.0, 0.0, 45.0, 89.5] {
            for lon in [-179.5, 0.0, 90.0] {
                assert!(chlorophyll_value(lat, lon, 0) > 0.0);
            }
        }
        assert!(chlorophyll_value(0.0, 0.0, 0) > chlorophyll_value(60.0, 0.0, 0));
    }

    #[test]
    fn test_global_products_offsets() {
        let products = create_global_products(3, 30.0, 1, |_, _, _| 1.0);
        assert_eq!(products.len(), 3);
        assert_eq!(products[2].name, "product-2");
        let obs = products[2].slices[0].get(0).unwrap();
        assert_eq!(obs.values, &[3.0]);
    }

    #[test]
    fn test_swath_product_bands() {
        let product = create_swath_product("swath", 3, 10.0, 1, |_, _, _| 1.0);
        assert_eq!(product.slices.len(), 3);
        assert!(product.slices.iter().all(|s| s.len() == 6 * 36));
        let north = product.slices[0].get(0).unwrap();
        let south = product.slices[2].get(0).unwrap();
        assert!(north.lat > south.lat);
    }
}
