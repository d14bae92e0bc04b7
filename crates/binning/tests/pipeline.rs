//! End-to-end tests of the binning pipeline on synthetic products.
//!
//! Products come from the deterministic generators in `test-utils`, so
//! expected bin contents follow from the generator inputs.

use binning::codec::{self, IndexMode};
use binning::{
    default_raster_width, BinningConfig, BinningGrid, BinningJob, BoundingBox, CollectingConsumer,
    FeatureRaster, ObservationSlice, ProductInput, SpatialBin, SpatialBinner, TemporalBinner,
};
use std::collections::BTreeMap;
use test_utils::{
    assert_approx_eq, chlorophyll_value, configs, create_geocoding, create_global_products,
    create_global_slice, create_swath_product, create_test_tile, TEST_TIME,
};

fn job(yaml: &str) -> BinningJob {
    let config = BinningConfig::from_yaml_str(yaml).expect("fixture parses");
    BinningJob::from_config(&config).expect("fixture is valid")
}

fn chl_and_sst(lat: f64, lon: f64, variable: usize) -> f32 {
    match variable {
        0 => chlorophyll_value(lat, lon, 0),
        _ => (28.0 - 0.3 * lat.abs()) as f32,
    }
}

// =============================================================================
// Minimal grid
// =============================================================================

#[test]
fn test_every_bin_receives_all_products() {
    let job = job(configs::MINIMAL);
    let products = create_global_products(3, 10.0, 1, |_, _, _| 1.0);
    let output = job.run(products).unwrap();

    assert_eq!(output.report.products_processed, 3);
    assert!(output.report.failed_products.is_empty());
    assert_eq!(output.report.observations, 3 * 18 * 36);
    assert_eq!(output.report.temporal_bins, 46);

    for bin in output.temporal_bins() {
        assert!(bin.is_completed());
        // product p adds 1 + p to every observation
        assert_approx_eq!(bin.output()[0], 2.0, 1e-5);
        assert_approx_eq!(bin.output()[1], (2.0f64 / 3.0).sqrt(), 1e-5);
    }
}

#[test]
fn test_reprojection_covers_global_raster() {
    let job = job(configs::MINIMAL);
    let output = job
        .run(create_global_products(2, 10.0, 1, |_, _, _| 5.0))
        .unwrap();

    let grid = output.context().grid();
    let width = default_raster_width(grid);
    let height = grid.num_rows();
    let names = output.context().manager().output_feature_names().to_vec();
    let raster = output
        .reproject(FeatureRaster::new(names, width, height), width, None)
        .unwrap();

    assert_eq!((raster.width(), raster.height()), (12, 6));
    assert_eq!(raster.covered_count(), 12 * 6);
    let mean = raster.band("chl_mean").unwrap();
    assert!(mean.iter().all(|&v| (v - 5.5).abs() < 1e-5));

    let stats = raster.band_stats();
    assert_eq!(stats[0].name, "chl_mean");
    assert_eq!(stats[0].valid, 72);
}

#[test]
fn test_tile_with_super_sampling() {
    let mut config = BinningConfig::from_yaml_str(configs::MINIMAL).unwrap();
    config.super_sampling = 2;
    let job = BinningJob::from_config(&config).unwrap();

    let tile = create_test_tile(4, 2);
    let bbox = BoundingBox::new(0.0, 0.0, 4.0, 2.0);
    let geocoding = create_geocoding(&bbox, tile.width(), tile.height());
    let slice =
        ObservationSlice::from_tile(&tile, &geocoding, job.context().super_sampling()).unwrap();
    assert_eq!(slice.len(), 4 * 2 * 4);

    let output = job.run(vec![ProductInput::new("tile", vec![slice])]).unwrap();
    let bins: Vec<_> = output.temporal_bins().collect();
    assert_eq!(bins.len(), 1);
    // 0-30 N, 0-30 E on the six-row grid
    assert_eq!(bins[0].index(), 17);
    assert_eq!(bins[0].num_obs(), 32);
    assert_approx_eq!(bins[0].output()[0], 1500.5, 1e-3);
}

// =============================================================================
// All aggregators
// =============================================================================

#[test]
fn test_all_aggregators_global_run() {
    let job = job(configs::ALL_AGGREGATORS);
    assert_eq!(job.num_partitions(), 3);

    let output = job
        .run(create_global_products(2, 1.0, 2, chl_and_sst))
        .unwrap();
    let manager = output.context().manager();
    assert_eq!(manager.output_feature_count(), 9);
    assert_eq!(
        output.report.temporal_bins as i64,
        output.context().grid().num_bins()
    );

    for bin in output.temporal_bins() {
        let out = bin.output();
        assert_eq!(out.len(), 9);
        assert!(out[0] > 0.0 && out[0].is_finite(), "chl_mean {:?}", out);
        assert!(out[4] <= out[5], "sst min/max {:?}", out);
        assert!(out[4] <= out[6] && out[6] <= out[5], "sst mean {:?}", out);
        // two product means m and m + 1, so p90 = m + 0.9
        assert!(out[8].is_finite() && out[8] > 0.9, "chl_p90 {:?}", out);
    }
}

#[test]
fn test_partitions_cover_rows_in_order() {
    let job = job(configs::ALL_AGGREGATORS);
    let output = job
        .run(create_global_products(1, 1.0, 2, chl_and_sst))
        .unwrap();
    let grid = output.context().grid();

    assert_eq!(output.partitions.len(), 3);
    let mut next_row = 0;
    let mut previous = -1;
    for partition in &output.partitions {
        assert_eq!(partition.rows.start, next_row);
        next_row = partition.rows.end;
        for bin in &partition.bins {
            assert!(bin.index() > previous);
            previous = bin.index();
            let row = grid.row_index(bin.index()).unwrap();
            assert!(partition.rows.contains(&row));
        }
    }
    assert_eq!(next_row, grid.num_rows());
}

#[test]
fn test_swath_slices_match_single_slice() {
    let job = job(configs::MINIMAL);
    let single = job
        .run(vec![ProductInput::new(
            "single",
            vec![create_global_slice(5.0, 1, |lat, lon, v| {
                chlorophyll_value(lat, lon, v)
            })],
        )])
        .unwrap();
    let swath = job
        .run(vec![create_swath_product("swath", 3, 5.0, 1, chlorophyll_value)])
        .unwrap();

    let single: Vec<_> = single.temporal_bins().cloned().collect();
    let swath: Vec<_> = swath.temporal_bins().cloned().collect();
    assert_eq!(single.len(), swath.len());
    for (a, b) in single.iter().zip(&swath) {
        assert_eq!(a.index(), b.index());
        assert_eq!(a.num_obs(), b.num_obs());
        assert_eq!(a.output(), b.output());
    }
}

// =============================================================================
// Regional and time-limited runs
// =============================================================================

#[test]
fn test_region_filters_observations() {
    let job = job(configs::REGIONAL);
    let output = job
        .run(create_global_products(1, 1.0, 1, |lat, _, _| lat as f32))
        .unwrap();

    assert_eq!(output.report.observations, 40 * 50);
    assert_eq!(output.report.skipped_observations, 180 * 360 - 40 * 50);

    let grid = output.context().grid();
    for bin in output.temporal_bins() {
        let row = grid.row_index(bin.index()).unwrap();
        assert!((30..=69).contains(&row), "row {} outside region", row);
        assert!(bin.output()[0] >= 20.0 && bin.output()[1] <= 60.0);
    }

    let width = default_raster_width(grid);
    let names = output.context().manager().output_feature_names().to_vec();
    let raster = output
        .reproject(FeatureRaster::new(names, width, grid.num_rows()), width, None)
        .unwrap();
    assert!(raster.covered_count() > 0);
    for y in 0..raster.height() {
        for x in 0..raster.width() {
            if raster.is_covered(x, y) {
                assert!((30..=69).contains(&y));
            }
        }
    }
}

#[test]
fn test_time_range_filters_observations() {
    let job = job(configs::REGIONAL);
    let mut slice = ObservationSlice::new(1);
    slice.push(40.5, -30.5, TEST_TIME, true, &[10.0]).unwrap();
    slice.push(40.5, -30.5, TEST_TIME + 40.0, true, &[99.0]).unwrap();
    slice.push(40.5, -30.5, f64::NAN, true, &[99.0]).unwrap();

    let output = job.run(vec![ProductInput::new("p", vec![slice])]).unwrap();
    assert_eq!(output.report.observations, 1);
    assert_eq!(output.report.skipped_observations, 2);
    let bin = output.temporal_bins().next().unwrap();
    assert_eq!(bin.output(), &[10.0, 10.0]);
}

// =============================================================================
// Shuffle
// =============================================================================

#[test]
fn test_codec_across_shuffle_matches_direct_merge() {
    let config = BinningConfig::from_yaml_str(configs::MINIMAL).unwrap();
    let context = config.create_context().unwrap();
    let feature_count = context.manager().spatial_feature_count();

    // spatial bins of each product, keyed by index
    let mut direct: BTreeMap<i64, Vec<SpatialBin>> = BTreeMap::new();
    let mut shuffled: BTreeMap<i64, Vec<u8>> = BTreeMap::new();
    for product in create_global_products(3, 10.0, 1, chlorophyll_value) {
        let mut binner = SpatialBinner::new(context.clone(), CollectingConsumer::default());
        for slice in &product.slices {
            binner.process_slice(slice);
        }
        binner.complete();
        assert!(binner.errors().is_empty());

        for bin in binner.into_consumer().bins {
            let record = codec::encode_to_bytes(&bin, IndexMode::Inline);
            assert_eq!(record.len(), codec::encoded_len(feature_count));
            shuffled.entry(bin.index()).or_default().extend_from_slice(&record);
            direct.entry(bin.index()).or_default().push(bin);
        }
    }

    let temporal = TemporalBinner::new(context.clone());
    for (index, spatial) in &direct {
        let decoded = codec::decode_spatial_bins(&shuffled[index][..], feature_count).unwrap();
        assert_eq!(&decoded, spatial);

        let a = temporal.process_spatial_bins(*index, spatial).unwrap();
        let b = temporal.process_spatial_bins(*index, &decoded).unwrap();
        assert_eq!(a.output(), b.output());
        assert_eq!(a.num_obs(), b.num_obs());
    }
}
