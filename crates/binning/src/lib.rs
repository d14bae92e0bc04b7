//! Level-3 spatial/temporal binning of geophysical observations.
//!
//! Pixel observations from many independently processed products are
//! condensed onto one global equal-area grid:
//!
//! ```text
//! ObservationSlice (one product)
//!      │
//!      ▼
//! SpatialBinner ─── BinningGrid::bin_index ──► BinManager::aggregate_spatial_bin
//!      │
//!      ├─► complete + encode (codec, index carried out-of-band)
//!      │
//!      ▼
//! shuffle: RowRangePartitioner + group by bin index
//!      │
//!      ▼
//! TemporalBinner::process_spatial_bins ──► TemporalBin (output features)
//!      │
//!      ▼
//! TemporalBinReprojector ──► TemporalBinProcessor (e.g. FeatureRaster)
//! ```
//!
//! The distributed runtime, product readers and output writers live
//! outside this crate. [`BinningJob`] runs the whole flow locally on a
//! rayon thread pool.
//!
//! # Example
//!
//! ```ignore
//! use binning::{BinningConfig, BinningJob, FeatureRaster, ProductInput};
//!
//! let config = BinningConfig::load("binning.yaml")?;
//! let job = BinningJob::from_config(&config)?;
//! let output = job.run(products)?;
//!
//! let names = output.context().manager().output_feature_names().to_vec();
//! let raster = output.reproject(FeatureRaster::new(names, 4320, 2160), 4320, None)?;
//! ```

pub mod aggregator;
pub mod bin;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod grid;
pub mod job;
pub mod manager;
pub mod observation;
pub mod partition;
pub mod reproject;
pub mod spatial;
pub mod temporal;
pub mod time;
pub mod types;
pub mod vector;

// Re-export commonly used types at crate root
pub use aggregator::{Aggregator, AggregatorDescriptor, AggregatorKind};
pub use bin::{BinRecord, BinState, SpatialBin, TemporalBin};
pub use codec::IndexMode;
pub use config::{AggregatorConfig, BinningConfig};
pub use context::{BinningContext, VariableContext};
pub use error::{BinningError, Result};
pub use grid::{BinningGrid, IsinGrid, DEFAULT_NUM_ROWS};
pub use job::{BinningJob, JobOutput, JobReport, PartitionOutput, ProductFailure, ProductInput};
pub use manager::BinManager;
pub use observation::{AffineGeoCoding, GeoCoding, Observation, ObservationSlice, PixelTile};
pub use partition::RowRangePartitioner;
pub use reproject::{
    default_raster_width, process_row_with_bins, BandStats, FeatureRaster, PixelRegion,
    TemporalBinProcessor, TemporalBinReprojector,
};
pub use spatial::{CollectingConsumer, SpatialBinConsumer, SpatialBinner, SpatialBinnerStats};
pub use temporal::TemporalBinner;
pub use time::TimeRange;
pub use types::BoundingBox;
pub use vector::{FeatureSlot, Vector};
