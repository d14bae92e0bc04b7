//! Local batch execution of the full binning pipeline.
//!
//! ```text
//!  products ──par──► SpatialBinner ──encode(-1)──► (index, record)
//!                                                        │
//!                              RowRangePartitioner ◄─────┘
//!                                      │ sort + group by index
//!  partitions ──par──► TemporalBinner ──► Vec<TemporalBin> per band
//!                                      │
//!                        TemporalBinReprojector (JobOutput::reproject)
//! ```
//!
//! Spatial bins cross the shuffle in their wire format with the index
//! carried next to the record, the same way a distributed runtime would
//! key them.

use crate::bin::{SpatialBin, TemporalBin};
use crate::codec::{self, IndexMode};
use crate::config::BinningConfig;
use crate::context::BinningContext;
use crate::error::{BinningError, Result};
use crate::observation::ObservationSlice;
use crate::partition::RowRangePartitioner;
use crate::reproject::{PixelRegion, TemporalBinProcessor, TemporalBinReprojector};
use crate::spatial::{SpatialBinConsumer, SpatialBinner, SpatialBinnerStats};
use crate::temporal::TemporalBinner;
use bytes::Bytes;
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Observations of one source product.
#[derive(Debug, Clone, Default)]
pub struct ProductInput {
    pub name: String,
    pub slices: Vec<ObservationSlice>,
}

impl ProductInput {
    pub fn new(name: impl Into<String>, slices: Vec<ObservationSlice>) -> Self {
        Self {
            name: name.into(),
            slices,
        }
    }
}

/// Errors recorded while binning one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductFailure {
    pub product: String,
    pub errors: Vec<String>,
}

/// Counters and timings of a job run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobReport {
    pub products_processed: usize,
    pub failed_products: Vec<ProductFailure>,
    pub observations: u64,
    pub skipped_observations: u64,
    pub spatial_bins: usize,
    pub temporal_bins: usize,
    pub partitions: usize,
    pub spatial_millis: u128,
    pub temporal_millis: u128,
}

/// Temporal bins of one row band, in increasing index order.
#[derive(Debug, Clone)]
pub struct PartitionOutput {
    pub partition: usize,
    pub rows: Range<usize>,
    pub bins: Vec<TemporalBin>,
}

#[derive(Debug, Clone)]
pub struct JobOutput {
    pub partitions: Vec<PartitionOutput>,
    pub report: JobReport,
    context: BinningContext,
}

impl JobOutput {
    pub fn context(&self) -> &BinningContext {
        &self.context
    }

    /// All temporal bins in increasing index order.
    pub fn temporal_bins(&self) -> impl Iterator<Item = &TemporalBin> {
        self.partitions.iter().flat_map(|p| p.bins.iter())
    }

    /// Drive a reprojector over every partition in row order.
    pub fn reproject<P: TemporalBinProcessor>(
        &self,
        processor: P,
        width: usize,
        region: Option<PixelRegion>,
    ) -> Result<P> {
        let mut reprojector =
            TemporalBinReprojector::new(self.context.shared_grid(), processor, width, region)?;
        reprojector.begin()?;
        for partition in &self.partitions {
            reprojector.process_bins(partition.bins.iter().cloned())?;
        }
        reprojector.end()?;
        Ok(reprojector.into_processor())
    }
}

/// Encodes emitted spatial bins for the shuffle.
#[derive(Debug, Default)]
struct ShuffleWriter {
    records: Vec<(i64, Bytes)>,
}

impl SpatialBinConsumer for ShuffleWriter {
    fn consume_spatial_bins(&mut self, _context: &BinningContext, bins: Vec<SpatialBin>) -> Result<()> {
        self.records.extend(
            bins.iter()
                .map(|bin| (bin.index(), codec::encode_to_bytes(bin, IndexMode::OutOfBand))),
        );
        Ok(())
    }
}

struct ProductResult {
    name: String,
    records: Vec<(i64, Bytes)>,
    stats: SpatialBinnerStats,
    errors: Vec<BinningError>,
}

/// Runs spatial and temporal binning on a dedicated thread pool.
pub struct BinningJob {
    context: BinningContext,
    num_partitions: usize,
    pool: rayon::ThreadPool,
}

impl BinningJob {
    pub fn new(context: BinningContext, num_partitions: usize, num_threads: Option<usize>) -> Result<Self> {
        if num_partitions == 0 {
            return Err(BinningError::config("num_partitions must be > 0"));
        }
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("binning-{}", i));
        if let Some(n) = num_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| BinningError::ThreadPool(e.to_string()))?;
        Ok(Self {
            context,
            num_partitions,
            pool,
        })
    }

    pub fn from_config(config: &BinningConfig) -> Result<Self> {
        let context = config.create_context()?;
        Self::new(context, config.num_partitions, config.num_threads)
    }

    pub fn context(&self) -> &BinningContext {
        &self.context
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Bin every product and merge the results.
    ///
    /// Product failures are collected in the report. An error is returned
    /// only for broken engine invariants.
    pub fn run(&self, products: Vec<ProductInput>) -> Result<JobOutput> {
        let mut report = JobReport {
            partitions: self.num_partitions,
            ..JobReport::default()
        };

        let start = Instant::now();
        let results: Vec<ProductResult> = self
            .pool
            .install(|| products.par_iter().map(|p| self.bin_product(p)).collect());
        report.spatial_millis = start.elapsed().as_millis();

        let partitioner =
            RowRangePartitioner::new(self.context.shared_grid(), self.context.region())?;
        let mut buckets: Vec<Vec<(i64, Bytes)>> = vec![Vec::new(); self.num_partitions];
        for result in results {
            report.products_processed += 1;
            report.observations += result.stats.observations;
            report.skipped_observations += result.stats.skipped_observations;
            report.spatial_bins += result.records.len();
            if !result.errors.is_empty() {
                report.failed_products.push(ProductFailure {
                    product: result.name,
                    errors: result.errors.iter().map(ToString::to_string).collect(),
                });
            }
            for (index, record) in result.records {
                let p = partitioner.partition(index, self.num_partitions)?;
                buckets[p].push((index, record));
            }
        }
        info!(
            products = report.products_processed,
            failed = report.failed_products.len(),
            observations = report.observations,
            spatial_bins = report.spatial_bins,
            elapsed_ms = report.spatial_millis as u64,
            "Spatial binning finished"
        );

        let start = Instant::now();
        let partitions: Vec<PartitionOutput> = self.pool.install(|| {
            buckets
                .into_par_iter()
                .enumerate()
                .map(|(p, records)| self.merge_partition(&partitioner, p, records))
                .collect::<Result<Vec<_>>>()
        })?;
        report.temporal_millis = start.elapsed().as_millis();
        report.temporal_bins = partitions.iter().map(|p| p.bins.len()).sum();
        info!(
            partitions = partitions.len(),
            temporal_bins = report.temporal_bins,
            elapsed_ms = report.temporal_millis as u64,
            "Temporal binning finished"
        );

        Ok(JobOutput {
            partitions,
            report,
            context: self.context.clone(),
        })
    }

    fn bin_product(&self, product: &ProductInput) -> ProductResult {
        let mut binner = SpatialBinner::new(self.context.clone(), ShuffleWriter::default())
            .with_product_name(product.name.clone());
        for slice in &product.slices {
            binner.process_slice(slice);
        }
        binner.complete();

        let errors = binner.take_errors();
        if !errors.is_empty() {
            warn!(product = %product.name, errors = errors.len(), "Product binned with errors");
        }
        let stats = binner.stats();
        ProductResult {
            name: product.name.clone(),
            records: binner.into_consumer().records,
            stats,
            errors,
        }
    }

    fn merge_partition(
        &self,
        partitioner: &RowRangePartitioner,
        partition: usize,
        mut records: Vec<(i64, Bytes)>,
    ) -> Result<PartitionOutput> {
        records.sort_by_key(|(index, _)| *index);

        let feature_count = self.context.manager().spatial_feature_count();
        let binner = TemporalBinner::new(self.context.clone());
        let mut bins = Vec::new();
        let mut group: Vec<SpatialBin> = Vec::new();
        let mut records = records.into_iter().peekable();
        while let Some((index, record)) = records.next() {
            group.push(codec::decode_spatial_exact(&record, feature_count)?);
            if records.peek().map(|(next, _)| *next) != Some(index) {
                bins.push(binner.process_spatial_bins(index, &group)?);
                group.clear();
            }
        }

        let rows = partitioner.row_range(partition, self.num_partitions)?;
        debug!(partition, rows = ?rows, bins = bins.len(), "Partition merged");
        Ok(PartitionOutput {
            partition,
            rows,
            bins,
        })
    }
}
