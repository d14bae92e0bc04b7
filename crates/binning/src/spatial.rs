//! Per-product accumulation of observations into spatial bins.
//!
//! One [`SpatialBinner`] handles one source product. Slices of that
//! product are fed in order; each observation is indexed on the grid and
//! accumulated into the product-local bin for that index.
//!
//! ```text
//! slice 1 ──► bins {3, 4, 5}        active: {3, 4, 5}
//! slice 2 ──► bins {4, 5, 6}        retire {3}       active: {4, 5, 6}
//! slice 3 ──► bins {9}              retire {4, 5, 6} active: {9}
//! complete()                        retire {9}
//! ```
//!
//! A bin stays active while consecutive slices keep touching it, so a
//! product scanned row by row emits bins as soon as the scan has moved
//! past them. Every bin is completed exactly once and handed to the
//! [`SpatialBinConsumer`] in increasing index order.

use crate::bin::SpatialBin;
use crate::context::BinningContext;
use crate::error::{BinningError, Result};
use crate::observation::ObservationSlice;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Receives completed spatial bins.
pub trait SpatialBinConsumer {
    fn consume_spatial_bins(&mut self, context: &BinningContext, bins: Vec<SpatialBin>) -> Result<()>;
}

impl<F> SpatialBinConsumer for F
where
    F: FnMut(&BinningContext, Vec<SpatialBin>) -> Result<()>,
{
    fn consume_spatial_bins(&mut self, context: &BinningContext, bins: Vec<SpatialBin>) -> Result<()> {
        self(context, bins)
    }
}

/// Collects every emitted bin in memory.
#[derive(Debug, Default)]
pub struct CollectingConsumer {
    pub bins: Vec<SpatialBin>,
}

impl SpatialBinConsumer for CollectingConsumer {
    fn consume_spatial_bins(&mut self, _context: &BinningContext, bins: Vec<SpatialBin>) -> Result<()> {
        self.bins.extend(bins);
        Ok(())
    }
}

/// Counters of one spatial binning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpatialBinnerStats {
    pub slices: usize,
    pub failed_slices: usize,
    pub observations: u64,
    pub skipped_observations: u64,
    pub bins_emitted: usize,
}

pub struct SpatialBinner<C> {
    context: BinningContext,
    consumer: C,
    product: String,
    active: HashMap<i64, SpatialBin>,
    errors: Vec<BinningError>,
    stats: SpatialBinnerStats,
}

impl<C: SpatialBinConsumer> SpatialBinner<C> {
    pub fn new(context: BinningContext, consumer: C) -> Self {
        Self {
            context,
            consumer,
            product: String::new(),
            active: HashMap::new(),
            errors: Vec::new(),
            stats: SpatialBinnerStats::default(),
        }
    }

    /// Name used in log records.
    pub fn with_product_name(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    pub fn context(&self) -> &BinningContext {
        &self.context
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }

    pub fn stats(&self) -> SpatialBinnerStats {
        self.stats
    }

    /// Number of bins still accumulating.
    pub fn active_bin_count(&self) -> usize {
        self.active.len()
    }

    /// Errors recorded so far.
    pub fn errors(&self) -> &[BinningError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<BinningError> {
        std::mem::take(&mut self.errors)
    }

    /// Bin one slice and return the number of observations accumulated.
    ///
    /// A slice that fails is skipped as a whole; its error is recorded
    /// and processing continues with the next slice.
    pub fn process_slice(&mut self, slice: &ObservationSlice) -> usize {
        self.stats.slices += 1;
        match self.bin_slice(slice) {
            Ok((binned, touched)) => {
                self.retire(|index| !touched.contains(&index));
                binned
            }
            Err(e) => {
                warn!(
                    product = %self.product,
                    slice = self.stats.slices,
                    error = %e,
                    "Failed to bin slice, skipping"
                );
                self.stats.failed_slices += 1;
                self.errors.push(e);
                0
            }
        }
    }

    /// Complete and emit every remaining bin. Returns the number of bins
    /// emitted over the whole pass.
    pub fn complete(&mut self) -> usize {
        self.retire(|_| true);
        debug!(
            product = %self.product,
            slices = self.stats.slices,
            observations = self.stats.observations,
            bins = self.stats.bins_emitted,
            "Spatial binning complete"
        );
        self.stats.bins_emitted
    }

    fn bin_slice(&mut self, slice: &ObservationSlice) -> Result<(usize, HashSet<i64>)> {
        let manager = self.context.manager();
        if slice.variable_count() != manager.variable_count() {
            return Err(BinningError::VariableCountMismatch {
                expected: manager.variable_count(),
                actual: slice.variable_count(),
            });
        }
        slice.validate_coordinates()?;

        // Index everything first so a failing slice leaves no partial sums.
        let grid = self.context.grid();
        let mut accepted = Vec::with_capacity(slice.len());
        for observation in slice.iter() {
            if !observation.valid || !self.context.accepts(observation.lat, observation.lon, observation.time) {
                continue;
            }
            let index = grid.bin_index(observation.lat, observation.lon)?;
            accepted.push((index, observation.values));
        }

        let mut touched = HashSet::new();
        for (index, values) in &accepted {
            let bin = self
                .active
                .entry(*index)
                .or_insert_with(|| manager.create_spatial_bin(*index));
            manager.aggregate_spatial_bin(values, bin)?;
            touched.insert(*index);
        }

        self.stats.observations += accepted.len() as u64;
        self.stats.skipped_observations += (slice.len() - accepted.len()) as u64;
        Ok((accepted.len(), touched))
    }

    fn retire(&mut self, should_retire: impl Fn(i64) -> bool) {
        let mut indices: Vec<i64> = self
            .active
            .keys()
            .copied()
            .filter(|&index| should_retire(index))
            .collect();
        if indices.is_empty() {
            return;
        }
        indices.sort_unstable();

        let manager = self.context.manager();
        let mut bins = Vec::with_capacity(indices.len());
        for index in indices {
            if let Some(mut bin) = self.active.remove(&index) {
                match manager.complete_spatial_bin(&mut bin) {
                    Ok(()) => bins.push(bin),
                    Err(e) => self.errors.push(e),
                }
            }
        }

        let count = bins.len();
        match self.consumer.consume_spatial_bins(&self.context, bins) {
            Ok(()) => self.stats.bins_emitted += count,
            Err(e) => {
                warn!(product = %self.product, bins = count, error = %e, "Spatial bin consumer failed");
                self.errors.push(e);
            }
        }
    }
}
