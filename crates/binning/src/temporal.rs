//! Merging of spatial bins into temporal bins.

use crate::bin::{SpatialBin, TemporalBin};
use crate::codec::OUT_OF_BAND_INDEX;
use crate::context::BinningContext;
use crate::error::{BinningError, Result};

/// Turns every group of spatial bins sharing an index into one completed
/// temporal bin.
///
/// Grouping is the caller's job: all spatial bins of an index, from every
/// product, must be supplied in one call. Their order does not matter.
#[derive(Debug, Clone)]
pub struct TemporalBinner {
    context: BinningContext,
}

impl TemporalBinner {
    pub fn new(context: BinningContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &BinningContext {
        &self.context
    }

    /// Merge and complete the spatial bins of `index`.
    ///
    /// Each spatial bin must be completed and carry either `index` or the
    /// out-of-band sentinel `-1`.
    pub fn process_spatial_bins<'a, I>(&self, index: i64, spatial_bins: I) -> Result<TemporalBin>
    where
        I: IntoIterator<Item = &'a SpatialBin>,
    {
        let num_bins = self.context.grid().num_bins();
        if index < 0 || index >= num_bins {
            return Err(BinningError::IndexOutOfRange { index, num_bins });
        }

        let manager = self.context.manager();
        let mut temporal = manager.create_temporal_bin(index);
        for spatial in spatial_bins {
            if spatial.index() != index && spatial.index() != OUT_OF_BAND_INDEX {
                return Err(BinningError::IndexMismatch {
                    expected: index,
                    actual: spatial.index(),
                });
            }
            manager.aggregate_temporal_bin(spatial, &mut temporal)?;
        }
        manager.complete_temporal_bin(&mut temporal)?;
        Ok(temporal)
    }
}
