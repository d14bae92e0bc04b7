//! Orchestrates the aggregator set over packed bin buffers.

use crate::aggregator::{Aggregator, AggregatorDescriptor};
use crate::bin::{BinState, SpatialBin, TemporalBin};
use crate::error::{BinningError, Result};
use crate::vector::{pack_slots, FeatureSlot, Vector};

/// Ordered aggregators and the slot layout they imply.
///
/// Registration order fixes each aggregator's offset inside every
/// spatial, temporal and output buffer. The manager is immutable and is
/// shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct BinManager {
    aggregators: Vec<Aggregator>,
    variable_count: usize,
    spatial_slots: Vec<FeatureSlot>,
    temporal_slots: Vec<FeatureSlot>,
    output_slots: Vec<FeatureSlot>,
    spatial_feature_count: usize,
    temporal_feature_count: usize,
    output_feature_count: usize,
    output_feature_names: Vec<String>,
}

impl BinManager {
    /// Create a manager for observations carrying `variable_count` values.
    pub fn new(aggregators: Vec<Aggregator>, variable_count: usize) -> Result<Self> {
        if aggregators.is_empty() {
            return Err(BinningError::config("at least one aggregator is required"));
        }
        if let Some(agg) = aggregators
            .iter()
            .find(|agg| agg.variable_index() >= variable_count)
        {
            return Err(BinningError::config(format!(
                "{} aggregator reads variable {} but observations carry {} values",
                agg.kind(),
                agg.variable_index(),
                variable_count
            )));
        }

        let (spatial_slots, spatial_feature_count) =
            pack_slots(aggregators.iter().map(Aggregator::spatial_len));
        let (temporal_slots, temporal_feature_count) =
            pack_slots(aggregators.iter().map(Aggregator::temporal_len));
        let (output_slots, output_feature_count) =
            pack_slots(aggregators.iter().map(Aggregator::output_len));
        let output_feature_names = aggregators
            .iter()
            .flat_map(|agg| agg.output_feature_names().iter().cloned())
            .collect();

        Ok(Self {
            aggregators,
            variable_count,
            spatial_slots,
            temporal_slots,
            output_slots,
            spatial_feature_count,
            temporal_feature_count,
            output_feature_count,
            output_feature_names,
        })
    }

    pub fn aggregators(&self) -> &[Aggregator] {
        &self.aggregators
    }

    pub fn aggregator_count(&self) -> usize {
        self.aggregators.len()
    }

    pub fn descriptors(&self) -> Vec<AggregatorDescriptor> {
        self.aggregators.iter().map(Aggregator::descriptor).collect()
    }

    /// Number of values every observation must carry.
    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    pub fn spatial_feature_count(&self) -> usize {
        self.spatial_feature_count
    }

    pub fn temporal_feature_count(&self) -> usize {
        self.temporal_feature_count
    }

    pub fn output_feature_count(&self) -> usize {
        self.output_feature_count
    }

    /// Output feature names in buffer order.
    pub fn output_feature_names(&self) -> &[String] {
        &self.output_feature_names
    }

    pub fn create_spatial_bin(&self, index: i64) -> SpatialBin {
        let mut features = vec![0.0; self.spatial_feature_count];
        for (agg, slot) in self.aggregators.iter().zip(&self.spatial_slots) {
            agg.init_spatial(&mut features[slot.range()]);
        }
        SpatialBin::from_parts(index, 0, features, BinState::Open)
    }

    /// Accumulate the variable values of one observation.
    pub fn aggregate_spatial_bin(&self, values: &[f32], bin: &mut SpatialBin) -> Result<()> {
        ensure_open("spatial", bin.index, bin.state)?;
        if values.len() != self.variable_count {
            return Err(BinningError::VariableCountMismatch {
                expected: self.variable_count,
                actual: values.len(),
            });
        }
        self.check_len(bin.features.len(), self.spatial_feature_count)?;
        for (agg, slot) in self.aggregators.iter().zip(&self.spatial_slots) {
            agg.aggregate_spatial(&mut bin.features[slot.range()], values);
        }
        bin.num_obs += 1;
        Ok(())
    }

    pub fn complete_spatial_bin(&self, bin: &mut SpatialBin) -> Result<()> {
        ensure_open("spatial", bin.index, bin.state)?;
        self.check_len(bin.features.len(), self.spatial_feature_count)?;
        for (agg, slot) in self.aggregators.iter().zip(&self.spatial_slots) {
            agg.complete_spatial(&mut bin.features[slot.range()]);
        }
        bin.state = BinState::Completed;
        Ok(())
    }

    pub fn create_temporal_bin(&self, index: i64) -> TemporalBin {
        let mut features = vec![0.0; self.temporal_feature_count];
        for (agg, slot) in self.aggregators.iter().zip(&self.temporal_slots) {
            agg.init_temporal(&mut features[slot.range()]);
        }
        TemporalBin::from_parts(index, 0, features)
    }

    /// Merge one completed spatial bin into an open temporal bin.
    pub fn aggregate_temporal_bin(&self, spatial: &SpatialBin, temporal: &mut TemporalBin) -> Result<()> {
        if !spatial.is_completed() {
            return Err(BinningError::BinNotCompleted {
                kind: "spatial",
                index: spatial.index,
            });
        }
        ensure_open("temporal", temporal.index, temporal.state)?;
        self.check_len(spatial.features.len(), self.spatial_feature_count)?;
        self.check_len(temporal.features.len(), self.temporal_feature_count)?;

        for ((agg, s), t) in self
            .aggregators
            .iter()
            .zip(&self.spatial_slots)
            .zip(&self.temporal_slots)
        {
            agg.aggregate_temporal(
                &spatial.features[s.range()],
                spatial.num_obs,
                &mut temporal.features[t.range()],
            );
        }
        temporal.num_obs = temporal.num_obs.saturating_add(spatial.num_obs);
        Ok(())
    }

    pub fn complete_temporal_bin(&self, bin: &mut TemporalBin) -> Result<()> {
        ensure_open("temporal", bin.index, bin.state)?;
        self.check_len(bin.features.len(), self.temporal_feature_count)?;

        let mut output = vec![f32::NAN; self.output_feature_count];
        for ((agg, t), o) in self
            .aggregators
            .iter()
            .zip(&self.temporal_slots)
            .zip(&self.output_slots)
        {
            agg.complete_temporal(&bin.features[t.range()], &mut output[o.range()]);
        }
        bin.output = output;
        bin.state = BinState::Completed;
        Ok(())
    }

    /// Spatial slot of aggregator `aggregator_index`.
    pub fn spatial_vector<'a>(&self, bin: &'a SpatialBin, aggregator_index: usize) -> Option<Vector<'a>> {
        let slot = *self.spatial_slots.get(aggregator_index)?;
        bin.features.get(slot.range()).map(Vector::new)
    }

    /// Temporal slot of aggregator `aggregator_index`.
    pub fn temporal_vector<'a>(&self, bin: &'a TemporalBin, aggregator_index: usize) -> Option<Vector<'a>> {
        let slot = *self.temporal_slots.get(aggregator_index)?;
        bin.features.get(slot.range()).map(Vector::new)
    }

    /// Output features of aggregator `aggregator_index`; `None` until the
    /// bin is completed.
    pub fn output_vector<'a>(&self, bin: &'a TemporalBin, aggregator_index: usize) -> Option<Vector<'a>> {
        let slot = *self.output_slots.get(aggregator_index)?;
        bin.output.get(slot.range()).map(Vector::new)
    }

    fn check_len(&self, actual: usize, expected: usize) -> Result<()> {
        if actual != expected {
            return Err(BinningError::Config(format!(
                "bin carries {} features, layout expects {}",
                actual, expected
            )));
        }
        Ok(())
    }
}

fn ensure_open(kind: &'static str, index: i64, state: BinState) -> Result<()> {
    match state {
        BinState::Open => Ok(()),
        BinState::Completed => Err(BinningError::BinAlreadyCompleted { kind, index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{AverageAggregator, MinMaxAggregator, PercentileAggregator};

    // Variables: A (index 0), B (index 1)
    fn manager() -> BinManager {
        BinManager::new(
            vec![
                Aggregator::MinMax(MinMaxAggregator::new(0, "a")),
                Aggregator::Average(AverageAggregator::new(1, "b")),
            ],
            2,
        )
        .unwrap()
    }

    fn spatial_bin(manager: &BinManager, index: i64, observations: &[[f32; 2]]) -> SpatialBin {
        let mut bin = manager.create_spatial_bin(index);
        for values in observations {
            manager.aggregate_spatial_bin(values, &mut bin).unwrap();
        }
        bin
    }

    // ========================================================================
    // Layout
    // ========================================================================

    #[test]
    fn test_layout() {
        let manager = manager();
        assert_eq!(manager.aggregator_count(), 2);
        assert_eq!(manager.spatial_feature_count(), 5);
        assert_eq!(manager.temporal_feature_count(), 5);
        assert_eq!(manager.output_feature_count(), 4);
        assert_eq!(
            manager.output_feature_names(),
            &["a_min", "a_max", "b_mean", "b_sigma"]
        );
    }

    #[test]
    fn test_rejects_bad_setup() {
        assert!(matches!(BinManager::new(vec![], 2), Err(BinningError::Config(_))));
        let agg = Aggregator::MinMax(MinMaxAggregator::new(3, "d"));
        assert!(matches!(BinManager::new(vec![agg], 2), Err(BinningError::Config(_))));
    }

    #[test]
    fn test_slots_follow_registration_order() {
        let manager = BinManager::new(
            vec![
                Aggregator::Percentile(PercentileAggregator::new(0, "a", 90, 3)),
                Aggregator::MinMax(MinMaxAggregator::new(0, "a")),
            ],
            1,
        )
        .unwrap();
        let bin = manager.create_temporal_bin(0);
        assert_eq!(bin.features().len(), 6);
        assert_eq!(manager.temporal_vector(&bin, 0).unwrap().len(), 4);
        assert_eq!(
            manager.temporal_vector(&bin, 1).unwrap().as_slice(),
            &[f32::INFINITY, f32::NEG_INFINITY]
        );
        assert!(manager.temporal_vector(&bin, 2).is_none());
    }

    // ========================================================================
    // Spatial stage
    // ========================================================================

    #[test]
    fn test_spatial_accumulation() {
        let manager = manager();
        let mut bin = spatial_bin(&manager, 7, &[[0.2, 4.0], [0.6, 2.0], [0.4, 6.0]]);
        assert_eq!(bin.num_obs(), 3);

        let a = manager.spatial_vector(&bin, 0).unwrap();
        assert_eq!(a.as_slice(), &[0.2, 0.6]);
        let b = manager.spatial_vector(&bin, 1).unwrap();
        assert_eq!(b.as_slice(), &[12.0, 56.0, 3.0]);

        manager.complete_spatial_bin(&mut bin).unwrap();
        let b = manager.spatial_vector(&bin, 1).unwrap();
        assert!((b[0] - 4.0).abs() < 1e-6);
        assert!((b[1] - 1.632_993).abs() < 1e-5);
        assert_eq!(b[2], 3.0);
        // min/max is unchanged by completion
        assert_eq!(manager.spatial_vector(&bin, 0).unwrap().as_slice(), &[0.2, 0.6]);
    }

    #[test]
    fn test_variable_count_mismatch() {
        let manager = manager();
        let mut bin = manager.create_spatial_bin(0);
        let err = manager.aggregate_spatial_bin(&[1.0], &mut bin).unwrap_err();
        assert!(matches!(
            err,
            BinningError::VariableCountMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(bin.num_obs(), 0);
    }

    #[test]
    fn test_spatial_lifecycle_violations() {
        let manager = manager();
        let mut bin = spatial_bin(&manager, 3, &[[1.0, 1.0]]);
        manager.complete_spatial_bin(&mut bin).unwrap();

        let err = manager.complete_spatial_bin(&mut bin).unwrap_err();
        assert!(matches!(
            err,
            BinningError::BinAlreadyCompleted {
                kind: "spatial",
                index: 3
            }
        ));
        let err = manager.aggregate_spatial_bin(&[2.0, 2.0], &mut bin).unwrap_err();
        assert!(err.is_contract_violation());
        assert_eq!(bin.num_obs(), 1);
    }

    #[test]
    fn test_spatial_bin_with_foreign_layout() {
        let manager = manager();
        let mut bin = SpatialBin::from_parts(4, 0, vec![1.0], BinState::Open);
        let err = manager.aggregate_spatial_bin(&[1.0, 2.0], &mut bin).unwrap_err();
        assert!(matches!(err, BinningError::Config(_)));
        assert_eq!(bin.num_obs(), 0);

        let err = manager.complete_spatial_bin(&mut bin).unwrap_err();
        assert!(matches!(err, BinningError::Config(_)));
        assert!(!bin.is_completed());
    }

    // ========================================================================
    // Temporal stage
    // ========================================================================

    #[test]
    fn test_temporal_merge_of_single_pixel_bins() {
        let manager = manager();
        let mut temporal = manager.create_temporal_bin(7);
        for values in [[0.2, 4.0], [0.6, 2.0], [0.4, 6.0]] {
            let mut spatial = spatial_bin(&manager, 7, &[values]);
            manager.complete_spatial_bin(&mut spatial).unwrap();
            manager.aggregate_temporal_bin(&spatial, &mut temporal).unwrap();
        }
        assert_eq!(temporal.num_obs(), 3);
        assert!(manager.output_vector(&temporal, 0).is_none());

        manager.complete_temporal_bin(&mut temporal).unwrap();
        let a = manager.output_vector(&temporal, 0).unwrap();
        assert_eq!(a.as_slice(), &[0.2, 0.6]);
        let b = manager.output_vector(&temporal, 1).unwrap();
        assert!((b[0] - 4.0).abs() < 1e-6);
        assert!((b[1] - 1.632_993).abs() < 1e-5);
    }

    #[test]
    fn test_temporal_requires_completed_spatial() {
        let manager = manager();
        let spatial = spatial_bin(&manager, 1, &[[1.0, 1.0]]);
        let mut temporal = manager.create_temporal_bin(1);
        let err = manager.aggregate_temporal_bin(&spatial, &mut temporal).unwrap_err();
        assert!(matches!(err, BinningError::BinNotCompleted { kind: "spatial", .. }));
    }

    #[test]
    fn test_temporal_lifecycle_violations() {
        let manager = manager();
        let mut spatial = spatial_bin(&manager, 1, &[[1.0, 1.0]]);
        manager.complete_spatial_bin(&mut spatial).unwrap();

        let mut temporal = manager.create_temporal_bin(1);
        manager.aggregate_temporal_bin(&spatial, &mut temporal).unwrap();
        manager.complete_temporal_bin(&mut temporal).unwrap();
        let output = temporal.output().to_vec();

        assert!(matches!(
            manager.complete_temporal_bin(&mut temporal),
            Err(BinningError::BinAlreadyCompleted { kind: "temporal", .. })
        ));
        assert!(manager.aggregate_temporal_bin(&spatial, &mut temporal).is_err());
        assert_eq!(temporal.output(), output.as_slice());
        assert_eq!(temporal.num_obs(), 1);
    }

    #[test]
    fn test_temporal_bin_with_foreign_layout() {
        let manager = manager();
        let mut spatial = spatial_bin(&manager, 2, &[[1.0, 1.0]]);
        manager.complete_spatial_bin(&mut spatial).unwrap();

        let mut temporal = TemporalBin::from_parts(2, 0, vec![0.0]);
        let err = manager.aggregate_temporal_bin(&spatial, &mut temporal).unwrap_err();
        assert!(matches!(err, BinningError::Config(_)));
        assert_eq!(temporal.num_obs(), 0);
        assert_eq!(temporal.features(), &[0.0]);
    }
}
