//! Spatial and temporal bins.
//!
//! A bin is a grid index, an observation count and one packed feature
//! buffer. The [`BinManager`](crate::manager::BinManager) owns the layout
//! of that buffer and drives every state transition:
//!
//! ```text
//! SpatialBin:   create ─► aggregate* ─► complete ─► encode / merge
//! TemporalBin:  create ─► aggregate* ─► complete ─► reproject
//! ```
//!
//! Completion happens exactly once. Mutating a completed bin is an error.

/// Lifecycle state of a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinState {
    #[default]
    Open,
    Completed,
}

/// Fields shared by every bin that travels through the codec.
pub trait BinRecord {
    fn index(&self) -> i64;
    fn num_obs(&self) -> u32;
    fn features(&self) -> &[f32];
}

/// Accumulation of one product's observations in one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialBin {
    pub(crate) index: i64,
    pub(crate) num_obs: u32,
    pub(crate) features: Vec<f32>,
    pub(crate) state: BinState,
}

impl SpatialBin {
    /// Reassemble a bin, e.g. after decoding.
    pub fn from_parts(index: i64, num_obs: u32, features: Vec<f32>, state: BinState) -> Self {
        Self {
            index,
            num_obs,
            features,
            state,
        }
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn num_obs(&self) -> u32 {
        self.num_obs
    }

    /// The packed spatial feature buffer.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn state(&self) -> BinState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == BinState::Completed
    }

    /// Replace the index, e.g. to restore one carried out-of-band.
    pub fn with_index(mut self, index: i64) -> Self {
        self.index = index;
        self
    }
}

impl BinRecord for SpatialBin {
    fn index(&self) -> i64 {
        self.index
    }

    fn num_obs(&self) -> u32 {
        self.num_obs
    }

    fn features(&self) -> &[f32] {
        &self.features
    }
}

/// Merged statistics of one grid cell across all products.
///
/// `features` holds the temporal accumulators; `output` is empty until
/// the bin is completed and then holds the output features.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalBin {
    pub(crate) index: i64,
    pub(crate) num_obs: u32,
    pub(crate) features: Vec<f32>,
    pub(crate) output: Vec<f32>,
    pub(crate) state: BinState,
}

impl TemporalBin {
    /// Reassemble an open bin, e.g. after decoding.
    pub fn from_parts(index: i64, num_obs: u32, features: Vec<f32>) -> Self {
        Self {
            index,
            num_obs,
            features,
            output: Vec::new(),
            state: BinState::Open,
        }
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn num_obs(&self) -> u32 {
        self.num_obs
    }

    /// The packed temporal feature buffer.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    /// Output features; empty while the bin is open.
    pub fn output(&self) -> &[f32] {
        &self.output
    }

    pub fn state(&self) -> BinState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == BinState::Completed
    }
}

impl BinRecord for TemporalBin {
    fn index(&self) -> i64 {
        self.index
    }

    fn num_obs(&self) -> u32 {
        self.num_obs
    }

    fn features(&self) -> &[f32] {
        &self.features
    }
}
