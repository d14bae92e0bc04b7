//! Immutable binning setup shared by every worker.

use crate::error::{BinningError, Result};
use crate::grid::BinningGrid;
use crate::manager::BinManager;
use crate::time::TimeRange;
use crate::types::BoundingBox;
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered names of the variables every observation carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableContext {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl VariableContext {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(BinningError::config("at least one variable is required"));
        }
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(BinningError::config("variable names must not be blank"));
            }
            if positions.insert(name.clone(), i).is_some() {
                return Err(BinningError::config(format!("duplicate variable '{}'", name)));
            }
        }
        Ok(Self { names, positions })
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// Everything a spatial or temporal worker needs, cheap to clone.
#[derive(Debug, Clone)]
pub struct BinningContext {
    grid: Arc<dyn BinningGrid>,
    variables: Arc<VariableContext>,
    manager: Arc<BinManager>,
    super_sampling: usize,
    region: Option<BoundingBox>,
    time_range: Option<TimeRange>,
}

impl BinningContext {
    pub fn new(grid: Arc<dyn BinningGrid>, variables: VariableContext, manager: BinManager) -> Self {
        Self {
            grid,
            variables: Arc::new(variables),
            manager: Arc::new(manager),
            super_sampling: 1,
            region: None,
            time_range: None,
        }
    }

    pub fn with_super_sampling(mut self, super_sampling: usize) -> Self {
        self.super_sampling = super_sampling.max(1);
        self
    }

    pub fn with_region(mut self, region: Option<BoundingBox>) -> Self {
        self.region = region;
        self
    }

    pub fn with_time_range(mut self, time_range: Option<TimeRange>) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn grid(&self) -> &dyn BinningGrid {
        self.grid.as_ref()
    }

    pub fn shared_grid(&self) -> Arc<dyn BinningGrid> {
        Arc::clone(&self.grid)
    }

    pub fn variables(&self) -> &VariableContext {
        &self.variables
    }

    pub fn manager(&self) -> &BinManager {
        &self.manager
    }

    pub fn super_sampling(&self) -> usize {
        self.super_sampling
    }

    pub fn region(&self) -> Option<&BoundingBox> {
        self.region.as_ref()
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        self.time_range.as_ref()
    }

    /// Whether an observation at this position and time is inside the
    /// configured region and time range.
    pub fn accepts(&self, lat: f64, lon: f64, time: f64) -> bool {
        self.region.map_or(true, |region| region.contains(lon, lat))
            && self.time_range.map_or(true, |range| range.accepts(time))
    }
}
