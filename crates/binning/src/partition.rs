//! Assignment of bins to workers by latitude band.
//!
//! The rows covered by the region are cut into `n` contiguous bands of
//! near-equal height; band `p` goes to worker `p`.
//!
//! ```text
//! row      min_row ................................ max_row
//! band     |   0   |   1   |   2   |   3   |   4   |
//! ```
//!
//! Each worker therefore merges and reprojects one unbroken run of rows.

use crate::error::{BinningError, Result};
use crate::grid::BinningGrid;
use crate::types::BoundingBox;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RowRangePartitioner {
    grid: Arc<dyn BinningGrid>,
    min_row: usize,
    max_row: usize,
}

impl RowRangePartitioner {
    /// Partition all rows, or only those intersecting `region`.
    pub fn new(grid: Arc<dyn BinningGrid>, region: Option<&BoundingBox>) -> Result<Self> {
        let (min_row, max_row) = match region {
            Some(region) => {
                region.validate()?;
                (grid.row_for_lat(region.max_lat), grid.row_for_lat(region.min_lat))
            }
            None => (0, grid.num_rows() - 1),
        };
        Ok(Self {
            grid,
            min_row,
            max_row,
        })
    }

    pub fn min_row(&self) -> usize {
        self.min_row
    }

    pub fn max_row(&self) -> usize {
        self.max_row
    }

    pub fn rows_covered(&self) -> usize {
        self.max_row - self.min_row + 1
    }

    /// Partition of bin `index` among `num_partitions`.
    pub fn partition(&self, index: i64, num_partitions: usize) -> Result<usize> {
        check_partitions(num_partitions)?;
        let row = self.grid.row_index(index)?;
        Ok(self.partition_of_row(row, num_partitions))
    }

    /// Partition of `row` among `num_partitions`. Rows outside the region
    /// go to the nearest edge partition.
    pub fn partition_of_row(&self, row: usize, num_partitions: usize) -> usize {
        let offset = row.saturating_sub(self.min_row);
        (offset * num_partitions / self.rows_covered()).min(num_partitions.saturating_sub(1))
    }

    /// Rows owned by `partition`. Empty if the partition receives none,
    /// which happens when there are more partitions than rows.
    pub fn row_range(&self, partition: usize, num_partitions: usize) -> Result<Range<usize>> {
        check_partitions(num_partitions)?;
        if partition >= num_partitions {
            return Ok(self.min_row..self.min_row);
        }
        let rows = self.rows_covered();
        let start = (partition * rows).div_ceil(num_partitions);
        let end = ((partition + 1) * rows).div_ceil(num_partitions);
        Ok(self.min_row + start..self.min_row + end)
    }
}

fn check_partitions(num_partitions: usize) -> Result<()> {
    if num_partitions == 0 {
        return Err(BinningError::config("num_partitions must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::IsinGrid;
    use proptest::prelude::*;

    fn grid(rows: usize) -> Arc<dyn BinningGrid> {
        Arc::new(IsinGrid::new(rows).unwrap())
    }

    #[test]
    fn test_global_rows() {
        let partitioner = RowRangePartitioner::new(grid(6), None).unwrap();
        assert_eq!((partitioner.min_row(), partitioner.max_row()), (0, 5));

        // 3 partitions of 2 rows each
        let partitions: Vec<usize> = (0..46)
            .map(|i| partitioner.partition(i, 3).unwrap())
            .collect();
        assert_eq!(partitions[0], 0);
        assert_eq!(partitions[10], 0);
        assert_eq!(partitions[11], 1);
        assert_eq!(partitions[34], 1);
        assert_eq!(partitions[35], 2);
        assert_eq!(partitions[45], 2);
    }

    #[test]
    fn test_single_partition() {
        let partitioner = RowRangePartitioner::new(grid(6), None).unwrap();
        assert!((0..46).all(|i| partitioner.partition(i, 1).unwrap() == 0));
        assert_eq!(partitioner.row_range(0, 1).unwrap(), 0..6);
    }

    #[test]
    fn test_region_rows() {
        let region = BoundingBox::new(-10.0, -20.0, 10.0, 50.0);
        let partitioner = RowRangePartitioner::new(grid(180), Some(&region)).unwrap();
        // row 0 is the 89-90 N band
        assert_eq!(partitioner.min_row(), 39);
        assert_eq!(partitioner.max_row(), 109);
        assert_eq!(partitioner.rows_covered(), 71);
    }

    #[test]
    fn test_row_ranges_tile_region() {
        let region = BoundingBox::new(-10.0, -20.0, 10.0, 50.0);
        let partitioner = RowRangePartitioner::new(grid(180), Some(&region)).unwrap();
        let n = 4;
        let mut next = partitioner.min_row();
        for p in 0..n {
            let range = partitioner.row_range(p, n).unwrap();
            assert_eq!(range.start, next);
            for row in range.clone() {
                assert_eq!(partitioner.partition_of_row(row, n), p);
            }
            next = range.end;
        }
        assert_eq!(next, partitioner.max_row() + 1);
    }

    #[test]
    fn test_more_partitions_than_rows() {
        let partitioner = RowRangePartitioner::new(grid(6), None).unwrap();
        let nonempty = (0..10)
            .filter(|&p| !partitioner.row_range(p, 10).unwrap().is_empty())
            .count();
        assert_eq!(nonempty, 6);
        assert!(partitioner.row_range(10, 10).unwrap().is_empty());
    }

    #[test]
    fn test_errors() {
        let partitioner = RowRangePartitioner::new(grid(6), None).unwrap();
        assert!(matches!(partitioner.partition(0, 0), Err(BinningError::Config(_))));
        assert!(matches!(
            partitioner.partition(46, 2),
            Err(BinningError::IndexOutOfRange { .. })
        ));
        let inverted = BoundingBox::new(0.0, 10.0, 10.0, -10.0);
        assert!(RowRangePartitioner::new(grid(6), Some(&inverted)).is_err());
    }

    proptest! {
        #[test]
        fn prop_partition_monotonic_in_region(
            lat_a in -89.0f64..89.0,
            lat_b in -89.0f64..89.0,
            n in 1usize..16,
        ) {
            let (min_lat, max_lat) = if lat_a < lat_b { (lat_a, lat_b) } else { (lat_b, lat_a) };
            prop_assume!(max_lat - min_lat > 0.5);
            let region = BoundingBox::new(-180.0, min_lat, 180.0, max_lat);
            let grid = grid(180);
            let partitioner = RowRangePartitioner::new(grid.clone(), Some(&region)).unwrap();

            let mut previous = 0;
            for row in partitioner.min_row()..=partitioner.max_row() {
                let index = grid.first_bin_index(row).unwrap();
                let p = partitioner.partition(index, n).unwrap();
                prop_assert!(p >= previous);
                prop_assert!(p < n);
                prop_assert!(partitioner.row_range(p, n).unwrap().contains(&row));
                previous = p;
            }
        }
    }
}
