//! Views into packed feature buffers.
//!
//! Every bin owns one contiguous `Vec<f32>`. Each aggregator works on a
//! fixed slot of that buffer, described by a [`FeatureSlot`]. Slots are
//! assigned once, in aggregator registration order, and shared read-only
//! by every worker.

use std::ops::{Index, Range};

/// Offset and length of one aggregator's values inside a packed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSlot {
    pub offset: usize,
    pub len: usize,
}

impl FeatureSlot {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Element range of this slot within the packed buffer.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Offset of the slot following this one.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Lay out slots of the given lengths back to back.
pub(crate) fn pack_slots(lens: impl IntoIterator<Item = usize>) -> (Vec<FeatureSlot>, usize) {
    let mut slots = Vec::new();
    let mut offset = 0;
    for len in lens {
        let slot = FeatureSlot::new(offset, len);
        offset = slot.end();
        slots.push(slot);
    }
    (slots, offset)
}

/// Read-only view of one slot of a packed buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector<'a> {
    values: &'a [f32],
}

impl<'a> Vector<'a> {
    pub fn new(values: &'a [f32]) -> Self {
        Self { values }
    }

    /// View `slot` of `buffer`.
    pub fn of_slot(buffer: &'a [f32], slot: FeatureSlot) -> Self {
        Self::new(&buffer[slot.range()])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<f32> {
        self.values.get(i).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        self.values.iter().copied()
    }

    pub fn as_slice(&self) -> &'a [f32] {
        self.values
    }
}

impl Index<usize> for Vector<'_> {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        &self.values[i]
    }
}
