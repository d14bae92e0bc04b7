//! Binary bin records.
//!
//! Bins cross worker boundaries in a fixed big-endian layout:
//!
//! ```text
//! +----------------+---------------+------------------------------+
//! | index: i64     | num_obs: u32  | features: f32 × feature_count |
//! +----------------+---------------+------------------------------+
//!   8 bytes          4 bytes         4 bytes each
//! ```
//!
//! The feature count is not written; both sides take it from the shared
//! [`BinManager`](crate::manager::BinManager). When the transport already
//! keys records by bin index the index field holds `-1` instead
//! ([`IndexMode::OutOfBand`]), and decoding yields `-1` back.

use crate::bin::{BinRecord, BinState, SpatialBin, TemporalBin};
use crate::error::{BinningError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Index value written when the index travels outside the record.
pub const OUT_OF_BAND_INDEX: i64 = -1;

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 8 + 4;

/// Whether a record carries its own bin index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    #[default]
    Inline,
    OutOfBand,
}

/// Encoded size of a record with `feature_count` features.
pub fn encoded_len(feature_count: usize) -> usize {
    HEADER_LEN + 4 * feature_count
}

/// Append one record to `buf`.
pub fn encode_bin<B: BinRecord, W: BufMut>(bin: &B, mode: IndexMode, buf: &mut W) {
    let index = match mode {
        IndexMode::Inline => bin.index(),
        IndexMode::OutOfBand => OUT_OF_BAND_INDEX,
    };
    buf.put_i64(index);
    buf.put_u32(bin.num_obs());
    for &value in bin.features() {
        buf.put_f32(value);
    }
}

/// Encode one record into a fresh buffer.
pub fn encode_to_bytes<B: BinRecord>(bin: &B, mode: IndexMode) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(bin.features().len()));
    encode_bin(bin, mode, &mut buf);
    buf.freeze()
}

/// Encode records back to back.
pub fn encode_bins<'a, B, I>(bins: I, mode: IndexMode) -> Bytes
where
    B: BinRecord + 'a,
    I: IntoIterator<Item = &'a B>,
{
    let mut buf = BytesMut::new();
    for bin in bins {
        buf.reserve(encoded_len(bin.features().len()));
        encode_bin(bin, mode, &mut buf);
    }
    buf.freeze()
}

fn decode_record<R: Buf>(buf: &mut R, feature_count: usize) -> Result<(i64, u32, Vec<f32>)> {
    let needed = encoded_len(feature_count);
    if buf.remaining() < needed {
        return Err(BinningError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    let index = buf.get_i64();
    let num_obs = buf.get_u32();
    let features = (0..feature_count).map(|_| buf.get_f32()).collect();
    Ok((index, num_obs, features))
}

/// Read one spatial record. Spatial bins only travel once completed, so
/// the result is in the completed state.
pub fn decode_spatial_bin<R: Buf>(buf: &mut R, feature_count: usize) -> Result<SpatialBin> {
    let (index, num_obs, features) = decode_record(buf, feature_count)?;
    Ok(SpatialBin::from_parts(
        index,
        num_obs,
        features,
        BinState::Completed,
    ))
}

/// Read one temporal record into an open bin.
pub fn decode_temporal_bin<R: Buf>(buf: &mut R, feature_count: usize) -> Result<TemporalBin> {
    let (index, num_obs, features) = decode_record(buf, feature_count)?;
    Ok(TemporalBin::from_parts(index, num_obs, features))
}

/// Read every spatial record in `buf`; the input must end on a record
/// boundary.
pub fn decode_spatial_bins<R: Buf>(mut buf: R, feature_count: usize) -> Result<Vec<SpatialBin>> {
    let mut bins = Vec::with_capacity(buf.remaining() / encoded_len(feature_count));
    while buf.has_remaining() {
        bins.push(decode_spatial_bin(&mut buf, feature_count)?);
    }
    Ok(bins)
}

/// Read exactly one spatial record from `data`, rejecting leftovers.
pub fn decode_spatial_exact(mut data: &[u8], feature_count: usize) -> Result<SpatialBin> {
    let bin = decode_spatial_bin(&mut data, feature_count)?;
    if !data.is_empty() {
        return Err(BinningError::TrailingBytes(data.len()));
    }
    Ok(bin)
}

/// Read every temporal record in `buf`.
pub fn decode_temporal_bins<R: Buf>(mut buf: R, feature_count: usize) -> Result<Vec<TemporalBin>> {
    let mut bins = Vec::with_capacity(buf.remaining() / encoded_len(feature_count));
    while buf.has_remaining() {
        bins.push(decode_temporal_bin(&mut buf, feature_count)?);
    }
    Ok(bins)
}
