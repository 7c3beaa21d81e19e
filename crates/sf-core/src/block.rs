//! Interleaved sample block helpers
//!
//! Blocks are contiguous f32 slices holding interleaved multi-channel data:
//! for C channels and N frames the layout is
//! `[s0c0, s0c1, .., s0c(C-1), s1c0, ..]`. Stages read and write this
//! layout directly; these helpers keep the frame math in one place.

use crate::error::{SfError, SfResult};
use crate::Sample;

/// Number of frames in an interleaved block
#[inline]
pub fn frame_count(len: usize, channels: usize) -> usize {
    if channels == 0 { 0 } else { len / channels }
}

/// Validate that a block length is an exact multiple of the channel count
pub fn check_geometry(len: usize, channels: usize) -> SfResult<usize> {
    if channels == 0 {
        return Err(SfError::ChannelMismatch {
            expected: 1,
            got: 0,
        });
    }
    if len % channels != 0 {
        return Err(SfError::KernelFailure(format!(
            "block length {len} is not a multiple of {channels} channels"
        )));
    }
    Ok(len / channels)
}

/// Copy one channel out of an interleaved block
pub fn extract_channel(block: &[Sample], channels: usize, channel: usize) -> Vec<Sample> {
    debug_assert!(channel < channels);
    block
        .iter()
        .skip(channel)
        .step_by(channels)
        .copied()
        .collect()
}

/// Write one channel back into an interleaved block
pub fn scatter_channel(block: &mut [Sample], channels: usize, channel: usize, data: &[Sample]) {
    debug_assert!(channel < channels);
    for (frame, &value) in data.iter().enumerate() {
        let idx = frame * channels + channel;
        if idx < block.len() {
            block[idx] = value;
        }
    }
}

/// Iterate frames of an interleaved block as chunks of `channels` samples
#[inline]
pub fn frames(block: &[Sample], channels: usize) -> impl Iterator<Item = &[Sample]> {
    block.chunks_exact(channels)
}

/// Mutable frame iteration
#[inline]
pub fn frames_mut(block: &mut [Sample], channels: usize) -> impl Iterator<Item = &mut [Sample]> {
    block.chunks_exact_mut(channels)
}
