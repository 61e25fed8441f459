
#[cfg(feature = "internal-no-panic")]
use no_panic::no_panic;

use alloc::vec;
use alloc::vec::Vec;

use crate::quantize::quantize_sample;
use crate::Error;

/// Size of the header written in front of the compressed nibbles.
pub const IMA_ADPCM_HEADER_SIZE: usize = 4;

/// State values for the IMA ADPCM encoder and decoder.
///
/// `predictor` is the running reconstruction of the signal and `step_index` points to
/// the step table. Both start at zero for a new stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AdpcmImaState {
    pub predictor: i16,
    pub step_index: u8,
}

impl AdpcmImaState {
    /// Creates a new AdpcmImaState with zero values.
    pub fn new() -> AdpcmImaState {
        AdpcmImaState {
            predictor: 0,
            step_index: 0,
        }
    }
}

impl Default for AdpcmImaState {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) const IMA_INDEX_TABLE: &[i8; 16] = &[
    -1, -1, -1, -1, 2, 4, 6, 8,
    -1, -1, -1, -1, 2, 4, 6, 8
];

pub(crate) const IMA_STEP_TABLE: &[i16; 89] = &[
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17,
    19, 21, 23, 25, 28, 31, 34, 37, 41, 45,
    50, 55, 60, 66, 73, 80, 88, 97, 107, 118,
    130, 143, 157, 173, 190, 209, 230, 253, 279, 307,
    337, 371, 408, 449, 494, 544, 598, 658, 724, 796,
    876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358,
    5894, 6484, 7132, 7845, 8630, 9493, 10442, 11487, 12635, 13899,
    15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794, 32767
];

/// Applies `vpdiff` in the direction of the nibble's sign bit and advances the step index.
#[inline(always)]
fn advance_state(nibble: u8, vpdiff: i32, state: &mut AdpcmImaState) {
    let mut predictor = i32::from(state.predictor);
    if (nibble & 8) != 0 {
        predictor -= vpdiff;
    } else {
        predictor += vpdiff;
    }
    #[allow(clippy::cast_possible_truncation)] // value is clamped so truncation never happens
    {
    state.predictor = predictor.clamp(-32768, 32767) as i16;
    }
    state.step_index = state.step_index
        .saturating_add_signed(IMA_INDEX_TABLE[usize::from(nibble & 0x0f)])
        .min(88);
}

/// Encodes a linear 16-bit signed integer sample value to a 4-bit encoded IMA ADPCM value.
///
/// `state` is updated with the new predictor and step index. Subsequent calls should pass in
/// the state values from the previous call.
#[cfg_attr(feature = "internal-no-panic", no_panic)]
#[inline(always)]
pub fn encode_adpcm_ima(sample_value: i16, state: &mut AdpcmImaState) -> u8 {
    state.step_index = state.step_index.min(88);

    let mut diff = i32::from(sample_value) - i32::from(state.predictor);
    let mut nibble: u8 = 0;
    if diff < 0 {
        nibble = 8;
        diff = -diff;
    }
    let mut step = i32::from(IMA_STEP_TABLE[usize::from(state.step_index)]);
    let mut vpdiff = step >> 3;
    // magnitude bits 4, 2 and 1 against step, step/2 and step/4
    let mut mask = 4;
    while mask != 0 {
        if diff >= step {
            nibble |= mask;
            diff -= step;
            vpdiff += step;
        }
        step >>= 1;
        mask >>= 1;
    }
    advance_state(nibble, vpdiff, state);
    nibble
}

/// Decodes a 4-bit encoded IMA ADPCM value to a linear 16-bit signed integer sample value.
///
/// Only the lowest 4 bits of `encoded_nibble` are used. Given the same starting `state`,
/// this returns the value the encoder had as its predictor after encoding the nibble.
#[cfg_attr(feature = "internal-no-panic", no_panic)]
#[inline(always)]
pub fn decode_adpcm_ima(encoded_nibble: u8, state: &mut AdpcmImaState) -> i16 {
    let nibble = encoded_nibble & 0x0f;
    state.step_index = state.step_index.min(88);

    let step = i32::from(IMA_STEP_TABLE[usize::from(state.step_index)]);
    let mut vpdiff = step >> 3;
    if (nibble & 4) != 0 { vpdiff += step; }
    if (nibble & 2) != 0 { vpdiff += step >> 1; }
    if (nibble & 1) != 0 { vpdiff += step >> 2; }
    advance_state(nibble, vpdiff, state);
    state.predictor
}

/// Compresses normalized floating point samples to an IMA ADPCM stream.
///
/// The output has a 4 byte header (initial predictor as little-endian i16, initial step
/// index and one unused byte, all zero) followed by two 4-bit samples per byte, the earlier
/// sample in the low nibble. An odd number of samples is padded with one zero sample, so the
/// output length is always `4 + samples.len().div_ceil(2)`.
///
/// A single predictor state runs over the whole buffer. Multi-channel input is encoded as
/// one interleaved stream.
pub fn compress_ima_adpcm(samples: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; IMA_ADPCM_HEADER_SIZE + samples.len().div_ceil(2)];
    let mut state = AdpcmImaState::new();
    // header is the initial state: predictor (2 bytes), step index, unused
    out[0..2].copy_from_slice(&state.predictor.to_le_bytes());
    out[2] = state.step_index;
    out[3] = 0;

    let pairs = samples.chunks(2);
    for (b, pair) in out[IMA_ADPCM_HEADER_SIZE..].iter_mut().zip(pairs) {
        let s0 = quantize_sample(pair[0]);
        let s1 = pair.get(1).map_or(0, |s| quantize_sample(*s));
        let nibble0 = encode_adpcm_ima(s0, &mut state);
        let nibble1 = encode_adpcm_ima(s1, &mut state);
        *b = nibble1 << 4 | nibble0;
    }
    out
}

/// Decompresses an IMA ADPCM stream produced by [`compress_ima_adpcm`] to
/// 16-bit signed integer samples.
///
/// The initial state is read from the 4 byte header and the step index is clamped to 0..=88.
/// `sample_count` nibbles are decoded, low nibble first.
///
/// An error is returned if `buf` is shorter than the header plus
/// `sample_count.div_ceil(2)` bytes.
pub fn decompress_ima_adpcm(buf: &[u8], sample_count: usize) -> Result<Vec<i16>, Error> {
    let payload_len = sample_count.div_ceil(2);
    if buf.len() < IMA_ADPCM_HEADER_SIZE || buf.len() - IMA_ADPCM_HEADER_SIZE < payload_len {
        return Err(Error::InvalidBufferSize);
    }
    let mut state = AdpcmImaState {
        predictor: i16::from_le_bytes([ buf[0], buf[1] ]),
        step_index: buf[2].min(88),
    };
    let mut out = Vec::with_capacity(sample_count);
    for b in &buf[IMA_ADPCM_HEADER_SIZE..IMA_ADPCM_HEADER_SIZE + payload_len] {
        out.push(decode_adpcm_ima(*b & 0x0f, &mut state));
        if out.len() == sample_count {
            break;
        }
        out.push(decode_adpcm_ima(*b >> 4, &mut state));
    }
    Ok(out)
}
