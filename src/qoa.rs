//! QOA ("Quite OK Audio") encoder and decoder.
//!
//! Stream layout (all values big endian):
//!
//! ```text
//! stream header   u32 magic "qoaf", u32 samples per channel
//! frame header    u8 channels, u24 sample rate, u16 samples per channel, u16 frame size
//! lms state       per channel: 4 x i16 history, 4 x i16 weights
//! slices          per 20 samples, per channel: u4 scale factor, 20 x u3 residuals
//! ```
//!
//! A frame holds up to 256 slices per channel (5120 samples per channel).

#[cfg(feature = "internal-no-panic")]
use no_panic::no_panic;

use alloc::vec;
use alloc::vec::Vec;

use log::trace;

use crate::quantize::quantize_samples;
use crate::Error;

pub const QOA_SLICE_LEN: usize = 20;
pub const QOA_SLICES_PER_FRAME: usize = 256;
pub const QOA_FRAME_LEN: usize = QOA_SLICES_PER_FRAME * QOA_SLICE_LEN;
pub const QOA_LMS_LEN: usize = 4;
pub const QOA_MAX_CHANNELS: usize = 8;
pub const QOA_MAGIC: u32 = u32::from_be_bytes(*b"qoaf");

/// Size of the stream header.
pub const QOA_HEADER_SIZE: usize = 8;
/// Size of the header in front of each frame.
pub const QOA_FRAME_HEADER_SIZE: usize = 8;
/// Size of one channel's LMS state dump in a frame.
pub const QOA_LMS_STATE_SIZE: usize = QOA_LMS_LEN * 4;

const QOA_QUANT_TABLE: &[u8; 17] = &[
    7, 7, 7, 5, 5, 3, 3, 1, // -8..-1
    0,                      //  0
    0, 2, 2, 4, 4, 6, 6, 6  //  1.. 8
];

// 65536 / scalefactor, rounded up
const QOA_RECIPROCAL_TABLE: &[i32; 16] = &[
    65536, 9363, 3121, 1457, 781, 475, 311, 216, 156, 117, 90, 71, 57, 47, 39, 32
];

// scalefactor(s) * { 0.75, -0.75, 2.5, -2.5, 4.5, -4.5, 7, -7 }, rounded
// with scalefactor(s) = round(pow(s + 1, 2.75))
const QOA_DEQUANT_TABLE: &[[i32; 8]; 16] = &[
    [   1,    -1,    3,    -3,    5,    -5,     7,     -7],
    [   5,    -5,   18,   -18,   32,   -32,    49,    -49],
    [  16,   -16,   53,   -53,   95,   -95,   147,   -147],
    [  34,   -34,  113,  -113,  203,  -203,   315,   -315],
    [  63,   -63,  210,  -210,  378,  -378,   588,   -588],
    [ 104,  -104,  345,  -345,  621,  -621,   966,   -966],
    [ 158,  -158,  528,  -528,  950,  -950,  1477,  -1477],
    [ 228,  -228,  760,  -760, 1368, -1368,  2128,  -2128],
    [ 316,  -316, 1053, -1053, 1895, -1895,  2947,  -2947],
    [ 422,  -422, 1405, -1405, 2529, -2529,  3934,  -3934],
    [ 548,  -548, 1828, -1828, 3290, -3290,  5117,  -5117],
    [ 696,  -696, 2320, -2320, 4176, -4176,  6496,  -6496],
    [ 868,  -868, 2893, -2893, 5207, -5207,  8099,  -8099],
    [1064, -1064, 3548, -3548, 6386, -6386,  9933,  -9933],
    [1286, -1286, 4288, -4288, 7718, -7718, 12005, -12005],
    [1536, -1536, 5120, -5120, 9216, -9216, 14336, -14336],
];

/// Per-channel LMS (least mean squares) predictor state.
///
/// The values are kept as i32 while encoding and are written to the stream as 16-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QoaLms {
    pub history: [i32; QOA_LMS_LEN],
    pub weights: [i32; QOA_LMS_LEN],
}

impl QoaLms {
    /// Initial predictor: zero history and weights biased towards `2 * s[-1] - s[-2]`.
    pub const fn new() -> QoaLms {
        QoaLms {
            history: [0; QOA_LMS_LEN],
            weights: [0, 0, -(1 << 13), 1 << 14],
        }
    }

    #[cfg_attr(feature = "internal-no-panic", no_panic)]
    #[inline(always)]
    pub fn predict(&self) -> i32 {
        let mut prediction: i32 = 0;
        for (w, h) in self.weights.iter().zip(&self.history) {
            prediction = prediction.wrapping_add(w.wrapping_mul(*h));
        }
        prediction >> 13
    }

    /// Nudges the weights by the sign of each history value and pushes `sample` to history.
    #[cfg_attr(feature = "internal-no-panic", no_panic)]
    #[inline(always)]
    pub fn update(&mut self, sample: i32, residual: i32) {
        let delta = residual >> 4;
        for (w, h) in self.weights.iter_mut().zip(&self.history) {
            *w = if *h < 0 { w.wrapping_sub(delta) } else { w.wrapping_add(delta) };
        }
        self.history.copy_within(1.., 0);
        self.history[QOA_LMS_LEN - 1] = sample;
    }

    fn weights_penalty(&self) -> i64 {
        let power: i64 = self.weights.iter().map(|w| i64::from(*w) * i64::from(*w)).sum();
        ((power >> 18) - 0x8ff).max(0)
    }
}

impl Default for QoaLms {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream parameters and the running per-channel predictor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QoaDescriptor {
    pub channels: u32,
    pub sample_rate: u32,
    /// Samples per channel.
    pub samples: u32,
    pub lms: [QoaLms; QOA_MAX_CHANNELS],
}

impl QoaDescriptor {
    pub fn new(channels: u32, sample_rate: u32, samples: u32) -> QoaDescriptor {
        QoaDescriptor {
            channels,
            sample_rate,
            samples,
            lms: [QoaLms::new(); QOA_MAX_CHANNELS],
        }
    }

    fn channel_count(&self) -> usize {
        usize::try_from(self.channels).unwrap_or(usize::MAX)
    }
}

#[cfg_attr(feature = "internal-no-panic", no_panic)]
#[inline(always)]
fn clamp_i16(v: i32) -> i32 {
    v.clamp(-32768, 32767)
}

/// Divides `v` by the scale factor using the reciprocal table, rounding away from zero.
#[inline(always)]
fn qoa_div(v: i32, scalefactor: usize) -> i32 {
    let reciprocal = QOA_RECIPROCAL_TABLE[scalefactor];
    let n = (v.wrapping_mul(reciprocal).wrapping_add(1 << 15)) >> 16;
    n + (v.signum() - n.signum())
}

fn write_u64(out: &mut [u8], pos: &mut usize, value: u64) {
    out[*pos..*pos + 8].copy_from_slice(&value.to_be_bytes());
    *pos += 8;
}

fn read_u64(buf: &[u8], pos: &mut usize) -> Result<u64, Error> {
    let bytes = buf.get(*pos..*pos + 8).ok_or(Error::InvalidBufferSize)?;
    let mut value = [0u8; 8];
    value.copy_from_slice(bytes);
    *pos += 8;
    Ok(u64::from_be_bytes(value))
}

/// Returns the size of a frame holding `slices` slices per channel.
pub fn qoa_frame_size(channels: usize, slices: usize) -> usize {
    QOA_FRAME_HEADER_SIZE + QOA_LMS_STATE_SIZE * channels + 8 * slices * channels
}

/// Returns the exact number of bytes [`compress_qoa`] produces for `samples` samples
/// per channel.
pub fn qoa_encoded_size(channels: usize, samples: usize) -> usize {
    let frames = samples.div_ceil(QOA_FRAME_LEN);
    let slices = samples.div_ceil(QOA_SLICE_LEN);
    QOA_HEADER_SIZE
        + frames * (QOA_LMS_STATE_SIZE * channels + QOA_FRAME_HEADER_SIZE)
        + slices * 8 * channels
}

/// Writes the 8 byte stream header (magic and sample count) to `out`.
///
/// Returns the number of bytes written. `out` must hold at least 8 bytes.
pub fn encode_qoa_header(desc: &QoaDescriptor, out: &mut [u8]) -> usize {
    let mut pos = 0;
    write_u64(out, &mut pos, (u64::from(QOA_MAGIC) << 32) | u64::from(desc.samples));
    pos
}

/// Encodes one frame of interleaved samples to `out`.
///
/// `desc.channels` must be in 1..=8 and `desc.sample_rate` must be below 2^24, the header
/// stores them in 8 and 24 bits. `samples` must hold `frame_len * channels` samples and
/// `frame_len` must be at most [`QOA_FRAME_LEN`]. The LMS state stored in `desc` is written to the frame and updated
/// while encoding, so consecutive frames must be encoded with the same descriptor.
///
/// Each slice tries all 16 scale factors, starting from the one used by the previous
/// slice of the channel, and keeps the one with the lowest squared error.
/// Returns the number of bytes written, which is
/// `qoa_frame_size(channels, frame_len.div_ceil(20))`.
pub fn encode_qoa_frame(samples: &[i16], desc: &mut QoaDescriptor, frame_len: usize,
    out: &mut [u8]) -> usize {

    let channels = desc.channel_count();
    let slices = frame_len.div_ceil(QOA_SLICE_LEN);
    let frame_size = qoa_frame_size(channels, slices);
    let mut prev_scalefactor = [0usize; QOA_MAX_CHANNELS];
    let mut pos = 0;

    // frame header: channels, sample rate, samples per channel, frame size
    let header = u64::from(desc.channels) << 56
        | u64::from(desc.sample_rate) << 32
        | (frame_len as u64) << 16
        | frame_size as u64;
    write_u64(out, &mut pos, header);

    for lms in &desc.lms[..channels] {
        let mut history: u64 = 0;
        let mut weights: u64 = 0;
        for i in 0..QOA_LMS_LEN {
            #[allow(clippy::cast_sign_loss)] // only the low 16 bits are kept
            {
            history = (history << 16) | (lms.history[i] as u64 & 0xffff);
            weights = (weights << 16) | (lms.weights[i] as u64 & 0xffff);
            }
        }
        write_u64(out, &mut pos, history);
        write_u64(out, &mut pos, weights);
    }

    for sample_index in (0..frame_len).step_by(QOA_SLICE_LEN) {
        for c in 0..channels {
            let slice_len = QOA_SLICE_LEN.min(frame_len - sample_index);
            let slice_start = sample_index * channels + c;
            let slice_end = (sample_index + slice_len) * channels + c;

            let mut best_rank = u64::MAX;
            let mut best_slice = 0u64;
            let mut best_lms = desc.lms[c];
            let mut best_scalefactor = 0;

            for sfi in 0..16 {
                // start at the previous slice's scale factor
                let scalefactor = (sfi + prev_scalefactor[c]) % 16;
                let mut lms = desc.lms[c];
                let mut slice = scalefactor as u64;
                let mut current_rank: u64 = 0;

                for si in (slice_start..slice_end).step_by(channels) {
                    let sample = i32::from(samples[si]);
                    let predicted = lms.predict();

                    let residual = sample.wrapping_sub(predicted);
                    let scaled = qoa_div(residual, scalefactor);
                    let clamped = scaled.clamp(-8, 8);
                    #[allow(clippy::cast_sign_loss)] // clamped + 8 is in 0..=16
                    let quantized = QOA_QUANT_TABLE[(clamped + 8) as usize];
                    let dequantized = QOA_DEQUANT_TABLE[scalefactor][usize::from(quantized)];
                    let reconstructed = clamp_i16(predicted.wrapping_add(dequantized));

                    let error = i64::from(sample - reconstructed);
                    let weights_penalty = lms.weights_penalty();
                    #[allow(clippy::cast_sign_loss)] // squares are never negative
                    {
                    current_rank = current_rank.saturating_add(
                        (error * error + weights_penalty * weights_penalty) as u64);
                    }
                    if current_rank > best_rank {
                        break;
                    }

                    lms.update(reconstructed, dequantized);
                    slice = (slice << 3) | u64::from(quantized);
                }

                if current_rank < best_rank {
                    best_rank = current_rank;
                    best_slice = slice;
                    best_lms = lms;
                    best_scalefactor = scalefactor;
                }
            }

            prev_scalefactor[c] = best_scalefactor;
            desc.lms[c] = best_lms;

            // a short last slice is left aligned, unused residuals are zero
            best_slice <<= (QOA_SLICE_LEN - slice_len) * 3;
            write_u64(out, &mut pos, best_slice);
        }
    }
    pos
}

/// Compresses interleaved normalized floating point samples to a QOA stream.
///
/// `desc.channels`, `desc.sample_rate` and `desc.samples` (samples per channel) describe the
/// input and must already be validated by the caller: `channels` must be in 1..=8 and
/// `samples` must hold at least `desc.samples * desc.channels` values.
/// The LMS state of every channel is reset before encoding and holds the final predictor
/// state afterwards.
///
/// The output is allocated once with [`qoa_encoded_size`] bytes.
pub fn compress_qoa(samples: &[f32], desc: &mut QoaDescriptor) -> Vec<u8> {
    let channels = desc.channel_count();
    let total = usize::try_from(desc.samples).unwrap_or(usize::MAX);

    for lms in &mut desc.lms[..channels] {
        *lms = QoaLms::new();
    }

    let mut out = vec![0u8; qoa_encoded_size(channels, total)];
    let mut data16 = vec![0i16; QOA_FRAME_LEN * channels];

    let mut pos = encode_qoa_header(desc, &mut out);
    let mut s = 0;
    while s < total {
        let frame_len = QOA_FRAME_LEN.min(total - s);
        let chunk = &samples[s * channels..(s + frame_len) * channels];
        quantize_samples(chunk, &mut data16);
        pos += encode_qoa_frame(&data16[..frame_len * channels], desc, frame_len,
            &mut out[pos..]);
        trace!("qoa frame at sample {} encoded, {} samples per channel", s, frame_len);
        s += frame_len;
    }
    debug_assert_eq!(pos, out.len());
    out
}

/// Decodes a QOA stream to interleaved 16-bit signed integer samples.
///
/// The returned descriptor holds the stream parameters and the LMS state after the last frame.
///
/// An error is returned if the stream is truncated, doesn't start with the QOA magic, has
/// frames with an invalid or inconsistent header or has more than 8 channels.
pub fn decode_qoa(buf: &[u8]) -> Result<(QoaDescriptor, Vec<i16>), Error> {
    let mut pos = 0;
    let file_header = read_u64(buf, &mut pos)?;
    #[allow(clippy::cast_possible_truncation)] // values are masked to 32 bits
    let (magic, samples) = ((file_header >> 32) as u32, (file_header & 0xffff_ffff) as u32);
    if magic != QOA_MAGIC {
        return Err(Error::InvalidHeader);
    }

    let mut desc = QoaDescriptor::new(0, 0, samples);
    let total = usize::try_from(samples).map_err(|_| Error::InvalidBufferSize)?;
    let mut out: Vec<i16> = Vec::new();
    let mut sample_index = 0;

    while sample_index < total {
        let frame_start = pos;
        let frame_header = read_u64(buf, &mut pos)?;
        #[allow(clippy::cast_possible_truncation)] // values are masked to their field sizes
        let (channels, sample_rate, frame_len, frame_size) = (
            (frame_header >> 56) as u32,
            ((frame_header >> 32) & 0xff_ffff) as u32,
            ((frame_header >> 16) & 0xffff) as usize,
            (frame_header & 0xffff) as usize,
        );
        if channels == 0 || sample_rate == 0 || frame_len == 0 {
            return Err(Error::InvalidHeader);
        }
        let ch = usize::try_from(channels).map_err(|_| Error::InvalidChannels)?;
        if ch > QOA_MAX_CHANNELS {
            return Err(Error::InvalidChannels);
        }
        if desc.channels == 0 {
            desc.channels = channels;
            desc.sample_rate = sample_rate;
            // a slice carries at most 20 samples, don't trust the header beyond that
            out.reserve(total.saturating_mul(ch).min(buf.len() / 8 * QOA_SLICE_LEN));
        } else if desc.channels != channels || desc.sample_rate != sample_rate {
            return Err(Error::InvalidHeader);
        }
        let lms_end = QOA_FRAME_HEADER_SIZE + QOA_LMS_STATE_SIZE * ch;
        if frame_size < lms_end {
            return Err(Error::InvalidHeader);
        }
        let slices = (frame_size - lms_end) / 8 / ch;
        if frame_len > slices * QOA_SLICE_LEN || frame_len > total - sample_index {
            return Err(Error::InvalidHeader);
        }
        if buf.len() < frame_start + frame_size {
            return Err(Error::InvalidBufferSize);
        }

        for lms in &mut desc.lms[..ch] {
            let mut history = read_u64(buf, &mut pos)?;
            let mut weights = read_u64(buf, &mut pos)?;
            for i in 0..QOA_LMS_LEN {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                {
                lms.history[i] = i32::from((history >> 48) as i16);
                lms.weights[i] = i32::from((weights >> 48) as i16);
                }
                history <<= 16;
                weights <<= 16;
            }
        }

        let frame_out = out.len();
        out.resize(frame_out + frame_len * ch, 0);
        for slice_index in (0..frame_len).step_by(QOA_SLICE_LEN) {
            for c in 0..ch {
                let mut slice = read_u64(buf, &mut pos)?;
                #[allow(clippy::cast_possible_truncation)] // 4 bits remain after the shift
                let scalefactor = (slice >> 60) as usize;
                slice <<= 4;
                let slice_start = frame_out + slice_index * ch + c;
                let slice_end = frame_out + (slice_index + QOA_SLICE_LEN).min(frame_len) * ch + c;
                for si in (slice_start..slice_end).step_by(ch) {
                    let predicted = desc.lms[c].predict();
                    #[allow(clippy::cast_possible_truncation)] // 3 bits remain after the shift
                    let quantized = (slice >> 61) as usize;
                    let dequantized = QOA_DEQUANT_TABLE[scalefactor][quantized];
                    let reconstructed = clamp_i16(predicted.wrapping_add(dequantized));
                    #[allow(clippy::cast_possible_truncation)] // value is clamped to i16
                    {
                    out[si] = reconstructed as i16;
                    }
                    slice <<= 3;
                    desc.lms[c].update(reconstructed, dequantized);
                }
            }
        }
        pos = frame_start + frame_size;
        sample_index += frame_len;
    }
    Ok((desc, out))
}
