//!
//! This crate contains the audio compression used when importing WAV files. Supported formats are:
//!  - [IMA ADPCM](https://en.wikipedia.org/wiki/Interactive_Multimedia_Association)
//!  - [QOA, the Quite OK Audio format](https://qoaformat.org/)
//!  - 16-bit PCM (compression disabled)
//!
//! All encoders take interleaved normalized `f32` samples, quantize them to 16 bits and
//! return a byte buffer. [`compress`] validates the input and picks the encoder for a
//! [`CompressMode`].
//!

#![no_std]

#![forbid(
    unsafe_code,
    clippy::panic,
    clippy::exit,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unimplemented,
    clippy::todo,
    clippy::unreachable,
)]
#![deny(
    clippy::cast_ptr_alignment,
    clippy::char_lit_as_u8,
    clippy::unnecessary_cast,
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::checked_conversions,
)]
#![allow(clippy::manual_range_contains)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::cast_possible_truncation,
    clippy::cast_precision_loss, clippy::cast_possible_wrap))]

extern crate alloc;

mod quantize;
pub use quantize::{quantize_sample, quantize_samples};

mod adpcm_ima;
pub use adpcm_ima::{AdpcmImaState, IMA_ADPCM_HEADER_SIZE};
pub use adpcm_ima::{compress_ima_adpcm, decompress_ima_adpcm};
pub use adpcm_ima::{decode_adpcm_ima, encode_adpcm_ima};

pub mod qoa;
pub use qoa::{compress_qoa, decode_qoa, QoaDescriptor, QoaLms};

mod import;
pub use import::{compress, AudioParams, CompressMode};

/// Error values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid number of channels.
    #[error("invalid number of channels")]
    InvalidChannels,

    /// Buffer has an invalid size.
    #[error("buffer has an invalid size")]
    InvalidBufferSize,

    /// Stream or frame header is malformed.
    #[error("invalid header")]
    InvalidHeader,

    /// Sample rate can't be stored in the stream.
    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    /// Unknown compression mode.
    #[error("invalid compression mode {0}")]
    InvalidMode(u32),
}
