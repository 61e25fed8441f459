
use alloc::vec::Vec;

use log::debug;

use crate::adpcm_ima::compress_ima_adpcm;
use crate::qoa::{compress_qoa, QoaDescriptor, QOA_MAX_CHANNELS};
use crate::quantize::quantize_sample;
use crate::Error;

/// Compression applied to imported audio.
///
/// The discriminants match the importer's `compress/mode` option values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressMode {
    /// No compression, 16-bit signed little-endian PCM.
    Disabled = 0,
    /// IMA ADPCM, 4 bits per sample.
    ImaAdpcm = 1,
    /// Quite OK Audio, 3.2 bits per sample.
    Qoa = 2,
}

impl TryFrom<u32> for CompressMode {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressMode::Disabled),
            1 => Ok(CompressMode::ImaAdpcm),
            2 => Ok(CompressMode::Qoa),
            _ => Err(Error::InvalidMode(value)),
        }
    }
}

/// Format of the interleaved samples passed to [`compress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Compresses interleaved normalized floating point samples with the given mode.
///
/// `samples` must hold a whole number of frames (`samples.len()` divisible by `channels`),
/// `channels` must be in 1..=8 and for QOA the sample rate must be in 1..2^24 and the
/// frame count must fit in 32 bits.
///
/// For [`CompressMode::ImaAdpcm`] all channels share one encoder state,
/// see [`compress_ima_adpcm`].
pub fn compress(samples: &[f32], params: AudioParams, mode: CompressMode)
    -> Result<Vec<u8>, Error> {

    let channels = usize::from(params.channels);
    if channels < 1 || channels > QOA_MAX_CHANNELS {
        return Err(Error::InvalidChannels);
    }
    if samples.len() % channels != 0 {
        return Err(Error::InvalidBufferSize);
    }
    let frames = samples.len() / channels;

    let out = match mode {
        CompressMode::Disabled => {
            let mut out = Vec::with_capacity(samples.len() * 2);
            for s in samples {
                out.extend_from_slice(&quantize_sample(*s).to_le_bytes());
            }
            out
        },
        CompressMode::ImaAdpcm => compress_ima_adpcm(samples),
        CompressMode::Qoa => {
            if params.sample_rate == 0 || params.sample_rate > 0xff_ffff {
                return Err(Error::InvalidSampleRate(params.sample_rate));
            }
            let frames = u32::try_from(frames).map_err(|_| Error::InvalidBufferSize)?;
            let mut desc = QoaDescriptor::new(u32::from(params.channels), params.sample_rate,
                frames);
            compress_qoa(samples, &mut desc)
        },
    };
    debug!("compressed {} frames of {} channel audio with {:?} to {} bytes",
        frames, channels, mode, out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qoa::qoa_encoded_size;
    use alloc::vec;

    const MONO: AudioParams = AudioParams { channels: 1, sample_rate: 44100 };
    const STEREO: AudioParams = AudioParams { channels: 2, sample_rate: 44100 };

    #[test]
    fn test_compress_mode_from_option() {
        assert_eq!(CompressMode::try_from(0).unwrap(), CompressMode::Disabled);
        assert_eq!(CompressMode::try_from(1).unwrap(), CompressMode::ImaAdpcm);
        assert_eq!(CompressMode::try_from(2).unwrap(), CompressMode::Qoa);
        assert!(matches!(CompressMode::try_from(3), Err(Error::InvalidMode(3))));
    }

    #[test]
    fn test_compress_disabled() {
        let out = compress(&[0.0, 1.0, -1.0, 2.0], STEREO, CompressMode::Disabled).unwrap();
        assert_eq!(out, [0x00, 0x00, 0xff, 0x7f, 0x01, 0x80, 0xff, 0x7f]);
    }

    #[test]
    fn test_compress_ima_adpcm() {
        let out = compress(&[0.0, 0.5, -0.5, 1.0], MONO, CompressMode::ImaAdpcm).unwrap();
        assert_eq!(out, [0x00, 0x00, 0x00, 0x00, 0x70, 0x7F]);

        // stereo is encoded as one interleaved stream
        let out = compress(&[0.0, 0.5, -0.5, 1.0], STEREO, CompressMode::ImaAdpcm).unwrap();
        assert_eq!(out, [0x00, 0x00, 0x00, 0x00, 0x70, 0x7F]);
    }

    #[test]
    fn test_compress_qoa() {
        let samples = vec![0.1f32; 2 * 5121];
        let out = compress(&samples, STEREO, CompressMode::Qoa).unwrap();
        assert_eq!(out.len(), qoa_encoded_size(2, 5121));
        assert_eq!(out[4..8], 5121u32.to_be_bytes());
    }

    #[test]
    fn test_compress_invalid_input() {
        let params = AudioParams { channels: 0, sample_rate: 44100 };
        assert!(matches!(compress(&[], params, CompressMode::Disabled),
            Err(Error::InvalidChannels)));

        let params = AudioParams { channels: 9, sample_rate: 44100 };
        assert!(matches!(compress(&[0.0; 9], params, CompressMode::Qoa),
            Err(Error::InvalidChannels)));

        assert!(matches!(compress(&[0.0; 3], STEREO, CompressMode::ImaAdpcm),
            Err(Error::InvalidBufferSize)));

        let params = AudioParams { channels: 1, sample_rate: 0 };
        assert!(matches!(compress(&[0.0], params, CompressMode::Qoa),
            Err(Error::InvalidSampleRate(0))));
        let params = AudioParams { channels: 1, sample_rate: 1 << 24 };
        assert!(matches!(compress(&[0.0], params, CompressMode::Qoa),
            Err(Error::InvalidSampleRate(16777216))));

        // sample rate only matters for QOA
        let params = AudioParams { channels: 1, sample_rate: 0 };
        assert!(compress(&[0.0], params, CompressMode::ImaAdpcm).is_ok());
    }

    #[test]
    fn test_compress_empty() {
        assert!(compress(&[], MONO, CompressMode::Disabled).unwrap().is_empty());
        assert_eq!(compress(&[], MONO, CompressMode::ImaAdpcm).unwrap(), [0, 0, 0, 0]);
        assert_eq!(compress(&[], MONO, CompressMode::Qoa).unwrap(), *b"qoaf\0\0\0\0");
    }
}
