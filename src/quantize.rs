
#[cfg(feature = "internal-no-panic")]
use no_panic::no_panic;

/// Converts a normalized floating point sample to a linear 16-bit signed integer sample value.
///
/// The sample is scaled by 32767, rounded half away from zero and saturated to
/// -32768..=32767. Values outside -1.0..=1.0 are clipped, NaN becomes 0.
#[cfg_attr(feature = "internal-no-panic", no_panic)]
#[inline(always)]
pub fn quantize_sample(sample: f32) -> i16 {
    let scaled = f64::from(sample) * 32767.0;
    // `as` saturates at the i32 bounds and maps NaN to 0
    #[allow(clippy::cast_possible_truncation)] // fraction is dropped after rounding
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5) as i32
    } else {
        (scaled - 0.5) as i32
    };
    #[allow(clippy::cast_possible_truncation)] // value is clamped so truncation never happens
    let quantized = rounded.clamp(-32768, 32767) as i16;
    quantized
}

/// Quantizes `input` to `out` element-wise with [`quantize_sample`].
///
/// Only `min(input.len(), out.len())` samples are converted, the rest of `out` is left as is.
pub fn quantize_samples(input: &[f32], out: &mut [i16]) {
    for (o, s) in out.iter_mut().zip(input) {
        *o = quantize_sample(*s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_sample() {
        assert_eq!(quantize_sample(0.0), 0);
        assert_eq!(quantize_sample(1.0), 32767);
        assert_eq!(quantize_sample(-1.0), -32767);
        // 0.5 * 32767 = 16383.5 is rounded away from zero
        assert_eq!(quantize_sample(0.5), 16384);
        assert_eq!(quantize_sample(-0.5), -16384);
        assert_eq!(quantize_sample(0.25), 8192);
        // one LSB
        assert_eq!(quantize_sample(1.0 / 32767.0), 1);
    }

    #[test]
    fn test_quantize_sample_saturates() {
        assert_eq!(quantize_sample(1.5), 32767);
        assert_eq!(quantize_sample(-1.5), -32768);
        assert_eq!(quantize_sample(f32::MAX), 32767);
        assert_eq!(quantize_sample(f32::MIN), -32768);
        assert_eq!(quantize_sample(f32::INFINITY), 32767);
        assert_eq!(quantize_sample(f32::NEG_INFINITY), -32768);
        assert_eq!(quantize_sample(f32::NAN), 0);
    }

    #[test]
    fn test_quantize_samples() {
        let mut out = [7i16; 4];
        quantize_samples(&[1.0, -1.0, 0.0], &mut out);
        assert_eq!(out, [32767, -32767, 0, 7]);

        let mut out = [0i16; 2];
        quantize_samples(&[0.5, 0.5, 0.5], &mut out);
        assert_eq!(out, [16384, 16384]);
    }
}
