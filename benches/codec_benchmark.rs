
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use wav_import_codecs::{AudioParams, CompressMode};

fn test_signal(len: usize) -> Vec<f32> {
    // sawtooth with a period of 100 samples
    (0..len).map(|i| (i % 100) as f32 / 50.0 - 1.0).collect()
}

fn criterion_benchmark(c: &mut Criterion) {

    // quantize
    c.bench_function("quantize_sample", |b| b.iter(|| {
        for i in -1000..=1000 {
            black_box(wav_import_codecs::quantize_sample(black_box(i as f32 / 1000.0)));
        }
    }));

    // adpcm ima
    c.bench_function("encode_adpcm_ima", |b| b.iter(|| {
        let mut state = wav_import_codecs::AdpcmImaState::new();
        for i in -32768..=32767 {
            black_box(
                wav_import_codecs::encode_adpcm_ima(black_box(i), &mut state));
        }
    }));
    let samples = test_signal(44100);
    c.bench_function("compress_ima_adpcm", |b| b.iter(|| {
        black_box(wav_import_codecs::compress_ima_adpcm(black_box(&samples)));
    }));

    // qoa, one second of stereo audio
    let stereo = test_signal(2 * 44100);
    c.bench_function("compress_qoa", |b| b.iter(|| {
        let params = AudioParams { channels: 2, sample_rate: 44100 };
        black_box(wav_import_codecs::compress(black_box(&stereo), params, CompressMode::Qoa))
    }));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
