use contraction_detector::{Frame, ProducerConfig, SimilarityMatrix, SimilarityProducer};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn criterion_benchmark(c: &mut Criterion) {
    let frames = helpers::noisy_frames(64, 64, 64);
    let refs = frames.iter().collect::<Vec<_>>();

    c.bench_function("similarity matrix of 64 frames (64x64 px)", |b| {
        b.iter(|| SimilarityMatrix::compute(black_box(&refs), 1e-10))
    });

    let matrix = SimilarityMatrix::compute(&refs, 1e-10);
    c.bench_function("entropy signal of a 64x64 matrix", |b| {
        b.iter(|| black_box(&matrix).entropy_signal())
    });

    let mut producer = SimilarityProducer::new("bench", ProducerConfig::default());
    producer.load_frames(frames, 0.04).unwrap();
    c.bench_function("producer: compute all 64 cached frames", |b| {
        b.iter(|| producer.compute(black_box(0), 0).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

mod helpers {
    use super::Frame;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Frames with uniform noise. Similarity scores are close to zero, which
    /// is fine as only the computation time matters.
    pub fn noisy_frames(count: usize, width: usize, height: usize) -> Vec<Frame> {
        let mut rng = StdRng::seed_from_u64(42);
        (0..count)
            .map(|_| Frame::from_fn(width, height, |_, _| rng.random()).unwrap())
            .collect()
    }
}
