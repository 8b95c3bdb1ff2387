use contraction_detector::{
    AnalyzerParams, ContractionAnalyzer, LevelsetFraction, SimilarityMatrix,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn criterion_benchmark(c: &mut Criterion) {
    let n = 500;
    let matrix = helpers::banded_matrix(n);
    let entropies = matrix.entropy_signal();

    let mut analyzer = ContractionAnalyzer::new(
        "bench",
        AnalyzerParams {
            levelset_fraction: LevelsetFraction::try_from(0.1).unwrap(),
            ..Default::default()
        },
    );
    analyzer.load(entropies.clone(), matrix.clone()).unwrap();
    c.bench_function("find_best on 500 frames, ranks memoized", |b| {
        b.iter(|| {
            let _ = black_box(analyzer.find_best().unwrap());
        })
    });

    c.bench_function("load + find_best on 500 frames", |b| {
        b.iter(|| {
            analyzer
                .load(black_box(entropies.clone()), matrix.clone())
                .unwrap();
            let _ = black_box(analyzer.find_best().unwrap());
        })
    });

    let mut smoothing = ContractionAnalyzer::new(
        "bench-smoothing",
        AnalyzerParams {
            levelset_fraction: LevelsetFraction::try_from(0.1).unwrap(),
            smoothing: true,
            ..Default::default()
        },
    );
    smoothing.load(entropies, matrix).unwrap();
    c.bench_function("find_best on 500 frames with Savitzky-Golay", |b| {
        b.iter(|| {
            let _ = black_box(smoothing.find_best().unwrap());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

mod helpers {
    use super::SimilarityMatrix;

    /// Similarity that decays with the distance of two frames in time, with a
    /// periodic dip like a beating cell.
    pub fn banded_matrix(n: usize) -> SimilarityMatrix {
        let rows = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let dip = |k: usize| if k % 50 < 5 { 0.5 } else { 1.0 };
                        let distance = (i as f64 - j as f64).abs() / n as f64;
                        dip(i) * dip(j) * (1.0 - distance)
                    })
                    .collect()
            })
            .collect::<Vec<Vec<f64>>>();
        SimilarityMatrix::from_rows(&rows).unwrap()
    }
}
