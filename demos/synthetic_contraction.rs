//! Detects the contractions in a synthetic recording of a beating cell.
//!
//! Frames are ingested on a worker thread, which can be cancelled with
//! Ctrl+C. Afterwards, every beat period is analyzed on its own.

use contraction_detector::{
    AnalyzerParams, ContractionAnalyzer, InMemorySource, LevelsetFraction, LoadError,
    OutputOrder, ProducerConfig, SimilarityProducer,
};

#[path = "_modules/demo_utils.rs"]
mod demo_utils;

const FRAMES: usize = 240;
const PERIOD: usize = 60;
const FRAME_PERIOD_S: f64 = 1.0 / 30.0;

fn main() {
    demo_utils::init_logger();

    let mut producer = SimilarityProducer::new("synthetic", ProducerConfig::default());
    producer.on_content_loaded(|e| log::info!("content loaded: {} frames", e.frames));

    let frames = demo_utils::beating_cell(FRAMES, PERIOD, 48);
    let source = InMemorySource::new(frames, FRAME_PERIOD_S).expect("frame period is positive");
    let handle = producer.load_source_in_background(source);
    demo_utils::stop_on_ctrlc(handle.stop_flag());

    handle.wait();
    match handle.join() {
        Ok(n) => log::info!("Loaded {n} frames"),
        Err(LoadError::Cancelled(n)) => {
            log::info!("Cancelled after {n} frames");
            return;
        }
        Err(e) => {
            log::error!("Loading failed: {e}");
            return;
        }
    }

    let mut analyzer = ContractionAnalyzer::new(
        "synthetic",
        AnalyzerParams {
            levelset_fraction: LevelsetFraction::from_percent(15.0).unwrap(),
            ..Default::default()
        },
    );
    analyzer.register_callback(|contractions| {
        for c in contractions {
            println!(
                "contraction: start={} peak={} end={}",
                c.contraction_start.0, c.contraction_peak.0, c.relaxation_end.0
            );
        }
    });

    for start in (0..FRAMES).step_by(PERIOD) {
        if let Err(e) = producer.compute(start, PERIOD) {
            log::error!("Computing frames {start}.. failed: {e}");
            continue;
        }
        let most_different = producer.ordered_input_output(OutputOrder::Descending)[0].clone();
        log::debug!(
            "Least typical frame: {} (score {:.4})",
            most_different.origin,
            most_different.score
        );

        let matrix = producer.matrix().cloned().unwrap_or_default();
        if let Err(e) = analyzer.load(producer.entropies().to_vec(), matrix) {
            log::error!("Invalid analyzer input: {e}");
            continue;
        }
        if let Err(e) = analyzer.find_best() {
            log::error!("Analysis failed: {e}");
        }
    }
}
