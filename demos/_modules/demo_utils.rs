use contraction_detector::Frame;
use log::LevelFilter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn init_logger() {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Debug)
        .with_colors(true)
        .with_utc_timestamps()
        .init()
        .unwrap();
}

/// Sets `flag` when the user hits Ctrl+C.
pub fn stop_on_ctrlc(flag: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .unwrap();
}

/// Synthetic recording of a beating cell: a bright disc that shrinks once
/// every `period` frames, peaking at `period / 2`, with sensor noise.
pub fn beating_cell(count: usize, period: usize, side: usize) -> Vec<Frame> {
    let mut rng = StdRng::seed_from_u64(0xCE11);
    let mid = (side as f64 - 1.0) / 2.0;
    let relaxed = side as f64 / 3.0;
    (0..count)
        .map(|k| {
            let phase = (k % period) as f64 - (period / 2) as f64;
            let squeeze = (1.0 - phase.abs() / 6.0).max(0.0);
            let radius = relaxed * (1.0 - 0.4 * squeeze);
            Frame::from_fn(side, side, |x, y| {
                let inside = (x as f64 - mid).hypot(y as f64 - mid) <= radius;
                let base: u8 = if inside { 180 } else { 30 };
                base + rng.random_range(0..20)
            })
            .unwrap()
        })
        .collect()
}
