//! Ranking of frames by how typical they are, measured as the distance of
//! their signal value to the median of the signal.


/// Returns the median of `signal`. For an even length, this is the mean of
/// the two middle values. Returns `None` for an empty signal.
pub fn median(signal: &[f64]) -> Option<f64> {
    if signal.is_empty() {
        return None;
    }
    let mut sorted = signal.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    };
    Some(median)
}

/// Returns the median of `signal` and the permutation of frame indices
/// sorted by ascending distance to it.
///
/// The sort is stable: frames with the same distance keep their input order.
/// Identical input therefore always yields the identical ranking.
///
/// # Panics
/// If `signal` is empty.
pub fn median_levelsets(signal: &[f64]) -> (f64, Vec<usize>) {
    let median = median(signal).expect("signal must not be empty");
    let mut ranks = (0..signal.len()).collect::<Vec<_>>();
    ranks.sort_by(|&a, &b| {
        let da = (signal[a] - median).abs();
        let db = (signal[b] - median).abs();
        da.total_cmp(&db)
    });
    (median, ranks)
}
