/// Arithmetic mean of the samples.
///
/// Callers guarantee `samples` is non-empty.
pub fn average(samples: &[i32]) -> f64 {
    let sum: i64 = samples.iter().map(|&s| i64::from(s)).sum();
    sum as f64 / samples.len() as f64
}

/// Median of the samples, sorting them in place.
///
/// For an even count the lower-middle element is returned, so the result
/// is always one of the collected readings.
pub fn median(samples: &mut [i32]) -> f64 {
    samples.sort_unstable();
    f64::from(samples[(samples.len() - 1) / 2])
}
