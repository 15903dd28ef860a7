//! Five-number summary of heart-rate samples

use crate::types::HeartRateDistribution;

/// Summarize samples as min / q1 / median / q3 / max.
///
/// Quartiles are picked by index (`s[n/4]`, `s[3n/4]`) rather than
/// interpolated. The median is rounded to one decimal and then kept within
/// `[q1, q3]`, so the summary stays ordered when rounding would cross a
/// neighbouring quartile. Non-finite samples are ignored; no samples yields
/// `None`.
pub fn summarize(samples: &[f64]) -> Option<HeartRateDistribution> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };

    let q1 = sorted[n / 4];
    let q3 = sorted[(3 * n) / 4];

    Some(HeartRateDistribution {
        min: sorted[0],
        q1,
        median: ((median * 10.0).round() / 10.0).clamp(q1, q3),
        q3,
        max: sorted[n - 1],
        count: n,
    })
}
