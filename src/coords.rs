//! Sample → pixel mapping for line charts.

/// Smallest and largest finite sample, or `None` if there are none.
pub fn value_range(samples: &[f64]) -> Option<(f64, f64)> {
    samples
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Map `samples` onto a `width × height` box inset by `padding`.
///
/// - x is evenly spaced: first sample at `padding`, last at `width - padding`.
///   A single sample sits at `padding`.
/// - y maps `[min, max]` onto `[height - padding, padding]` (larger values
///   are higher on screen).
/// - A flat signal uses a range of 1, so every point lands on the bottom
///   edge of the plot area (`height - padding`).
///
/// Non-finite samples map to non-finite y; renderers break the line there.
pub fn map_samples(samples: &[f64], width: f64, height: f64, padding: f64) -> Vec<(f64, f64)> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }
    let chart_w = width - 2.0 * padding;
    let chart_h = height - 2.0 * padding;
    let (min, max) = value_range(samples).unwrap_or((0.0, 0.0));
    let range = if max - min == 0.0 { 1.0 } else { max - min };
    let step = if n > 1 { chart_w / (n - 1) as f64 } else { 0.0 };

    samples
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let x = padding + i as f64 * step;
            let y = padding + chart_h - ((v - min) / range) * chart_h;
            (x, y)
        })
        .collect()
}
