//! Small numeric helpers shared by the recorder and the optimizer.

/// Arithmetic mean, 0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Median of unsorted values, 0 for an empty slice
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Nearest-rank percentile (`p` in 0..=100) of unsorted values
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let rank = ((p.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Least-squares slope of `ys` against standardized `xs`.
///
/// `xs` are z-scored first so the slope is in units of `y` per standard
/// deviation of `x`. Returns 0 with fewer than two points or constant `xs`.
pub fn standardized_slope(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let xs = &xs[..n];
    let ys = &ys[..n];
    if ys.iter().all(|y| *y == ys[0]) {
        return 0.0;
    }

    let x_mean = mean(xs);
    let variance = xs.iter().map(|x| (x - x_mean).powi(2)).sum::<f64>() / n as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }

    let z: Vec<f64> = xs.iter().map(|x| (x - x_mean) / std_dev).collect();
    let y_mean = mean(ys);
    let num: f64 = z.iter().zip(ys).map(|(z, y)| z * (y - y_mean)).sum();
    let den: f64 = z.iter().map(|z| z * z).sum();
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
