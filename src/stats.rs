use statrs::statistics::Statistics;

use crate::model::{HistoryStats, PriceSample};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.mean()
}

/// Sample standard deviation (n - 1). Zero for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.std_dev()
}

/// Sample variance (n - 1). Zero for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.variance()
}

/// Middle value, averaging the two central values for even counts.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// stdev / mean, 0 when the mean is 0.
pub fn volatility(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(values) / m
}

/// Least-squares slope of value against position in the slice.
pub fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if n < 2.0 {
        return 0.0;
    }

    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for (i, &value) in values.iter().enumerate() {
        let x_diff = i as f64 - x_mean;
        numerator += x_diff * (value - y_mean);
        denominator += x_diff * x_diff;
    }

    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

pub fn prices_of(samples: &[PriceSample]) -> Vec<f64> {
    samples.iter().map(|s| s.price as f64).collect()
}

pub fn history_stats(samples: &[PriceSample]) -> HistoryStats {
    if samples.is_empty() {
        return HistoryStats::default();
    }
    let prices = prices_of(samples);

    HistoryStats {
        min: samples.iter().map(|s| s.price).min().unwrap_or(0),
        max: samples.iter().map(|s| s.price).max().unwrap_or(0),
        mean: mean(&prices),
        median: median(&prices),
        std_dev: std_dev(&prices),
        volatility: volatility(&prices),
    }
}
