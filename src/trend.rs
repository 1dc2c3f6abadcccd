//! Trend classification over the recent sample window.
//!
//! The classifier is an ordered list of rules evaluated first-match-wins.
//! Directional rules sit ahead of the volatility rule, so a series that moves
//! strongly in one direction is reported as moving even when it is noisy.

use chrono::{DateTime, Duration, Utc};

use crate::model::{PriceSample, TrendLabel};
use crate::stats;

pub const TREND_WINDOW_DAYS: i64 = 7;
pub const MIN_TREND_SAMPLES: usize = 3;

const FAST_CHANGE: f64 = 0.15;
const CHANGE: f64 = 0.05;
const VOLATILE_RATIO: f64 = 0.30;

/// Measurements the rules are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendInputs {
    pub sample_count: usize,
    pub change_pct: f64,
    pub volatility: f64,
}

pub struct TrendRule {
    pub label: TrendLabel,
    pub matches: fn(&TrendInputs) -> bool,
}

fn rising_fast(t: &TrendInputs) -> bool {
    t.change_pct > FAST_CHANGE
}

fn rising(t: &TrendInputs) -> bool {
    t.change_pct > CHANGE
}

fn falling_fast(t: &TrendInputs) -> bool {
    t.change_pct < -FAST_CHANGE
}

fn falling(t: &TrendInputs) -> bool {
    t.change_pct < -CHANGE
}

fn volatile(t: &TrendInputs) -> bool {
    t.sample_count > 1 && t.volatility > VOLATILE_RATIO
}

/// Evaluated in order; the first matching rule decides the label.
pub const RULES: [TrendRule; 5] = [
    TrendRule {
        label: TrendLabel::RisingFast,
        matches: rising_fast,
    },
    TrendRule {
        label: TrendLabel::Rising,
        matches: rising,
    },
    TrendRule {
        label: TrendLabel::FallingFast,
        matches: falling_fast,
    },
    TrendRule {
        label: TrendLabel::Falling,
        matches: falling,
    },
    TrendRule {
        label: TrendLabel::Volatile,
        matches: volatile,
    },
];

pub fn evaluate(inputs: &TrendInputs) -> TrendLabel {
    RULES
        .iter()
        .find(|rule| (rule.matches)(inputs))
        .map(|rule| rule.label)
        .unwrap_or(TrendLabel::Stable)
}

/// Sizes of the leading and trailing slices for a window of `n` samples.
///
/// The leading slice takes `n / 3` samples and the trailing slice
/// `ceil(n / 3)`, matching floor division of a negated count.
pub fn third_sizes(n: usize) -> (usize, usize) {
    (n / 3, n.div_ceil(3))
}

/// Measure a chronologically ordered window.
pub fn measure(prices: &[f64]) -> Option<TrendInputs> {
    let n = prices.len();
    if n < MIN_TREND_SAMPLES {
        return None;
    }

    let (head, tail) = third_sizes(n);
    let first_mean = stats::mean(&prices[..head]);
    let last_mean = stats::mean(&prices[n - tail..]);

    let change_pct = if first_mean == 0.0 {
        0.0
    } else {
        (last_mean - first_mean) / first_mean
    };

    Some(TrendInputs {
        sample_count: n,
        change_pct,
        volatility: stats::volatility(prices),
    })
}

/// Label for the samples that fall in the 7 days before `now`.
///
/// `samples` must be ordered by timestamp.
pub fn classify(samples: &[PriceSample], now: DateTime<Utc>) -> TrendLabel {
    let cutoff = now - Duration::days(TREND_WINDOW_DAYS);
    let window: Vec<f64> = samples
        .iter()
        .filter(|s| s.timestamp >= cutoff)
        .map(|s| s.price as f64)
        .collect();

    match measure(&window) {
        Some(inputs) => evaluate(&inputs),
        None => TrendLabel::Stable,
    }
}
