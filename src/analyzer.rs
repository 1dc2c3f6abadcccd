//! Price judgments derived from the market store: fair value, short-term
//! prediction, anomaly checks and market comparisons.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalyzerConfig;
use crate::model::{ItemId, TrendLabel};
use crate::stats;
use crate::store::MarketStore;

pub const HISTORY_WINDOW_DAYS: i64 = 30;
const PREDICTION_MIN_SAMPLES: usize = 7;
const PREDICTION_LOOKBACK: usize = 14;
const ANOMALY_MIN_SAMPLES: usize = 3;
const SEASONAL_WINDOW_DAYS: i64 = 90;
const SEASONAL_MIN_SAMPLES: usize = 30;
const CARD_VALUE_SHARE: f64 = 0.8;
const DEFAULT_REFINE_BONUS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePrediction {
    pub item_id: ItemId,
    pub current_price: i64,
    pub predicted_price: i64,
    pub days_ahead: i64,
    /// Price change per sample over the lookback window.
    pub slope: f64,
    pub confidence: f64,
}

impl PricePrediction {
    pub fn change_pct(&self) -> f64 {
        if self.current_price == 0 {
            return 0.0;
        }
        (self.predicted_price - self.current_price) as f64 / self.current_price as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyReason {
    InsufficientData,
    Normal,
    TooHigh,
    TooLow,
    ExceedsMaximum,
    BelowMinimum,
}

impl AnomalyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyReason::InsufficientData => "insufficient data",
            AnomalyReason::Normal => "normal",
            AnomalyReason::TooHigh => "price too high",
            AnomalyReason::TooLow => "price too low",
            AnomalyReason::ExceedsMaximum => "exceeds maximum",
            AnomalyReason::BelowMinimum => "below minimum",
        }
    }
}

impl fmt::Display for AnomalyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCheck {
    pub is_anomaly: bool,
    pub reason: AnomalyReason,
    pub z_score: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl AnomalyCheck {
    fn insufficient() -> Self {
        Self {
            is_anomaly: false,
            reason: AnomalyReason::InsufficientData,
            z_score: 0.0,
            mean: 0.0,
            std_dev: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketVerdict {
    ExcellentBuy,
    GoodBuy,
    FairPrice,
    AboveMarket,
    Overpriced,
}

impl MarketVerdict {
    fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.90 {
            MarketVerdict::ExcellentBuy
        } else if ratio < 1.0 {
            MarketVerdict::GoodBuy
        } else if ratio < 1.10 {
            MarketVerdict::FairPrice
        } else if ratio < 1.20 {
            MarketVerdict::AboveMarket
        } else {
            MarketVerdict::Overpriced
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketVerdict::ExcellentBuy => "excellent_buy",
            MarketVerdict::GoodBuy => "good_buy",
            MarketVerdict::FairPrice => "fair_price",
            MarketVerdict::AboveMarket => "above_market",
            MarketVerdict::Overpriced => "overpriced",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            MarketVerdict::ExcellentBuy => "well below market, buy",
            MarketVerdict::GoodBuy => "below market, good deal",
            MarketVerdict::FairPrice => "around market price",
            MarketVerdict::AboveMarket => "slightly above market, negotiate",
            MarketVerdict::Overpriced => "overpriced, avoid",
        }
    }
}

impl fmt::Display for MarketVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketComparison {
    pub price: i64,
    pub median: f64,
    pub ratio: f64,
    pub verdict: MarketVerdict,
    pub percentile: f64,
    /// Where `price` sits between the current min and max, 0..=1.
    pub position_in_range: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPattern {
    pub item_id: ItemId,
    /// Mean price per weekday, Monday first.
    pub weekday_means: [Option<f64>; 7],
    /// Mean price per day period: night, morning, afternoon, evening.
    pub period_means: [Option<f64>; 4],
    pub has_pattern: bool,
    pub sample_count: usize,
}

fn bucket_means<const N: usize>(buckets: &[Vec<f64>; N]) -> [Option<f64>; N] {
    std::array::from_fn(|i| {
        let b = &buckets[i];
        (!b.is_empty()).then(|| stats::mean(b))
    })
}

pub struct PriceAnalyzer {
    store: Arc<MarketStore>,
    config: AnalyzerConfig,
    refine_bonus: BTreeMap<u8, f64>,
    trend_multiplier: HashMap<TrendLabel, f64>,
}

impl PriceAnalyzer {
    pub fn new(store: Arc<MarketStore>, config: AnalyzerConfig) -> Self {
        let refine_bonus = BTreeMap::from([
            (1, 0.05),
            (2, 0.10),
            (3, 0.15),
            (4, 0.25),
            (5, 0.40),
            (6, 0.55),
            (7, 0.75),
            (8, 1.00),
            (9, 1.25),
            (10, 1.50),
        ]);
        let trend_multiplier = HashMap::from([
            (TrendLabel::RisingFast, 1.15),
            (TrendLabel::Rising, 1.08),
            (TrendLabel::Stable, 1.0),
            (TrendLabel::Volatile, 1.0),
            (TrendLabel::Falling, 0.92),
            (TrendLabel::FallingFast, 0.85),
        ]);

        Self {
            store,
            config,
            refine_bonus,
            trend_multiplier,
        }
    }

    pub fn store(&self) -> &Arc<MarketStore> {
        &self.store
    }

    /// Fraction of the base price added for a refine level.
    pub fn refine_bonus(&self, refine: u8) -> f64 {
        if refine == 0 {
            return 0.0;
        }
        self.refine_bonus
            .get(&refine)
            .copied()
            .unwrap_or(DEFAULT_REFINE_BONUS)
    }

    pub fn trend_multiplier(&self, trend: TrendLabel) -> f64 {
        self.trend_multiplier.get(&trend).copied().unwrap_or(1.0)
    }

    /// Equilibrium price for an item with the given refine and cards.
    pub fn fair_price(&self, item_id: ItemId, refine: u8, cards: &[ItemId]) -> i64 {
        let base = match self.store.current_price_summary(item_id, false) {
            Some(summary) => summary.median,
            None => {
                warn!(item_id, "no market data for fair price, using 0 as base");
                0.0
            }
        };

        let refine_value = base * self.refine_bonus(refine);
        let card_value: f64 = cards
            .iter()
            .map(|&card| {
                self.store
                    .current_price_summary(card, false)
                    .map_or(0.0, |s| s.median * CARD_VALUE_SHARE)
            })
            .sum();

        let multiplier = self.trend_multiplier(self.store.trend(item_id));
        ((base + refine_value + card_value) * multiplier).floor() as i64
    }

    fn current_median(&self, item_id: ItemId) -> Option<f64> {
        self.store
            .current_price_summary(item_id, false)
            .map(|s| s.median)
    }

    /// Extrapolate the recent trend `days_ahead` steps forward.
    pub fn predict_price(&self, item_id: ItemId, days_ahead: i64) -> PricePrediction {
        let current = self.current_median(item_id);
        let history = self
            .store
            .price_history(item_id, HISTORY_WINDOW_DAYS)
            .filter(|h| h.len() >= PREDICTION_MIN_SAMPLES);

        let Some(history) = history else {
            let current_price = current.unwrap_or(0.0).floor() as i64;
            return PricePrediction {
                item_id,
                current_price,
                predicted_price: current_price,
                days_ahead,
                slope: 0.0,
                confidence: 0.0,
            };
        };

        let prices = history.prices();
        let recent = &prices[prices.len().saturating_sub(PREDICTION_LOOKBACK)..];
        let slope = stats::ols_slope(recent);
        let predicted = stats::mean(recent) + slope * days_ahead as f64;
        let confidence = (1.0 - 2.0 * history.stats.volatility).max(0.0);

        let prediction = PricePrediction {
            item_id,
            current_price: current.unwrap_or(history.stats.mean).floor() as i64,
            predicted_price: predicted.max(0.0).floor() as i64,
            days_ahead,
            slope,
            confidence,
        };
        debug!(item_id, ?prediction, "price predicted");
        prediction
    }

    /// Check `price` against the 30-day distribution.
    pub fn detect_anomaly(&self, item_id: ItemId, price: i64) -> AnomalyCheck {
        let Some(history) = self
            .store
            .price_history(item_id, HISTORY_WINDOW_DAYS)
            .filter(|h| h.len() >= ANOMALY_MIN_SAMPLES)
        else {
            return AnomalyCheck::insufficient();
        };

        let mean = history.stats.mean;
        let std_dev = history.stats.std_dev;
        let price_f = price as f64;
        let z_score = if std_dev > 0.0 {
            (price_f - mean).abs() / std_dev
        } else {
            0.0
        };

        let reason = if z_score > self.config.z_score_threshold {
            if price_f > mean {
                AnomalyReason::TooHigh
            } else {
                AnomalyReason::TooLow
            }
        } else if price_f > mean * self.config.max_price_multiplier {
            AnomalyReason::ExceedsMaximum
        } else if price_f < mean * self.config.min_price_multiplier {
            AnomalyReason::BelowMinimum
        } else {
            AnomalyReason::Normal
        };

        AnomalyCheck {
            is_anomaly: reason != AnomalyReason::Normal,
            reason,
            z_score,
            mean,
            std_dev,
        }
    }

    /// Share of 30-day samples strictly cheaper than `price`.
    pub fn percentile(&self, item_id: ItemId, price: i64) -> f64 {
        match self.store.price_history(item_id, HISTORY_WINDOW_DAYS) {
            Some(history) => {
                let below = history.samples.iter().filter(|s| s.price < price).count();
                below as f64 / history.len() as f64
            }
            None => 0.5,
        }
    }

    pub fn compare_to_market(&self, item_id: ItemId, price: i64) -> Option<MarketComparison> {
        let summary = self.store.current_price_summary(item_id, false)?;

        let ratio = if summary.median > 0.0 {
            price as f64 / summary.median
        } else {
            1.0
        };
        let position_in_range = if summary.max == summary.min {
            0.0
        } else {
            ((price - summary.min) as f64 / (summary.max - summary.min) as f64).clamp(0.0, 1.0)
        };

        Some(MarketComparison {
            price,
            median: summary.median,
            ratio,
            verdict: MarketVerdict::from_ratio(ratio),
            percentile: self.percentile(item_id, price),
            position_in_range,
        })
    }

    /// Weekday and time-of-day price buckets over the last 90 days.
    pub fn seasonal_pattern(&self, item_id: ItemId) -> Option<SeasonalPattern> {
        let history = self
            .store
            .price_history(item_id, SEASONAL_WINDOW_DAYS)
            .filter(|h| h.len() >= SEASONAL_MIN_SAMPLES)?;

        let mut weekdays: [Vec<f64>; 7] = Default::default();
        let mut periods: [Vec<f64>; 4] = Default::default();
        for s in &history.samples {
            let price = s.price as f64;
            weekdays[s.timestamp.weekday().num_days_from_monday() as usize].push(price);
            periods[(s.timestamp.hour() / 6) as usize].push(price);
        }

        let weekday_means = bucket_means(&weekdays);
        let period_means = bucket_means(&periods);

        let observed: Vec<f64> = weekday_means.iter().flatten().copied().collect();
        let overall_variance = stats::variance(&history.prices());
        let has_pattern = stats::variance(&observed) > overall_variance * 0.5;

        Some(SeasonalPattern {
            item_id,
            weekday_means,
            period_means,
            has_pattern,
            sample_count: history.len(),
        })
    }
}
