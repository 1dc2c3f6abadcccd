//! Market surveillance: manipulation and scam alerts, market health and
//! opportunity digests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::analyzer::{AnomalyReason, PriceAnalyzer, HISTORY_WINDOW_DAYS};
use crate::config::IntelligenceConfig;
use crate::model::{AlertKind, ItemId, Listing, MarketAlert, Severity, TrendLabel};
use crate::stats;
use crate::store::MarketStore;
use crate::trading::TradingEngine;
use crate::trend::TREND_WINDOW_DAYS;

const SPIKE_WINDOW: usize = 5;
/// Samples needed before the spike check has a baseline to compare against.
const SPIKE_MIN_SAMPLES: usize = SPIKE_WINDOW + 2;
const COORDINATION_MIN_SAMPLES: usize = 10;
const SPIKE_RATIO: f64 = 2.0;
const COORDINATION_MIN_LISTINGS: usize = 10;
const COORDINATION_SHARE: f64 = 0.5;
const INVESTMENT_DISCOUNT: f64 = 0.85;
const DIGEST_LIMIT: usize = 10;
const EVENT_MIN_CONFIDENCE: f64 = 0.6;
const EVENT_MIN_CHANGE: f64 = 0.20;
const HOT_MIN_SAMPLES: usize = 5;
const HOT_MIN_VOLUME: u64 = 100;
const UNDERVALUED_RATIO: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentOpportunity {
    pub item_id: ItemId,
    pub name: String,
    pub trend: TrendLabel,
    pub buy_price: i64,
    pub predicted_price: i64,
    pub hold_days: i64,
    pub roi: f64,
    pub expected_roi: f64,
    pub confidence: f64,
    pub risk: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLabel {
    Unknown,
    Unstable,
    Bullish,
    Bearish,
    Stable,
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            HealthLabel::Unknown => "unknown",
            HealthLabel::Unstable => "unstable",
            HealthLabel::Bullish => "bullish",
            HealthLabel::Bearish => "bearish",
            HealthLabel::Stable => "stable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketHealth {
    pub total_items: usize,
    pub rising: usize,
    pub falling: usize,
    pub stable: usize,
    pub volatile: usize,
    pub rising_share: f64,
    pub volatile_share: f64,
    pub health: HealthLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub item_id: ItemId,
    pub name: String,
    pub trend: TrendLabel,
    pub current_price: i64,
    pub predicted_price: i64,
    pub change_pct: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotItem {
    pub item_id: ItemId,
    pub name: String,
    pub trend: TrendLabel,
    pub volume: u64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndervaluedItem {
    pub item_id: ItemId,
    pub name: String,
    pub current_median: f64,
    pub historical_mean: f64,
    pub discount_percent: f64,
}

#[derive(Debug, Default)]
struct AlertLog {
    alerts: Vec<MarketAlert>,
    next_id: u64,
}

pub struct IntelligenceLayer {
    store: Arc<MarketStore>,
    analyzer: Arc<PriceAnalyzer>,
    trading: Arc<TradingEngine>,
    config: IntelligenceConfig,
    log: Mutex<AlertLog>,
}

impl IntelligenceLayer {
    pub fn new(
        store: Arc<MarketStore>,
        analyzer: Arc<PriceAnalyzer>,
        trading: Arc<TradingEngine>,
        config: IntelligenceConfig,
    ) -> Self {
        Self {
            store,
            analyzer,
            trading,
            config,
            log: Mutex::new(AlertLog { alerts: Vec::new(), next_id: 1 }),
        }
    }

    fn raise(
        &self,
        kind: AlertKind,
        item_id: ItemId,
        name: String,
        description: String,
        severity: Severity,
        data: serde_json::Value,
    ) -> MarketAlert {
        let mut log = self.log.lock();
        let alert = MarketAlert {
            id: log.next_id,
            kind,
            item_id,
            name,
            description,
            severity,
            timestamp: Utc::now(),
            data,
        };
        log.next_id += 1;
        log.alerts.push(alert.clone());

        warn!(
            alert_id = alert.id,
            item_id,
            severity = %alert.severity,
            "{}",
            alert.description
        );
        alert
    }

    fn name_of(&self, item_id: ItemId) -> String {
        self.store
            .item_name(item_id)
            .unwrap_or_else(|| format!("item #{item_id}"))
    }

    /// Price spike or coordinated pricing over the last 7 days.
    pub fn detect_manipulation(&self, item_id: ItemId) -> Option<MarketAlert> {
        let history = self.store.price_history(item_id, TREND_WINDOW_DAYS)?;
        if history.len() < SPIKE_MIN_SAMPLES {
            return None;
        }

        let prices = history.prices();
        let split = prices.len() - SPIKE_WINDOW;
        let before = stats::mean(&prices[..split]);
        let after = stats::mean(&prices[split..]);

        if before > 0.0 && after / before >= SPIKE_RATIO {
            let increase = after / before;
            return Some(self.raise(
                AlertKind::Manipulation,
                item_id,
                history.name.clone(),
                format!("{} price spiked {:.1}x within 7 days", history.name, increase),
                Severity::High,
                json!({
                    "before_avg": before,
                    "after_avg": after,
                    "increase_ratio": increase,
                }),
            ));
        }

        if history.len() < COORDINATION_MIN_SAMPLES {
            return None;
        }
        let listings = self.store.listings(item_id);
        if listings.len() <= COORDINATION_MIN_LISTINGS {
            return None;
        }

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for l in &listings {
            *counts.entry(l.price).or_default() += 1;
        }
        let (&price, &count) = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))?;

        let share = count as f64 / listings.len() as f64;
        if share <= COORDINATION_SHARE {
            return None;
        }

        let coordination_pct = share * 100.0;
        Some(self.raise(
            AlertKind::Manipulation,
            item_id,
            history.name.clone(),
            format!(
                "{} has {count} of {} listings at {price} ({coordination_pct:.0}%)",
                history.name,
                listings.len()
            ),
            Severity::Medium,
            json!({
                "coordination_pct": coordination_pct,
                "dominant_price": price,
                "dominant_count": count,
                "listing_count": listings.len(),
            }),
        ))
    }

    /// Flag a listing whose price is a statistical outlier.
    pub fn detect_scam(&self, listing: &Listing) -> Option<MarketAlert> {
        let check = self.analyzer.detect_anomaly(listing.item_id, listing.price);
        if !check.is_anomaly {
            return None;
        }

        let severity = if check.reason == AnomalyReason::TooLow {
            Severity::Critical
        } else {
            Severity::High
        };
        let seller = listing.seller.as_deref().unwrap_or("unknown seller");

        Some(self.raise(
            AlertKind::Scam,
            listing.item_id,
            listing.name.clone(),
            format!(
                "suspicious {} listing by {seller} at {}: {}",
                listing.name, listing.price, check.reason
            ),
            severity,
            json!({
                "price": listing.price,
                "mean": check.mean,
                "std_dev": check.std_dev,
                "z_score": check.z_score,
                "reason": check.reason.as_str(),
                "seller": listing.seller,
            }),
        ))
    }

    /// Rising items with a discounted listing, ranked by confidence-weighted
    /// ROI.
    pub fn identify_investment_opportunities(
        &self,
        budget: i64,
        risk_tolerance: f64,
    ) -> Vec<InvestmentOpportunity> {
        let hold_days = self.config.investment_hold_days;

        let mut found: Vec<InvestmentOpportunity> = self
            .store
            .item_ids()
            .into_par_iter()
            .filter_map(|item_id| {
                let trend = self.store.trend(item_id);
                if !trend.is_rising() {
                    return None;
                }
                let summary = self.store.current_price_summary(item_id, false)?;
                let cheapest = self
                    .store
                    .listings(item_id)
                    .into_iter()
                    .filter(|l| {
                        !l.is_carded() && (l.price as f64) < summary.median * INVESTMENT_DISCOUNT
                    })
                    .min_by_key(|l| l.price)?;

                if cheapest.price > budget {
                    return None;
                }
                let risk = self.trading.flip_risk(item_id, cheapest.price);
                if risk > risk_tolerance {
                    return None;
                }
                let roi = self.trading.calculate_roi(item_id, cheapest.price, hold_days);
                if !roi.recommended {
                    return None;
                }

                Some(InvestmentOpportunity {
                    item_id,
                    name: cheapest.name,
                    trend,
                    buy_price: cheapest.price,
                    predicted_price: roi.predicted_price,
                    hold_days,
                    roi: roi.roi,
                    expected_roi: roi.expected_roi,
                    confidence: roi.confidence,
                    risk,
                })
            })
            .collect();

        found.sort_by(|a, b| b.expected_roi.total_cmp(&a.expected_roi));
        found.truncate(DIGEST_LIMIT);
        found
    }

    pub fn analyze_market_health(&self) -> MarketHealth {
        let mut health = MarketHealth {
            total_items: 0,
            rising: 0,
            falling: 0,
            stable: 0,
            volatile: 0,
            rising_share: 0.0,
            volatile_share: 0.0,
            health: HealthLabel::Unknown,
        };

        for item_id in self.store.item_ids() {
            match self.store.trend(item_id) {
                TrendLabel::Rising | TrendLabel::RisingFast => health.rising += 1,
                TrendLabel::Falling | TrendLabel::FallingFast => health.falling += 1,
                TrendLabel::Stable => health.stable += 1,
                TrendLabel::Volatile => health.volatile += 1,
            }
            health.total_items += 1;
        }
        if health.total_items == 0 {
            return health;
        }

        let total = health.total_items as f64;
        health.rising_share = health.rising as f64 / total;
        health.volatile_share = health.volatile as f64 / total;
        health.health = if health.volatile_share > 0.4 {
            HealthLabel::Unstable
        } else if health.rising_share > 0.6 {
            HealthLabel::Bullish
        } else if health.rising_share < 0.3 {
            HealthLabel::Bearish
        } else {
            HealthLabel::Stable
        };

        info!(
            items = health.total_items,
            rising = health.rising,
            falling = health.falling,
            volatile = health.volatile,
            health = %health.health,
            "market health analyzed"
        );
        health
    }

    /// Large confident moves expected for fast-trending items.
    pub fn predict_market_events(&self, days_ahead: i64) -> Vec<MarketEvent> {
        let mut events: Vec<MarketEvent> = self
            .store
            .item_ids()
            .into_iter()
            .filter_map(|item_id| {
                let trend = self.store.trend(item_id);
                if !trend.is_fast() {
                    return None;
                }
                let prediction = self.analyzer.predict_price(item_id, days_ahead);
                let change_pct = prediction.change_pct();
                if prediction.confidence <= EVENT_MIN_CONFIDENCE
                    || change_pct.abs() <= EVENT_MIN_CHANGE
                {
                    return None;
                }

                Some(MarketEvent {
                    item_id,
                    name: self.name_of(item_id),
                    trend,
                    current_price: prediction.current_price,
                    predicted_price: prediction.predicted_price,
                    change_pct: change_pct * 100.0,
                    confidence: prediction.confidence,
                })
            })
            .collect();

        events.sort_by(|a, b| b.change_pct.abs().total_cmp(&a.change_pct.abs()));
        events.truncate(DIGEST_LIMIT);
        events
    }

    /// Rising items with heavy 7-day volume, busiest first.
    pub fn hot_items(&self, limit: usize) -> Vec<HotItem> {
        let mut hot: Vec<HotItem> = self
            .store
            .item_ids()
            .into_iter()
            .filter_map(|item_id| {
                let history = self.store.price_history(item_id, TREND_WINDOW_DAYS)?;
                let volume = history.total_quantity();
                if history.len() < HOT_MIN_SAMPLES
                    || volume <= HOT_MIN_VOLUME
                    || !history.trend.is_rising()
                {
                    return None;
                }
                Some(HotItem {
                    item_id,
                    name: history.name.clone(),
                    trend: history.trend,
                    volume,
                    sample_count: history.len(),
                })
            })
            .collect();

        hot.sort_by(|a, b| b.volume.cmp(&a.volume));
        hot.truncate(limit);
        hot
    }

    /// Items whose current median sits below 70% of their 30-day mean.
    pub fn undervalued_items(&self, limit: usize) -> Vec<UndervaluedItem> {
        let mut items: Vec<UndervaluedItem> = self
            .store
            .item_ids()
            .into_iter()
            .filter_map(|item_id| {
                let summary = self.store.current_price_summary(item_id, false)?;
                let history = self.store.price_history(item_id, HISTORY_WINDOW_DAYS)?;
                let mean = history.stats.mean;
                if mean <= 0.0 || summary.median >= mean * UNDERVALUED_RATIO {
                    return None;
                }
                Some(UndervaluedItem {
                    item_id,
                    name: history.name.clone(),
                    current_median: summary.median,
                    historical_mean: mean,
                    discount_percent: (1.0 - summary.median / mean) * 100.0,
                })
            })
            .collect();

        items.sort_by(|a, b| b.discount_percent.total_cmp(&a.discount_percent));
        items.truncate(limit);
        items
    }

    /// The latest alerts, or every alert of one severity.
    pub fn recent_alerts(&self, severity: Option<Severity>) -> Vec<MarketAlert> {
        let log = self.log.lock();
        match severity {
            Some(severity) => log
                .alerts
                .iter()
                .filter(|a| a.severity == severity)
                .cloned()
                .collect(),
            None => {
                let skip = log.alerts.len().saturating_sub(self.config.recent_alert_limit);
                log.alerts[skip..].to_vec()
            }
        }
    }

    pub fn clear_old_alerts(&self, hours: i64) -> usize {
        self.clear_alerts_before(Utc::now() - Duration::hours(hours))
    }

    pub fn clear_alerts_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut log = self.log.lock();
        let before = log.alerts.len();
        log.alerts.retain(|a| a.timestamp >= cutoff);
        let removed = before - log.alerts.len();
        if removed > 0 {
            info!(removed, "old alerts cleared");
        }
        removed
    }
}
