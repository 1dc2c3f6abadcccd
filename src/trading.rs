//! Opportunity discovery and point-in-time trade decisions.
//!
//! Scans run per item in parallel on the rayon pool; each item is evaluated
//! against its own consistent copy of the store data, and ids are assigned
//! once the combined result is ordered.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analyzer::{MarketVerdict, PriceAnalyzer, HISTORY_WINDOW_DAYS};
use crate::config::TradingConfig;
use crate::error::Error;
use crate::model::{ItemId, Listing, ListingSource, TradeOpportunity};
use crate::store::MarketStore;

const ARBITRAGE_RISK: f64 = 0.2;
const ARBITRAGE_CONFIDENCE: f64 = 0.9;
const ARBITRAGE_TTL_HOURS: i64 = 1;
const FLIP_DISCOUNT: f64 = 0.8;
const FLIP_CONFIDENCE: f64 = 0.7;
const FLIP_RISK_NO_HISTORY: f64 = 0.8;
const LIQUID_LISTING_COUNT: usize = 20;
const MIN_VIABLE_MARGIN: f64 = 0.05;
const MIN_EXPECTED_ROI: f64 = 0.10;
const MIN_FLIP_PROFIT: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeGrade {
    Excellent,
    Good,
    Acceptable,
    Marginal,
    Avoid,
}

impl TradeGrade {
    fn from_margin(margin: f64, risk: f64) -> Self {
        if margin > 0.30 && risk < 0.3 {
            TradeGrade::Excellent
        } else if margin > 0.20 && risk < 0.5 {
            TradeGrade::Good
        } else if margin > 0.10 && risk < 0.5 {
            TradeGrade::Acceptable
        } else if margin > 0.05 {
            TradeGrade::Marginal
        } else {
            TradeGrade::Avoid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeEvaluation {
    pub item_id: ItemId,
    pub buy_price: i64,
    pub fair_price: i64,
    pub profit: i64,
    pub margin: f64,
    pub roi_pct: f64,
    pub risk: f64,
    pub viable: bool,
    pub grade: TradeGrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiEstimate {
    pub item_id: ItemId,
    pub buy_price: i64,
    pub predicted_price: i64,
    pub hold_days: i64,
    pub roi: f64,
    pub confidence: f64,
    pub expected_roi: f64,
    pub recommended: bool,
}

/// Why an item is being bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyPurpose {
    Flip,
    Hold,
    Use,
}

impl FromStr for BuyPurpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flip" => Ok(BuyPurpose::Flip),
            "hold" => Ok(BuyPurpose::Hold),
            "use" => Ok(BuyPurpose::Use),
            other => Err(Error::UnknownPurpose(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyDecision {
    pub approved: bool,
    pub reason: String,
}

impl BuyDecision {
    fn yes(reason: impl Into<String>) -> Self {
        Self { approved: true, reason: reason.into() }
    }

    fn no(reason: impl Into<String>) -> Self {
        Self { approved: false, reason: reason.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellAction {
    Sell,
    Wait,
    Reject,
}

impl fmt::Display for SellAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SellAction::Sell => "sell",
            SellAction::Wait => "wait",
            SellAction::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellDecision {
    pub action: SellAction,
    pub margin: f64,
    pub reason: String,
}

pub struct TradingEngine {
    store: Arc<MarketStore>,
    analyzer: Arc<PriceAnalyzer>,
    config: TradingConfig,
    next_id: AtomicU64,
}

impl TradingEngine {
    pub fn new(
        store: Arc<MarketStore>,
        analyzer: Arc<PriceAnalyzer>,
        config: TradingConfig,
    ) -> Self {
        Self {
            store,
            analyzer,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn analyzer(&self) -> &Arc<PriceAnalyzer> {
        &self.analyzer
    }

    fn assign_ids(&self, opportunities: &mut [TradeOpportunity]) {
        for opp in opportunities {
            opp.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Price gaps for the same item between two source channels.
    pub fn find_arbitrage(&self, min_profit: i64, min_margin: f64) -> Vec<TradeOpportunity> {
        let mut found: Vec<TradeOpportunity> = self
            .store
            .item_ids()
            .into_par_iter()
            .flat_map_iter(|item_id| self.arbitrage_for_item(item_id, min_profit, min_margin))
            .collect();

        self.assign_ids(&mut found);
        debug!(count = found.len(), min_profit, min_margin, "arbitrage scan finished");
        found
    }

    fn arbitrage_for_item(
        &self,
        item_id: ItemId,
        min_profit: i64,
        min_margin: f64,
    ) -> Vec<TradeOpportunity> {
        let listings = self.store.listings(item_id);
        let mut groups: BTreeMap<ListingSource, Vec<&Listing>> = BTreeMap::new();
        for listing in &listings {
            groups.entry(listing.source).or_default().push(listing);
        }
        if groups.len() < 2 {
            return Vec::new();
        }

        let sources: Vec<ListingSource> = groups.keys().copied().collect();
        let expires_at = Utc::now() + Duration::hours(ARBITRAGE_TTL_HOURS);
        let mut out = Vec::new();

        for (i, &a) in sources.iter().enumerate() {
            for &b in &sources[i + 1..] {
                for (buy_src, sell_src) in [(a, b), (b, a)] {
                    let buy_side = &groups[&buy_src];
                    let sell_side = &groups[&sell_src];

                    let Some(buy) = buy_side.iter().min_by_key(|l| l.price) else { continue };
                    let Some(max_sell) = sell_side.iter().map(|l| l.price).max() else { continue };

                    let profit = max_sell - buy.price;
                    let margin = if buy.price > 0 {
                        profit as f64 / buy.price as f64
                    } else {
                        0.0
                    };
                    if profit < min_profit || margin < min_margin {
                        continue;
                    }

                    let buy_qty: u64 = buy_side.iter().map(|l| l.quantity as u64).sum();
                    let sell_qty: u64 = sell_side.iter().map(|l| l.quantity as u64).sum();

                    out.push(TradeOpportunity {
                        id: 0,
                        item_id,
                        name: buy.name.clone(),
                        buy_price: buy.price,
                        sell_price: max_sell,
                        profit,
                        margin,
                        risk: ARBITRAGE_RISK,
                        confidence: ARBITRAGE_CONFIDENCE,
                        buy_source: buy_src,
                        sell_source: sell_src,
                        expires_at: Some(expires_at),
                        quantity: buy_qty.min(sell_qty),
                    });
                }
            }
        }
        out
    }

    /// Single listings priced well below the item's median.
    pub fn find_flips(&self, min_profit: i64, max_risk: f64) -> Vec<TradeOpportunity> {
        let mut found: Vec<TradeOpportunity> = self
            .store
            .item_ids()
            .into_par_iter()
            .flat_map_iter(|item_id| self.flips_for_item(item_id, min_profit, max_risk))
            .collect();

        found.sort_by(|a, b| b.profit.cmp(&a.profit));
        self.assign_ids(&mut found);
        debug!(count = found.len(), min_profit, max_risk, "flip scan finished");
        found
    }

    fn flips_for_item(
        &self,
        item_id: ItemId,
        min_profit: i64,
        max_risk: f64,
    ) -> Vec<TradeOpportunity> {
        let Some(summary) = self.store.current_price_summary(item_id, false) else {
            return Vec::new();
        };
        let median = summary.median;
        let threshold = median * FLIP_DISCOUNT;

        self.store
            .listings(item_id)
            .into_iter()
            .filter(|l| !l.is_carded() && (l.price as f64) < threshold)
            .filter_map(|l| {
                let profit = (median - l.price as f64).floor() as i64;
                if profit < min_profit {
                    return None;
                }
                let risk = self.flip_risk(item_id, l.price);
                if risk > max_risk {
                    return None;
                }
                let margin = if l.price > 0 { profit as f64 / l.price as f64 } else { 0.0 };

                Some(TradeOpportunity {
                    id: 0,
                    item_id,
                    name: l.name,
                    buy_price: l.price,
                    sell_price: median.floor() as i64,
                    profit,
                    margin,
                    risk,
                    confidence: FLIP_CONFIDENCE,
                    buy_source: l.source,
                    sell_source: ListingSource::PlayerVending,
                    expires_at: None,
                    quantity: l.quantity as u64,
                })
            })
            .collect()
    }

    /// Risk of buying at `buy_price` for resale, 0..=1.
    pub fn flip_risk(&self, item_id: ItemId, buy_price: i64) -> f64 {
        let Some(history) = self.store.price_history(item_id, HISTORY_WINDOW_DAYS) else {
            return FLIP_RISK_NO_HISTORY;
        };

        let mut risk = history.stats.volatility;
        if (buy_price as f64) < history.stats.min as f64 * 1.1 {
            risk += 0.2;
        }
        if self.store.listing_count(item_id) > LIQUID_LISTING_COUNT {
            risk *= 0.8;
        }
        risk.clamp(0.0, 1.0)
    }

    pub fn evaluate_trade(&self, item_id: ItemId, buy_price: i64) -> TradeEvaluation {
        let fair_price = self.analyzer.fair_price(item_id, 0, &[]);
        let profit = fair_price - buy_price;
        let margin = if buy_price > 0 {
            profit as f64 / buy_price as f64
        } else {
            0.0
        };
        let risk = self.flip_risk(item_id, buy_price);

        TradeEvaluation {
            item_id,
            buy_price,
            fair_price,
            profit,
            margin,
            roi_pct: margin * 100.0,
            risk,
            viable: profit > 0 && margin > MIN_VIABLE_MARGIN,
            grade: TradeGrade::from_margin(margin, risk),
        }
    }

    /// Return on buying now and selling after `hold_days`, weighted by the
    /// prediction's confidence.
    pub fn calculate_roi(&self, item_id: ItemId, buy_price: i64, hold_days: i64) -> RoiEstimate {
        let prediction = self.analyzer.predict_price(item_id, hold_days);
        let roi = if buy_price > 0 {
            (prediction.predicted_price - buy_price) as f64 / buy_price as f64
        } else {
            0.0
        };
        let expected_roi = roi * prediction.confidence;

        RoiEstimate {
            item_id,
            buy_price,
            predicted_price: prediction.predicted_price,
            hold_days,
            roi,
            confidence: prediction.confidence,
            expected_roi,
            recommended: expected_roi > MIN_EXPECTED_ROI,
        }
    }

    pub fn should_buy(&self, item_id: ItemId, price: i64, purpose: BuyPurpose) -> BuyDecision {
        let Some(cmp) = self.analyzer.compare_to_market(item_id, price) else {
            return BuyDecision::no("no market data");
        };

        match purpose {
            BuyPurpose::Flip => {
                let potential = cmp.median - price as f64;
                let cheap = matches!(
                    cmp.verdict,
                    MarketVerdict::ExcellentBuy | MarketVerdict::GoodBuy
                );
                let reason = format!("{} with {:.0} profit potential", cmp.verdict, potential);
                if cheap && potential > MIN_FLIP_PROFIT {
                    BuyDecision::yes(reason)
                } else {
                    BuyDecision::no(reason)
                }
            }
            BuyPurpose::Hold => {
                let trend = self.store.trend(item_id);
                if trend.is_rising() && cmp.verdict != MarketVerdict::Overpriced {
                    BuyDecision::yes(format!("trend {trend}, price {}", cmp.verdict))
                } else {
                    BuyDecision::no(format!("trend {trend}, price {}", cmp.verdict))
                }
            }
            BuyPurpose::Use => match cmp.verdict {
                MarketVerdict::ExcellentBuy | MarketVerdict::GoodBuy | MarketVerdict::FairPrice => {
                    BuyDecision::yes(cmp.verdict.recommendation())
                }
                _ => BuyDecision::no(cmp.verdict.recommendation()),
            },
        }
    }

    pub fn should_sell(&self, item_id: ItemId, price: i64, holding_price: i64) -> SellDecision {
        let margin = if holding_price > 0 {
            (price - holding_price) as f64 / holding_price as f64
        } else {
            0.0
        };
        let decide = |action, reason: &str| SellDecision {
            action,
            margin,
            reason: reason.to_string(),
        };

        if margin < 0.05 {
            return decide(SellAction::Reject, "margin below 5%");
        }
        if let Some(cmp) = self.analyzer.compare_to_market(item_id, price) {
            if cmp.verdict == MarketVerdict::Overpriced {
                return decide(SellAction::Wait, "asking price is overpriced against the market");
            }
        }

        let trend = self.store.trend(item_id);
        if trend.is_falling() {
            return decide(SellAction::Sell, "market is falling, sell now");
        }
        if trend.is_rising() && margin < 0.20 {
            return decide(SellAction::Wait, "market is rising, hold for a better margin");
        }
        if margin >= 0.15 {
            decide(SellAction::Sell, "margin target reached")
        } else {
            decide(SellAction::Wait, "margin below 15% target")
        }
    }

    /// Arbitrage and flips within `risk_tolerance`, best risk-adjusted profit
    /// first, packed greedily into `budget`. Flips are also capped by the
    /// configured `flip_max_risk`.
    pub fn recommended_trades(&self, budget: i64, risk_tolerance: f64) -> Vec<TradeOpportunity> {
        let mut candidates = self.find_arbitrage(
            self.config.arbitrage_min_profit,
            self.config.arbitrage_min_margin,
        );
        let flip_risk_cap = risk_tolerance.min(self.config.flip_max_risk);
        candidates.extend(self.find_flips(self.config.flip_min_profit, flip_risk_cap));
        candidates.retain(|o| o.risk <= risk_tolerance);
        candidates.sort_by(|a, b| b.risk_adjusted_profit().total_cmp(&a.risk_adjusted_profit()));

        let mut spent = 0i64;
        let mut picked = Vec::new();
        for opp in candidates {
            let cost = opp.total_cost();
            if let Some(total) = spent.checked_add(cost).filter(|&t| t <= budget) {
                spent = total;
                picked.push(opp);
            }
        }
        debug!(picked = picked.len(), spent, budget, "trades recommended");
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_by_margin_and_risk() {
        let cases = [
            (0.35, 0.20, TradeGrade::Excellent),
            (0.35, 0.35, TradeGrade::Good),
            (0.25, 0.20, TradeGrade::Good),
            (0.25, 0.60, TradeGrade::Marginal),
            (0.15, 0.40, TradeGrade::Acceptable),
            (0.15, 0.50, TradeGrade::Marginal),
            (0.08, 0.90, TradeGrade::Marginal),
            (0.05, 0.10, TradeGrade::Avoid),
            (-0.20, 0.00, TradeGrade::Avoid),
        ];
        for (margin, risk, expected) in cases {
            assert_eq!(
                TradeGrade::from_margin(margin, risk),
                expected,
                "margin {margin}, risk {risk}"
            );
        }
    }
}
