//! Authoritative store of active listings and price history per item.
//!
//! A single `RwLock` guards the item map. Writers (`record`, `cleanup`,
//! `remove_listings`) hold it for one item update at a time; readers clone
//! what they need, so downstream computations always see a consistent
//! history with aggregates that match its samples.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MarketConfig;
use crate::model::{
    HistoryStats, ItemId, Listing, ListingRecord, PriceHistory, PriceSample, PriceSummary,
    TrendLabel,
};
use crate::stats;
use crate::trend::{self, TREND_WINDOW_DAYS};

impl PriceHistory {
    /// Build a history from samples in any order; aggregates and trend are
    /// computed against `now`.
    pub fn from_samples(
        item_id: ItemId,
        name: impl Into<String>,
        mut samples: Vec<PriceSample>,
        now: DateTime<Utc>,
    ) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        let stats = stats::history_stats(&samples);
        let trend = trend::classify(&samples, now);
        Self {
            item_id,
            name: name.into(),
            samples,
            stats,
            trend,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        stats::prices_of(&self.samples)
    }

    pub fn total_quantity(&self) -> u64 {
        self.samples.iter().map(|s| s.quantity as u64).sum()
    }

    /// Copy restricted to samples at or after `now - days`.
    pub fn window(&self, days: i64, now: DateTime<Utc>) -> Option<PriceHistory> {
        let cutoff = now - Duration::days(days);
        let samples: Vec<PriceSample> = self
            .samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .copied()
            .collect();
        if samples.is_empty() {
            return None;
        }
        Some(PriceHistory::from_samples(self.item_id, self.name.clone(), samples, now))
    }

    fn insert(&mut self, sample: PriceSample, now: DateTime<Utc>) {
        let pos = self.samples.partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(pos, sample);
        self.refresh(now);
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        self.stats = stats::history_stats(&self.samples);
        self.trend = trend::classify(&self.samples, now);
    }
}

pub fn summarize<'a, I>(listings: I) -> Option<PriceSummary>
where
    I: IntoIterator<Item = &'a Listing>,
{
    let listings: Vec<&Listing> = listings.into_iter().collect();
    if listings.is_empty() {
        return None;
    }
    let prices: Vec<f64> = listings.iter().map(|l| l.price as f64).collect();

    Some(PriceSummary {
        min: listings.iter().map(|l| l.price).min().unwrap_or(0),
        max: listings.iter().map(|l| l.price).max().unwrap_or(0),
        mean: stats::mean(&prices),
        median: stats::median(&prices),
        listing_count: listings.len(),
        total_quantity: listings.iter().map(|l| l.quantity as u64).sum(),
    })
}

#[derive(Debug, Clone)]
struct ItemMarket {
    listings: Vec<Listing>,
    history: PriceHistory,
}

impl ItemMarket {
    fn empty(item_id: ItemId, name: &str) -> Self {
        Self {
            listings: Vec::new(),
            history: PriceHistory {
                item_id,
                name: name.to_string(),
                samples: Vec::new(),
                stats: HistoryStats::default(),
                trend: TrendLabel::Stable,
            },
        }
    }
}

/// Outcome of [`MarketStore::ingest_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// Serializable image of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub items: Vec<ItemSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub item_id: ItemId,
    pub name: String,
    pub listings: Vec<Listing>,
    pub samples: Vec<PriceSample>,
}

/// Supply/demand ratios derived from the recent history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupplyDemand {
    /// Share of recent daily volume against what is on offer now, 0..=1.
    pub scarcity: f64,
    /// Share of recent observations against the active listing count, 0..=1.
    pub liquidity: f64,
}

impl SupplyDemand {
    pub const NEUTRAL: SupplyDemand = SupplyDemand {
        scarcity: 0.5,
        liquidity: 0.5,
    };
}

/// Source of supply/demand figures for collaborators that price goods.
pub trait MarketMetrics {
    fn supply_demand(&self, item_id: ItemId) -> SupplyDemand;
}

/// Stand-in used when no market data source is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralMetrics;

impl MarketMetrics for NeutralMetrics {
    fn supply_demand(&self, _item_id: ItemId) -> SupplyDemand {
        SupplyDemand::NEUTRAL
    }
}

#[derive(Debug)]
pub struct MarketStore {
    items: RwLock<HashMap<ItemId, ItemMarket>>,
    retention_days: i64,
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketStore {
    pub fn new() -> Self {
        Self::with_config(&MarketConfig::default())
    }

    pub fn with_config(config: &MarketConfig) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            retention_days: config.retention_days,
        }
    }

    /// Rebuild a store from a snapshot, re-sorting samples and recomputing
    /// aggregates.
    pub fn from_snapshot(snapshot: MarketSnapshot, config: &MarketConfig) -> Self {
        let now = Utc::now();
        let mut items = HashMap::with_capacity(snapshot.items.len());

        for item in snapshot.items {
            if item.listings.is_empty() && item.samples.is_empty() {
                continue;
            }
            let mut listings = item.listings;
            listings.sort_by_key(|l| l.observed_at);
            let history = PriceHistory::from_samples(item.item_id, item.name, item.samples, now);
            items.insert(item.item_id, ItemMarket { listings, history });
        }

        debug!(items = items.len(), "market store restored from snapshot");
        Self {
            items: RwLock::new(items),
            retention_days: config.retention_days,
        }
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        let items = self.items.read();
        let mut out: Vec<ItemSnapshot> = items
            .iter()
            .map(|(&item_id, market)| ItemSnapshot {
                item_id,
                name: market.history.name.clone(),
                listings: market.listings.clone(),
                samples: market.history.samples.clone(),
            })
            .collect();
        out.sort_by_key(|i| i.item_id);
        MarketSnapshot { items: out }
    }

    /// Add a listing to the active set and append its price sample.
    pub fn record(&self, listing: Listing) {
        let now = Utc::now();
        let sample = PriceSample {
            timestamp: listing.observed_at,
            price: listing.price,
            quantity: listing.quantity,
        };

        let mut items = self.items.write();
        let market = items
            .entry(listing.item_id)
            .or_insert_with(|| ItemMarket::empty(listing.item_id, &listing.name));

        let pos = market
            .listings
            .partition_point(|l| l.observed_at <= listing.observed_at);
        market.listings.insert(pos, listing);
        market.history.insert(sample, now);

        debug!(
            item_id = market.history.item_id,
            price = sample.price,
            samples = market.history.len(),
            trend = %market.history.trend,
            "listing recorded"
        );
    }

    /// Validate and record a batch, skipping records that fail validation.
    pub fn ingest_batch<I>(&self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = ListingRecord>,
    {
        let mut report = IngestReport::default();
        for record in records {
            let item_id = record.item_id;
            match Listing::try_from(record) {
                Ok(listing) => {
                    self.record(listing);
                    report.accepted += 1;
                }
                Err(e) => {
                    warn!(item_id, error = %e, "skipping malformed listing");
                    report.rejected += 1;
                }
            }
        }
        report
    }

    /// Drop active listings of `item_id` matching `pred`. History is kept.
    pub fn remove_listings<F>(&self, item_id: ItemId, pred: F) -> usize
    where
        F: Fn(&Listing) -> bool,
    {
        let mut items = self.items.write();
        let Some(market) = items.get_mut(&item_id) else {
            return 0;
        };
        let before = market.listings.len();
        market.listings.retain(|l| !pred(l));
        before - market.listings.len()
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.items.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn item_name(&self, item_id: ItemId) -> Option<String> {
        self.items.read().get(&item_id).map(|m| m.history.name.clone())
    }

    pub fn listings(&self, item_id: ItemId) -> Vec<Listing> {
        self.items
            .read()
            .get(&item_id)
            .map(|m| m.listings.clone())
            .unwrap_or_default()
    }

    pub fn listing_count(&self, item_id: ItemId) -> usize {
        self.items.read().get(&item_id).map_or(0, |m| m.listings.len())
    }

    pub fn best_price(&self, item_id: ItemId) -> Option<i64> {
        let items = self.items.read();
        items.get(&item_id)?.listings.iter().map(|l| l.price).min()
    }

    pub fn average_price(&self, item_id: ItemId) -> Option<f64> {
        let items = self.items.read();
        let listings = &items.get(&item_id)?.listings;
        if listings.is_empty() {
            return None;
        }
        Some(listings.iter().map(|l| l.price as f64).sum::<f64>() / listings.len() as f64)
    }

    /// Statistics over the active listings, optionally including carded
    /// equipment.
    pub fn current_price_summary(
        &self,
        item_id: ItemId,
        include_carded: bool,
    ) -> Option<PriceSummary> {
        let items = self.items.read();
        let market = items.get(&item_id)?;
        summarize(
            market
                .listings
                .iter()
                .filter(|l| include_carded || !l.is_carded()),
        )
    }

    /// Full history with aggregates over every retained sample.
    pub fn history(&self, item_id: ItemId) -> Option<PriceHistory> {
        let items = self.items.read();
        let history = &items.get(&item_id)?.history;
        if history.is_empty() {
            return None;
        }
        Some(history.clone())
    }

    /// History limited to the last `window_days`, aggregates recomputed.
    pub fn price_history(&self, item_id: ItemId, window_days: i64) -> Option<PriceHistory> {
        self.price_history_at(item_id, window_days, Utc::now())
    }

    pub fn price_history_at(
        &self,
        item_id: ItemId,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Option<PriceHistory> {
        let items = self.items.read();
        items.get(&item_id)?.history.window(window_days, now)
    }

    pub fn trend(&self, item_id: ItemId) -> TrendLabel {
        self.trend_at(item_id, Utc::now())
    }

    pub fn trend_at(&self, item_id: ItemId, now: DateTime<Utc>) -> TrendLabel {
        let items = self.items.read();
        match items.get(&item_id) {
            Some(m) => trend::classify(&m.history.samples, now),
            None => TrendLabel::Stable,
        }
    }

    /// Delete listings and samples older than `max_age_days`; items left
    /// without either are dropped. Returns the number of records removed.
    pub fn cleanup(&self, max_age_days: i64) -> usize {
        self.cleanup_at(max_age_days, Utc::now())
    }

    pub fn cleanup_at(&self, max_age_days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(max_age_days);
        let mut removed = 0;

        let mut items = self.items.write();
        items.retain(|_, market| {
            let listings_before = market.listings.len();
            market.listings.retain(|l| l.observed_at >= cutoff);

            let samples_before = market.history.samples.len();
            market.history.samples.retain(|s| s.timestamp >= cutoff);
            let samples_removed = samples_before - market.history.samples.len();
            if samples_removed > 0 {
                market.history.refresh(now);
            }

            removed += listings_before - market.listings.len() + samples_removed;
            !(market.listings.is_empty() && market.history.is_empty())
        });

        info!(removed, max_age_days, remaining_items = items.len(), "market cleanup finished");
        removed
    }

    /// Cleanup with the configured retention window.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup(self.retention_days)
    }
}

impl MarketMetrics for MarketStore {
    fn supply_demand(&self, item_id: ItemId) -> SupplyDemand {
        let items = self.items.read();
        let Some(market) = items.get(&item_id) else {
            return SupplyDemand::NEUTRAL;
        };

        let cutoff = Utc::now() - Duration::days(TREND_WINDOW_DAYS);
        let recent: Vec<&PriceSample> = market
            .history
            .samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .collect();
        let active_quantity: u64 = market.listings.iter().map(|l| l.quantity as u64).sum();
        let active_count = market.listings.len() as f64;

        if recent.is_empty() && active_quantity == 0 {
            return SupplyDemand::NEUTRAL;
        }

        let daily_volume =
            recent.iter().map(|s| s.quantity as f64).sum::<f64>() / TREND_WINDOW_DAYS as f64;
        let observations = recent.len() as f64;

        SupplyDemand {
            scarcity: daily_volume / (daily_volume + active_quantity as f64),
            liquidity: observations / (observations + active_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ListingSource;

    fn listing(item_id: ItemId, price: i64, hours_ago: i64) -> Listing {
        Listing::try_new(
            item_id,
            "Elunium",
            price,
            1,
            ListingSource::PlayerVending,
            Utc::now() - Duration::hours(hours_ago),
        )
        .unwrap()
    }

    #[test]
    fn empty_item_has_no_data() {
        let store = MarketStore::new();
        assert_eq!(store.best_price(985), None);
        assert_eq!(store.average_price(985), None);
        assert!(store.current_price_summary(985, false).is_none());
        assert!(store.price_history(985, 30).is_none());
        assert_eq!(store.trend(985), TrendLabel::Stable);
    }

    #[test]
    fn out_of_order_samples_are_kept_sorted() {
        let store = MarketStore::new();
        store.record(listing(985, 300, 1));
        store.record(listing(985, 100, 5));
        store.record(listing(985, 200, 3));

        let history = store.history(985).unwrap();
        let prices: Vec<i64> = history.samples.iter().map(|s| s.price).collect();
        assert_eq!(prices, vec![100, 200, 300]);
        assert_eq!(history.trend, TrendLabel::RisingFast);
    }

    #[test]
    fn carded_listings_are_excluded_by_default() {
        let store = MarketStore::new();
        store.record(listing(2104, 1000, 1));
        store.record(listing(2104, 5000, 1).with_cards(vec![4058]));

        let plain = store.current_price_summary(2104, false).unwrap();
        assert_eq!(plain.listing_count, 1);
        assert_eq!(plain.max, 1000);

        let all = store.current_price_summary(2104, true).unwrap();
        assert_eq!(all.listing_count, 2);
        assert_eq!(all.median, 3000.0);
    }

    #[test]
    fn removal_keeps_history() {
        let store = MarketStore::new();
        store.record(listing(985, 300, 1).with_seller("alice"));
        store.record(listing(985, 320, 1).with_seller("bob"));

        let removed = store.remove_listings(985, |l| l.seller.as_deref() == Some("alice"));
        assert_eq!(removed, 1);
        assert_eq!(store.best_price(985), Some(320));
        assert_eq!(store.history(985).unwrap().len(), 2);
    }

    #[test]
    fn neutral_metrics_without_data() {
        let store = MarketStore::new();
        assert_eq!(store.supply_demand(1), SupplyDemand::NEUTRAL);
        assert_eq!(NeutralMetrics.supply_demand(1), SupplyDemand::NEUTRAL);
    }

    #[test]
    fn supply_demand_from_recent_volume() {
        let store = MarketStore::new();
        for _ in 0..7 {
            store.record(listing(985, 300, 2));
        }
        store.remove_listings(985, |_| true);
        store.record(listing(985, 300, 1));

        // 8 units over 7 days against 1 unit on offer
        let sd = store.supply_demand(985);
        let daily = 8.0 / 7.0;
        assert!((sd.scarcity - daily / (daily + 1.0)).abs() < 1e-9);
        assert!((sd.liquidity - 8.0 / 9.0).abs() < 1e-9);
    }
}
