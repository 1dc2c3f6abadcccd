#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use ro_market_analyzer::analyzer::PriceAnalyzer;
use ro_market_analyzer::config::EngineConfig;
use ro_market_analyzer::intel::IntelligenceLayer;
use ro_market_analyzer::model::{ItemId, Listing, ListingSource};
use ro_market_analyzer::store::MarketStore;
use ro_market_analyzer::trading::TradingEngine;

/// Fully wired engine over an empty store.
pub struct Engine {
    pub store: Arc<MarketStore>,
    pub analyzer: Arc<PriceAnalyzer>,
    pub trading: Arc<TradingEngine>,
    pub intel: IntelligenceLayer,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_store(MarketStore::new())
    }

    pub fn with_store(store: MarketStore) -> Self {
        let config = EngineConfig::default();
        let store = Arc::new(store);
        let analyzer = Arc::new(PriceAnalyzer::new(store.clone(), config.analyzer.clone()));
        let trading = Arc::new(TradingEngine::new(
            store.clone(),
            analyzer.clone(),
            config.trading.clone(),
        ));
        let intel = IntelligenceLayer::new(
            store.clone(),
            analyzer.clone(),
            trading.clone(),
            config.intelligence,
        );
        Self {
            store,
            analyzer,
            trading,
            intel,
        }
    }
}

pub fn listing_at(item_id: ItemId, price: i64, source: ListingSource, hours_ago: i64) -> Listing {
    Listing::try_new(
        item_id,
        format!("Item {item_id}"),
        price,
        1,
        source,
        Utc::now() - Duration::hours(hours_ago),
    )
    .unwrap()
}

pub fn listing(item_id: ItemId, price: i64, hours_ago: i64) -> Listing {
    listing_at(item_id, price, ListingSource::PlayerVending, hours_ago)
}

/// Record `prices` oldest first, spread over the last six days.
pub fn record_series(store: &MarketStore, item_id: ItemId, prices: &[i64]) {
    record_series_with_quantity(store, item_id, prices, 1);
}

pub fn record_series_with_quantity(
    store: &MarketStore,
    item_id: ItemId,
    prices: &[i64],
    quantity: i64,
) {
    let n = prices.len() as i64;
    let step = if n > 1 { 144 / n } else { 1 };
    for (i, &price) in prices.iter().enumerate() {
        let hours_ago = (n - i as i64) * step;
        let l = Listing::try_new(
            item_id,
            format!("Item {item_id}"),
            price,
            quantity,
            ListingSource::PlayerVending,
            Utc::now() - Duration::hours(hours_ago),
        )
        .unwrap();
        store.record(l);
    }
}
