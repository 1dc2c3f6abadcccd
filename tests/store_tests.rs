//! Market store behaviour: no-data sentinels, windows, trend and cleanup.

mod support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use ro_market_analyzer::model::{ListingRecord, ListingSource, TrendLabel};
use ro_market_analyzer::store::MarketStore;
use support::{listing, record_series};

#[test]
fn unknown_item_reports_no_data() {
    let store = MarketStore::new();

    assert!(store.current_price_summary(501, false).is_none());
    assert!(store.current_price_summary(501, true).is_none());
    assert_eq!(store.best_price(501), None);
    assert_eq!(store.average_price(501), None);
    assert!(store.price_history(501, 30).is_none());
}

#[test]
fn summary_over_active_listings() {
    let store = MarketStore::new();
    record_series(&store, 607, &[900, 1000, 1100, 1200]);

    let summary = store.current_price_summary(607, false).unwrap();
    assert_eq!(summary.min, 900);
    assert_eq!(summary.max, 1200);
    assert_eq!(summary.mean, 1050.0);
    assert_eq!(summary.median, 1050.0);
    assert_eq!(summary.listing_count, 4);
    assert_eq!(summary.total_quantity, 4);
    assert_eq!(store.best_price(607), Some(900));
    assert_eq!(store.average_price(607), Some(1050.0));
}

#[test]
fn trend_is_stable_below_three_recent_samples() {
    let store = MarketStore::new();
    store.record(listing(607, 100, 2));
    store.record(listing(607, 900, 1));
    assert_eq!(store.trend(607), TrendLabel::Stable);

    // Old samples outside the 7-day window do not count.
    store.record(listing(607, 10, 24 * 10));
    assert_eq!(store.trend(607), TrendLabel::Stable);
}

#[test]
fn trend_is_idempotent_between_records() {
    let store = MarketStore::new();
    record_series(&store, 607, &[1000, 1000, 1000, 1300, 1300, 1300]);

    let first = store.trend(607);
    let second = store.trend(607);
    assert_eq!(first, TrendLabel::RisingFast);
    assert_eq!(first, second);
}

#[test]
fn price_history_window_recomputes_aggregates() {
    let store = MarketStore::new();
    store.record(listing(607, 5000, 24 * 40));
    store.record(listing(607, 1000, 24 * 2));
    store.record(listing(607, 3000, 24));

    let full = store.history(607).unwrap();
    assert_eq!(full.len(), 3);
    assert_eq!(full.stats.max, 5000);

    let recent = store.price_history(607, 30).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent.stats.min, 1000);
    assert_eq!(recent.stats.max, 3000);
    assert_eq!(recent.stats.mean, 2000.0);
    assert_eq!(recent.stats.median, 2000.0);

    assert!(store.price_history(607, 0).is_none());
}

#[test]
fn cleanup_removes_old_records_and_empty_items() {
    let store = MarketStore::new();
    store.record(listing(607, 1000, 24 * 40));
    store.record(listing(608, 2000, 24 * 40));
    store.record(listing(608, 2100, 1));

    let removed = store.cleanup(30);

    // one listing and one sample for each old observation
    assert_eq!(removed, 4);
    assert_eq!(store.item_ids(), vec![608]);
    assert_eq!(store.history(608).unwrap().len(), 1);
    assert_eq!(store.best_price(608), Some(2100));
}

#[test]
fn batch_ingestion_skips_malformed_records() {
    let store = MarketStore::new();
    let now = Utc::now();
    let record = |price: Option<i64>, quantity: i64| ListingRecord {
        item_id: 7539,
        name: "Poring Coin".into(),
        price,
        total_price: None,
        quantity,
        refine: 0,
        cards: vec![],
        source: ListingSource::NpcSell,
        seller: None,
        location: None,
        observed_at: now - Duration::minutes(5),
    };

    let report = store.ingest_batch(vec![
        record(Some(150), 3),
        record(Some(-1), 1),
        record(Some(150), 0),
        record(None, 1),
    ]);

    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 3);
    assert_eq!(store.current_price_summary(7539, false).unwrap().total_quantity, 3);
}

#[test]
fn concurrent_writers_keep_history_ordered() {
    let store = Arc::new(MarketStore::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    store.record(listing(607, 1000 + i, (t * 25 + i) % 150 + 1));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let history = store.history(607).unwrap();
    assert_eq!(history.len(), 200);
    assert!(history.samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(store.listing_count(607), 200);
}
