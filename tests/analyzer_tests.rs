//! Price analyzer: fair price, prediction, anomalies and comparisons.

mod support;

use chrono::{Datelike, Duration, TimeZone, Utc, Weekday};
use ro_market_analyzer::analyzer::{AnomalyReason, MarketVerdict};
use ro_market_analyzer::model::{Listing, ListingSource};
use support::{listing, record_series, Engine};

#[test]
fn fair_price_without_data_is_zero() {
    let engine = Engine::new();
    assert_eq!(engine.analyzer.fair_price(1201, 0, &[]), 0);
}

#[test]
fn fair_price_is_monotonic_in_refine_level() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[1000, 1000, 1000]);

    let prices: Vec<i64> = (0..=10).map(|r| engine.analyzer.fair_price(1201, r, &[])).collect();
    assert!(prices.windows(2).all(|w| w[0] <= w[1]), "{prices:?}");
    assert_eq!(prices[0], 1000);
    assert_eq!(prices[10], 2500);
}

#[test]
fn fair_price_adds_card_value() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[1000, 1000, 1000]);
    record_series(&engine.store, 4058, &[10_000, 10_000, 10_000]);

    assert_eq!(engine.analyzer.fair_price(1201, 0, &[4058]), 9000);
    // unknown cards add nothing
    assert_eq!(engine.analyzer.fair_price(1201, 0, &[4999]), 1000);
}

#[test]
fn fair_price_applies_trend_multiplier() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[1000, 1000, 1000, 1300, 1300, 1300]);

    // median 1150, rising fast x1.15
    assert_eq!(engine.analyzer.fair_price(1201, 0, &[]), 1322);
}

#[test]
fn prediction_falls_back_with_few_samples() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[1000, 1100, 1200]);

    let p = engine.analyzer.predict_price(1201, 7);
    assert_eq!(p.confidence, 0.0);
    assert_eq!(p.predicted_price, 1100);
    assert_eq!(p.current_price, 1100);
}

#[test]
fn prediction_extrapolates_linear_series() {
    let engine = Engine::new();
    let prices: Vec<i64> = (0..10).map(|i| 1000 + i * 10).collect();
    record_series(&engine.store, 1201, &prices);

    let p = engine.analyzer.predict_price(1201, 7);
    assert!((1114..=1115).contains(&p.predicted_price), "{p:?}");
    assert!((p.slope - 10.0).abs() < 1e-6);
    assert!(p.confidence > 0.9 && p.confidence < 1.0);
}

#[test]
fn anomaly_needs_three_samples() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[1000, 1000]);

    let check = engine.analyzer.detect_anomaly(1201, 1_000_000);
    assert!(!check.is_anomaly);
    assert_eq!(check.reason, AnomalyReason::InsufficientData);

    engine.store.record(listing(1201, 1000, 1));
    let check = engine.analyzer.detect_anomaly(1201, 1000);
    assert_ne!(check.reason, AnomalyReason::InsufficientData);
}

#[test]
fn price_at_mean_is_normal() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[100, 110, 90, 100]);

    let check = engine.analyzer.detect_anomaly(1201, 100);
    assert!(!check.is_anomaly);
    assert_eq!(check.reason, AnomalyReason::Normal);
    assert_eq!(check.z_score, 0.0);
}

#[test]
fn z_score_flags_direction_and_wins_over_multiplier() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[1000, 1010, 990, 1000, 1005, 995]);

    assert_eq!(engine.analyzer.detect_anomaly(1201, 2000).reason, AnomalyReason::TooHigh);
    assert_eq!(engine.analyzer.detect_anomaly(1201, 500).reason, AnomalyReason::TooLow);
    // above 3x the mean as well, still reported by z-score
    assert_eq!(engine.analyzer.detect_anomaly(1201, 5000).reason, AnomalyReason::TooHigh);
}

#[test]
fn multiplier_bounds_apply_when_z_score_is_small() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[10, 1000, 10, 1000]);

    let high = engine.analyzer.detect_anomaly(1201, 1700);
    assert!(high.z_score <= 3.0);
    assert_eq!(high.reason, AnomalyReason::ExceedsMaximum);

    let low = engine.analyzer.detect_anomaly(1201, 40);
    assert_eq!(low.reason, AnomalyReason::BelowMinimum);
    assert!(low.is_anomaly);
}

#[test]
fn zero_deviation_gives_zero_z_score() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[500, 500, 500]);

    let check = engine.analyzer.detect_anomaly(1201, 600);
    assert_eq!(check.z_score, 0.0);
    assert_eq!(check.reason, AnomalyReason::Normal);
}

#[test]
fn percentile_counts_strictly_cheaper_samples() {
    let engine = Engine::new();
    assert_eq!(engine.analyzer.percentile(1201, 100), 0.5);

    record_series(&engine.store, 1201, &[100, 200, 300, 400]);
    assert_eq!(engine.analyzer.percentile(1201, 250), 0.5);
    assert_eq!(engine.analyzer.percentile(1201, 100), 0.0);
    assert_eq!(engine.analyzer.percentile(1201, 401), 1.0);
}

#[test]
fn market_comparison_buckets() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[1000, 1000, 1000]);

    let verdict = |price| engine.analyzer.compare_to_market(1201, price).unwrap().verdict;
    assert_eq!(verdict(850), MarketVerdict::ExcellentBuy);
    assert_eq!(verdict(950), MarketVerdict::GoodBuy);
    assert_eq!(verdict(1000), MarketVerdict::FairPrice);
    assert_eq!(verdict(1150), MarketVerdict::AboveMarket);
    assert_eq!(verdict(1300), MarketVerdict::Overpriced);

    let cmp = engine.analyzer.compare_to_market(1201, 950).unwrap();
    assert_eq!(cmp.position_in_range, 0.0);
    assert!(engine.analyzer.compare_to_market(9999, 950).is_none());
}

#[test]
fn position_in_range_between_min_and_max() {
    let engine = Engine::new();
    record_series(&engine.store, 1201, &[800, 1000, 1200]);

    let cmp = engine.analyzer.compare_to_market(1201, 1100).unwrap();
    assert_eq!(cmp.position_in_range, 0.75);
    assert_eq!(cmp.ratio, 1.1);
}

fn record_daily(engine: &Engine, item_id: i32, days: i64, price_for: impl Fn(Weekday) -> i64) {
    let today = Utc::now().date_naive();
    for d in 1..=days {
        let date = today - Duration::days(d);
        let ts = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap());
        let price = price_for(date.weekday());
        let source = ListingSource::PlayerVending;
        let l = Listing::try_new(item_id, "Old Card Album", price, 1, source, ts).unwrap();
        engine.store.record(l);
    }
}

#[test]
fn seasonal_pattern_needs_thirty_samples() {
    let engine = Engine::new();
    record_daily(&engine, 616, 20, |_| 1000);
    assert!(engine.analyzer.seasonal_pattern(616).is_none());
}

#[test]
fn weekend_premium_is_a_pattern() {
    let engine = Engine::new();
    record_daily(&engine, 616, 35, |day| match day {
        Weekday::Sat | Weekday::Sun => 2000,
        _ => 1000,
    });

    let pattern = engine.analyzer.seasonal_pattern(616).unwrap();
    assert!(pattern.has_pattern);
    assert_eq!(pattern.sample_count, 35);
    assert_eq!(pattern.weekday_means[5], Some(2000.0));
    assert_eq!(pattern.weekday_means[0], Some(1000.0));
    // every sample is at noon
    assert!(pattern.period_means[2].is_some());
    assert!(pattern.period_means[0].is_none());
}

#[test]
fn flat_prices_have_no_pattern() {
    let engine = Engine::new();
    record_daily(&engine, 616, 35, |_| 1000);

    let pattern = engine.analyzer.seasonal_pattern(616).unwrap();
    assert!(!pattern.has_pattern);
}
