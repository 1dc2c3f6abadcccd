//! Market intelligence for an MMORPG trading client.
//!
//! Observed listings (vending shops, buying stores, NPC prices, auctions)
//! flow into a [`store::MarketStore`], which keeps the active offers and the
//! price history of every item. Analysis components read that store on
//! demand:
//!
//! - [`analyzer::PriceAnalyzer`] - fair price, prediction, anomaly checks
//! - [`trading::TradingEngine`] - arbitrage and flip discovery, buy/sell advice
//! - [`intel::IntelligenceLayer`] - manipulation and scam alerts, market health
//!
//! Snapshots of the store can be persisted to SQLite with [`loader`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use ro_market_analyzer::analyzer::PriceAnalyzer;
//! use ro_market_analyzer::config::EngineConfig;
//! use ro_market_analyzer::model::{Listing, ListingSource};
//! use ro_market_analyzer::store::MarketStore;
//!
//! let config = EngineConfig::default();
//! let store = Arc::new(MarketStore::with_config(&config.market));
//! let source = ListingSource::PlayerVending;
//! store.record(Listing::try_new(985, "Elunium", 12_000, 3, source, Utc::now()).unwrap());
//!
//! let analyzer = PriceAnalyzer::new(store.clone(), config.analyzer.clone());
//! assert_eq!(analyzer.fair_price(985, 0, &[]), 12_000);
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod intel;
pub mod loader;
pub mod model;
pub mod stats;
pub mod store;
pub mod trading;
pub mod trend;

pub use error::{Error, Result};
