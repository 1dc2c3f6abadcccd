use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ListingError;

pub type ItemId = i32;

/// Channel a listing was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSource {
    PlayerVending,
    BuyingStore,
    Npc,
    NpcBuy,
    NpcSell,
    Auction,
    DirectTrade,
}

impl ListingSource {
    pub const ALL: [ListingSource; 7] = [
        ListingSource::PlayerVending,
        ListingSource::BuyingStore,
        ListingSource::Npc,
        ListingSource::NpcBuy,
        ListingSource::NpcSell,
        ListingSource::Auction,
        ListingSource::DirectTrade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingSource::PlayerVending => "vending",
            ListingSource::BuyingStore => "buying_store",
            ListingSource::Npc => "npc",
            ListingSource::NpcBuy => "npc_buy",
            ListingSource::NpcSell => "npc_sell",
            ListingSource::Auction => "auction",
            ListingSource::DirectTrade => "trade",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|src| src.as_str() == s)
    }
}

impl fmt::Display for ListingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub map: String,
    pub x: i32,
    pub y: i32,
}

/// One observed offer.
///
/// Built through [`Listing::try_new`], which enforces a non-negative unit
/// price and a positive quantity. A recorded listing is never mutated; the
/// store removes it from the active set instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub item_id: ItemId,
    pub name: String,
    pub price: i64,
    pub quantity: u32,
    pub refine: u8,
    pub cards: Vec<ItemId>,
    pub source: ListingSource,
    pub seller: Option<String>,
    pub location: Option<Location>,
    pub observed_at: DateTime<Utc>,
}

impl Listing {
    pub fn try_new(
        item_id: ItemId,
        name: impl Into<String>,
        price: i64,
        quantity: i64,
        source: ListingSource,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, ListingError> {
        if price < 0 {
            return Err(ListingError::NegativePrice { price });
        }
        if quantity <= 0 {
            return Err(ListingError::NonPositiveQuantity { quantity });
        }
        let quantity =
            u32::try_from(quantity).map_err(|_| ListingError::QuantityTooLarge { quantity })?;

        Ok(Self {
            item_id,
            name: name.into(),
            price,
            quantity,
            refine: 0,
            cards: Vec::new(),
            source,
            seller: None,
            location: None,
            observed_at,
        })
    }

    pub fn with_refine(mut self, refine: u8) -> Self {
        self.refine = refine;
        self
    }

    pub fn with_cards(mut self, cards: Vec<ItemId>) -> Self {
        self.cards = cards;
        self
    }

    pub fn with_seller(mut self, seller: impl Into<String>) -> Self {
        self.seller = Some(seller.into());
        self
    }

    pub fn with_location(mut self, map: impl Into<String>, x: i32, y: i32) -> Self {
        self.location = Some(Location { map: map.into(), x, y });
        self
    }

    pub fn total_price(&self) -> i64 {
        self.price.saturating_mul(self.quantity as i64)
    }

    pub fn is_carded(&self) -> bool {
        !self.cards.is_empty()
    }
}

/// Raw listing shape as handed over by an ingestion collaborator.
///
/// Unlike [`Listing`] this carries unchecked numbers; converting it validates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRecord {
    pub item_id: ItemId,
    pub name: String,
    /// Unit price. When absent the total is split over the quantity.
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub total_price: Option<i64>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub refine: u8,
    #[serde(default)]
    pub cards: Vec<ItemId>,
    pub source: ListingSource,
    #[serde(default)]
    pub seller: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    pub observed_at: DateTime<Utc>,
}

fn default_quantity() -> i64 {
    1
}

impl TryFrom<ListingRecord> for Listing {
    type Error = ListingError;

    fn try_from(r: ListingRecord) -> Result<Self, Self::Error> {
        let price = match (r.price, r.total_price) {
            (Some(p), _) => p,
            (None, Some(total)) if r.quantity > 0 => total / r.quantity,
            (None, Some(total)) => total,
            (None, None) => return Err(ListingError::MissingPrice),
        };

        let mut listing =
            Listing::try_new(r.item_id, r.name, price, r.quantity, r.source, r.observed_at)?
                .with_refine(r.refine)
                .with_cards(r.cards);
        listing.seller = r.seller;
        listing.location = r.location;
        Ok(listing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    RisingFast,
    Rising,
    Stable,
    Falling,
    FallingFast,
    Volatile,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::RisingFast => "rising_fast",
            TrendLabel::Rising => "rising",
            TrendLabel::Stable => "stable",
            TrendLabel::Falling => "falling",
            TrendLabel::FallingFast => "falling_fast",
            TrendLabel::Volatile => "volatile",
        }
    }

    pub fn is_rising(&self) -> bool {
        matches!(self, TrendLabel::Rising | TrendLabel::RisingFast)
    }

    pub fn is_falling(&self) -> bool {
        matches!(self, TrendLabel::Falling | TrendLabel::FallingFast)
    }

    pub fn is_fast(&self) -> bool {
        matches!(self, TrendLabel::RisingFast | TrendLabel::FallingFast)
    }
}

impl fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Aggregates over a set of price samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    /// std_dev / mean, 0 when the mean is 0.
    pub volatility: f64,
}

/// Time-ordered samples for one item plus derived aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub item_id: ItemId,
    pub name: String,
    pub samples: Vec<PriceSample>,
    pub stats: HistoryStats,
    pub trend: TrendLabel,
}

/// Snapshot of the active listings of one item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub median: f64,
    pub listing_count: usize,
    pub total_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOpportunity {
    pub id: u64,
    pub item_id: ItemId,
    pub name: String,
    pub buy_price: i64,
    pub sell_price: i64,
    pub profit: i64,
    pub margin: f64,
    pub risk: f64,
    pub confidence: f64,
    pub buy_source: ListingSource,
    pub sell_source: ListingSource,
    pub expires_at: Option<DateTime<Utc>>,
    pub quantity: u64,
}

impl TradeOpportunity {
    pub fn risk_adjusted_profit(&self) -> f64 {
        self.profit as f64 * (1.0 - self.risk)
    }

    pub fn total_cost(&self) -> i64 {
        self.buy_price.saturating_mul(self.quantity as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Manipulation,
    Scam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAlert {
    pub id: u64,
    pub kind: AlertKind,
    pub item_id: ItemId,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}
