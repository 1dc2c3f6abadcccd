//! SQLite persistence for market snapshots.
//!
//! Saving replaces the whole database content inside one transaction.
//! Timestamps are stored as milliseconds since the Unix epoch; card lists as
//! JSON arrays.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{Listing, ListingSource, Location, PriceSample};
use crate::store::{ItemSnapshot, MarketSnapshot};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS items (
        id   INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS samples (
        item_id     INTEGER NOT NULL REFERENCES items(id),
        observed_at INTEGER NOT NULL,
        price       INTEGER NOT NULL,
        quantity    INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS listings (
        item_id     INTEGER NOT NULL REFERENCES items(id),
        name        TEXT NOT NULL,
        price       INTEGER NOT NULL,
        quantity    INTEGER NOT NULL,
        refine      INTEGER NOT NULL,
        cards       TEXT NOT NULL,
        source      TEXT NOT NULL,
        seller      TEXT,
        map         TEXT,
        x           INTEGER,
        y           INTEGER,
        observed_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS samples_by_item ON samples(item_id, observed_at);
";

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub fn save_snapshot<P: AsRef<Path>>(db_path: P, snapshot: &MarketSnapshot) -> Result<()> {
    let mut conn = Connection::open(db_path)?;
    conn.execute_batch(SCHEMA)?;

    let tx = conn.transaction()?;
    tx.execute_batch("DELETE FROM listings; DELETE FROM samples; DELETE FROM items;")?;
    {
        let mut item_stmt = tx.prepare("INSERT INTO items (id, name) VALUES (?1, ?2)")?;
        let mut sample_stmt = tx.prepare(
            "INSERT INTO samples (item_id, observed_at, price, quantity) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut listing_stmt = tx.prepare(
            "INSERT INTO listings
                (item_id, name, price, quantity, refine, cards, source, seller,
                 map, x, y, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        for item in &snapshot.items {
            item_stmt.execute(params![item.item_id, item.name])?;

            for s in &item.samples {
                sample_stmt.execute(params![
                    item.item_id,
                    s.timestamp.timestamp_millis(),
                    s.price,
                    s.quantity
                ])?;
            }

            for l in &item.listings {
                let loc = l.location.as_ref();
                listing_stmt.execute(params![
                    l.item_id,
                    l.name,
                    l.price,
                    l.quantity,
                    l.refine,
                    serde_json::to_string(&l.cards)?,
                    l.source.as_str(),
                    l.seller,
                    loc.map(|p| p.map.as_str()),
                    loc.map(|p| p.x),
                    loc.map(|p| p.y),
                    l.observed_at.timestamp_millis(),
                ])?;
            }
        }
    }
    tx.commit()?;

    debug!(items = snapshot.items.len(), "snapshot saved");
    Ok(())
}

pub fn load_snapshot<P: AsRef<Path>>(db_path: P) -> Result<MarketSnapshot> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(SCHEMA)?;

    let mut items: Vec<ItemSnapshot> = {
        let mut stmt = conn.prepare("SELECT id, name FROM items ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(ItemSnapshot {
                item_id: row.get(0)?,
                name: row.get(1)?,
                listings: Vec::new(),
                samples: Vec::new(),
            })
        })?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut samples = conn.prepare(
        "SELECT observed_at, price, quantity FROM samples
         WHERE item_id = ?1
         ORDER BY observed_at",
    )?;
    let mut listings = conn.prepare(
        "SELECT item_id, name, price, quantity, refine, cards, source, seller,
                map, x, y, observed_at
         FROM listings
         WHERE item_id = ?1
         ORDER BY observed_at",
    )?;

    for item in &mut items {
        item.samples = samples
            .query_map([item.item_id], |row| {
                Ok(PriceSample {
                    timestamp: from_millis(row.get(0)?),
                    price: row.get(1)?,
                    quantity: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let rows = listings.query_map([item.item_id], |row| {
            let cards: String = row.get(5)?;
            let source: String = row.get(6)?;
            let map: Option<String> = row.get(8)?;
            let x: Option<i32> = row.get(9)?;
            let y: Option<i32> = row.get(10)?;
            let location = match (map, x, y) {
                (Some(map), Some(x), Some(y)) => Some(Location { map, x, y }),
                _ => None,
            };
            Ok((
                Listing {
                    item_id: row.get(0)?,
                    name: row.get(1)?,
                    price: row.get(2)?,
                    quantity: row.get(3)?,
                    refine: row.get(4)?,
                    cards: Vec::new(),
                    source: ListingSource::PlayerVending,
                    seller: row.get(7)?,
                    location,
                    observed_at: from_millis(row.get(11)?),
                },
                cards,
                source,
            ))
        })?;

        for row in rows {
            let (mut listing, cards, source) = row?;
            let Some(source) = ListingSource::parse(&source) else {
                warn!(item_id = item.item_id, source, "skipping listing with unknown source");
                continue;
            };
            listing.source = source;
            listing.cards = serde_json::from_str(&cards)?;
            item.listings.push(listing);
        }
    }

    debug!(items = items.len(), "snapshot loaded");
    Ok(MarketSnapshot { items })
}
