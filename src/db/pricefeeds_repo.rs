use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{PriceFeed, PriceFeedId, PricePoint, PricePointId, WeightedSource};

fn row_to_feed(row: &sqlx::postgres::PgRow) -> AppResult<PriceFeed> {
    let sources: serde_json::Value = row.try_get("sources")?;
    Ok(PriceFeed {
        id: PriceFeedId(row.try_get("id")?),
        pair: row.try_get("pair")?,
        sources: serde_json::from_value::<Vec<WeightedSource>>(sources).unwrap_or_default(),
        update_interval_secs: row.try_get::<i64, _>("update_interval_secs")? as u64,
        deviation_threshold: row.try_get("deviation_threshold")?,
        heartbeat_interval_secs: row.try_get::<i64, _>("heartbeat_interval_secs")? as u64,
        contract_address: row.try_get("contract_address")?,
        min_sources: row.try_get::<i32, _>("min_sources")? as usize,
        last_price: row.try_get("last_price")?,
        last_round_id: row.try_get::<i64, _>("last_round_id")? as u64,
        last_on_chain_price: row.try_get("last_on_chain_price")?,
        last_on_chain_publish_at: row.try_get("last_on_chain_publish_at")?,
    })
}

pub async fn create(pool: &PgPool, feed: &PriceFeed) -> AppResult<()> {
    let sources = serde_json::to_value(&feed.sources)?;
    sqlx::query(
        "INSERT INTO price_feeds
         (id, pair, sources, update_interval_secs, deviation_threshold, heartbeat_interval_secs,
          contract_address, min_sources)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(feed.id.0)
    .bind(&feed.pair)
    .bind(sources)
    .bind(feed.update_interval_secs as i64)
    .bind(feed.deviation_threshold)
    .bind(feed.heartbeat_interval_secs as i64)
    .bind(&feed.contract_address)
    .bind(feed.min_sources as i32)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_all(pool: &PgPool) -> AppResult<Vec<PriceFeed>> {
    let rows = sqlx::query("SELECT * FROM price_feeds").fetch_all(pool).await?;
    rows.iter().map(row_to_feed).collect()
}

pub async fn get_by_pair(pool: &PgPool, pair: &str) -> AppResult<PriceFeed> {
    let row = sqlx::query("SELECT * FROM price_feeds WHERE pair = $1")
        .bind(pair)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("price feed"))?;
    row_to_feed(&row)
}

pub async fn record_round(pool: &PgPool, feed_id: PriceFeedId, pair: &str, round_id: u64, price: f64, surviving: usize) -> AppResult<()> {
    sqlx::query(
        "UPDATE price_feeds SET last_price = $1, last_round_id = $2 WHERE id = $3",
    )
    .bind(price)
    .bind(round_id as i64)
    .bind(feed_id.0)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO price_history (id, pair, round_id, price, surviving_sources, timestamp)
         VALUES ($1,$2,$3,$4,$5,$6)",
    )
    .bind(Uuid::new_v4())
    .bind(pair)
    .bind(round_id as i64)
    .bind(price)
    .bind(surviving as i32)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_on_chain_publish(pool: &PgPool, feed_id: PriceFeedId, price: f64) -> AppResult<()> {
    sqlx::query(
        "UPDATE price_feeds SET last_on_chain_price = $1, last_on_chain_publish_at = $2 WHERE id = $3",
    )
    .bind(price)
    .bind(Utc::now())
    .bind(feed_id.0)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn history(pool: &PgPool, pair: &str) -> AppResult<Vec<PricePoint>> {
    let rows = sqlx::query(
        "SELECT * FROM price_history WHERE pair = $1 ORDER BY timestamp DESC LIMIT 500",
    )
    .bind(pair)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(PricePoint {
                id: PricePointId(row.try_get("id")?),
                pair: row.try_get("pair")?,
                round_id: row.try_get::<i64, _>("round_id")? as u64,
                price: row.try_get("price")?,
                surviving_sources: row.try_get::<i32, _>("surviving_sources")? as usize,
                timestamp: row.try_get("timestamp")?,
            })
        })
        .collect()
}
