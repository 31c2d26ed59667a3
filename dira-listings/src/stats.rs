use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use dira_core::cache::{self, RedisPool};
use dira_core::models::Listing;
use dira_core::schema::listing_stats;
use dira_core::types::HowTaken;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing;

const COMMUNITY_STATS_KEY: &str = "home:community_stats";
const COMMUNITY_STATS_TTL_SECS: u64 = 3600;

/// What the owner reported when marking the listing as taken.
#[derive(Debug, Clone, Default)]
pub struct TakenReport {
    pub how_taken: Option<HowTaken>,
    pub price_taken_at: Option<f64>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = listing_stats)]
struct StatSnapshot {
    listing_id: i64,
    lease_type: Option<String>,
    neighbourhoods: Option<Value>,
    address: Option<String>,
    how_taken: Option<String>,
    price_advertised: Option<f64>,
    price_taken_at: Option<f64>,
    date_taken: Option<DateTime<Utc>>,
    date_advertised: Option<DateTime<Utc>>,
}

/// Captures the listing's market-facing fields as they are right now.
fn base_snapshot(listing: &Listing) -> StatSnapshot {
    let neighbourhoods = listing
        .neighbourhoods
        .as_array()
        .filter(|a| !a.is_empty())
        .map(|_| listing.neighbourhoods.clone());

    StatSnapshot {
        listing_id: listing.id,
        lease_type: Some(listing.lease_type.clone()),
        neighbourhoods,
        address: listing.address(),
        how_taken: None,
        price_advertised: listing.price,
        price_taken_at: None,
        date_taken: None,
        date_advertised: Some(listing.created_at),
    }
}

/// Records (or re-records) that a listing was taken. The taken event owns
/// the stat row, so it overwrites anything a prior delete wrote.
pub async fn record_taken(
    conn: &mut AsyncPgConnection,
    redis: &RedisPool,
    listing: &Listing,
    report: &TakenReport,
) -> Result<()> {
    let mut snapshot = base_snapshot(listing);
    snapshot.how_taken = report.how_taken.map(|h| h.as_str().to_string());
    snapshot.price_taken_at = report.price_taken_at;
    snapshot.date_taken = Some(listing.taken_at.unwrap_or_else(Utc::now));

    diesel::insert_into(listing_stats::table)
        .values(&snapshot)
        .on_conflict(listing_stats::listing_id)
        .do_update()
        .set((
            listing_stats::lease_type.eq(excluded(listing_stats::lease_type)),
            listing_stats::neighbourhoods.eq(excluded(listing_stats::neighbourhoods)),
            listing_stats::address.eq(excluded(listing_stats::address)),
            listing_stats::how_taken.eq(excluded(listing_stats::how_taken)),
            listing_stats::price_advertised.eq(excluded(listing_stats::price_advertised)),
            listing_stats::price_taken_at.eq(excluded(listing_stats::price_taken_at)),
            listing_stats::date_taken.eq(excluded(listing_stats::date_taken)),
            listing_stats::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

    invalidate_community_stats(redis).await;
    Ok(())
}

/// Records a deletion, but only if no stat row exists yet. A listing
/// that was marked taken and later deleted keeps its taken snapshot.
pub async fn record_deleted(
    conn: &mut AsyncPgConnection,
    redis: &RedisPool,
    listing: &Listing,
) -> Result<()> {
    let snapshot = base_snapshot(listing);

    diesel::insert_into(listing_stats::table)
        .values(&snapshot)
        .on_conflict(listing_stats::listing_id)
        .do_nothing()
        .execute(conn)
        .await?;

    invalidate_community_stats(redis).await;
    Ok(())
}

async fn invalidate_community_stats(redis: &RedisPool) {
    if let Err(e) = cache::forget(redis, &[COMMUNITY_STATS_KEY]).await {
        tracing::warn!("Failed to invalidate community stats cache: {}", e);
    }
}

/// Home-page counters: how many listings were taken through the site,
/// and the fees those owners did not pay an agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommunityStats {
    pub taken_via_site: i64,
    pub money_saved: f64,
}

/// Computes the counters, serving from Redis for up to an hour.
pub async fn community_stats(
    conn: &mut AsyncPgConnection,
    redis: &RedisPool,
) -> Result<CommunityStats> {
    if let Ok(Some(cached)) = cache::get(redis, COMMUNITY_STATS_KEY).await {
        if let Ok(stats) = serde_json::from_str(&cached) {
            return Ok(stats);
        }
    }

    let rows: Vec<(Option<f64>, Option<f64>)> = listing_stats::table
        .filter(listing_stats::how_taken.eq(HowTaken::Tivuchfree.as_str()))
        .select((listing_stats::price_taken_at, listing_stats::price_advertised))
        .load(conn)
        .await?;

    let taken_via_site = rows.len() as i64;
    // One month's rent per taken listing, preferring the final price.
    let money_saved = rows
        .iter()
        .filter_map(|(taken_at, advertised)| taken_at.or(*advertised))
        .sum();

    let stats = CommunityStats {
        taken_via_site,
        money_saved,
    };

    if let Ok(serialized) = serde_json::to_string(&stats) {
        if let Err(e) = cache::put(redis, COMMUNITY_STATS_KEY, &serialized, COMMUNITY_STATS_TTL_SECS).await {
            tracing::warn!("Failed to cache community stats: {}", e);
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn listing() -> Listing {
        Listing {
            id: 9,
            user_id: 1,
            contact_name: None,
            contact_phone: None,
            neighbourhoods: json!(["Romema"]),
            price: Some(4200.0),
            street: "Yirmiyahu".to_string(),
            building_number: Some("12".to_string()),
            lat: None,
            lon: None,
            floor: 1.0,
            lease_type: "long_term".to_string(),
            available_from: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            available_to: None,
            bedrooms: 2.5,
            square_meter: None,
            views: 0,
            furnished: "partially_furnished".to_string(),
            taken: false,
            taken_at: None,
            taken_warning_sent_at: None,
            bathrooms: None,
            access: None,
            kitchen_dining_room: None,
            porch_garden: None,
            succah_porch: false,
            air_conditioning: None,
            apartment_condition: None,
            additional_info: None,
            has_dud_shemesh: false,
            has_machsan: false,
            has_parking_spot: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_captures_market_fields() {
        let listing = listing();
        let snapshot = base_snapshot(&listing);

        assert_eq!(snapshot.listing_id, 9);
        assert_eq!(snapshot.lease_type.as_deref(), Some("long_term"));
        assert_eq!(snapshot.address.as_deref(), Some("Yirmiyahu 12"));
        assert_eq!(snapshot.price_advertised, Some(4200.0));
        assert_eq!(snapshot.neighbourhoods, Some(json!(["Romema"])));
        assert_eq!(snapshot.date_advertised, Some(listing.created_at));
        assert_eq!(snapshot.how_taken, None);
        assert_eq!(snapshot.date_taken, None);
    }

    #[test]
    fn snapshot_with_no_neighbourhoods_stores_null() {
        let mut listing = listing();
        listing.neighbourhoods = json!([]);
        assert_eq!(base_snapshot(&listing).neighbourhoods, None);
    }
}
