use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use dira_core::models::{Listing, NewListing, Street};
use dira_core::schema::{listings, streets};
use dira_core::types::{
    Access, AirConditioning, ApartmentCondition, Furnished, KitchenDiningRoom, LeaseType, Locale,
    Neighbourhood, PorchGarden,
};
use dira_core::{AppContext, DomainError};
use dira_delivery::geocode::Geocode;
use dira_outbox::jobs::queue_translation;
use dira_subscriptions::notify_subscribers;
use serde_json::json;
use tracing;

pub use crate::stats::TakenReport;
use crate::stats::{record_deleted, record_taken};

const MAX_NEIGHBOURHOODS: usize = 3;

/// The authenticated user performing an operation.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Caller {
    fn owns(&self, listing: &Listing) -> bool {
        self.user_id == listing.user_id
    }

    fn can_manage(&self, listing: &Listing) -> bool {
        self.owns(listing) || self.is_admin
    }
}

/// Validated input for posting a listing. Enum fields arrive already
/// parsed; free text arrives in whichever locale the poster wrote it.
#[derive(Debug, Clone)]
pub struct NewListingInput {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub neighbourhoods: Vec<Neighbourhood>,
    pub price: Option<f64>,
    pub street_id: i64,
    pub building_number: Option<String>,
    pub floor: f64,
    pub lease_type: LeaseType,
    pub available_from: NaiveDate,
    pub available_to: Option<NaiveDate>,
    pub bedrooms: f64,
    pub square_meter: Option<i32>,
    pub furnished: Furnished,
    pub bathrooms: Option<i32>,
    pub access: Option<Access>,
    pub kitchen_dining_room: Option<KitchenDiningRoom>,
    pub porch_garden: Option<PorchGarden>,
    pub succah_porch: bool,
    pub air_conditioning: Option<AirConditioning>,
    pub apartment_condition: Option<ApartmentCondition>,
    pub description: Option<String>,
    pub description_locale: Locale,
    pub has_dud_shemesh: bool,
    pub has_machsan: bool,
    pub has_parking_spot: bool,
}

fn validate_input(input: &NewListingInput) -> Result<(), DomainError> {
    let mut distinct = input.neighbourhoods.clone();
    distinct.sort_by_key(|n| n.as_str());
    distinct.dedup();

    if distinct.is_empty() || distinct.len() > MAX_NEIGHBOURHOODS {
        return Err(DomainError::validation(
            "neighbourhoods",
            format!("between 1 and {} distinct neighbourhoods are required", MAX_NEIGHBOURHOODS),
        ));
    }

    if !(1.0..=10.0).contains(&input.bedrooms) {
        return Err(DomainError::validation("bedrooms", "must be between 1 and 10"));
    }

    if let Some(price) = input.price {
        if price <= 0.0 {
            return Err(DomainError::validation("price", "must be positive"));
        }
    }

    match (input.lease_type, input.available_to) {
        (LeaseType::MediumTerm, None) => {
            return Err(DomainError::validation(
                "available_to",
                "medium-term listings need an end date",
            ));
        }
        (LeaseType::MediumTerm, Some(to)) if to < input.available_from => {
            return Err(DomainError::validation(
                "available_to",
                "must be on or after available_from",
            ));
        }
        _ => {}
    }

    Ok(())
}

/// The end date only means something for a medium-term stay.
fn effective_available_to(lease_type: LeaseType, available_to: Option<NaiveDate>) -> Option<NaiveDate> {
    match lease_type {
        LeaseType::MediumTerm => available_to,
        LeaseType::LongTerm => None,
    }
}

/// Posts a listing: resolve the street, geocode it, insert, then queue a
/// description translation and subscriber notifications.
pub async fn create_listing(
    ctx: &AppContext,
    caller: &Caller,
    input: NewListingInput,
    geocoder: &dyn Geocode,
) -> Result<Listing, DomainError> {
    validate_input(&input)?;

    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let street: Option<Street> = streets::table
        .filter(streets::id.eq(input.street_id))
        .select(Street::as_select())
        .first(&mut conn)
        .await
        .optional()?;

    let street = street
        .filter(|s| !s.name_he.trim().is_empty())
        .ok_or_else(|| DomainError::validation("street", "unknown street"))?;

    // Best-effort; a failed lookup just leaves the pin off the map.
    let coordinates = geocoder
        .geocode(&street.name_he, input.building_number.as_deref())
        .await;

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let additional_info =
        description.map(|text| json!({ input.description_locale.as_str(): text }));

    let new_listing = NewListing {
        user_id: caller.user_id,
        contact_name: input.contact_name.clone(),
        contact_phone: input.contact_phone.clone(),
        neighbourhoods: json!(input.neighbourhoods),
        price: input.price,
        street: street.name_he.clone(),
        building_number: input.building_number.clone(),
        lat: coordinates.map(|c| c.lat),
        lon: coordinates.map(|c| c.lon),
        floor: input.floor,
        lease_type: input.lease_type.as_str().to_string(),
        available_from: input.available_from,
        available_to: effective_available_to(input.lease_type, input.available_to),
        bedrooms: input.bedrooms,
        square_meter: input.square_meter,
        furnished: input.furnished.as_str().to_string(),
        bathrooms: input.bathrooms,
        access: input.access.map(|v| v.as_str().to_string()),
        kitchen_dining_room: input.kitchen_dining_room.map(|v| v.as_str().to_string()),
        porch_garden: input.porch_garden.map(|v| v.as_str().to_string()),
        succah_porch: input.succah_porch,
        air_conditioning: input.air_conditioning.map(|v| v.as_str().to_string()),
        apartment_condition: input.apartment_condition.map(|v| v.as_str().to_string()),
        additional_info,
        has_dud_shemesh: input.has_dud_shemesh,
        has_machsan: input.has_machsan,
        has_parking_spot: input.has_parking_spot,
    };

    let listing = conn
        .transaction::<Listing, DomainError, _>(|conn| {
            async move {
                let listing: Listing = diesel::insert_into(listings::table)
                    .values(&new_listing)
                    .returning(Listing::as_returning())
                    .get_result(conn)
                    .await?;

                if let Some(source_locale) = listing.untranslated_locale() {
                    if let Some(text) = listing.additional_info_text(source_locale) {
                        queue_translation(conn, listing.id, text, source_locale).await?;
                    }
                }

                notify_subscribers(conn, &listing).await?;

                Ok(listing)
            }
            .scope_boxed()
        })
        .await?;

    tracing::info!(listing_id = listing.id, "Listing created");
    Ok(listing)
}

/// Marks a listing as taken. Recording the outcome always happens, so an
/// owner can correct the how-taken report on an already-taken listing.
pub async fn mark_as_taken(
    ctx: &AppContext,
    caller: &Caller,
    listing_id: i64,
    report: TakenReport,
) -> Result<(), DomainError> {
    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let mut listing: Listing = listings::table
        .filter(listings::id.eq(listing_id))
        .select(Listing::as_select())
        .first(&mut conn)
        .await?;

    if !caller.owns(&listing) {
        return Err(DomainError::Forbidden);
    }

    if !listing.taken {
        let now = Utc::now();
        diesel::update(listings::table.filter(listings::id.eq(listing.id)))
            .set((
                listings::taken.eq(true),
                listings::taken_at.eq(Some(now)),
                listings::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;

        listing.taken = true;
        listing.taken_at = Some(now);
    }

    record_taken(&mut conn, &ctx.redis_pool, &listing, &report).await?;

    tracing::info!(listing_id, "Listing marked as taken");
    Ok(())
}

/// Puts a taken listing back on the market. Resetting `created_at` gives
/// the repost a fresh lifecycle clock.
pub async fn repost(ctx: &AppContext, caller: &Caller, listing_id: i64) -> Result<(), DomainError> {
    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let listing: Listing = listings::table
        .filter(listings::id.eq(listing_id))
        .select(Listing::as_select())
        .first(&mut conn)
        .await?;

    if !caller.owns(&listing) {
        return Err(DomainError::Forbidden);
    }

    if !listing.taken {
        return Ok(());
    }

    let now = Utc::now();
    diesel::update(listings::table.filter(listings::id.eq(listing.id)))
        .set((
            listings::taken.eq(false),
            listings::taken_at.eq(None::<chrono::DateTime<Utc>>),
            listings::taken_warning_sent_at.eq(None::<chrono::DateTime<Utc>>),
            listings::created_at.eq(now),
            listings::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;

    tracing::info!(listing_id, "Listing reposted");
    Ok(())
}

/// Deletes a listing, recording its snapshot first.
pub async fn delete_listing(
    ctx: &AppContext,
    caller: &Caller,
    listing_id: i64,
) -> Result<(), DomainError> {
    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let listing: Listing = listings::table
        .filter(listings::id.eq(listing_id))
        .select(Listing::as_select())
        .first(&mut conn)
        .await?;

    if !caller.can_manage(&listing) {
        return Err(DomainError::Forbidden);
    }

    let redis = ctx.redis_pool.clone();
    conn.transaction::<_, DomainError, _>(|conn| {
        async move {
            record_deleted(conn, &redis, &listing).await?;

            diesel::delete(listings::table.filter(listings::id.eq(listing.id)))
                .execute(conn)
                .await?;

            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    tracing::info!(listing_id, "Listing deleted");
    Ok(())
}
