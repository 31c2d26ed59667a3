use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde_json::Value;

use crate::types::{
    Furnished, HowTaken, LeaseType, Locale, Neighbourhood, TypeError,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub locale: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn locale(&self) -> Locale {
        self.locale.parse().unwrap_or(Locale::En)
    }
}

/// One posted apartment. Enum-typed columns are stored as text and parsed
/// through the accessors below; the neighbourhood tag set is a JSONB array.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::listings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Listing {
    pub id: i64,
    pub user_id: i64,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub neighbourhoods: Value,
    pub price: Option<f64>,
    pub street: String,
    pub building_number: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub floor: f64,
    pub lease_type: String,
    pub available_from: NaiveDate,
    pub available_to: Option<NaiveDate>,
    pub bedrooms: f64,
    pub square_meter: Option<i32>,
    pub views: i32,
    pub furnished: String,
    pub taken: bool,
    pub taken_at: Option<DateTime<Utc>>,
    pub taken_warning_sent_at: Option<DateTime<Utc>>,
    pub bathrooms: Option<i32>,
    pub access: Option<String>,
    pub kitchen_dining_room: Option<String>,
    pub porch_garden: Option<String>,
    pub succah_porch: bool,
    pub air_conditioning: Option<String>,
    pub apartment_condition: Option<String>,
    pub additional_info: Option<Value>,
    pub has_dud_shemesh: bool,
    pub has_machsan: bool,
    pub has_parking_spot: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Parsed neighbourhood tag set. Unknown tags in stored data are
    /// skipped rather than failing the whole row.
    pub fn neighbourhood_tags(&self) -> Vec<Neighbourhood> {
        self.neighbourhoods
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn lease_type(&self) -> Result<LeaseType, TypeError> {
        self.lease_type.parse()
    }

    pub fn furnished(&self) -> Result<Furnished, TypeError> {
        self.furnished.parse()
    }

    /// Street plus building number, or `None` when both are blank.
    pub fn address(&self) -> Option<String> {
        let street = self.street.trim();
        let building = self
            .building_number
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();

        let address = format!("{} {}", street, building);
        let address = address.trim();

        (!address.is_empty()).then(|| address.to_string())
    }

    /// The free-text description in the given locale, if present.
    pub fn additional_info_text(&self, locale: Locale) -> Option<&str> {
        self.additional_info
            .as_ref()
            .and_then(|info| info.get(locale.as_str()))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The single locale the description was posted in, when the other
    /// slot is still empty and a translation is pending.
    pub fn untranslated_locale(&self) -> Option<Locale> {
        match (
            self.additional_info_text(Locale::En),
            self.additional_info_text(Locale::He),
        ) {
            (Some(_), None) => Some(Locale::En),
            (None, Some(_)) => Some(Locale::He),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::listings)]
pub struct NewListing {
    pub user_id: i64,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub neighbourhoods: Value,
    pub price: Option<f64>,
    pub street: String,
    pub building_number: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub floor: f64,
    pub lease_type: String,
    pub available_from: NaiveDate,
    pub available_to: Option<NaiveDate>,
    pub bedrooms: f64,
    pub square_meter: Option<i32>,
    pub furnished: String,
    pub bathrooms: Option<i32>,
    pub access: Option<String>,
    pub kitchen_dining_room: Option<String>,
    pub porch_garden: Option<String>,
    pub succah_porch: bool,
    pub air_conditioning: Option<String>,
    pub apartment_condition: Option<String>,
    pub additional_info: Option<Value>,
    pub has_dud_shemesh: bool,
    pub has_machsan: bool,
    pub has_parking_spot: bool,
}

/// Immutable-after-creation snapshot of a listing's terminal economics.
/// At most one row per listing; the first taken-or-deleted event wins.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::listing_stats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ListingStat {
    pub id: i64,
    pub listing_id: i64,
    pub lease_type: Option<String>,
    pub neighbourhoods: Option<Value>,
    pub address: Option<String>,
    pub how_taken: Option<String>,
    pub price_advertised: Option<f64>,
    pub price_taken_at: Option<f64>,
    pub date_taken: Option<DateTime<Utc>>,
    pub date_advertised: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingStat {
    pub fn how_taken(&self) -> Option<HowTaken> {
        self.how_taken.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Subscription {
    pub id: i64,
    pub email: String,
    pub user_id: Option<i64>,
    pub filters: Value,
    pub token: String,
    pub subscribed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn filters(&self) -> crate::filters::SubscriptionFilters {
        crate::filters::SubscriptionFilters::from_json(&self.filters)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.unsubscribed_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::pending_subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PendingSubscription {
    pub id: i64,
    pub email: String,
    pub filters: Value,
    pub otp_code: String,
    pub otp_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::streets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Street {
    pub id: i64,
    pub neighbourhood: String,
    pub name_en: String,
    pub name_he: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Street {
    pub fn neighbourhood(&self) -> Result<Neighbourhood, TypeError> {
        self.neighbourhood.parse()
    }

    pub fn localized_name(&self, locale: Locale) -> &str {
        match locale {
            Locale::En => &self.name_en,
            Locale::He => &self.name_he,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing_with(street: &str, building_number: Option<&str>) -> Listing {
        Listing {
            id: 1,
            user_id: 1,
            contact_name: None,
            contact_phone: None,
            neighbourhoods: json!(["Geula"]),
            price: None,
            street: street.to_string(),
            building_number: building_number.map(str::to_string),
            lat: None,
            lon: None,
            floor: 2.0,
            lease_type: "long_term".to_string(),
            available_from: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            available_to: None,
            bedrooms: 3.0,
            square_meter: None,
            views: 0,
            furnished: "not_furnished".to_string(),
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
    fn address_joins_street_and_building_number() {
        let listing = listing_with("הרב שך", Some("12"));
        assert_eq!(listing.address().as_deref(), Some("הרב שך 12"));
    }

    #[test]
    fn address_without_building_number_is_just_the_street() {
        let listing = listing_with("Yoel", None);
        assert_eq!(listing.address().as_deref(), Some("Yoel"));
    }

    #[test]
    fn blank_address_is_none() {
        let listing = listing_with("  ", None);
        assert_eq!(listing.address(), None);
    }

    #[test]
    fn neighbourhood_tags_skip_unknown_values() {
        let mut listing = listing_with("Yoel", None);
        listing.neighbourhoods = json!(["Geula", "Narnia", "Bar Ilan"]);
        assert_eq!(
            listing.neighbourhood_tags(),
            vec![Neighbourhood::Geula, Neighbourhood::BarIlan]
        );
    }

    #[test]
    fn untranslated_locale_detects_the_missing_slot() {
        let mut listing = listing_with("Yoel", None);
        listing.additional_info = Some(json!({ "he": "דירה מרווחת" }));
        assert_eq!(listing.untranslated_locale(), Some(Locale::He));

        listing.additional_info = Some(json!({ "he": "דירה מרווחת", "en": "Spacious flat" }));
        assert_eq!(listing.untranslated_locale(), None);
    }
}
