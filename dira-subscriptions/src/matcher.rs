use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use dira_core::models::{Listing, Subscription};
use dira_core::schema::subscriptions;
use dira_core::types::LeaseType;
use dira_core::SubscriptionFilters;

/// Whether a listing satisfies a subscription's filter set.
///
/// Every filter is an independent AND-ed predicate; an absent filter
/// always passes. A listing whose stored enum column fails to parse does
/// not match a filter on that column.
pub fn listing_matches_filters(listing: &Listing, filters: &SubscriptionFilters) -> bool {
    if !filters.neighbourhoods.is_empty() {
        let tags = listing.neighbourhood_tags();
        if !filters.neighbourhoods.iter().any(|n| tags.contains(n)) {
            return false;
        }
    }

    if filters.availability == dira_core::types::Availability::Available && listing.taken {
        return false;
    }

    // Stored subscriptions can hold an inverted bedroom range; treat the
    // bounds as unordered when both are present.
    match (filters.bedrooms_min, filters.bedrooms_max) {
        (Some(a), Some(b)) => {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            if listing.bedrooms < lo || listing.bedrooms > hi {
                return false;
            }
        }
        (Some(lo), None) => {
            if listing.bedrooms < lo {
                return false;
            }
        }
        (None, Some(hi)) => {
            if listing.bedrooms > hi {
                return false;
            }
        }
        (None, None) => {}
    }

    if let Some(wanted) = filters.furnished {
        match listing.furnished() {
            Ok(furnished) if furnished == wanted => {}
            _ => return false,
        }
    }

    if let Some(wanted) = filters.lease_type {
        match listing.lease_type() {
            Ok(lease_type) if lease_type == wanted => {}
            _ => return false,
        }
    }

    // Date-range filters only apply to medium-term searches; long-term
    // listings have an open-ended stay.
    if filters.lease_type == Some(LeaseType::MediumTerm) {
        if let Some(from) = filters.available_from {
            if listing.available_from < from {
                return false;
            }
        }
        if let Some(to) = filters.available_to {
            match listing.available_to {
                Some(available_to) if available_to <= to => {}
                _ => return false,
            }
        }
    }

    true
}

/// Loads the active subscriptions whose filters match the listing.
pub async fn find_matching_subscriptions(
    conn: &mut AsyncPgConnection,
    listing: &Listing,
) -> anyhow::Result<Vec<Subscription>> {
    let now = Utc::now();

    let active: Vec<Subscription> = subscriptions::table
        .filter(subscriptions::unsubscribed_at.is_null())
        .filter(subscriptions::expires_at.gt(now))
        .select(Subscription::as_select())
        .load(conn)
        .await?;

    Ok(active
        .into_iter()
        .filter(|sub| listing_matches_filters(listing, &sub.filters()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dira_core::types::{Availability, Furnished, Neighbourhood};
    use serde_json::json;

    fn listing() -> Listing {
        Listing {
            id: 1,
            user_id: 1,
            contact_name: None,
            contact_phone: None,
            neighbourhoods: json!(["Geula", "Bar Ilan"]),
            price: Some(5000.0),
            street: "Yoel".to_string(),
            building_number: Some("7".to_string()),
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
    fn empty_filters_match_everything() {
        assert!(listing_matches_filters(
            &listing(),
            &SubscriptionFilters::default()
        ));
    }

    #[test]
    fn neighbourhood_overlap_matches() {
        let filters = SubscriptionFilters {
            neighbourhoods: vec![Neighbourhood::Romema, Neighbourhood::Geula],
            ..Default::default()
        };
        assert!(listing_matches_filters(&listing(), &filters));
    }

    #[test]
    fn disjoint_neighbourhoods_do_not_match() {
        let filters = SubscriptionFilters {
            neighbourhoods: vec![Neighbourhood::Belz],
            ..Default::default()
        };
        assert!(!listing_matches_filters(&listing(), &filters));
    }

    #[test]
    fn availability_filter_excludes_taken_listings() {
        let filters = SubscriptionFilters {
            availability: Availability::Available,
            ..Default::default()
        };
        let mut taken = listing();
        taken.taken = true;

        assert!(listing_matches_filters(&listing(), &filters));
        assert!(!listing_matches_filters(&taken, &filters));
    }

    #[test]
    fn bedroom_range_is_inclusive() {
        let filters = SubscriptionFilters {
            bedrooms_min: Some(2.0),
            bedrooms_max: Some(4.0),
            ..Default::default()
        };
        assert!(listing_matches_filters(&listing(), &filters));

        let outside = SubscriptionFilters {
            bedrooms_min: Some(4.0),
            bedrooms_max: Some(6.0),
            ..Default::default()
        };
        assert!(!listing_matches_filters(&listing(), &outside));
    }

    #[test]
    fn inverted_bedroom_bounds_behave_like_the_ordered_range() {
        let inverted = SubscriptionFilters {
            bedrooms_min: Some(4.0),
            bedrooms_max: Some(2.0),
            ..Default::default()
        };
        assert!(listing_matches_filters(&listing(), &inverted));
    }

    #[test]
    fn single_sided_bedroom_bounds() {
        let min_only = SubscriptionFilters {
            bedrooms_min: Some(3.5),
            ..Default::default()
        };
        assert!(!listing_matches_filters(&listing(), &min_only));

        let max_only = SubscriptionFilters {
            bedrooms_max: Some(3.0),
            ..Default::default()
        };
        assert!(listing_matches_filters(&listing(), &max_only));
    }

    #[test]
    fn furnished_filter_requires_exact_state() {
        let filters = SubscriptionFilters {
            furnished: Some(Furnished::FullyFurnished),
            ..Default::default()
        };
        assert!(!listing_matches_filters(&listing(), &filters));

        let matching = SubscriptionFilters {
            furnished: Some(Furnished::NotFurnished),
            ..Default::default()
        };
        assert!(listing_matches_filters(&listing(), &matching));
    }

    #[test]
    fn unparseable_stored_enum_never_matches_that_filter() {
        let mut corrupt = listing();
        corrupt.furnished = "mystery".to_string();

        let filters = SubscriptionFilters {
            furnished: Some(Furnished::NotFurnished),
            ..Default::default()
        };
        assert!(!listing_matches_filters(&corrupt, &filters));

        // Without the filter the corrupt column is irrelevant.
        assert!(listing_matches_filters(&corrupt, &SubscriptionFilters::default()));
    }

    #[test]
    fn date_range_applies_only_to_medium_term_filters() {
        let long_term = SubscriptionFilters {
            lease_type: Some(LeaseType::LongTerm),
            available_from: NaiveDate::from_ymd_opt(2026, 12, 1),
            ..Default::default()
        };
        // Listing becomes available earlier, but long-term filters ignore dates.
        assert!(listing_matches_filters(&listing(), &long_term));
    }

    #[test]
    fn medium_term_date_range_bounds_the_stay() {
        let mut medium = listing();
        medium.lease_type = "medium_term".to_string();
        medium.available_to = NaiveDate::from_ymd_opt(2026, 12, 15);

        let filters = SubscriptionFilters {
            lease_type: Some(LeaseType::MediumTerm),
            available_from: NaiveDate::from_ymd_opt(2026, 8, 1),
            available_to: NaiveDate::from_ymd_opt(2026, 12, 31),
            ..Default::default()
        };
        assert!(listing_matches_filters(&medium, &filters));

        let too_short = SubscriptionFilters {
            available_to: NaiveDate::from_ymd_opt(2026, 12, 1),
            ..filters.clone()
        };
        assert!(!listing_matches_filters(&medium, &too_short));

        // Open-ended listings fail an upper-bounded medium-term search.
        let mut open_ended = medium.clone();
        open_ended.available_to = None;
        assert!(!listing_matches_filters(&open_ended, &filters));
    }

    #[test]
    fn all_predicates_are_anded() {
        let filters = SubscriptionFilters {
            neighbourhoods: vec![Neighbourhood::Geula],
            bedrooms_min: Some(2.0),
            bedrooms_max: Some(4.0),
            furnished: Some(Furnished::NotFurnished),
            lease_type: Some(LeaseType::LongTerm),
            ..Default::default()
        };
        assert!(listing_matches_filters(&listing(), &filters));

        let mut wrong_type = filters.clone();
        wrong_type.lease_type = Some(LeaseType::MediumTerm);
        assert!(!listing_matches_filters(&listing(), &wrong_type));
    }
}
