use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::error::DomainError;
use crate::types::{Availability, Furnished, LeaseType, Neighbourhood};

/// A subscription's stored filter set. Every field is optional; an absent
/// field imposes no constraint. Persisted as JSONB on subscription rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SubscriptionFilters {
    pub neighbourhoods: Vec<Neighbourhood>,
    pub availability: Availability,
    pub bedrooms_min: Option<f64>,
    pub bedrooms_max: Option<f64>,
    pub furnished: Option<Furnished>,
    #[serde(rename = "type")]
    pub lease_type: Option<LeaseType>,
    pub available_from: Option<NaiveDate>,
    pub available_to: Option<NaiveDate>,
}

impl SubscriptionFilters {
    /// Lenient decode of a stored filter set.
    ///
    /// Stored rows predate several format changes: the neighbourhood
    /// constraint used to be a single `neighbourhood` string, and optional
    /// enum fields may hold `""` instead of `null`. Unknown enum values and
    /// malformed entries degrade to "no constraint" so that one bad row
    /// never poisons a match pass.
    pub fn from_json(value: &Value) -> Self {
        let non_empty_str =
            |key: &str| value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

        let mut neighbourhoods: Vec<Neighbourhood> = value
            .get("neighbourhoods")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        if neighbourhoods.is_empty() {
            // Legacy singular key, accepted on read but never written back.
            if let Some(n) = non_empty_str("neighbourhood").and_then(|s| s.parse().ok()) {
                neighbourhoods.push(n);
            }
        }

        SubscriptionFilters {
            neighbourhoods,
            availability: non_empty_str("availability")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            bedrooms_min: value.get("bedrooms_min").and_then(Value::as_f64),
            bedrooms_max: value.get("bedrooms_max").and_then(Value::as_f64),
            furnished: non_empty_str("furnished").and_then(|s| s.parse().ok()),
            lease_type: non_empty_str("type").and_then(|s| s.parse().ok()),
            available_from: non_empty_str("available_from").and_then(|s| s.parse().ok()),
            available_to: non_empty_str("available_to").and_then(|s| s.parse().ok()),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Normalization applied before storage: bedroom bounds are rounded to
    /// the nearest half and ordered min <= max, neighbourhoods are deduped.
    pub fn normalized(mut self) -> Self {
        let round_half = |v: f64| (v * 2.0).round() / 2.0;

        self.bedrooms_min = self.bedrooms_min.map(round_half);
        self.bedrooms_max = self.bedrooms_max.map(round_half);

        if let (Some(min), Some(max)) = (self.bedrooms_min, self.bedrooms_max) {
            self.bedrooms_min = Some(min.min(max));
            self.bedrooms_max = Some(min.max(max));
        }

        let mut seen = Vec::with_capacity(self.neighbourhoods.len());
        for n in self.neighbourhoods {
            if !seen.contains(&n) {
                seen.push(n);
            }
        }
        self.neighbourhoods = seen;

        self
    }

    /// Field-level validation for the subscribe path.
    pub fn validate(&self) -> Result<(), DomainError> {
        for bound in [self.bedrooms_min, self.bedrooms_max].into_iter().flatten() {
            if !(1.0..=10.0).contains(&bound) {
                return Err(DomainError::validation(
                    "bedrooms",
                    "bedroom bounds must be between 1 and 10",
                ));
            }
        }

        if let (Some(from), Some(to)) = (self.available_from, self.available_to) {
            if to < from {
                return Err(DomainError::validation(
                    "available_to",
                    "must be on or after available_from",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_stored_filter_set() {
        let filters = SubscriptionFilters::from_json(&json!({
            "neighbourhoods": ["Geula", "Bar Ilan"],
            "availability": "available",
            "bedrooms_min": 2,
            "bedrooms_max": 4,
            "furnished": "fully_furnished",
            "type": "medium_term",
            "available_from": "2026-09-01",
            "available_to": "2026-12-31",
        }));

        assert_eq!(filters.neighbourhoods, vec![Neighbourhood::Geula, Neighbourhood::BarIlan]);
        assert_eq!(filters.availability, Availability::Available);
        assert_eq!(filters.bedrooms_min, Some(2.0));
        assert_eq!(filters.bedrooms_max, Some(4.0));
        assert_eq!(filters.furnished, Some(Furnished::FullyFurnished));
        assert_eq!(filters.lease_type, Some(LeaseType::MediumTerm));
        assert_eq!(filters.available_from, Some(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()));
    }

    #[test]
    fn empty_strings_mean_no_constraint() {
        let filters = SubscriptionFilters::from_json(&json!({
            "furnished": "",
            "type": "",
            "available_from": "",
            "availability": "",
        }));

        assert_eq!(filters.furnished, None);
        assert_eq!(filters.lease_type, None);
        assert_eq!(filters.available_from, None);
        assert_eq!(filters.availability, Availability::All);
    }

    #[test]
    fn legacy_singular_neighbourhood_key_is_accepted() {
        let filters = SubscriptionFilters::from_json(&json!({ "neighbourhood": "Geula" }));
        assert_eq!(filters.neighbourhoods, vec![Neighbourhood::Geula]);
    }

    #[test]
    fn array_key_wins_over_legacy_key() {
        let filters = SubscriptionFilters::from_json(&json!({
            "neighbourhoods": ["Romema"],
            "neighbourhood": "Geula",
        }));
        assert_eq!(filters.neighbourhoods, vec![Neighbourhood::Romema]);
    }

    #[test]
    fn unknown_enum_values_are_dropped() {
        let filters = SubscriptionFilters::from_json(&json!({
            "neighbourhoods": ["Atlantis", "Geula"],
            "furnished": "mostly_furnished",
        }));
        assert_eq!(filters.neighbourhoods, vec![Neighbourhood::Geula]);
        assert_eq!(filters.furnished, None);
    }

    #[test]
    fn normalization_rounds_to_half_steps_and_orders_bounds() {
        let filters = SubscriptionFilters {
            bedrooms_min: Some(4.3),
            bedrooms_max: Some(1.9),
            ..Default::default()
        }
        .normalized();

        assert_eq!(filters.bedrooms_min, Some(2.0));
        assert_eq!(filters.bedrooms_max, Some(4.5));
    }

    #[test]
    fn normalization_dedupes_neighbourhoods() {
        let filters = SubscriptionFilters {
            neighbourhoods: vec![Neighbourhood::Geula, Neighbourhood::Belz, Neighbourhood::Geula],
            ..Default::default()
        }
        .normalized();

        assert_eq!(filters.neighbourhoods, vec![Neighbourhood::Geula, Neighbourhood::Belz]);
    }

    #[test]
    fn validate_rejects_out_of_range_bedrooms() {
        let filters = SubscriptionFilters {
            bedrooms_max: Some(11.0),
            ..Default::default()
        };
        assert!(matches!(
            filters.validate(),
            Err(DomainError::Validation { field: "bedrooms", .. })
        ));
    }

    #[test]
    fn validate_rejects_inverted_date_range() {
        let filters = SubscriptionFilters {
            available_from: NaiveDate::from_ymd_opt(2026, 10, 1),
            available_to: NaiveDate::from_ymd_opt(2026, 9, 1),
            ..Default::default()
        };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn storage_round_trip_preserves_filters() {
        let filters = SubscriptionFilters {
            neighbourhoods: vec![Neighbourhood::Sorotzkin],
            availability: Availability::Available,
            bedrooms_min: Some(2.0),
            bedrooms_max: Some(4.0),
            lease_type: Some(LeaseType::LongTerm),
            ..Default::default()
        };

        let decoded = SubscriptionFilters::from_json(&filters.to_json());
        assert_eq!(decoded, filters);
    }
}
