use thiserror::Error;

/// Raised when a stored string does not map to a known enum value.
///
/// Enum columns are plain text in the database; parsing is explicit and
/// validated here instead of being hidden behind ORM casts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value `{value}`")]
pub struct TypeError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, TypeError> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(TypeError { kind: $kind, value: s.to_string() }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_enum!(Locale, "locale", {
    En => "en",
    He => "he",
});

impl Locale {
    /// The other locale of the bilingual pair, used as translation target.
    pub fn other(&self) -> Locale {
        match self {
            Locale::En => Locale::He,
            Locale::He => Locale::En,
        }
    }
}

string_enum!(
    /// Whether a filter set is restricted to listings still on the market.
    Availability, "availability", {
    All => "all",
    Available => "available",
});

impl Default for Availability {
    fn default() -> Self {
        Availability::All
    }
}

string_enum!(Neighbourhood, "neighbourhood", {
    Sanhedria => "Sanhedria",
    SanhedriaMurchavet => "Sanhedria Murchavet",
    BarIlan => "Bar Ilan",
    Gush80 => "Gush 80",
    Belz => "Belz",
    Romema => "Romema",
    Sorotzkin => "Sorotzkin",
    MekorBaruch => "Mekor Baruch",
    Geula => "Geula",
});

impl Neighbourhood {
    pub fn label(&self) -> &'static str {
        self.as_str()
    }
}

string_enum!(LeaseType, "lease type", {
    MediumTerm => "medium_term",
    LongTerm => "long_term",
});

impl LeaseType {
    pub fn label(&self) -> &'static str {
        match self {
            LeaseType::MediumTerm => "Medium term",
            LeaseType::LongTerm => "Long term",
        }
    }
}

string_enum!(Furnished, "furnished state", {
    FullyFurnished => "fully_furnished",
    PartiallyFurnished => "partially_furnished",
    NotFurnished => "not_furnished",
});

impl Furnished {
    pub fn label(&self) -> &'static str {
        match self {
            Furnished::FullyFurnished => "Fully Furnished",
            Furnished::PartiallyFurnished => "Partially Furnished",
            Furnished::NotFurnished => "Not Furnished",
        }
    }
}

string_enum!(Access, "access", {
    StepFreeAccess => "step_free_access",
    StepsOnly => "steps_only",
    ElevatorNonShabbos => "elevator_non_shabbos",
    ElevatorShabbos => "elevator_shabbos",
});

string_enum!(KitchenDiningRoom, "kitchen/dining room", {
    Separate => "separate",
    NotSeparate => "not_separate",
    PartlySeparate => "partly_separate",
    NoKitchen => "no_kitchen",
});

string_enum!(PorchGarden, "porch/garden", {
    Porch => "porch",
    Garden => "garden",
    No => "no",
});

string_enum!(AirConditioning, "air conditioning", {
    FullyAirconditioned => "fully_airconditioned",
    PartlyAirconditioned => "partly_airconditioned",
    NotAirconditioned => "not_airconditioned",
});

string_enum!(ApartmentCondition, "apartment condition", {
    BrandNew => "brand_new",
    Excellent => "excellent",
    Good => "good",
    LivedIn => "lived_in",
});

string_enum!(
    /// How a listing left the market, as reported by the owner.
    HowTaken, "how-taken", {
    Tivuchfree => "tivuchfree",
    OtherNonPaid => "other_non_paid",
    Agent => "agent",
    Other => "other",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_type_round_trips_through_strings() {
        for lease_type in LeaseType::ALL {
            assert_eq!(lease_type.as_str().parse::<LeaseType>().unwrap(), *lease_type);
        }
    }

    #[test]
    fn unknown_value_is_rejected_with_context() {
        let err = "short_term".parse::<LeaseType>().unwrap_err();
        assert_eq!(err.kind, "lease type");
        assert_eq!(err.value, "short_term");
    }

    #[test]
    fn neighbourhood_values_match_stored_spelling() {
        assert_eq!(Neighbourhood::BarIlan.as_str(), "Bar Ilan");
        assert_eq!("Sanhedria Murchavet".parse::<Neighbourhood>().unwrap(), Neighbourhood::SanhedriaMurchavet);
    }

    #[test]
    fn enums_serialize_as_their_stored_value() {
        let json = serde_json::to_value(Furnished::PartiallyFurnished).unwrap();
        assert_eq!(json, serde_json::json!("partially_furnished"));
    }

    #[test]
    fn locale_other_flips_between_the_pair() {
        assert_eq!(Locale::En.other(), Locale::He);
        assert_eq!(Locale::He.other(), Locale::En);
    }
}
