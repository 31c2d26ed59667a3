use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

table! {
    users (id) {
        id -> BigInt,
        name -> Text,
        email -> Text,
        locale -> Text,
        is_admin -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    listings (id) {
        id -> BigInt,
        user_id -> BigInt,
        contact_name -> Nullable<Text>,
        contact_phone -> Nullable<Text>,
        neighbourhoods -> Jsonb,
        price -> Nullable<Double>,
        street -> Text,
        building_number -> Nullable<Text>,
        lat -> Nullable<Double>,
        lon -> Nullable<Double>,
        floor -> Double,
        lease_type -> Text,
        available_from -> Date,
        available_to -> Nullable<Date>,
        bedrooms -> Double,
        square_meter -> Nullable<Integer>,
        views -> Integer,
        furnished -> Text,
        taken -> Bool,
        taken_at -> Nullable<Timestamptz>,
        taken_warning_sent_at -> Nullable<Timestamptz>,
        bathrooms -> Nullable<Integer>,
        access -> Nullable<Text>,
        kitchen_dining_room -> Nullable<Text>,
        porch_garden -> Nullable<Text>,
        succah_porch -> Bool,
        air_conditioning -> Nullable<Text>,
        apartment_condition -> Nullable<Text>,
        additional_info -> Nullable<Jsonb>,
        has_dud_shemesh -> Bool,
        has_machsan -> Bool,
        has_parking_spot -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    listing_stats (id) {
        id -> BigInt,
        listing_id -> BigInt,
        lease_type -> Nullable<Text>,
        neighbourhoods -> Nullable<Jsonb>,
        address -> Nullable<Text>,
        how_taken -> Nullable<Text>,
        price_advertised -> Nullable<Double>,
        price_taken_at -> Nullable<Double>,
        date_taken -> Nullable<Timestamptz>,
        date_advertised -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    subscriptions (id) {
        id -> BigInt,
        email -> Text,
        user_id -> Nullable<BigInt>,
        filters -> Jsonb,
        token -> Text,
        subscribed_at -> Timestamptz,
        expires_at -> Timestamptz,
        unsubscribed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    pending_subscriptions (id) {
        id -> BigInt,
        email -> Text,
        filters -> Jsonb,
        otp_code -> Text,
        otp_expires_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    streets (id) {
        id -> BigInt,
        neighbourhood -> Text,
        name_en -> Text,
        name_he -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    outbox_jobs (id) {
        id -> BigInt,
        job_type -> Text,
        payload -> Jsonb,
        created_at -> Timestamptz,
        processed_at -> Nullable<Timestamptz>,
        retry_count -> Integer,
        error_message -> Nullable<Text>,
    }
}

joinable!(listings -> users (user_id));
joinable!(subscriptions -> users (user_id));

allow_tables_to_appear_in_same_query!(
    users,
    listings,
    listing_stats,
    subscriptions,
    pending_subscriptions,
    streets,
    outbox_jobs,
);
