use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use dira_core::models::Subscription;
use dira_core::schema::{pending_subscriptions, subscriptions, users};
use dira_core::types::Locale;
use dira_core::{AppContext, DomainError, SubscriptionFilters};
use dira_delivery::templates::MailMessage;
use dira_outbox::jobs::queue_email;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing;

const TOKEN_LENGTH: usize = 64;
const SUBSCRIPTION_DAYS: i64 = 30;
const OTP_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// A new subscription was created.
    Subscribed,
    /// The address already had an active subscription; its filter set was
    /// replaced in place, leaving the expiry clock untouched.
    FiltersUpdated,
    /// The address is unverified; a one-time code was sent.
    OtpSent,
}

/// Whether a subscribe (or OTP verification) for this email refreshes an
/// existing row or creates a fresh one. Expired and unsubscribed rows are
/// terminal; only a currently active subscription is refreshed in place.
fn resolve_outcome(existing: Option<&Subscription>, now: DateTime<Utc>) -> SubscribeOutcome {
    match existing {
        Some(sub) if sub.is_active(now) => SubscribeOutcome::FiltersUpdated,
        _ => SubscribeOutcome::Subscribed,
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn generate_otp() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::validation("email", "a valid email address is required"));
    }
    Ok(email)
}

/// The email's most recent subscription row, active or not.
async fn latest_subscription(
    conn: &mut diesel_async::AsyncPgConnection,
    email: &str,
) -> Result<Option<Subscription>, DomainError> {
    let existing: Option<Subscription> = subscriptions::table
        .filter(subscriptions::email.eq(email))
        .order(subscriptions::subscribed_at.desc())
        .select(Subscription::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(existing)
}

/// Replaces the filter set of an existing subscription. The expiry clock
/// is deliberately left alone; only a fresh subscription restarts it.
async fn refresh_filters(
    conn: &mut diesel_async::AsyncPgConnection,
    subscription_id: i64,
    filters: &SubscriptionFilters,
) -> Result<(), DomainError> {
    diesel::update(subscriptions::table.filter(subscriptions::id.eq(subscription_id)))
        .set((
            subscriptions::filters.eq(filters.to_json()),
            subscriptions::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// The shared tail of `subscribe` and `verify_otp`: refresh the active
/// subscription for this email if one exists, otherwise create one.
async fn refresh_or_create(
    conn: &mut diesel_async::AsyncPgConnection,
    email: &str,
    filters: &SubscriptionFilters,
    user_id: Option<i64>,
) -> Result<SubscribeOutcome, DomainError> {
    let existing = latest_subscription(conn, email).await?;

    match resolve_outcome(existing.as_ref(), Utc::now()) {
        SubscribeOutcome::FiltersUpdated => {
            let subscription = existing.ok_or(DomainError::NotFound)?;
            refresh_filters(conn, subscription.id, filters).await?;
            tracing::info!(subscription_id = subscription.id, "Subscription filters refreshed");
            Ok(SubscribeOutcome::FiltersUpdated)
        }
        _ => {
            let subscription = create_subscription(conn, email, filters, user_id).await?;
            tracing::info!(subscription_id = subscription.id, "Subscription created");
            Ok(SubscribeOutcome::Subscribed)
        }
    }
}

/// Subscribe an email address to listing notifications.
///
/// Addresses belonging to the authenticated caller skip verification;
/// anyone else gets a one-time code first. Subscribing again with an
/// active subscription replaces its filters in place.
pub async fn subscribe(
    ctx: &AppContext,
    email: &str,
    filters: SubscriptionFilters,
    caller_user_id: Option<i64>,
) -> Result<SubscribeOutcome, DomainError> {
    let email = normalize_email(email)?;
    let filters = filters.normalized();
    filters.validate()?;

    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let existing = latest_subscription(&mut conn, &email).await?;
    if let Some(subscription) = existing.filter(|s| s.is_active(Utc::now())) {
        refresh_filters(&mut conn, subscription.id, &filters).await?;
        tracing::info!(subscription_id = subscription.id, "Subscription filters refreshed");
        return Ok(SubscribeOutcome::FiltersUpdated);
    }

    // The caller's own verified address skips the OTP round trip.
    let verified = match caller_user_id {
        Some(user_id) => {
            let account_email: Option<String> = users::table
                .filter(users::id.eq(user_id))
                .select(users::email)
                .first(&mut conn)
                .await
                .optional()?;
            account_email.map(|e| e.to_lowercase()) == Some(email.clone())
        }
        None => false,
    };

    if verified {
        return refresh_or_create(&mut conn, &email, &filters, caller_user_id).await;
    }

    let otp = generate_otp();
    let filters_json = filters.to_json();
    let email_for_txn = email.clone();
    let otp_for_txn = otp.clone();

    conn.transaction::<_, DomainError, _>(|conn| {
        async move {
            // One pending verification per address at a time.
            diesel::delete(
                pending_subscriptions::table
                    .filter(pending_subscriptions::email.eq(&email_for_txn)),
            )
            .execute(conn)
            .await?;

            diesel::insert_into(pending_subscriptions::table)
                .values((
                    pending_subscriptions::email.eq(&email_for_txn),
                    pending_subscriptions::filters.eq(&filters_json),
                    pending_subscriptions::otp_code.eq(&otp_for_txn),
                    pending_subscriptions::otp_expires_at
                        .eq(Utc::now() + Duration::minutes(OTP_MINUTES)),
                ))
                .execute(conn)
                .await?;

            queue_email(
                conn,
                &email_for_txn,
                Locale::En,
                MailMessage::SubscriptionOtp { code: otp_for_txn },
            )
            .await?;

            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    tracing::info!("Verification code queued for new subscriber");
    Ok(SubscribeOutcome::OtpSent)
}

/// Confirms a pending subscription with the emailed code. An active
/// subscription that appeared for the email in the meantime is refreshed
/// instead of being duplicated.
pub async fn verify_otp(
    ctx: &AppContext,
    email: &str,
    code: &str,
) -> Result<SubscribeOutcome, DomainError> {
    let email = normalize_email(email)?;
    let code = code.trim();

    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;
    let now = Utc::now();

    let pending: Option<(i64, serde_json::Value, String)> = pending_subscriptions::table
        .filter(pending_subscriptions::email.eq(&email))
        .filter(pending_subscriptions::otp_expires_at.gt(now))
        .order(pending_subscriptions::created_at.desc())
        .select((
            pending_subscriptions::id,
            pending_subscriptions::filters,
            pending_subscriptions::otp_code,
        ))
        .first(&mut conn)
        .await
        .optional()?;

    let (pending_id, filters_json, otp_code) = pending.ok_or_else(|| {
        DomainError::validation("otp", "the verification code is invalid or has expired")
    })?;

    if otp_code != code {
        return Err(DomainError::validation(
            "otp",
            "the verification code is invalid or has expired",
        ));
    }

    let filters = SubscriptionFilters::from_json(&filters_json);
    let outcome = refresh_or_create(&mut conn, &email, &filters, None).await?;

    diesel::delete(pending_subscriptions::table.filter(pending_subscriptions::id.eq(pending_id)))
        .execute(&mut conn)
        .await?;

    tracing::info!("Subscription verified");
    Ok(outcome)
}

async fn create_subscription(
    conn: &mut diesel_async::AsyncPgConnection,
    email: &str,
    filters: &SubscriptionFilters,
    user_id: Option<i64>,
) -> Result<Subscription, DomainError> {
    let token = generate_token();
    let filters_json = filters.to_json();
    let email = email.to_string();

    let subscription = conn
        .transaction::<_, DomainError, _>(|conn| {
            async move {
                let now = Utc::now();
                let subscription: Subscription = diesel::insert_into(subscriptions::table)
                    .values((
                        subscriptions::email.eq(&email),
                        subscriptions::user_id.eq(user_id),
                        subscriptions::filters.eq(&filters_json),
                        subscriptions::token.eq(&token),
                        subscriptions::subscribed_at.eq(now),
                        subscriptions::expires_at.eq(now + Duration::days(SUBSCRIPTION_DAYS)),
                    ))
                    .returning(Subscription::as_returning())
                    .get_result(conn)
                    .await?;

                queue_email(
                    conn,
                    &email,
                    Locale::En,
                    MailMessage::SubscriptionConfirmation {
                        token: subscription.token.clone(),
                    },
                )
                .await?;

                Ok(subscription)
            }
            .scope_boxed()
        })
        .await?;

    Ok(subscription)
}

/// Deactivates the subscription behind an unsubscribe link.
pub async fn unsubscribe(ctx: &AppContext, token: &str) -> Result<(), DomainError> {
    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;

    let updated = diesel::update(
        subscriptions::table
            .filter(subscriptions::token.eq(token))
            .filter(subscriptions::unsubscribed_at.is_null()),
    )
    .set((
        subscriptions::unsubscribed_at.eq(Utc::now()),
        subscriptions::updated_at.eq(Utc::now()),
    ))
    .execute(&mut conn)
    .await?;

    if updated == 0 {
        return Err(DomainError::NotFound);
    }

    tracing::info!("Subscription deactivated");
    Ok(())
}

/// Replaces the filter set behind an update-filters link.
pub async fn update_filters(
    ctx: &AppContext,
    token: &str,
    filters: SubscriptionFilters,
) -> Result<(), DomainError> {
    let filters = filters.normalized();
    filters.validate()?;

    let mut conn = ctx.db_pool.get().await.map_err(DomainError::db)?;
    let now = Utc::now();

    let updated = diesel::update(
        subscriptions::table
            .filter(subscriptions::token.eq(token))
            .filter(subscriptions::unsubscribed_at.is_null())
            .filter(subscriptions::expires_at.gt(now)),
    )
    .set((
        subscriptions::filters.eq(filters.to_json()),
        subscriptions::updated_at.eq(now),
    ))
    .execute(&mut conn)
    .await?;

    if updated == 0 {
        return Err(DomainError::NotFound);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_alphanumeric() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn otp_codes_are_six_digits_zero_padded() {
        for _ in 0..50 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    fn subscription(expires_at: DateTime<Utc>, unsubscribed_at: Option<DateTime<Utc>>) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: 1,
            email: "chaim@example.com".to_string(),
            user_id: None,
            filters: serde_json::json!({}),
            token: "t".repeat(TOKEN_LENGTH),
            subscribed_at: now - Duration::days(1),
            expires_at,
            unsubscribed_at,
            created_at: now - Duration::days(1),
            updated_at: now - Duration::days(1),
        }
    }

    #[test]
    fn an_active_subscription_is_refreshed_not_duplicated() {
        let now = Utc::now();
        let active = subscription(now + Duration::days(10), None);
        assert_eq!(
            resolve_outcome(Some(&active), now),
            SubscribeOutcome::FiltersUpdated
        );
    }

    #[test]
    fn terminal_subscriptions_get_a_fresh_row() {
        let now = Utc::now();

        let expired = subscription(now - Duration::days(1), None);
        assert_eq!(resolve_outcome(Some(&expired), now), SubscribeOutcome::Subscribed);

        let unsubscribed = subscription(now + Duration::days(10), Some(now - Duration::hours(1)));
        assert_eq!(
            resolve_outcome(Some(&unsubscribed), now),
            SubscribeOutcome::Subscribed
        );

        assert_eq!(resolve_outcome(None, now), SubscribeOutcome::Subscribed);
    }

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email("  Chaim@Example.COM ").unwrap(),
            "chaim@example.com"
        );
        assert!(normalize_email("not-an-address").is_err());
        assert!(normalize_email("   ").is_err());
    }
}
