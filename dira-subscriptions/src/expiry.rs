use anyhow::{anyhow, Result};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use dira_core::schema::subscriptions;
use dira_core::types::Locale;
use dira_core::AppContext;
use dira_delivery::templates::MailMessage;
use dira_outbox::jobs::queue_email;
use tracing;

/// Deactivates subscriptions past their 30-day expiry and queues a
/// goodbye email for each. Returns the number expired.
pub async fn run_expiry_sweep(ctx: &AppContext) -> Result<usize> {
    let mut conn = ctx.db_pool.get().await.map_err(|e| anyhow!("{}", e))?;
    let now = Utc::now();

    let expired: Vec<(i64, String)> = subscriptions::table
        .filter(subscriptions::unsubscribed_at.is_null())
        .filter(subscriptions::expires_at.le(now))
        .select((subscriptions::id, subscriptions::email))
        .load(&mut conn)
        .await?;

    if expired.is_empty() {
        return Ok(0);
    }

    for (id, email) in &expired {
        queue_email(&mut conn, email, Locale::En, MailMessage::SubscriptionExpired).await?;

        diesel::update(subscriptions::table.filter(subscriptions::id.eq(id)))
            .set((
                subscriptions::unsubscribed_at.eq(now),
                subscriptions::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;
    }

    tracing::info!(count = expired.len(), "Expired subscriptions deactivated");
    Ok(expired.len())
}
