use diesel_async::AsyncPgConnection;
use dira_core::models::Listing;
use dira_core::types::Locale;
use dira_delivery::templates::{ListingSummary, MailMessage};
use dira_outbox::jobs::queue_email;
use tracing;

use crate::matcher::find_matching_subscriptions;

/// Queues one notification per subscription whose filters match the
/// freshly posted listing. Returns the number queued.
pub async fn notify_subscribers(
    conn: &mut AsyncPgConnection,
    listing: &Listing,
) -> anyhow::Result<usize> {
    let matches = find_matching_subscriptions(conn, listing).await?;
    if matches.is_empty() {
        return Ok(0);
    }

    let summary = ListingSummary::from_listing(listing);

    for subscription in &matches {
        queue_email(
            conn,
            &subscription.email,
            Locale::En,
            MailMessage::SubscriptionNotification {
                listing: summary.clone(),
                token: subscription.token.clone(),
            },
        )
        .await?;
    }

    tracing::info!(
        listing_id = listing.id,
        count = matches.len(),
        "Queued subscriber notifications"
    );

    Ok(matches.len())
}
