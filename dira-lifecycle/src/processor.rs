use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use dira_core::models::Listing;
use dira_core::schema::{listings, users};
use dira_core::types::Locale;
use dira_core::AppContext;
use dira_delivery::templates::{ChangeMethod, ListingAction, ListingSummary, MailMessage};
use dira_listings::stats::{record_deleted, record_taken, TakenReport};
use dira_outbox::jobs::queue_email;
use tracing;

/// Taken listings are purged after two weeks.
const DELETE_AFTER_TAKEN_DAYS: i64 = 14;
/// Untouched listings are assumed taken after a month on the site.
const AUTO_TAKE_AFTER_DAYS: i64 = 30;
/// Owners are warned this many days before the automatic take.
const WARNING_LEAD_DAYS: i64 = 3;

const PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleReport {
    pub deleted: usize,
    pub marked_taken: usize,
    pub warnings_sent: usize,
}

/// A listing taken this long ago is due for deletion.
pub fn deletion_due(taken_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    taken_at <= now - Duration::days(DELETE_AFTER_TAKEN_DAYS)
}

/// A listing posted this long ago is assumed taken.
pub fn auto_taken_due(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    created_at <= now - Duration::days(AUTO_TAKE_AFTER_DAYS)
}

/// The warning window opens three days before the automatic take and
/// closes when the take itself is due.
pub fn warning_due(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let take_due = now - Duration::days(AUTO_TAKE_AFTER_DAYS);
    let window_open = take_due + Duration::days(WARNING_LEAD_DAYS);
    created_at > take_due && created_at <= window_open
}

/// The daily pass over all listings: purge stale taken listings, mark
/// month-old ones as taken, and warn owners approaching that mark.
pub async fn run(ctx: &AppContext) -> Result<LifecycleReport> {
    let mut conn = ctx.db_pool.get().await.map_err(|e| anyhow!("{}", e))?;
    let now = Utc::now();

    let report = LifecycleReport {
        deleted: delete_stale_taken(ctx, &mut conn, now).await?,
        marked_taken: auto_take_old_listings(ctx, &mut conn, now).await?,
        warnings_sent: warn_before_auto_take(&mut conn, now).await?,
    };

    tracing::info!(
        deleted = report.deleted,
        marked_taken = report.marked_taken,
        warnings_sent = report.warnings_sent,
        "Lifecycle pass finished"
    );

    Ok(report)
}

async fn owner_contact(
    conn: &mut AsyncPgConnection,
    user_id: i64,
) -> Result<Option<(String, Locale)>> {
    let row: Option<(String, String)> = users::table
        .filter(users::id.eq(user_id))
        .select((users::email, users::locale))
        .first(conn)
        .await
        .optional()?;

    Ok(row.and_then(|(email, locale)| {
        let email = email.trim().to_string();
        (!email.is_empty()).then(|| (email, locale.parse().unwrap_or(Locale::En)))
    }))
}

/// Purges listings taken at least two weeks ago, a page at a time so a
/// large backlog cannot hold one transaction open for the whole table.
async fn delete_stale_taken(
    ctx: &AppContext,
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
) -> Result<usize> {
    let cutoff = now - Duration::days(DELETE_AFTER_TAKEN_DAYS);
    let mut deleted = 0usize;
    let mut cursor = 0i64;

    loop {
        let page: Vec<Listing> = listings::table
            .filter(listings::taken.eq(true))
            .filter(listings::taken_at.le(cutoff))
            .filter(listings::id.gt(cursor))
            .order(listings::id.asc())
            .limit(PAGE_SIZE)
            .select(Listing::as_select())
            .load(conn)
            .await?;

        if page.is_empty() {
            break;
        }

        for listing in page {
            cursor = listing.id;

            if let Some((email, locale)) = owner_contact(conn, listing.user_id).await? {
                let owner_name: String = users::table
                    .filter(users::id.eq(listing.user_id))
                    .select(users::name)
                    .first(conn)
                    .await?;

                queue_email(
                    conn,
                    &email,
                    locale,
                    MailMessage::ListingStatusChange {
                        recipient_name: owner_name,
                        address: listing.address().unwrap_or_default(),
                        action: ListingAction::Deleted,
                        method: ChangeMethod::Automatically,
                    },
                )
                .await?;
            }

            record_deleted(conn, &ctx.redis_pool, &listing).await?;

            diesel::delete(listings::table.filter(listings::id.eq(listing.id)))
                .execute(conn)
                .await?;

            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Marks month-old untouched listings as taken and tells their owners.
async fn auto_take_old_listings(
    ctx: &AppContext,
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
) -> Result<usize> {
    let cutoff = now - Duration::days(AUTO_TAKE_AFTER_DAYS);

    let due: Vec<Listing> = listings::table
        .filter(listings::taken.eq(false))
        .filter(listings::created_at.le(cutoff))
        .order(listings::id.asc())
        .select(Listing::as_select())
        .load(conn)
        .await?;

    let mut marked = 0usize;

    for mut listing in due {
        diesel::update(listings::table.filter(listings::id.eq(listing.id)))
            .set((
                listings::taken.eq(true),
                listings::taken_at.eq(Some(now)),
                listings::updated_at.eq(now),
            ))
            .execute(conn)
            .await?;

        listing.taken = true;
        listing.taken_at = Some(now);

        // No report from the owner; the stat row just records the event.
        record_taken(conn, &ctx.redis_pool, &listing, &TakenReport::default()).await?;

        if let Some((email, locale)) = owner_contact(conn, listing.user_id).await? {
            let owner_name: String = users::table
                .filter(users::id.eq(listing.user_id))
                .select(users::name)
                .first(conn)
                .await?;

            queue_email(
                conn,
                &email,
                locale,
                MailMessage::ListingStatusChange {
                    recipient_name: owner_name,
                    address: listing.address().unwrap_or_default(),
                    action: ListingAction::MarkedAsTaken,
                    method: ChangeMethod::Automatically,
                },
            )
            .await?;
        }

        marked += 1;
    }

    Ok(marked)
}

/// Warns owners whose listing is a few days away from the automatic
/// take. Each listing is warned at most once; owners without a usable
/// email are skipped without being stamped, so they get the warning if
/// an address shows up before the window closes.
async fn warn_before_auto_take(conn: &mut AsyncPgConnection, now: DateTime<Utc>) -> Result<usize> {
    let window_close = now - Duration::days(AUTO_TAKE_AFTER_DAYS);
    let window_open = window_close + Duration::days(WARNING_LEAD_DAYS);

    let due: Vec<Listing> = listings::table
        .filter(listings::taken.eq(false))
        .filter(listings::taken_warning_sent_at.is_null())
        .filter(listings::created_at.gt(window_close))
        .filter(listings::created_at.le(window_open))
        .order(listings::id.asc())
        .select(Listing::as_select())
        .load(conn)
        .await?;

    let mut warned = 0usize;

    for listing in due {
        let (email, locale) = match owner_contact(conn, listing.user_id).await? {
            Some(contact) => contact,
            None => continue,
        };

        let take_at = listing.created_at + Duration::days(AUTO_TAKE_AFTER_DAYS);
        let days_until_taken = (take_at - now).num_days().max(1);

        queue_email(
            conn,
            &email,
            locale,
            MailMessage::TakenWarning {
                listing: ListingSummary::from_listing(&listing),
                days_until_taken,
            },
        )
        .await?;

        diesel::update(listings::table.filter(listings::id.eq(listing.id)))
            .set((
                listings::taken_warning_sent_at.eq(Some(now)),
                listings::updated_at.eq(now),
            ))
            .execute(conn)
            .await?;

        warned += 1;
    }

    Ok(warned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days_ago(days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(days)
    }

    #[test]
    fn deletion_is_due_fourteen_days_after_taken() {
        let now = Utc::now();
        assert!(deletion_due(days_ago(14, now), now));
        assert!(deletion_due(days_ago(20, now), now));
        assert!(!deletion_due(days_ago(13, now), now));
    }

    #[test]
    fn auto_take_is_due_thirty_days_after_posting() {
        let now = Utc::now();
        assert!(auto_taken_due(days_ago(30, now), now));
        assert!(auto_taken_due(days_ago(31, now), now));
        assert!(!auto_taken_due(days_ago(29, now), now));
    }

    #[test]
    fn warning_window_covers_the_three_days_before_auto_take() {
        let now = Utc::now();
        assert!(warning_due(days_ago(28, now), now));
        assert!(warning_due(days_ago(27, now), now));
        // Already due for the take itself, past warning.
        assert!(!warning_due(days_ago(30, now), now));
        // Too fresh.
        assert!(!warning_due(days_ago(26, now), now));
    }

    #[test]
    fn a_listing_is_never_both_warned_and_taken() {
        let now = Utc::now();
        for days in 0..40 {
            let created = days_ago(days, now);
            assert!(!(warning_due(created, now) && auto_taken_due(created, now)));
        }
    }
}
