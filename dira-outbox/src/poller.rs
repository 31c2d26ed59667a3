use anyhow::{anyhow, Result};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use dira_core::models::Listing;
use dira_core::schema::{listings, outbox_jobs};
use dira_core::AppContext;
use dira_delivery::templates::render;
use dira_delivery::translate::{OpenAiTranslator, Translate};
use dira_delivery::EmailDelivery;
use std::time::Duration;
use tracing;

use crate::jobs::{EmailJob, TranslateListingInfoJob, JOB_EMAIL, JOB_TRANSLATE_LISTING_INFO};

#[derive(Queryable, Selectable)]
#[diesel(table_name = dira_core::schema::outbox_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct OutboxRow {
    id: i64,
    job_type: String,
    payload: serde_json::Value,
}

const BATCH_SIZE: usize = 100;
const MAX_RETRIES: i32 = 3;

/// Drains the outbox table: email sends and listing translations. Jobs
/// that fail `MAX_RETRIES` times stay in the table with their last error
/// for inspection.
pub async fn run(ctx: AppContext) -> Result<()> {
    tracing::info!("Starting outbox poller");

    let email = EmailDelivery::new(&ctx.config.delivery)?;
    let translator = OpenAiTranslator::new(&ctx.config.translation)?;
    let poll_interval = Duration::from_millis(ctx.config.scheduler.outbox_poll_interval_ms);

    loop {
        match poll_and_dispatch(&ctx, &email, &translator).await {
            Ok(_) => {
                tokio::time::sleep(poll_interval).await;
            }
            Err(e) => {
                tracing::error!("Error in outbox poller: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn poll_and_dispatch(
    ctx: &AppContext,
    email: &EmailDelivery,
    translator: &OpenAiTranslator,
) -> Result<()> {
    let mut conn = ctx.db_pool.get().await.map_err(|e| anyhow!("{}", e))?;

    let jobs: Vec<OutboxRow> = outbox_jobs::table
        .filter(outbox_jobs::processed_at.is_null())
        .filter(outbox_jobs::retry_count.lt(&MAX_RETRIES))
        .order(outbox_jobs::created_at.asc())
        .limit(BATCH_SIZE as i64)
        .select(OutboxRow::as_select())
        .load(&mut conn)
        .await?;

    if jobs.is_empty() {
        return Ok(());
    }

    tracing::debug!("Found {} unprocessed jobs", jobs.len());

    for job in jobs {
        match dispatch(ctx, email, translator, &mut conn, &job).await {
            Ok(_) => {
                diesel::update(outbox_jobs::table.filter(outbox_jobs::id.eq(job.id)))
                    .set(outbox_jobs::processed_at.eq(Utc::now()))
                    .execute(&mut conn)
                    .await?;

                tracing::debug!("Processed job {} ({})", job.id, job.job_type);
            }
            Err(e) => {
                diesel::update(outbox_jobs::table.filter(outbox_jobs::id.eq(job.id)))
                    .set((
                        outbox_jobs::retry_count.eq(outbox_jobs::retry_count + 1),
                        outbox_jobs::error_message.eq(Some(format!("{}", e))),
                    ))
                    .execute(&mut conn)
                    .await?;

                tracing::warn!("Failed job {} ({}): {}", job.id, job.job_type, e);
            }
        }
    }

    Ok(())
}

async fn dispatch(
    ctx: &AppContext,
    email: &EmailDelivery,
    translator: &OpenAiTranslator,
    conn: &mut AsyncPgConnection,
    job: &OutboxRow,
) -> Result<()> {
    match job.job_type.as_str() {
        JOB_EMAIL => {
            let email_job: EmailJob = serde_json::from_value(job.payload.clone())?;
            let mail = render(&email_job.mail, email_job.locale, &ctx.config.app);
            email.send(&email_job.recipient, &mail).await?;

            // Development throttle so a burst of notifications stays
            // under the free-tier rate limit.
            let delay = ctx.config.delivery.throttle_delay_seconds;
            if delay > 0 {
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            Ok(())
        }
        JOB_TRANSLATE_LISTING_INFO => {
            let translate_job: TranslateListingInfoJob = serde_json::from_value(job.payload.clone())?;
            apply_translation(translator, conn, &translate_job).await
        }
        other => Err(anyhow!("Unknown job type: {}", other)),
    }
}

async fn apply_translation(
    translator: &OpenAiTranslator,
    conn: &mut AsyncPgConnection,
    job: &TranslateListingInfoJob,
) -> Result<()> {
    let listing: Listing = match listings::table
        .filter(listings::id.eq(job.listing_id))
        .select(Listing::as_select())
        .first(conn)
        .await
        .optional()?
    {
        Some(listing) => listing,
        None => {
            // Listing was deleted before the job ran.
            tracing::debug!(listing_id = job.listing_id, "Listing gone, skipping translation");
            return Ok(());
        }
    };

    let target = job.source_locale.other();
    if listing.additional_info_text(target).is_some() {
        return Ok(());
    }

    // Best-effort: when no translation comes back the source text fills
    // both slots, so readers of either locale see something.
    let translated = match translator
        .translate(&job.source_text, job.source_locale, target)
        .await
    {
        Some(text) => text,
        None => {
            tracing::warn!(listing_id = job.listing_id, "No translation produced, using source text");
            job.source_text.clone()
        }
    };

    let mut info = listing
        .additional_info
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    if let Some(map) = info.as_object_mut() {
        map.insert(target.as_str().to_string(), serde_json::Value::String(translated));
    }

    diesel::update(listings::table.filter(listings::id.eq(listing.id)))
        .set((
            listings::additional_info.eq(Some(info)),
            listings::updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

    Ok(())
}
