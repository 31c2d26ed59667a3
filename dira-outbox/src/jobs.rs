use anyhow::Result;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use dira_core::schema::outbox_jobs;
use dira_core::types::Locale;
use dira_delivery::templates::MailMessage;
use serde::{Deserialize, Serialize};

pub const JOB_EMAIL: &str = "email";
pub const JOB_TRANSLATE_LISTING_INFO: &str = "translate.listing_info";

/// A single outbound email, fully rendered at delivery time so template
/// fixes apply to jobs that were queued before the fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    pub recipient: String,
    pub locale: Locale,
    pub mail: MailMessage,
}

/// A request to fill in the missing locale slot of a listing description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateListingInfoJob {
    pub listing_id: i64,
    pub source_text: String,
    pub source_locale: Locale,
}

async fn enqueue(
    conn: &mut AsyncPgConnection,
    job_type: &str,
    payload: serde_json::Value,
) -> Result<()> {
    diesel::insert_into(outbox_jobs::table)
        .values((
            outbox_jobs::job_type.eq(job_type),
            outbox_jobs::payload.eq(payload),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Queues an email. Callable inside a transaction so the job commits or
/// rolls back together with the change it announces.
pub async fn queue_email(
    conn: &mut AsyncPgConnection,
    recipient: &str,
    locale: Locale,
    mail: MailMessage,
) -> Result<()> {
    let job = EmailJob {
        recipient: recipient.to_string(),
        locale,
        mail,
    };
    enqueue(conn, JOB_EMAIL, serde_json::to_value(&job)?).await
}

pub async fn queue_translation(
    conn: &mut AsyncPgConnection,
    listing_id: i64,
    source_text: &str,
    source_locale: Locale,
) -> Result<()> {
    let job = TranslateListingInfoJob {
        listing_id,
        source_text: source_text.to_string(),
        source_locale,
    };
    enqueue(conn, JOB_TRANSLATE_LISTING_INFO, serde_json::to_value(&job)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use dira_delivery::templates::MailMessage;

    #[test]
    fn email_job_round_trips_through_json() {
        let job = EmailJob {
            recipient: "someone@example.com".to_string(),
            locale: Locale::He,
            mail: MailMessage::SubscriptionOtp {
                code: "123456".to_string(),
            },
        };
        let value = serde_json::to_value(&job).unwrap();
        let decoded: EmailJob = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn translation_job_round_trips_through_json() {
        let job = TranslateListingInfoJob {
            listing_id: 7,
            source_text: "דירה מרווחת".to_string(),
            source_locale: Locale::He,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["listing_id"], 7);
        let decoded: TranslateListingInfoJob = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, job);
    }
}
