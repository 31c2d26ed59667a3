use dira_core::config::AppConfig;
use dira_core::models::Listing;
use dira_core::types::{Furnished, LeaseType, Locale, Neighbourhood};
use serde::{Deserialize, Serialize};

/// Simple HTML escaping function
fn html_escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#x27;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}

/// The listing fields carried inside queued notification payloads, so a
/// send can be retried after the listing row itself changed or vanished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: i64,
    pub price: Option<f64>,
    pub bedrooms: f64,
    pub street: String,
    pub building_number: Option<String>,
    pub neighbourhoods: Vec<Neighbourhood>,
    pub lease_type: Option<LeaseType>,
    pub furnished: Option<Furnished>,
}

impl ListingSummary {
    pub fn from_listing(listing: &Listing) -> Self {
        ListingSummary {
            id: listing.id,
            price: listing.price,
            bedrooms: listing.bedrooms,
            street: listing.street.clone(),
            building_number: listing.building_number.clone(),
            neighbourhoods: listing.neighbourhood_tags(),
            lease_type: listing.lease_type().ok(),
            furnished: listing.furnished().ok(),
        }
    }

    fn address(&self) -> String {
        match self.building_number.as_deref() {
            Some(n) if !n.trim().is_empty() => format!("{} {}", self.street.trim(), n.trim()),
            _ => self.street.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingAction {
    MarkedAsTaken,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeMethod {
    Automatically,
    Manually,
}

/// Every templated email the system sends. Serialized into outbox job
/// payloads and rendered just before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MailMessage {
    ListingStatusChange {
        recipient_name: String,
        address: String,
        action: ListingAction,
        method: ChangeMethod,
    },
    TakenWarning {
        listing: ListingSummary,
        days_until_taken: i64,
    },
    SubscriptionNotification {
        listing: ListingSummary,
        token: String,
    },
    SubscriptionConfirmation {
        token: String,
    },
    SubscriptionOtp {
        code: String,
    },
    SubscriptionExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub fn render(message: &MailMessage, locale: Locale, app: &AppConfig) -> RenderedMail {
    let subject = subject(message, locale).to_string();
    let (heading, paragraphs, link) = body(message, locale, app);

    let text = {
        let mut lines = vec![heading.clone()];
        lines.extend(paragraphs.iter().cloned());
        if let Some((label, url)) = &link {
            lines.push(format!("{}: {}", label, url));
        }
        lines.join("\n\n")
    };

    let mut html_body = String::new();
    for paragraph in &paragraphs {
        html_body.push_str(&format!(
            "<p style=\"margin: 0 0 12px 0; font-size: 16px; color: #495057;\">{}</p>\n",
            html_escape(paragraph)
        ));
    }
    if let Some((label, url)) = &link {
        html_body.push_str(&format!(
            "<p style=\"margin: 16px 0 0 0;\"><a href=\"{}\" style=\"color: #1d4ed8;\">{}</a></p>\n",
            html_escape(url),
            html_escape(label)
        ));
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html dir="{dir}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <div style="background-color: #f8f9fa; border-radius: 8px; padding: 24px; margin-bottom: 20px;">
        <h1 style="margin: 0 0 16px 0; font-size: 24px; color: #212529;">{heading}</h1>
{body}    </div>
    <p style="font-size: 14px; color: #6c757d; margin-top: 20px;">
        {footer}
    </p>
</body>
</html>"#,
        dir = match locale {
            Locale::He => "rtl",
            Locale::En => "ltr",
        },
        heading = html_escape(&heading),
        body = html_body,
        footer = html_escape(&footer(locale, app)),
    );

    RenderedMail {
        subject,
        html,
        text,
    }
}

fn subject(message: &MailMessage, locale: Locale) -> &'static str {
    match (message, locale) {
        (
            MailMessage::ListingStatusChange {
                action: ListingAction::Deleted,
                ..
            },
            Locale::En,
        ) => "Your property listing was deleted",
        (
            MailMessage::ListingStatusChange {
                action: ListingAction::Deleted,
                ..
            },
            Locale::He,
        ) => "המודעה שלך נמחקה",
        (MailMessage::ListingStatusChange { .. }, Locale::En) => {
            "Your property listing was marked as taken"
        }
        (MailMessage::ListingStatusChange { .. }, Locale::He) => "המודעה שלך סומנה כתפוסה",
        (MailMessage::TakenWarning { .. }, Locale::En) => {
            "Your property listing will be marked as taken soon"
        }
        (MailMessage::TakenWarning { .. }, Locale::He) => "המודעה שלך תסומן כתפוסה בקרוב",
        (MailMessage::SubscriptionNotification { .. }, Locale::En) => {
            "New property matching your subscription"
        }
        (MailMessage::SubscriptionNotification { .. }, Locale::He) => "נכס חדש שמתאים למינוי שלך",
        (MailMessage::SubscriptionConfirmation { .. }, Locale::En) => {
            "You are subscribed to property updates"
        }
        (MailMessage::SubscriptionConfirmation { .. }, Locale::He) => "נרשמת לעדכוני נכסים",
        (MailMessage::SubscriptionOtp { .. }, Locale::En) => {
            "Verification code for property subscription"
        }
        (MailMessage::SubscriptionOtp { .. }, Locale::He) => "קוד אימות למינוי נכסים",
        (MailMessage::SubscriptionExpired, Locale::En) => "Your property subscription has expired",
        (MailMessage::SubscriptionExpired, Locale::He) => "המינוי שלך פג תוקף",
    }
}

type Body = (String, Vec<String>, Option<(String, String)>);

fn body(message: &MailMessage, locale: Locale, app: &AppConfig) -> Body {
    // Body copy is English; Hebrew recipients currently get localized
    // subjects only, matching the original mail templates.
    let _ = locale;
    let base = app.base_url.trim_end_matches('/');

    match message {
        MailMessage::ListingStatusChange {
            recipient_name,
            address,
            action,
            method,
        } => {
            let verb = match action {
                ListingAction::Deleted => "deleted",
                ListingAction::MarkedAsTaken => "marked as taken",
            };
            let how = match method {
                ChangeMethod::Automatically => "automatically",
                ChangeMethod::Manually => "manually",
            };
            (
                format!("Hello {}", recipient_name),
                vec![format!(
                    "Your property listing at {} was {} {}.",
                    address, how, verb
                )],
                Some((
                    "View my properties".to_string(),
                    format!("{}/my-properties", base),
                )),
            )
        }
        MailMessage::TakenWarning {
            listing,
            days_until_taken,
        } => (
            "Your listing will be marked as taken soon".to_string(),
            vec![
                format!(
                    "Your property listing at {} will be automatically marked as taken in {} days.",
                    listing.address(),
                    days_until_taken
                ),
                "If your property is still available, you can repost it from the \"My Properties\" page after it has been marked as taken.".to_string(),
            ],
            Some((
                "View my properties".to_string(),
                format!("{}/my-properties", base),
            )),
        ),
        MailMessage::SubscriptionNotification { listing, token } => {
            let neighbourhoods = listing
                .neighbourhoods
                .iter()
                .map(|n| n.label())
                .collect::<Vec<_>>()
                .join(", ");
            (
                "New Property Match".to_string(),
                vec![
                    "A new property has been posted that matches your subscription filters."
                        .to_string(),
                    format!("Price: {}", format_price(listing.price)),
                    format!("Bedrooms: {}", format_bedrooms(listing.bedrooms)),
                    format!("Street: {}", listing.street),
                    format!("Neighbourhoods: {}", neighbourhoods),
                    format!(
                        "Type: {}",
                        listing
                            .lease_type
                            .map_or("not specified", |t| t.label())
                    ),
                    format!(
                        "Furnished: {}",
                        listing.furnished.map_or("not specified", |f| f.label())
                    ),
                    format!("View the property: {}/properties/{}", base, listing.id),
                    format!(
                        "Update filters: {}/subscriptions/update-filters/{}",
                        base, token
                    ),
                ],
                Some((
                    "Unsubscribe".to_string(),
                    format!("{}/subscriptions/unsubscribe/{}", base, token),
                )),
            )
        }
        MailMessage::SubscriptionConfirmation { token } => (
            "Subscription confirmed".to_string(),
            vec![
                "You will receive an email whenever a new property matches your filters."
                    .to_string(),
                "The subscription expires after 30 days; subscribing again refreshes it."
                    .to_string(),
                format!(
                    "Update filters: {}/subscriptions/update-filters/{}",
                    base, token
                ),
            ],
            Some((
                "Unsubscribe".to_string(),
                format!("{}/subscriptions/unsubscribe/{}", base, token),
            )),
        ),
        MailMessage::SubscriptionOtp { code } => (
            "Verification code".to_string(),
            vec![
                format!("Your verification code is: {}", code),
                "The code expires in 10 minutes.".to_string(),
                "If you did not request a property subscription, you can ignore this email."
                    .to_string(),
            ],
            None,
        ),
        MailMessage::SubscriptionExpired => (
            "Subscription expired".to_string(),
            vec![
                "Your property subscription has expired after 30 days.".to_string(),
                "You can subscribe again to keep receiving updates about new properties."
                    .to_string(),
            ],
            Some(("Subscribe again".to_string(), format!("{}/subscribe", base))),
        ),
    }
}

fn footer(locale: Locale, app: &AppConfig) -> String {
    match locale {
        Locale::En => format!("This is a notification from {}.", app.name),
        Locale::He => format!("הודעה זו נשלחה על ידי {}.", app.name),
    }
}

fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) => format!("₪{}", thousands(p.round() as i64)),
        None => "not specified".to_string(),
    }
}

fn format_bedrooms(bedrooms: f64) -> String {
    if bedrooms.fract() == 0.0 {
        format!("{}", bedrooms as i64)
    } else {
        format!("{}", bedrooms)
    }
}

fn thousands(mut n: i64) -> String {
    let negative = n < 0;
    n = n.abs();

    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    if negative {
        format!("-{}", out)
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> AppConfig {
        AppConfig {
            name: "Dira".to_string(),
            base_url: "https://dira.test".to_string(),
        }
    }

    fn summary() -> ListingSummary {
        ListingSummary {
            id: 42,
            price: Some(5400.0),
            bedrooms: 3.0,
            street: "Yoel".to_string(),
            building_number: Some("7".to_string()),
            neighbourhoods: vec![Neighbourhood::Geula, Neighbourhood::BarIlan],
            lease_type: Some(LeaseType::LongTerm),
            furnished: Some(Furnished::NotFurnished),
        }
    }

    #[test]
    fn notification_contains_listing_details_and_links() {
        let mail = render(
            &MailMessage::SubscriptionNotification {
                listing: summary(),
                token: "tok123".to_string(),
            },
            Locale::En,
            &app(),
        );

        assert_eq!(mail.subject, "New property matching your subscription");
        assert!(mail.text.contains("₪5,400"));
        assert!(mail.text.contains("Geula, Bar Ilan"));
        assert!(mail.text.contains("https://dira.test/properties/42"));
        assert!(mail.html.contains("https://dira.test/subscriptions/unsubscribe/tok123"));
        assert!(mail.text.contains("https://dira.test/subscriptions/update-filters/tok123"));
    }

    #[test]
    fn status_change_mentions_action_and_method() {
        let mail = render(
            &MailMessage::ListingStatusChange {
                recipient_name: "Rivka".to_string(),
                address: "Yoel 7".to_string(),
                action: ListingAction::Deleted,
                method: ChangeMethod::Automatically,
            },
            Locale::En,
            &app(),
        );

        assert_eq!(mail.subject, "Your property listing was deleted");
        assert!(mail.text.contains("Yoel 7"));
        assert!(mail.text.contains("automatically deleted"));
    }

    #[test]
    fn otp_mail_carries_the_code() {
        let mail = render(
            &MailMessage::SubscriptionOtp {
                code: "042137".to_string(),
            },
            Locale::En,
            &app(),
        );
        assert!(mail.text.contains("042137"));
        assert!(mail.html.contains("042137"));
    }

    #[test]
    fn hebrew_locale_gets_hebrew_subject_and_rtl_markup() {
        let mail = render(&MailMessage::SubscriptionExpired, Locale::He, &app());
        assert_eq!(mail.subject, "המינוי שלך פג תוקף");
        assert!(mail.html.contains("dir=\"rtl\""));
    }

    #[test]
    fn html_output_is_escaped() {
        let mut listing = summary();
        listing.street = "<script>alert(1)</script>".to_string();
        let mail = render(
            &MailMessage::SubscriptionNotification {
                listing,
                token: "t".to_string(),
            },
            Locale::En,
            &app(),
        );
        assert!(!mail.html.contains("<script>"));
        assert!(mail.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn mail_message_round_trips_through_json() {
        let message = MailMessage::TakenWarning {
            listing: summary(),
            days_until_taken: 3,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "taken_warning");
        let decoded: MailMessage = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(950), "950");
        assert_eq!(thousands(1234567), "1,234,567");
    }
}
