pub mod email;
pub mod geocode;
pub mod templates;
pub mod translate;

pub use email::EmailDelivery;
pub use geocode::{Coordinates, Geocode, Geocoder};
pub use templates::{render, ListingSummary, MailMessage, RenderedMail};
pub use translate::{OpenAiTranslator, Translate};
