use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::subscriber_email::SubscriberEmail;

/// Kinds of notification the dispatcher knows how to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailJobKind {
    SubscriptionConfirmation,
}

impl EmailJobKind {
    pub const SUPPORTED: [EmailJobKind; 1] = [EmailJobKind::SubscriptionConfirmation];

    pub fn parse(kind: &str) -> Result<EmailJobKind, String> {
        match kind {
            "subscription-confirmation" => Ok(EmailJobKind::SubscriptionConfirmation),
            _ => Err(format!("{} is not a supported email job type", kind)),
        }
    }
}

impl AsRef<str> for EmailJobKind {
    fn as_ref(&self) -> &str {
        match self {
            EmailJobKind::SubscriptionConfirmation => "subscription-confirmation",
        }
    }
}

/// Payload of a `subscription-confirmation` job.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionConfirmationParams {
    pub email: String,
    pub newsletter_public_id: NewsletterPublicId,
    pub token: String,
}

/// A row of the `email_jobs` outbox table. `message_type` stays a raw string
/// because rows written by other producers may carry kinds this build does
/// not know.
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub id: Uuid,
    pub message_type: String,
    pub params: serde_json::Value,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailJob {
    pub fn kind(&self) -> Result<EmailJobKind, String> {
        EmailJobKind::parse(&self.message_type)
    }
}

#[derive(Debug, Clone)]
pub struct NewEmailJob {
    pub id: Uuid,
    pub kind: EmailJobKind,
    pub params: serde_json::Value,
}

impl NewEmailJob {
    pub fn subscription_confirmation(
        email: &SubscriberEmail,
        newsletter_public_id: NewsletterPublicId,
        token: &str,
    ) -> Result<NewEmailJob, serde_json::Error> {
        let params = serde_json::to_value(SubscriptionConfirmationParams {
            email: email.as_ref().to_string(),
            newsletter_public_id,
            token: token.to_string(),
        })?;

        Ok(Self {
            id: Uuid::new_v4(),
            kind: EmailJobKind::SubscriptionConfirmation,
            params,
        })
    }
}
