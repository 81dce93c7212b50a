use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::subscriber_email::SubscriberEmail;

/// A row of the `subscriptions` table. `disabled_at` is `None` while active.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_email: SubscriberEmail,
    pub newsletter_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub disabled_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.disabled_at.is_none()
    }
}

/// A subscription about to be written, with the newsletter already resolved
/// to its internal id.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub id: Uuid,
    pub subscriber_email: SubscriberEmail,
    pub newsletter_id: Uuid,
    pub newsletter_public_id: NewsletterPublicId,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl NewSubscription {
    pub fn new(
        subscriber_email: SubscriberEmail,
        newsletter_id: Uuid,
        newsletter_public_id: NewsletterPublicId,
        token: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscriber_email,
            newsletter_id,
            newsletter_public_id,
            token,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedNewsletter {
    pub public_id: NewsletterPublicId,
    pub name: String,
    pub description: Option<String>,
    pub subscribed_at: DateTime<Utc>,
}
