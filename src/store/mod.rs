use async_trait::async_trait;
use std::future::Future;
use std::time;
use uuid::Uuid;

use crate::domain::email_job::{EmailJob, EmailJobKind, NewEmailJob};
use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::page::{Page, PageRequest};
use crate::domain::subscription::{NewSubscription, SubscribedNewsletter, Subscription};

pub mod memory;
pub mod postgres;

pub use memory::InMemorySubscriptionStore;
pub use postgres::PgSubscriptionStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Newsletter not found.")]
    NewsletterNotFound,
    #[error("Subscriber is already subscribed to the newsletter.")]
    AlreadySubscribed,
    #[error("Database operation failed.")]
    Database(#[from] sqlx::Error),
    #[error("Stored row is not valid: {0}")]
    InvalidRow(String),
    #[error("Database did not answer within {0:?}.")]
    Timeout(time::Duration),
}

/// Authoritative relational state: newsletters, subscriptions and the
/// `email_jobs` outbox.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create_newsletter(&self, newsletter: &Newsletter) -> Result<(), StoreError>;

    async fn newsletter_by_public_id(
        &self,
        public_id: &NewsletterPublicId,
    ) -> Result<Newsletter, StoreError>;

    async fn newsletters_by_creator(
        &self,
        creator_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Newsletter>, StoreError>;

    async fn newsletter_id_by_public_id(
        &self,
        public_id: &NewsletterPublicId,
    ) -> Result<Uuid, StoreError>;

    /// Upserts the subscription and enqueues its job as one unit. A pair that
    /// is already active fails with `AlreadySubscribed` and writes nothing; a
    /// disabled pair is reactivated in place.
    async fn insert_subscription_with_job(
        &self,
        subscription: &NewSubscription,
        job: &NewEmailJob,
    ) -> Result<(), StoreError>;

    async fn find_subscription(
        &self,
        email: &SubscriberEmail,
        newsletter_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Returns how many active rows were disabled; zero is not an error.
    async fn disable_subscription(
        &self,
        email: &SubscriberEmail,
        newsletter_id: Uuid,
    ) -> Result<u64, StoreError>;

    async fn newsletters_by_subscriber_email(
        &self,
        email: &SubscriberEmail,
        page: PageRequest,
    ) -> Result<Page<SubscribedNewsletter>, StoreError>;

    async fn unsent_email_jobs(
        &self,
        max_jobs: i64,
        kinds: &[EmailJobKind],
    ) -> Result<Vec<EmailJob>, StoreError>;

    /// Unsent jobs whose type is not in `kinds`; they are never fetched.
    async fn count_unsupported_email_jobs(&self, kinds: &[EmailJobKind]) -> Result<i64, StoreError>;

    async fn mark_email_jobs_sent(&self, job_ids: &[Uuid]) -> Result<u64, StoreError>;
}

pub(crate) async fn bounded<T, E>(
    timeout: time::Duration,
    operation: impl Future<Output = Result<T, E>>,
) -> Result<T, StoreError>
where
    StoreError: From<E>,
{
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
        .map_err(StoreError::from)
}
