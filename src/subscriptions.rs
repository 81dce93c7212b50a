use std::sync::Arc;

use crate::cache::SubscriptionCache;
use crate::domain::email_job::NewEmailJob;
use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::page::{Page, PageRequest};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscription::{NewSubscription, SubscribedNewsletter};
use crate::store::{StoreError, SubscriptionStore};
use crate::token::{TokenError, TokenService};

#[derive(thiserror::Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    InvalidEmail(String),
    #[error("{0}")]
    InvalidNewsletterId(String),
    #[error("{0}")]
    InvalidPage(String),
    #[error("Newsletter not found.")]
    NewsletterNotFound,
    #[error("Subscriber is already subscribed to the newsletter.")]
    AlreadySubscribed,
    #[error("Unsubscribe token is not valid.")]
    InvalidToken(#[source] TokenError),
    #[error("Failed to issue a subscription token.")]
    TokenIssue(#[source] TokenError),
    #[error("Failed to build the confirmation email job.")]
    JobPayload(#[from] serde_json::Error),
    #[error("Failed to reach the subscription store.")]
    Store(#[source] StoreError),
}

impl From<StoreError> for SubscriptionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NewsletterNotFound => SubscriptionError::NewsletterNotFound,
            StoreError::AlreadySubscribed => SubscriptionError::AlreadySubscribed,
            err => SubscriptionError::Store(err),
        }
    }
}

impl std::fmt::Debug for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

pub fn error_chain_fmt(
    err: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}", err)?;

    let mut current = err.source();

    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Disabled,
    // Repeated clicks on the same link land here
    AlreadyInactive,
    // Validly signed token for a pair that was never stored
    NotSubscribed,
}

/// Synchronous commands issued by the transport layer. Subscribing only
/// writes the outbox; delivery happens later in the dispatcher.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    tokens: TokenService,
    cache: SubscriptionCache,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        tokens: TokenService,
        cache: SubscriptionCache,
    ) -> Self {
        Self {
            store,
            tokens,
            cache,
        }
    }

    #[tracing::instrument(name = "Subscribe to a newsletter", skip(self))]
    pub async fn subscribe(
        &self,
        newsletter_public_id: &str,
        email: &str,
    ) -> Result<(), SubscriptionError> {
        let email = SubscriberEmail::parse(email.to_string()).map_err(SubscriptionError::InvalidEmail)?;
        let public_id = NewsletterPublicId::parse(newsletter_public_id)
            .map_err(SubscriptionError::InvalidNewsletterId)?;
        let newsletter_id = self.store.newsletter_id_by_public_id(&public_id).await?;
        let token = self
            .tokens
            .issue_subscription_token(&email)
            .map_err(SubscriptionError::TokenIssue)?;
        let job = NewEmailJob::subscription_confirmation(&email, public_id, &token)?;
        let subscription = NewSubscription::new(email, newsletter_id, public_id, token);

        self.store
            .insert_subscription_with_job(&subscription, &job)
            .await?;

        tracing::info!(job_id = %job.id, "Subscription stored, confirmation email enqueued");

        Ok(())
    }

    #[tracing::instrument(name = "Unsubscribe from a newsletter", skip(self, token))]
    pub async fn unsubscribe(
        &self,
        newsletter_public_id: &str,
        token: &str,
    ) -> Result<UnsubscribeOutcome, SubscriptionError> {
        let subject = self
            .tokens
            .verify(token)
            .map_err(SubscriptionError::InvalidToken)?;
        let email = SubscriberEmail::parse(subject)
            .map_err(|_| SubscriptionError::InvalidToken(TokenError::MalformedSubject))?;
        let public_id = NewsletterPublicId::parse(newsletter_public_id)
            .map_err(SubscriptionError::InvalidNewsletterId)?;
        let newsletter_id = self.store.newsletter_id_by_public_id(&public_id).await?;

        let outcome = match self.store.find_subscription(&email, newsletter_id).await? {
            None => UnsubscribeOutcome::NotSubscribed,
            Some(subscription) if !subscription.is_active() => UnsubscribeOutcome::AlreadyInactive,
            Some(_) => match self.store.disable_subscription(&email, newsletter_id).await? {
                // Lost a race with a concurrent unsubscribe
                0 => UnsubscribeOutcome::AlreadyInactive,
                _ => UnsubscribeOutcome::Disabled,
            },
        };

        if let Err(err) = self
            .cache
            .remove_subscribed_newsletter(&email, &public_id)
            .await
        {
            tracing::warn!(
                "Failed to remove newsletter {} from cache of {}: {:?}",
                public_id,
                email,
                err
            );
        }

        if outcome != UnsubscribeOutcome::Disabled {
            tracing::info!("No active subscription to disable: {:?}", outcome);
        }

        Ok(outcome)
    }

    #[tracing::instrument(name = "List subscribed newsletters", skip(self))]
    pub async fn subscribed_newsletters(
        &self,
        email: &str,
        page_size: i64,
        page_number: i64,
    ) -> Result<Page<SubscribedNewsletter>, SubscriptionError> {
        let email = SubscriberEmail::parse(email.to_string()).map_err(SubscriptionError::InvalidEmail)?;
        let page = PageRequest::parse(page_size, page_number).map_err(SubscriptionError::InvalidPage)?;

        Ok(self
            .store
            .newsletters_by_subscriber_email(&email, page)
            .await?)
    }
}
