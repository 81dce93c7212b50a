use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::email_job::{EmailJob, EmailJobKind, NewEmailJob};
use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::page::{Page, PageRequest, Pagination};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscription::{NewSubscription, SubscribedNewsletter, Subscription};
use crate::store::{StoreError, SubscriptionStore};

#[derive(Default)]
struct State {
    newsletters: Vec<Newsletter>,
    subscriptions: Vec<Subscription>,
    email_jobs: Vec<EmailJob>,
}

/// Store kept behind a single lock, so every write is all-or-nothing.
#[derive(Default, Clone)]
pub struct InMemorySubscriptionStore {
    state: Arc<Mutex<State>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.state.lock().await.subscriptions.clone()
    }

    pub async fn email_jobs(&self) -> Vec<EmailJob> {
        self.state.lock().await.email_jobs.clone()
    }

    /// Enqueues a job outside of a subscription, as another producer would.
    pub async fn enqueue_email_job(&self, message_type: &str, params: serde_json::Value) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();

        self.state.lock().await.email_jobs.push(EmailJob {
            id,
            message_type: message_type.to_string(),
            params,
            sent: false,
            created_at: now,
            updated_at: now,
        });

        id
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn create_newsletter(&self, newsletter: &Newsletter) -> Result<(), StoreError> {
        self.state.lock().await.newsletters.push(newsletter.clone());

        Ok(())
    }

    async fn newsletter_by_public_id(
        &self,
        public_id: &NewsletterPublicId,
    ) -> Result<Newsletter, StoreError> {
        self.state
            .lock()
            .await
            .newsletters
            .iter()
            .find(|newsletter| &newsletter.public_id == public_id)
            .cloned()
            .ok_or(StoreError::NewsletterNotFound)
    }

    async fn newsletters_by_creator(
        &self,
        creator_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Newsletter>, StoreError> {
        let state = self.state.lock().await;
        let mut owned: Vec<Newsletter> = state
            .newsletters
            .iter()
            .filter(|newsletter| newsletter.creator_id == creator_id)
            .cloned()
            .collect();

        owned.sort_by_key(|newsletter| newsletter.created_at);

        let total_items = owned.len() as i64;
        let data = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size() as usize)
            .collect();

        Ok(Page {
            data,
            pagination: Pagination::new(page, total_items),
        })
    }

    async fn newsletter_id_by_public_id(
        &self,
        public_id: &NewsletterPublicId,
    ) -> Result<Uuid, StoreError> {
        self.state
            .lock()
            .await
            .newsletters
            .iter()
            .find(|newsletter| &newsletter.public_id == public_id)
            .map(|newsletter| newsletter.id)
            .ok_or(StoreError::NewsletterNotFound)
    }

    async fn insert_subscription_with_job(
        &self,
        subscription: &NewSubscription,
        job: &NewEmailJob,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        let existing = state.subscriptions.iter_mut().find(|existing| {
            existing.subscriber_email == subscription.subscriber_email
                && existing.newsletter_id == subscription.newsletter_id
        });

        match existing {
            Some(existing) if existing.is_active() => return Err(StoreError::AlreadySubscribed),
            Some(existing) => {
                existing.disabled_at = None;
                existing.token = subscription.token.clone();
            }
            None => state.subscriptions.push(Subscription {
                id: subscription.id,
                subscriber_email: subscription.subscriber_email.clone(),
                newsletter_id: subscription.newsletter_id,
                token: subscription.token.clone(),
                created_at: subscription.created_at,
                disabled_at: None,
            }),
        }

        let now = Utc::now();

        state.email_jobs.push(EmailJob {
            id: job.id,
            message_type: job.kind.as_ref().to_string(),
            params: job.params.clone(),
            sent: false,
            created_at: now,
            updated_at: now,
        });

        Ok(())
    }

    async fn find_subscription(
        &self,
        email: &SubscriberEmail,
        newsletter_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .subscriptions
            .iter()
            .find(|subscription| {
                &subscription.subscriber_email == email
                    && subscription.newsletter_id == newsletter_id
            })
            .cloned())
    }

    async fn disable_subscription(
        &self,
        email: &SubscriberEmail,
        newsletter_id: Uuid,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut affected = 0;

        for subscription in state.subscriptions.iter_mut().filter(|subscription| {
            &subscription.subscriber_email == email
                && subscription.newsletter_id == newsletter_id
                && subscription.is_active()
        }) {
            subscription.disabled_at = Some(now);
            affected += 1;
        }

        Ok(affected)
    }

    async fn newsletters_by_subscriber_email(
        &self,
        email: &SubscriberEmail,
        page: PageRequest,
    ) -> Result<Page<SubscribedNewsletter>, StoreError> {
        let state = self.state.lock().await;
        let mut active: Vec<SubscribedNewsletter> = state
            .subscriptions
            .iter()
            .filter(|subscription| &subscription.subscriber_email == email && subscription.is_active())
            .filter_map(|subscription| {
                state
                    .newsletters
                    .iter()
                    .find(|newsletter| newsletter.id == subscription.newsletter_id)
                    .map(|newsletter| SubscribedNewsletter {
                        public_id: newsletter.public_id,
                        name: newsletter.name.clone(),
                        description: newsletter.description.clone(),
                        subscribed_at: subscription.created_at,
                    })
            })
            .collect();

        active.sort_by_key(|newsletter| newsletter.subscribed_at);

        let total_items = active.len() as i64;
        let data = active
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size() as usize)
            .collect();

        Ok(Page {
            data,
            pagination: Pagination::new(page, total_items),
        })
    }

    async fn unsent_email_jobs(
        &self,
        max_jobs: i64,
        kinds: &[EmailJobKind],
    ) -> Result<Vec<EmailJob>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .email_jobs
            .iter()
            .filter(|job| !job.sent)
            .filter(|job| kinds.iter().any(|kind| kind.as_ref() == job.message_type))
            .take(max_jobs.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_unsupported_email_jobs(&self, kinds: &[EmailJobKind]) -> Result<i64, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .email_jobs
            .iter()
            .filter(|job| !job.sent)
            .filter(|job| !kinds.iter().any(|kind| kind.as_ref() == job.message_type))
            .count() as i64)
    }

    async fn mark_email_jobs_sent(&self, job_ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut affected = 0;

        for job in state
            .email_jobs
            .iter_mut()
            .filter(|job| !job.sent && job_ids.contains(&job.id))
        {
            job.sent = true;
            job.updated_at = now;
            affected += 1;
        }

        Ok(affected)
    }
}
