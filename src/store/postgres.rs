use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time;
use uuid::Uuid;

use crate::domain::email_job::{EmailJob, EmailJobKind, NewEmailJob};
use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::page::{Page, PageRequest, Pagination};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscription::{NewSubscription, SubscribedNewsletter, Subscription};
use crate::store::{bounded, StoreError, SubscriptionStore};

pub struct PgSubscriptionStore {
    db_pool: PgPool,
    timeout: time::Duration,
}

impl PgSubscriptionStore {
    pub fn new(db_pool: PgPool, timeout: time::Duration) -> Self {
        Self { db_pool, timeout }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    #[tracing::instrument(name = "Insert a newsletter into the database", skip(self))]
    async fn create_newsletter(&self, newsletter: &Newsletter) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO newsletters (id, public_id, creator_id, name, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(newsletter.id)
        .bind(newsletter.public_id.as_uuid())
        .bind(newsletter.creator_id)
        .bind(&newsletter.name)
        .bind(&newsletter.description)
        .bind(newsletter.created_at)
        .execute(&self.db_pool);

        bounded(self.timeout, query).await?;

        Ok(())
    }

    #[tracing::instrument(name = "Fetch a newsletter by public id", skip(self))]
    async fn newsletter_by_public_id(
        &self,
        public_id: &NewsletterPublicId,
    ) -> Result<Newsletter, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT id, public_id, creator_id, name, description, created_at
            FROM newsletters
            WHERE public_id = $1
            "#,
        )
        .bind(public_id.as_uuid())
        .map(|row: PgRow| newsletter_from_row(&row))
        .fetch_optional(&self.db_pool);

        bounded(self.timeout, query)
            .await?
            .ok_or(StoreError::NewsletterNotFound)
    }

    #[tracing::instrument(name = "List newsletters of a creator", skip(self))]
    async fn newsletters_by_creator(
        &self,
        creator_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Newsletter>, StoreError> {
        let count_query = sqlx::query("SELECT COUNT(*) AS total FROM newsletters WHERE creator_id = $1")
            .bind(creator_id)
            .map(|row: PgRow| row.get::<i64, _>("total"))
            .fetch_one(&self.db_pool);

        let total_items = bounded(self.timeout, count_query).await?;

        let query = sqlx::query(
            r#"
            SELECT id, public_id, creator_id, name, description, created_at
            FROM newsletters
            WHERE creator_id = $1
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(creator_id)
        .bind(page.page_size())
        .bind(page.offset())
        .map(|row: PgRow| newsletter_from_row(&row))
        .fetch_all(&self.db_pool);

        let data = bounded(self.timeout, query).await?;

        Ok(Page {
            data,
            pagination: Pagination::new(page, total_items),
        })
    }

    #[tracing::instrument(name = "Resolve a newsletter public id", skip(self))]
    async fn newsletter_id_by_public_id(
        &self,
        public_id: &NewsletterPublicId,
    ) -> Result<Uuid, StoreError> {
        let query = sqlx::query("SELECT id FROM newsletters WHERE public_id = $1")
            .bind(public_id.as_uuid())
            .map(|row: PgRow| row.get::<Uuid, _>("id"))
            .fetch_optional(&self.db_pool);

        bounded(self.timeout, query)
            .await?
            .ok_or(StoreError::NewsletterNotFound)
    }

    #[tracing::instrument(
        name = "Insert a subscription and its confirmation job",
        skip(self, subscription, job),
        fields(
            subscriber_email = %subscription.subscriber_email,
            newsletter_id = %subscription.newsletter_id,
            job_id = %job.id
        )
    )]
    async fn insert_subscription_with_job(
        &self,
        subscription: &NewSubscription,
        job: &NewEmailJob,
    ) -> Result<(), StoreError> {
        bounded(self.timeout, async {
            let mut tx = self.db_pool.begin().await?;

            // Read committed: no dirty reads, and upserts of unrelated
            // (email, newsletter) pairs never wait on each other.
            sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
                .execute(&mut tx)
                .await?;

            // The conditional update only fires for disabled rows, so an
            // active pair comes back without a RETURNING row.
            let upserted = sqlx::query(
                r#"
                INSERT INTO subscriptions (id, subscriber_email, newsletter_id, token, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (subscriber_email, newsletter_id) DO UPDATE
                SET disabled_at = NULL, token = EXCLUDED.token
                WHERE subscriptions.disabled_at IS NOT NULL
                RETURNING id
                "#,
            )
            .bind(subscription.id)
            .bind(subscription.subscriber_email.as_ref())
            .bind(subscription.newsletter_id)
            .bind(&subscription.token)
            .bind(subscription.created_at)
            .fetch_optional(&mut tx)
            .await?;

            if upserted.is_none() {
                tx.rollback().await?;
                return Err(StoreError::AlreadySubscribed);
            }

            let now = Utc::now();

            sqlx::query(
                r#"
                INSERT INTO email_jobs (id, message_type, params, sent, created_at, updated_at)
                VALUES ($1, $2, $3, FALSE, $4, $4)
                "#,
            )
            .bind(job.id)
            .bind(job.kind.as_ref())
            .bind(&job.params)
            .bind(now)
            .execute(&mut tx)
            .await?;

            tx.commit().await?;

            Ok::<(), StoreError>(())
        })
        .await
        .map_err(|err| {
            tracing::error!("Failed to store subscription: {:?}", err);
            err
        })
    }

    #[tracing::instrument(name = "Fetch a subscription", skip(self))]
    async fn find_subscription(
        &self,
        email: &SubscriberEmail,
        newsletter_id: Uuid,
    ) -> Result<Option<Subscription>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT id, subscriber_email, newsletter_id, token, created_at, disabled_at
            FROM subscriptions
            WHERE subscriber_email = $1 AND newsletter_id = $2
            "#,
        )
        .bind(email.as_ref())
        .bind(newsletter_id)
        .fetch_optional(&self.db_pool);

        match bounded(self.timeout, query).await? {
            Some(row) => Ok(Some(subscription_from_row(&row)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(name = "Disable a subscription", skip(self))]
    async fn disable_subscription(
        &self,
        email: &SubscriberEmail,
        newsletter_id: Uuid,
    ) -> Result<u64, StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE subscriptions SET disabled_at = $3
            WHERE subscriber_email = $1 AND newsletter_id = $2 AND disabled_at IS NULL
            "#,
        )
        .bind(email.as_ref())
        .bind(newsletter_id)
        .bind(Utc::now())
        .execute(&self.db_pool);

        let result = bounded(self.timeout, query).await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(name = "List newsletters of a subscriber", skip(self))]
    async fn newsletters_by_subscriber_email(
        &self,
        email: &SubscriberEmail,
        page: PageRequest,
    ) -> Result<Page<SubscribedNewsletter>, StoreError> {
        let count_query = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM subscriptions s JOIN newsletters n ON n.id = s.newsletter_id
            WHERE s.subscriber_email = $1 AND s.disabled_at IS NULL
            "#,
        )
        .bind(email.as_ref())
        .map(|row: PgRow| row.get::<i64, _>("total"))
        .fetch_one(&self.db_pool);

        let total_items = bounded(self.timeout, count_query).await?;

        let query = sqlx::query(
            r#"
            SELECT n.public_id, n.name, n.description, s.created_at
            FROM subscriptions s JOIN newsletters n ON n.id = s.newsletter_id
            WHERE s.subscriber_email = $1 AND s.disabled_at IS NULL
            ORDER BY s.created_at, n.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(email.as_ref())
        .bind(page.page_size())
        .bind(page.offset())
        .map(|row: PgRow| SubscribedNewsletter {
            public_id: NewsletterPublicId::from(row.get::<Uuid, _>("public_id")),
            name: row.get("name"),
            description: row.get("description"),
            subscribed_at: row.get("created_at"),
        })
        .fetch_all(&self.db_pool);

        let data = bounded(self.timeout, query).await?;

        Ok(Page {
            data,
            pagination: Pagination::new(page, total_items),
        })
    }

    #[tracing::instrument(name = "Fetch unsent email jobs", skip(self, kinds))]
    async fn unsent_email_jobs(
        &self,
        max_jobs: i64,
        kinds: &[EmailJobKind],
    ) -> Result<Vec<EmailJob>, StoreError> {
        let kinds: Vec<String> = kinds.iter().map(|kind| kind.as_ref().to_string()).collect();
        let query = sqlx::query(
            r#"
            SELECT id, message_type, params, sent, created_at, updated_at
            FROM email_jobs
            WHERE sent = FALSE AND message_type = ANY($1)
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(kinds)
        .bind(max_jobs)
        .map(|row: PgRow| EmailJob {
            id: row.get("id"),
            message_type: row.get("message_type"),
            params: row.get("params"),
            sent: row.get("sent"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
        .fetch_all(&self.db_pool);

        bounded(self.timeout, query).await
    }

    #[tracing::instrument(name = "Count unsent jobs of unsupported types", skip(self, kinds))]
    async fn count_unsupported_email_jobs(&self, kinds: &[EmailJobKind]) -> Result<i64, StoreError> {
        let kinds: Vec<String> = kinds.iter().map(|kind| kind.as_ref().to_string()).collect();
        let query = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM email_jobs
            WHERE sent = FALSE AND message_type <> ALL($1)
            "#,
        )
        .bind(kinds)
        .map(|row: PgRow| row.get::<i64, _>("total"))
        .fetch_one(&self.db_pool);

        bounded(self.timeout, query).await
    }

    #[tracing::instrument(name = "Mark email jobs as sent", skip(self))]
    async fn mark_email_jobs_sent(&self, job_ids: &[Uuid]) -> Result<u64, StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE email_jobs SET sent = TRUE, updated_at = CURRENT_TIMESTAMP
            WHERE id = ANY($1) AND sent = FALSE
            "#,
        )
        .bind(job_ids.to_vec())
        .execute(&self.db_pool);

        let result = bounded(self.timeout, query).await?;

        Ok(result.rows_affected())
    }
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, StoreError> {
    Ok(Subscription {
        id: row.try_get("id")?,
        subscriber_email: SubscriberEmail::parse(row.try_get("subscriber_email")?)
            .map_err(StoreError::InvalidRow)?,
        newsletter_id: row.try_get("newsletter_id")?,
        token: row.try_get("token")?,
        created_at: row.try_get("created_at")?,
        disabled_at: row.try_get("disabled_at")?,
    })
}

fn newsletter_from_row(row: &PgRow) -> Newsletter {
    Newsletter {
        id: row.get("id"),
        public_id: NewsletterPublicId::from(row.get::<Uuid, _>("public_id")),
        creator_id: row.get("creator_id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}
