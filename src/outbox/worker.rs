use std::sync::Arc;
use std::time;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::SubscriptionCache;
use crate::domain::email_job::{EmailJob, EmailJobKind, SubscriptionConfirmationParams};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::{MailError, MailTransport};

const CONFIRMATION_SUBJECT: &str = "Subscribed to newsletter";

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("{0}")]
    UnsupportedKind(String),
    #[error("Job params do not match the job type.")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidRecipient(String),
    #[error("Failed to send the email.")]
    Mail(#[from] MailError),
}

/// Ids of the jobs delivered during one tick, appended concurrently by the
/// workers of that tick.
#[derive(Clone, Default)]
pub struct CompletedJobs {
    ids: Arc<Mutex<Vec<Uuid>>>,
}

impl CompletedJobs {
    pub async fn record(&self, job_id: Uuid) {
        self.ids.lock().await.push(job_id);
    }

    pub async fn take(&self) -> Vec<Uuid> {
        std::mem::take(&mut *self.ids.lock().await)
    }
}

/// Delivers a single outbox job and mirrors the subscription into the cache.
#[derive(Clone)]
pub struct DeliveryWorker {
    mail: Arc<dyn MailTransport>,
    cache: SubscriptionCache,
    base_url: String,
    send_mail: bool,
    mail_timeout: time::Duration,
}

impl DeliveryWorker {
    pub fn new(
        mail: Arc<dyn MailTransport>,
        cache: SubscriptionCache,
        base_url: String,
        send_mail: bool,
        mail_timeout: time::Duration,
    ) -> Self {
        if !send_mail {
            tracing::warn!("Mail sending is disabled, jobs will be marked sent without an email");
        }

        Self {
            mail,
            cache,
            base_url,
            send_mail,
            mail_timeout,
        }
    }

    /// Runs the job to completion. Success is recorded before the cache is
    /// touched: a cache failure must not cause the email to be sent again.
    #[tracing::instrument(
        name = "Process an email job",
        skip(self, job, completed),
        fields(job_id = %job.id, message_type = %job.message_type)
    )]
    pub async fn process(&self, job: EmailJob, completed: &CompletedJobs) {
        let params = match self.deliver(&job).await {
            Ok(params) => params,
            Err(err) => {
                tracing::error!("Failed to deliver email job: {:?}", err);
                return;
            }
        };

        completed.record(job.id).await;

        let email = match SubscriberEmail::parse(params.email) {
            Ok(email) => email,
            Err(err) => {
                tracing::error!("Delivered job holds an invalid email: {}", err);
                return;
            }
        };

        if let Err(err) = self
            .cache
            .add_subscribed_newsletter(&email, &params.newsletter_public_id)
            .await
        {
            tracing::error!("Failed to cache subscription: {:?}", err);
        }
    }

    pub async fn deliver(
        &self,
        job: &EmailJob,
    ) -> Result<SubscriptionConfirmationParams, DeliveryError> {
        match job.kind().map_err(DeliveryError::UnsupportedKind)? {
            EmailJobKind::SubscriptionConfirmation => {
                let params: SubscriptionConfirmationParams =
                    serde_json::from_value(job.params.clone())?;

                self.send_subscription_confirmation(&params).await?;

                Ok(params)
            }
        }
    }

    async fn send_subscription_confirmation(
        &self,
        params: &SubscriptionConfirmationParams,
    ) -> Result<(), DeliveryError> {
        let recipient =
            SubscriberEmail::parse(params.email.clone()).map_err(DeliveryError::InvalidRecipient)?;

        if !self.send_mail {
            tracing::debug!("Mail sending disabled, skipping email to {}", recipient);
            return Ok(());
        }

        let html_body = self.confirmation_email_body(params);
        let status = tokio::time::timeout(
            self.mail_timeout,
            self.mail.send(&recipient, CONFIRMATION_SUBJECT, &html_body),
        )
        .await
        .map_err(|_| MailError::Timeout(self.mail_timeout))??;

        tracing::debug!("Confirmation email sent with status code {}", status);

        Ok(())
    }

    fn confirmation_email_body(&self, params: &SubscriptionConfirmationParams) -> String {
        let unsubscribe_link = format!(
            "{}/api/v1/unsubscribe?newsletter_public_id={}&token={}",
            self.base_url, params.newsletter_public_id, params.token
        );

        format!(
            r#"
            <div>
                <h1>Welcome to our newsletter!</h1>
                <p>Hi {}, you are now subscribed.</p>
                <p>Changed your mind? Click <a href="{}">here</a> to unsubscribe.</p>
            </div>
            "#,
            params.email, unsubscribe_link
        )
    }
}
