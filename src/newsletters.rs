use std::sync::Arc;
use uuid::Uuid;

use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_name::NewsletterName;
use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::page::{Page, PageRequest};
use crate::store::{StoreError, SubscriptionStore};
use crate::subscriptions::error_chain_fmt;
use crate::token::{TokenError, TokenService};

#[derive(thiserror::Error)]
pub enum NewsletterError {
    #[error("{0}")]
    InvalidName(String),
    #[error("{0}")]
    InvalidNewsletterId(String),
    #[error("{0}")]
    InvalidPage(String),
    #[error("Newsletter not found.")]
    NewsletterNotFound,
    #[error("Authorization header is missing or malformed.")]
    MissingCredentials,
    #[error("Session token is not valid.")]
    Unauthorized(#[source] TokenError),
    #[error("Failed to reach the newsletter store.")]
    Store(#[source] StoreError),
}

impl From<StoreError> for NewsletterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NewsletterNotFound => NewsletterError::NewsletterNotFound,
            err => NewsletterError::Store(err),
        }
    }
}

impl std::fmt::Debug for NewsletterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Creator-side commands. Writes need the creator id carried by a session
/// token; reading a single newsletter is public.
#[derive(Clone)]
pub struct NewsletterService {
    store: Arc<dyn SubscriptionStore>,
    tokens: TokenService,
}

impl NewsletterService {
    pub fn new(store: Arc<dyn SubscriptionStore>, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// Resolves a session token to the id of the creator it was issued for.
    pub fn authenticate(&self, session_token: &str) -> Result<Uuid, NewsletterError> {
        let subject = self
            .tokens
            .verify(session_token)
            .map_err(NewsletterError::Unauthorized)?;

        Uuid::parse_str(&subject)
            .map_err(|_| NewsletterError::Unauthorized(TokenError::MalformedSubject))
    }

    #[tracing::instrument(name = "Create a newsletter", skip(self, description))]
    pub async fn create(
        &self,
        creator_id: Uuid,
        name: String,
        description: Option<String>,
    ) -> Result<Newsletter, NewsletterError> {
        let name = NewsletterName::parse(name).map_err(NewsletterError::InvalidName)?;
        let newsletter = Newsletter::new(creator_id, name, description);

        self.store.create_newsletter(&newsletter).await?;

        tracing::info!(public_id = %newsletter.public_id, "Newsletter created");

        Ok(newsletter)
    }

    #[tracing::instrument(name = "Fetch a newsletter", skip(self))]
    pub async fn newsletter(&self, public_id: &str) -> Result<Newsletter, NewsletterError> {
        let public_id =
            NewsletterPublicId::parse(public_id).map_err(NewsletterError::InvalidNewsletterId)?;

        Ok(self.store.newsletter_by_public_id(&public_id).await?)
    }

    #[tracing::instrument(name = "List newsletters of a creator", skip(self))]
    pub async fn newsletters_by_creator(
        &self,
        creator_id: Uuid,
        page_size: i64,
        page_number: i64,
    ) -> Result<Page<Newsletter>, NewsletterError> {
        let page = PageRequest::parse(page_size, page_number).map_err(NewsletterError::InvalidPage)?;

        Ok(self.store.newsletters_by_creator(creator_id, page).await?)
    }
}
