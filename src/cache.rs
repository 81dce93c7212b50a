use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time;
use tokio::sync::Mutex;

use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::subscriber_email::SubscriberEmail;

const KEY_PREFIX: &str = "subscriptions";

/// Newsletter public id -> presence flag.
pub type SubscribedNewsletters = HashMap<String, bool>;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("Cache store failed.")]
    Redis(#[from] redis::RedisError),
    #[error("Cached value could not be (de)serialized.")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache store did not answer within {0:?}.")]
    Timeout(time::Duration),
}

/// Key/value store holding one mapping per encoded subscriber email. No
/// cross-key or read-modify-write guarantees are assumed.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<SubscribedNewsletters, CacheError>;

    async fn set(&self, key: &str, value: &SubscribedNewsletters) -> Result<(), CacheError>;
}

pub struct RedisCacheStore {
    client: redis::Client,
}

impl RedisCacheStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<SubscribedNewsletters, CacheError> {
        let mut redis_conn = self.client.get_tokio_connection().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut redis_conn)
            .await?;

        match value {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Ok(SubscribedNewsletters::new()),
        }
    }

    async fn set(&self, key: &str, value: &SubscribedNewsletters) -> Result<(), CacheError> {
        let mut redis_conn = self.client.get_tokio_connection().await?;

        redis::cmd("SET")
            .arg(key)
            .arg(serde_json::to_string(value)?)
            .query_async::<_, ()>(&mut redis_conn)
            .await?;

        Ok(())
    }
}

/// Process-local store, used by the test suite and by local runs without Redis.
#[derive(Default, Clone)]
pub struct InMemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, SubscribedNewsletters>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<SubscribedNewsletters, CacheError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn set(&self, key: &str, value: &SubscribedNewsletters) -> Result<(), CacheError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.clone());

        Ok(())
    }
}

pub fn cache_key(email: &SubscriberEmail) -> String {
    format!(
        "{}:{}",
        KEY_PREFIX,
        general_purpose::URL_SAFE.encode(email.as_ref())
    )
}

/// Keeps the denormalized "newsletters of this subscriber" index in step with
/// the relational store. The index is a hint only: updates read the whole
/// mapping and write it back, so concurrent writers for the same email may
/// lose an update.
#[derive(Clone)]
pub struct SubscriptionCache {
    store: Arc<dyn CacheStore>,
    timeout: time::Duration,
}

impl SubscriptionCache {
    pub fn new(store: Arc<dyn CacheStore>, timeout: time::Duration) -> Self {
        Self { store, timeout }
    }

    #[tracing::instrument(name = "Add a newsletter to the subscription cache", skip(self))]
    pub async fn add_subscribed_newsletter(
        &self,
        email: &SubscriberEmail,
        newsletter_public_id: &NewsletterPublicId,
    ) -> Result<(), CacheError> {
        let key = cache_key(email);
        let mut records = self.bounded(self.store.get(&key)).await?;

        records.insert(newsletter_public_id.to_string(), true);

        self.bounded(self.store.set(&key, &records)).await
    }

    #[tracing::instrument(name = "Remove a newsletter from the subscription cache", skip(self))]
    pub async fn remove_subscribed_newsletter(
        &self,
        email: &SubscriberEmail,
        newsletter_public_id: &NewsletterPublicId,
    ) -> Result<(), CacheError> {
        let key = cache_key(email);
        let mut records = self.bounded(self.store.get(&key)).await?;

        if records.remove(&newsletter_public_id.to_string()).is_none() {
            return Ok(());
        }

        self.bounded(self.store.set(&key, &records)).await
    }

    pub async fn subscribed_newsletters(
        &self,
        email: &SubscriberEmail,
    ) -> Result<SubscribedNewsletters, CacheError> {
        self.bounded(self.store.get(&cache_key(email))).await
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }
}
