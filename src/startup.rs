use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::net::TcpListener;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_actix_web::TracingLogger;

use crate::cache::{CacheStore, RedisCacheStore, SubscriptionCache};
use crate::config::{DatabaseSettings, Settings};
use crate::email_client::{EmailClient, MailError};
use crate::outbox::{DeliveryWorker, OutboxDispatcher};
use crate::newsletters::NewsletterService;
use crate::routes::{
    handle_create_newsletter, handle_get_newsletter, handle_own_newsletters, handle_subscribe,
    handle_subscribed_newsletters, handle_unsubscribe,
};
use crate::store::{PgSubscriptionStore, SubscriptionStore};
use crate::subscriptions::SubscriptionService;
use crate::token::TokenService;

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("Failed to load the configuration.")]
    Config(#[from] config::ConfigError),
    #[error("Failed to bind the HTTP listener.")]
    Io(#[from] std::io::Error),
    #[error("Invalid Redis configuration.")]
    Redis(#[from] redis::RedisError),
    #[error("Failed to build the email client.")]
    Mail(#[from] MailError),
    #[error("Sender email is not valid: {0}")]
    InvalidSender(String),
}

pub struct Application {
    port: u16,
    server: Server,
    dispatcher: OutboxDispatcher,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, StartupError> {
        let redis_client = redis::Client::open(config.get_redis_address())?;

        Self::build_with_cache(config, Arc::new(RedisCacheStore::new(redis_client))).await
    }

    /// Same as `build` with the cache store supplied by the caller.
    pub async fn build_with_cache(
        config: Settings,
        cache_store: Arc<dyn CacheStore>,
    ) -> Result<Self, StartupError> {
        let dependency_timeout = config.dispatcher.get_dependency_timeout();
        let db_pool = get_connection_db_pool(&config.database);
        let store: Arc<dyn SubscriptionStore> =
            Arc::new(PgSubscriptionStore::new(db_pool, dependency_timeout));
        let cache = SubscriptionCache::new(cache_store, dependency_timeout);
        let tokens = TokenService::new(
            &config.application.token_secret,
            config.application.token_issuer.clone(),
        );
        let newsletters = NewsletterService::new(store.clone(), tokens.clone());
        let subscriptions = SubscriptionService::new(store.clone(), tokens, cache.clone());
        let dispatcher = build_dispatcher(&config, store, cache)?;

        let listener = TcpListener::bind(config.get_address())?;
        let port = listener.local_addr()?.port();
        let server = run(listener, newsletters, subscriptions)?;

        Ok(Self {
            port,
            server,
            dispatcher,
        })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Serves HTTP and dispatches the outbox until the server stops (actix
    /// handles SIGINT/SIGTERM), then lets the dispatcher finish its batch.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        let (shutdown_sender, shutdown) = watch::channel(false);
        let dispatcher = tokio::spawn(self.dispatcher.run_until_stopped(shutdown));

        let result = self.server.await;

        shutdown_sender.send_replace(true);

        if let Err(err) = dispatcher.await {
            tracing::error!("Email job dispatcher failed: {:?}", err);
        }

        result
    }
}

pub fn build_dispatcher(
    config: &Settings,
    store: Arc<dyn SubscriptionStore>,
    cache: SubscriptionCache,
) -> Result<OutboxDispatcher, StartupError> {
    let sender_email = config
        .get_email_client_sender()
        .map_err(StartupError::InvalidSender)?;
    let email_client = EmailClient::new(
        config.get_email_client_base_url(),
        sender_email,
        config.get_email_client_api(),
        Some(config.get_email_client_timeout()),
    )?;
    let worker = DeliveryWorker::new(
        Arc::new(email_client),
        cache,
        config.get_app_base_url(),
        config.dispatcher.send_mail,
        config.get_email_client_timeout(),
    );

    Ok(OutboxDispatcher::new(
        store,
        worker,
        config.dispatcher.clone(),
    ))
}

pub fn run(
    listener: TcpListener,
    newsletters: NewsletterService,
    subscriptions: SubscriptionService,
) -> Result<Server, std::io::Error> {
    let newsletters = web::Data::new(newsletters);
    let subscriptions = web::Data::new(subscriptions);

    let server = HttpServer::new(move || {
        App::new()
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .route("/api/v1/newsletters", web::post().to(handle_create_newsletter))
            .route("/api/v1/newsletters", web::get().to(handle_own_newsletters))
            .route(
                "/api/v1/newsletters/{newsletter_public_id}",
                web::get().to(handle_get_newsletter),
            )
            .route(
                "/api/v1/newsletters/{newsletter_public_id}/subscriptions",
                web::post().to(handle_subscribe),
            )
            .route("/api/v1/unsubscribe", web::get().to(handle_unsubscribe))
            .route(
                "/api/v1/subscriptions/{email}/newsletters",
                web::get().to(handle_subscribed_newsletters),
            )
            .app_data(newsletters.clone())
            .app_data(subscriptions.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}
