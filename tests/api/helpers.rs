use linkify::{LinkFinder, LinkKind};
use once_cell::sync::Lazy;
use reqwest::{Response, Url};
use sqlx::{migrate, Connection, Executor, PgConnection, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::MockServer;

use newsletter_outbox::{
    cache::{InMemoryCacheStore, SubscriptionCache},
    config::{get_configuration, DatabaseSettings, Settings},
    domain::{newsletter::Newsletter, newsletter_name::NewsletterName},
    outbox::{OutboxDispatcher, TickReport},
    startup::{build_dispatcher, get_connection_db_pool, Application},
    store::{PgSubscriptionStore, SubscriptionStore},
    telemetry::{get_subscriber, init_subscriber},
    token::TokenService,
};

// Logs are only printed when TEST_LOG is set, e.g. `TEST_LOG=true cargo test | bunyan`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = String::from("info");
    let subscriber_name = String::from("test");

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub struct TestApp {
    pub config: Settings,
    pub address: String,
    pub port: u16,
    pub db_pool: PgPool,
    pub email_server: MockServer,
    pub store: Arc<dyn SubscriptionStore>,
    pub cache_store: InMemoryCacheStore,
    // Driven by hand through `dispatch_pending_jobs`, the server's own loop never fires in tests
    pub dispatcher: OutboxDispatcher,
}

impl TestApp {
    pub async fn spawn_app() -> TestApp {
        Lazy::force(&TRACING);

        let mut config = get_configuration().expect("Missing configuration file.");
        let db_test_name = format!("db_{}", Uuid::new_v4().to_string().replace('-', "_"));
        let email_server = MockServer::start().await;

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.set_email_client_base_url(email_server.uri());
        config.dispatcher.send_mail = true;
        config.dispatcher.interval_seconds = 3600;

        let db_pool = configure_db(&mut config.database, db_test_name.clone()).await;
        let cache_store = InMemoryCacheStore::new();

        let application = Application::build_with_cache(config.clone(), Arc::new(cache_store.clone()))
            .await
            .expect("Failed to build application.");

        let port = application.get_port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(application.run_until_stopped());

        let dependency_timeout = config.dispatcher.get_dependency_timeout();
        let store: Arc<dyn SubscriptionStore> =
            Arc::new(PgSubscriptionStore::new(db_pool.clone(), dependency_timeout));
        let dispatcher = build_dispatcher(
            &config,
            store.clone(),
            SubscriptionCache::new(Arc::new(cache_store.clone()), dependency_timeout),
        )
        .expect("Failed to build the dispatcher.");

        TestApp {
            address,
            port,
            config,
            db_pool,
            email_server,
            store,
            cache_store,
            dispatcher,
        }
    }

    pub async fn create_newsletter(&self) -> Newsletter {
        let newsletter = Newsletter::new(
            Uuid::new_v4(),
            NewsletterName::parse(String::from("Rust weekly")).unwrap(),
            Some(String::from("News from the Rust ecosystem")),
        );

        self.store
            .create_newsletter(&newsletter)
            .await
            .expect("Failed to create newsletter.");

        newsletter
    }

    /// Session token for `creator_id`, signed the way the server expects.
    pub fn session_token(&self, creator_id: Uuid) -> String {
        TokenService::new(
            &self.config.application.token_secret,
            self.config.application.token_issuer.clone(),
        )
        .issue_session_token(&creator_id.to_string())
        .expect("Failed to issue session token.")
    }

    pub async fn post_newsletter(&self, session_token: Option<&str>, body: serde_json::Value) -> Response {
        let mut request = reqwest::Client::new()
            .post(format!("{}/api/v1/newsletters", self.address))
            .json(&body);

        if let Some(token) = session_token {
            request = request.bearer_auth(token);
        }

        request.send().await.expect("Failed to execute request.")
    }

    pub async fn get_own_newsletters(&self, session_token: &str, query: &[(&str, &str)]) -> Response {
        reqwest::Client::new()
            .get(format!("{}/api/v1/newsletters", self.address))
            .bearer_auth(session_token)
            .query(query)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_newsletter(&self, newsletter_public_id: &str) -> Response {
        reqwest::Client::new()
            .get(format!("{}/api/v1/newsletters/{}", self.address, newsletter_public_id))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_subscription(
        &self,
        newsletter_public_id: &str,
        body: HashMap<&str, &str>,
    ) -> Response {
        let client = reqwest::Client::new();
        let url = format!(
            "{}/api/v1/newsletters/{}/subscriptions",
            self.address, newsletter_public_id
        );

        client
            .post(&url)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn subscribe(&self, newsletter: &Newsletter, email: &str) -> Response {
        self.post_subscription(
            &newsletter.public_id.to_string(),
            HashMap::from([("email", email)]),
        )
        .await
    }

    pub async fn get_unsubscribe(&self, newsletter_public_id: &str, token: &str) -> Response {
        reqwest::Client::new()
            .get(format!("{}/api/v1/unsubscribe", self.address))
            .query(&[("newsletter_public_id", newsletter_public_id), ("token", token)])
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_subscribed_newsletters(&self, email: &str, query: &[(&str, &str)]) -> Response {
        reqwest::Client::new()
            .get(format!("{}/api/v1/subscriptions/{}/newsletters", self.address, email))
            .query(query)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn dispatch_pending_jobs(&self) -> TickReport {
        self.dispatcher
            .tick()
            .await
            .expect("Failed to dispatch email jobs.")
    }

    /// Extracts the unsubscribe link from an email sent to the mock provider,
    /// pointing it to the port the test server listens on.
    pub fn get_unsubscribe_link(&self, request: &wiremock::Request) -> Url {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let html = body["content"][0]["value"].as_str().unwrap();
        let links: Vec<_> = LinkFinder::new()
            .links(html)
            .filter(|link| *link.kind() == LinkKind::Url)
            .collect();

        assert_eq!(links.len(), 1);

        let mut unsubscribe_link = Url::parse(links[0].as_str()).unwrap();

        assert_eq!(unsubscribe_link.host_str().unwrap(), "127.0.0.1");

        unsubscribe_link.set_port(Some(self.port)).unwrap();

        unsubscribe_link
    }

    pub fn recipient_of(request: &wiremock::Request) -> String {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();

        body["personalizations"][0]["to"][0]["email"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

async fn configure_db(db_config: &mut DatabaseSettings, db_test_name: String) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect_with(&db_config.get_db_options_without_name())
        .await
        .expect("Failed to connect to Postgres.");

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");

    connection
        .close()
        .await
        .expect("Failed to close connection.");

    // Execute migrations
    db_config.set_name(db_test_name);

    let db_pool = get_connection_db_pool(db_config);

    migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run migrations.");

    db_pool
}
