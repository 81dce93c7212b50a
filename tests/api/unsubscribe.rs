use secrecy::Secret;
use sqlx::Row;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::TestApp;
use newsletter_outbox::cache::CacheStore;
use newsletter_outbox::domain::subscriber_email::SubscriberEmail;
use newsletter_outbox::token::TokenService;

async fn subscribe_and_get_unsubscribe_link(test_app: &TestApp, email: &str) -> reqwest::Url {
    let newsletter = test_app.create_newsletter().await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&test_app.email_server)
        .await;

    test_app.subscribe(&newsletter, email).await;
    test_app.dispatch_pending_jobs().await;

    // Get the first request that was sent to the email server
    let received_requests = &test_app.email_server.received_requests().await.unwrap();

    test_app.get_unsubscribe_link(&received_requests[0])
}

#[tokio::test]
async fn unsubscribe_without_parameters_is_rejected_with_400() {
    let test_app = TestApp::spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/v1/unsubscribe", &test_app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unsubscribe_link_from_the_email_disables_the_subscription() {
    let test_app = TestApp::spawn_app().await;
    let client = reqwest::Client::new();
    let unsubscribe_link = subscribe_and_get_unsubscribe_link(&test_app, "test@test.com").await;

    let response = client.get(unsubscribe_link).send().await.unwrap();
    let subscription = sqlx::query("SELECT disabled_at FROM subscriptions;")
        .fetch_one(&test_app.db_pool)
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(subscription
        .get::<Option<chrono::DateTime<chrono::Utc>>, _>("disabled_at")
        .is_some());
}

#[tokio::test]
async fn unsubscribing_twice_succeeds() {
    let test_app = TestApp::spawn_app().await;
    let client = reqwest::Client::new();
    let unsubscribe_link = subscribe_and_get_unsubscribe_link(&test_app, "test@test.com").await;

    let first = client.get(unsubscribe_link.clone()).send().await.unwrap();
    let second = client.get(unsubscribe_link).send().await.unwrap();

    assert_eq!(first.status(), 200);
    assert_eq!(second.status(), 200);
}

#[tokio::test]
async fn unsubscribe_removes_the_newsletter_from_the_cache() {
    let test_app = TestApp::spawn_app().await;
    let client = reqwest::Client::new();
    let unsubscribe_link = subscribe_and_get_unsubscribe_link(&test_app, "test@test.com").await;
    let cache_key = "subscriptions:dGVzdEB0ZXN0LmNvbQ==";

    assert_eq!(test_app.cache_store.get(cache_key).await.unwrap().len(), 1);

    client.get(unsubscribe_link).send().await.unwrap();

    assert!(test_app.cache_store.get(cache_key).await.unwrap().is_empty());
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected_with_401() {
    let test_app = TestApp::spawn_app().await;
    let newsletter = test_app.create_newsletter().await;

    test_app.subscribe(&newsletter, "test@test.com").await;

    let forged = TokenService::new(
        &Secret::new(String::from("not-the-server-secret")),
        test_app.config.application.token_issuer.clone(),
    )
    .issue_subscription_token(&SubscriberEmail::parse(String::from("test@test.com")).unwrap())
    .unwrap();

    let response = test_app
        .get_unsubscribe(&newsletter.public_id.to_string(), &forged)
        .await;
    let disabled: i64 =
        sqlx::query("SELECT COUNT(*) AS total FROM subscriptions WHERE disabled_at IS NOT NULL;")
            .fetch_one(&test_app.db_pool)
            .await
            .unwrap()
            .get("total");

    assert_eq!(response.status(), 401);
    assert_eq!(disabled, 0);
}

#[tokio::test]
async fn unsubscribe_from_unknown_newsletter_returns_404() {
    let test_app = TestApp::spawn_app().await;
    let unsubscribe_link = subscribe_and_get_unsubscribe_link(&test_app, "test@test.com").await;
    let token = unsubscribe_link
        .query_pairs()
        .find(|(name, _)| name == "token")
        .map(|(_, value)| value.into_owned())
        .unwrap();

    let response = test_app
        .get_unsubscribe(&Uuid::new_v4().to_string(), &token)
        .await;

    assert_eq!(response.status(), 404);
}
