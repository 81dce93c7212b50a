use sqlx::Row;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::TestApp;
use newsletter_outbox::cache::CacheStore;
use newsletter_outbox::outbox::TickReport;

#[tokio::test]
async fn dispatch_sends_one_confirmation_email_per_subscription() {
    let test_app = TestApp::spawn_app().await;
    let newsletter = test_app.create_newsletter().await;
    let subscribers = ["a@test.com", "b@test.com", "c@test.com"];

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(3)
        .mount(&test_app.email_server)
        .await;

    for subscriber in subscribers {
        test_app.subscribe(&newsletter, subscriber).await;
    }

    let report = test_app.dispatch_pending_jobs().await;
    let pending: i64 = sqlx::query("SELECT COUNT(*) AS total FROM email_jobs WHERE sent = FALSE;")
        .fetch_one(&test_app.db_pool)
        .await
        .unwrap()
        .get("total");
    let mut recipients: Vec<String> = test_app
        .email_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(TestApp::recipient_of)
        .collect();

    recipients.sort();

    assert_eq!(report, TickReport { fetched: 3, sent: 3, unsupported: 0 });
    assert_eq!(pending, 0);
    assert_eq!(recipients, subscribers);
}

#[tokio::test]
async fn dispatch_fills_the_subscription_cache() {
    let test_app = TestApp::spawn_app().await;
    let newsletter = test_app.create_newsletter().await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&test_app.email_server)
        .await;

    test_app.subscribe(&newsletter, "test@test.com").await;
    test_app.dispatch_pending_jobs().await;

    let cached = test_app
        .cache_store
        .get("subscriptions:dGVzdEB0ZXN0LmNvbQ==")
        .await
        .unwrap();

    assert_eq!(cached.get(&newsletter.public_id.to_string()), Some(&true));
}

#[tokio::test]
async fn failed_delivery_is_retried_on_the_next_dispatch() {
    let test_app = TestApp::spawn_app().await;
    let newsletter = test_app.create_newsletter().await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .and(body_string_contains("broken@test.com"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&test_app.email_server)
        .await;
    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&test_app.email_server)
        .await;

    test_app.subscribe(&newsletter, "broken@test.com").await;
    test_app.subscribe(&newsletter, "fine@test.com").await;

    let first = test_app.dispatch_pending_jobs().await;
    let pending: Vec<String> = sqlx::query("SELECT params FROM email_jobs WHERE sent = FALSE;")
        .fetch_all(&test_app.db_pool)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get::<serde_json::Value, _>("params")["email"].to_string())
        .collect();

    assert_eq!(first, TickReport { fetched: 2, sent: 1, unsupported: 0 });
    assert_eq!(pending, vec![String::from("\"broken@test.com\"")]);

    let second = test_app.dispatch_pending_jobs().await;

    assert_eq!(second, TickReport { fetched: 1, sent: 0, unsupported: 0 });
}

#[tokio::test]
async fn dispatch_with_no_pending_jobs_does_nothing() {
    let test_app = TestApp::spawn_app().await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&test_app.email_server)
        .await;

    assert_eq!(test_app.dispatch_pending_jobs().await, TickReport::default());
}

#[tokio::test]
async fn jobs_of_unknown_type_are_counted_and_left_unsent() {
    let test_app = TestApp::spawn_app().await;

    sqlx::query(
        r#"
        INSERT INTO email_jobs (id, message_type, params, sent, created_at, updated_at)
        VALUES ($1, 'weekly-digest', '{}'::jsonb, FALSE, now(), now())
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .execute(&test_app.db_pool)
    .await
    .expect("Failed to insert email job.");

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&test_app.email_server)
        .await;

    let report = test_app.dispatch_pending_jobs().await;

    assert_eq!(report, TickReport { fetched: 0, sent: 0, unsupported: 1 });

    let unsent: i64 = sqlx::query("SELECT COUNT(*) AS total FROM email_jobs WHERE sent = FALSE;")
        .fetch_one(&test_app.db_pool)
        .await
        .unwrap()
        .get("total");

    assert_eq!(unsent, 1);
}
