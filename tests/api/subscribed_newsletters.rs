use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::TestApp;

#[tokio::test]
async fn lists_only_active_subscriptions_of_the_subscriber() {
    let test_app = TestApp::spawn_app().await;
    let first = test_app.create_newsletter().await;
    let second = test_app.create_newsletter().await;
    let third = test_app.create_newsletter().await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&test_app.email_server)
        .await;

    test_app.subscribe(&first, "test@test.com").await;
    test_app.subscribe(&second, "test@test.com").await;
    test_app.subscribe(&third, "other@test.com").await;
    test_app.dispatch_pending_jobs().await;

    let received_requests = test_app.email_server.received_requests().await.unwrap();
    let link = received_requests
        .iter()
        .find(|request| {
            TestApp::recipient_of(request) == "test@test.com"
                && String::from_utf8_lossy(&request.body).contains(&second.public_id.to_string())
        })
        .map(|request| test_app.get_unsubscribe_link(request))
        .unwrap();

    reqwest::get(link).await.unwrap();

    let response = test_app
        .get_subscribed_newsletters("test@test.com", &[])
        .await;
    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["publicId"], first.public_id.to_string());
    assert_eq!(body["pagination"]["totalItems"], 1);
}

#[tokio::test]
async fn pages_through_subscriptions() {
    let test_app = TestApp::spawn_app().await;

    for _ in 0..3 {
        let newsletter = test_app.create_newsletter().await;
        test_app.subscribe(&newsletter, "test@test.com").await;
    }

    let response = test_app
        .get_subscribed_newsletters("test@test.com", &[("page_size", "2"), ("page_number", "2")])
        .await;
    let body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["currentPage"], 2);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["hasPrevious"], true);
    assert_eq!(body["pagination"]["hasNext"], false);
}

#[tokio::test]
async fn invalid_page_is_rejected_with_400() {
    let test_app = TestApp::spawn_app().await;

    let test_cases = vec![
        (vec![("page_size", "0")], "empty page"),
        (vec![("page_size", "101")], "page over the size cap"),
        (vec![("page_size", "9223372036854775807")], "largest page size"),
        (vec![("page_number", "9223372036854775807")], "page far past the end"),
    ];

    for (query, error_message) in test_cases {
        let response = test_app
            .get_subscribed_newsletters("test@test.com", &query)
            .await;

        assert_eq!(
            response.status(),
            400,
            "The API did not fail with 400 Bad Request for the {}.",
            error_message
        );
    }
}
