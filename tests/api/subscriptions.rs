use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::TestApp;

#[tokio::test]
async fn subscribe_returns_200_with_the_new_subscriber() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app
        .post_subscriber(serde_json::json!({
            "email": "ada@example.com",
            "name": "Ada",
            "profession": "mathematician"
        }))
        .await;

    assert_eq!(200, response.status().as_u16());

    let body: serde_json::Value = response.json().await.unwrap();
    let subscriber = &body["subscriber"];
    assert_eq!(subscriber["email"], "ada@example.com");
    assert_eq!(subscriber["name"], "Ada");
    assert_eq!(subscriber["profession"], "mathematician");
    assert_eq!(subscriber["status"], "unconfirmed");
    assert!(subscriber.get("confirm_token").is_none());
}

#[tokio::test]
async fn subscribe_persists_the_new_subscriber() {
    let test_app = TestApp::spawn_app().await;

    test_app
        .post_subscriber(serde_json::json!({"email": "test@test.com", "name": "Test"}))
        .await;

    let stored = std::fs::read_to_string(test_app.data_dir.path().join("subscribers.json"))
        .expect("Subscribers file was not written.");
    let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();

    assert_eq!(stored[0]["email"], "test@test.com");
    assert_eq!(stored[0]["status"], "unconfirmed");
    assert_eq!(stored[0]["confirm_token"].as_str().unwrap().len(), 40);
}

#[tokio::test]
async fn subscribe_accepts_a_missing_name() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app
        .post_subscriber(serde_json::json!({"email": "anon@example.com"}))
        .await;

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn subscribe_returns_400_when_body_is_not_valid() {
    let test_app = TestApp::spawn_app().await;

    // This is a common practice and it is called table-driven tests. In this case, it simulates different kind of possible request bodies
    // where API should return 400.
    let test_cases = vec![
        (serde_json::json!({}), "missing email"),
        (serde_json::json!({"name": "Frank"}), "missing email with a name"),
        (serde_json::json!({"email": "   "}), "blank email"),
        (serde_json::json!({"email": "test.com"}), "invalid email"),
        (
            serde_json::json!({"email": "frank@test.com", "name": "{Frank}"}),
            "invalid name",
        ),
        (serde_json::json!({"email": 42}), "email is not a string"),
    ];

    for (invalid_body, error_message) in test_cases {
        let response = test_app.post_subscriber(invalid_body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 status when payload was {}",
            error_message
        );

        let body: serde_json::Value = response.json().await.unwrap();
        assert!(
            body["error"].is_string(),
            "No error message when payload was {}",
            error_message
        );
    }
}

#[tokio::test]
async fn subscribe_sends_a_confirmation_email_with_a_link() {
    let test_app = TestApp::spawn_app().await;

    test_app
        .post_subscriber(serde_json::json!({"email": "test@test.com", "name": "Test"}))
        .await;

    let sent = test_app.mailbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient.as_ref(), "test@test.com");

    let confirmation_link = test_app.get_confirmation_link(&sent[0]);
    assert_eq!(confirmation_link.html, confirmation_link.plain_text);
    assert_eq!(confirmation_link.html.path(), "/subscribers/confirm");
}

#[tokio::test]
async fn subscribing_twice_with_a_different_case_keeps_one_record() {
    let test_app = TestApp::spawn_app().await;

    let first = test_app
        .post_subscriber(serde_json::json!({"email": "ada@example.com", "name": "Ada"}))
        .await;
    let second = test_app
        .post_subscriber(serde_json::json!({"email": "ADA@Example.com", "name": "Someone"}))
        .await;

    assert_eq!(first.status().as_u16(), 200);
    assert_eq!(second.status().as_u16(), 200);

    let second: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second["subscriber"]["email"], "ada@example.com");
    assert_eq!(second["subscriber"]["name"], "Ada");

    let listed = test_app.get_subscribers_json().await;
    assert_eq!(listed["count"], 1);
    assert_eq!(test_app.mailbox.sent().len(), 1);
}

#[tokio::test]
async fn subscribe_with_mailerlite_adds_the_remote_subscriber_instead_of_emailing() {
    let test_app = TestApp::spawn_app_with_mailerlite().await;

    Mock::given(method("POST"))
        .and(path("/subscribers"))
        .and(body_partial_json(serde_json::json!({
            "email": "ada@example.com",
            "fields": {"name": "Ada"},
            "groups": ["weekly"]
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&test_app.mailerlite_server)
        .await;

    let response = test_app
        .post_subscriber(serde_json::json!({
            "email": "ada@example.com",
            "name": "Ada",
            "newsletterId": "weekly"
        }))
        .await;

    assert_eq!(response.status().as_u16(), 200);
    assert!(test_app.mailbox.sent().is_empty());

    let stored =
        std::fs::read_to_string(test_app.data_dir.path().join("subscribers.json")).unwrap();
    let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert!(stored[0].get("confirm_token").map_or(true, |t| t.is_null()));
}

#[tokio::test]
async fn subscribe_succeeds_when_the_remote_list_fails() {
    let test_app = TestApp::spawn_app_with_mailerlite().await;

    Mock::given(method("POST"))
        .and(path("/subscribers"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&test_app.mailerlite_server)
        .await;

    let response = test_app
        .post_subscriber(serde_json::json!({"email": "ada@example.com"}))
        .await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn list_subscribers_merges_local_and_remote_entries() {
    let test_app = TestApp::spawn_app_with_mailerlite().await;

    Mock::given(method("POST"))
        .and(path("/subscribers"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&test_app.mailerlite_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscribers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {
                    "email": "ADA@example.com",
                    "status": "active",
                    "fields": {"name": "Augusta", "profession": "mathematician"}
                },
                {"email": "grace@example.com", "status": "active", "fields": {"name": "Grace"}},
                {"email": "broken@example.com", "status": "pending"}
            ]
        })))
        .mount(&test_app.mailerlite_server)
        .await;

    test_app
        .post_subscriber(serde_json::json!({"email": "ada@example.com", "name": "Ada"}))
        .await;

    let listed = test_app.get_subscribers_json().await;

    assert_eq!(listed["count"], 2);
    let subscribers = listed["subscribers"].as_array().unwrap();
    assert_eq!(subscribers[0]["email"], "ada@example.com");
    assert_eq!(subscribers[0]["name"], "Ada");
    assert_eq!(subscribers[0]["status"], "unconfirmed");
    assert_eq!(subscribers[0]["profession"], "mathematician");
    assert_eq!(subscribers[1]["email"], "grace@example.com");
}

#[tokio::test]
async fn list_subscribers_falls_back_to_local_entries_when_the_remote_fails() {
    let test_app = TestApp::spawn_app_with_mailerlite().await;

    Mock::given(method("GET"))
        .and(path("/subscribers"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&test_app.mailerlite_server)
        .await;

    test_app
        .post_subscriber(serde_json::json!({"email": "ada@example.com"}))
        .await;

    let response = test_app.get_subscribers().await;

    assert_eq!(response.status().as_u16(), 200);
    let listed: serde_json::Value = response.json().await.unwrap();
    assert_eq!(listed["count"], 1);
}
