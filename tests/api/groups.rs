use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::TestApp;

#[tokio::test]
async fn groups_are_unavailable_without_an_api_key() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get("/groups").await;

    assert_eq!(response.status().as_u16(), 503);
}

#[tokio::test]
async fn groups_are_listed_from_mailerlite() {
    let test_app = TestApp::spawn_app_with_mailerlite().await;

    Mock::given(method("GET"))
        .and(path("/groups"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"id": 42, "name": "Weekly"}]
        })))
        .expect(1)
        .mount(&test_app.mailerlite_server)
        .await;

    let response = test_app.get("/groups").await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"groups": [{"id": "42", "name": "Weekly"}]})
    );
}

#[tokio::test]
async fn groups_return_502_when_mailerlite_fails() {
    let test_app = TestApp::spawn_app_with_mailerlite().await;

    Mock::given(method("GET"))
        .and(path("/groups"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&test_app.mailerlite_server)
        .await;

    let response = test_app.get("/groups").await;

    assert_eq!(response.status().as_u16(), 502);
}
