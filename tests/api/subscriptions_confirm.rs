use crate::helpers::TestApp;

#[tokio::test]
async fn confirmations_without_token_are_rejected_with_400() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get("/subscribers/confirm").await;

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn unknown_tokens_are_rejected_with_404() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app
        .get("/subscribers/confirm?token=0123456789abcdef0123456789abcdef01234567")
        .await;

    assert_eq!(response.status().as_u16(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn confirmation_link_redirects_to_the_confirmation_page() {
    let test_app = TestApp::spawn_app().await;

    test_app
        .post_subscriber(serde_json::json!({"email": "frank@test.com", "name": "Frank"}))
        .await;
    let confirmation_link = test_app.get_confirmation_link(&test_app.mailbox.sent()[0]);

    let response = test_app
        .api_client
        .get(confirmation_link.html)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 303);
    let location = response.headers()["Location"].to_str().unwrap();
    assert!(location.ends_with("/subscribe/confirmation"));
}

#[tokio::test]
async fn subscribers_are_active_after_clicking_the_confirmation_link() {
    let test_app = TestApp::spawn_app().await;

    test_app
        .create_confirmed_subscriber("frank@test.com", Some("Frank"))
        .await;

    let listed = test_app.get_subscribers_json().await;
    assert_eq!(listed["subscribers"][0]["status"], "active");

    let stored =
        std::fs::read_to_string(test_app.data_dir.path().join("subscribers.json")).unwrap();
    let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert!(stored[0]["confirmed_at"].is_string());
    assert!(stored[0].get("confirm_token").map_or(true, |t| t.is_null()));
}

#[tokio::test]
async fn confirmation_tokens_are_single_use() {
    let test_app = TestApp::spawn_app().await;

    test_app
        .post_subscriber(serde_json::json!({"email": "frank@test.com"}))
        .await;
    let confirmation_link = test_app.get_confirmation_link(&test_app.mailbox.sent()[0]);

    let first = test_app
        .api_client
        .get(confirmation_link.html.clone())
        .send()
        .await
        .unwrap();
    let second = test_app
        .api_client
        .get(confirmation_link.html)
        .send()
        .await
        .unwrap();

    assert_eq!(first.status().as_u16(), 303);
    assert_eq!(second.status().as_u16(), 404);
}
