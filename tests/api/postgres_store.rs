use chrono::Utc;
use claim::{assert_none, assert_ok, assert_some};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

use learn_drop::{
    config::get_configuration,
    domain::{
        InlineImage, Issue, IssueStatus, Subscriber, SubscriberEmail, SubscriberName,
        SubscriberStatus,
    },
    startup::get_connection_db_pool,
    store::{IssueStore, PgIssueStore, PgSubscriberStore, SubscriberInsert, SubscriberStore},
};

/// Creates a fresh, migrated database on the configured Postgres server.
/// Returns `None` when no database is configured or the server is not reachable.
async fn configure_database() -> Option<PgPool> {
    let config = get_configuration().expect("Missing configuration file.");
    let mut database = match config.database {
        Some(database) => database,
        None => {
            println!("No database configured, skipping the Postgres store test");
            return None;
        }
    };

    let mut connection = match PgConnection::connect_with(&database.get_server_options()).await {
        Ok(connection) => connection,
        Err(e) => {
            println!("Postgres is not reachable ({}), skipping the Postgres store test", e);
            return None;
        }
    };

    let db_test_name = format!("db_{}", Uuid::new_v4().to_string().replace('-', "_"));

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");
    connection
        .close()
        .await
        .expect("Failed to close connection.");

    database.set_name(db_test_name);

    let db_pool = get_connection_db_pool(&database);

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run migrations.");

    Some(db_pool)
}

fn subscriber(email: &str, token: &str) -> Subscriber {
    Subscriber {
        id: Uuid::new_v4(),
        newsletter_id: None,
        email: SubscriberEmail::parse(email.to_string()).unwrap(),
        name: Some(SubscriberName::parse("Ada".to_string()).unwrap()),
        profession: Some("mathematician".into()),
        status: SubscriberStatus::Unconfirmed,
        subscribed_at: Utc::now(),
        confirmed_at: None,
        confirm_token: Some(token.to_string()),
    }
}

#[tokio::test]
async fn postgres_store_keeps_one_subscriber_per_email_regardless_of_case() {
    let Some(db_pool) = configure_database().await else {
        return;
    };
    let store = PgSubscriberStore::new(db_pool);

    let first = assert_ok!(store.add(subscriber("Ada@Example.com", "token-1")).await);
    let second = assert_ok!(store.add(subscriber("ada@example.com", "token-2")).await);

    assert!(matches!(first, SubscriberInsert::Created(_)));
    match second {
        SubscriberInsert::AlreadyExists(existing) => {
            assert_eq!(existing.email.as_ref(), "Ada@Example.com");
            assert_eq!(existing.confirm_token.as_deref(), Some("token-1"));
        }
        SubscriberInsert::Created(_) => panic!("A duplicate email was stored twice."),
    }
    assert_eq!(assert_ok!(store.list().await).len(), 1);
}

#[tokio::test]
async fn postgres_store_confirms_a_token_only_once() {
    let Some(db_pool) = configure_database().await else {
        return;
    };
    let store = PgSubscriberStore::new(db_pool);
    assert_ok!(store.add(subscriber("grace@example.com", "single-use")).await);

    let confirmed = assert_ok!(store.confirm("single-use", Utc::now()).await);
    let again = assert_ok!(store.confirm("single-use", Utc::now()).await);

    let confirmed = assert_some!(confirmed);
    assert_eq!(confirmed.status, SubscriberStatus::Active);
    assert_some!(confirmed.confirmed_at);
    assert_none!(confirmed.confirm_token);
    assert_none!(again);

    let stored = assert_ok!(store.list().await);
    assert_eq!(stored[0].status, SubscriberStatus::Active);
}

#[tokio::test]
async fn postgres_store_returns_issues_with_their_image() {
    let Some(db_pool) = configure_database().await else {
        return;
    };
    let store = PgIssueStore::new(db_pool);
    let issue = Issue {
        id: Uuid::new_v4(),
        title: "Week 1".into(),
        subject: "Learn Drop #1".into(),
        content: "# Hello".into(),
        status: IssueStatus::Draft,
        scheduled_time: None,
        sent_at: None,
        created_at: Utc::now(),
        image: Some(InlineImage {
            file_name: "cover.png".into(),
            content_type: "image/png".into(),
            data: vec![0x89, 0x50, 0x4e, 0x47],
        }),
    };

    assert_ok!(store.add(issue.clone()).await);

    let stored = assert_some!(assert_ok!(store.get(issue.id).await));
    let image = assert_some!(stored.image);
    assert_eq!(stored.title, "Week 1");
    assert_eq!(stored.status, IssueStatus::Draft);
    assert_eq!(image.file_name, "cover.png");
    assert_eq!(image.content_type, "image/png");
    assert_eq!(image.data, vec![0x89, 0x50, 0x4e, 0x47]);
    assert_none!(assert_ok!(store.get(Uuid::new_v4()).await));
}
