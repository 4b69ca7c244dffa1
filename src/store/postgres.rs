use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::domain::{
    InlineImage, Issue, IssueStatus, Subscriber, SubscriberEmail, SubscriberName,
    SubscriberStatus,
};
use crate::store::{IssueStore, StoreError, SubscriberInsert, SubscriberStore};

const SUBSCRIBER_COLUMNS: &str = "id, newsletter_id, email, name, profession, status, \
     subscribed_at, confirmed_at, confirm_token";

const ISSUE_COLUMNS: &str = "id, title, subject, content, status, scheduled_time, sent_at, \
     created_at, image_name, image_content_type, image_data";

pub struct PgSubscriberStore {
    db_pool: PgPool,
}

impl PgSubscriberStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

fn subscriber_from_row(row: &PgRow) -> Result<Subscriber, StoreError> {
    let name: Option<String> = row.try_get("name")?;
    let status: String = row.try_get("status")?;

    Ok(Subscriber {
        id: row.try_get("id")?,
        newsletter_id: row.try_get("newsletter_id")?,
        email: SubscriberEmail::parse(row.try_get("email")?).map_err(StoreError::InvalidRecord)?,
        name: name
            .map(SubscriberName::parse)
            .transpose()
            .map_err(StoreError::InvalidRecord)?,
        profession: row.try_get("profession")?,
        status: SubscriberStatus::parse(&status).map_err(StoreError::InvalidRecord)?,
        subscribed_at: row.try_get("subscribed_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        confirm_token: row.try_get("confirm_token")?,
    })
}

#[async_trait]
impl SubscriberStore for PgSubscriberStore {
    #[tracing::instrument(
        name = "Insert a new subscriber into the database",
        skip(self, subscriber),
        fields(subscriber_email = %subscriber.email)
    )]
    async fn add(&self, subscriber: Subscriber) -> Result<SubscriberInsert, StoreError> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO subscribers ({SUBSCRIBER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            RETURNING {SUBSCRIBER_COLUMNS}
            "#
        ))
        .bind(subscriber.id)
        .bind(&subscriber.newsletter_id)
        .bind(subscriber.email.as_ref())
        .bind(subscriber.name.as_ref().map(|name| name.as_ref().to_string()))
        .bind(&subscriber.profession)
        .bind(subscriber.status.as_ref())
        .bind(subscriber.subscribed_at)
        .bind(subscriber.confirmed_at)
        .bind(&subscriber.confirm_token)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(|err| {
            tracing::error!("Failed to execute query: {:?}", err);
            err
        })?;

        if let Some(row) = inserted {
            return Ok(SubscriberInsert::Created(subscriber_from_row(&row)?));
        }

        let existing = sqlx::query(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers WHERE lower(email) = lower($1)"
        ))
        .bind(subscriber.email.as_ref())
        .fetch_one(&self.db_pool)
        .await?;

        Ok(SubscriberInsert::AlreadyExists(subscriber_from_row(
            &existing,
        )?))
    }

    #[tracing::instrument(name = "Get subscribers from the database", skip(self))]
    async fn list(&self) -> Result<Vec<Subscriber>, StoreError> {
        sqlx::query(&format!(
            "SELECT {SUBSCRIBER_COLUMNS} FROM subscribers ORDER BY subscribed_at, id"
        ))
        .fetch_all(&self.db_pool)
        .await?
        .iter()
        .map(subscriber_from_row)
        .collect()
    }

    #[tracing::instrument(name = "Mark subscriber as confirmed", skip_all)]
    async fn confirm(
        &self,
        token: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError> {
        // A single UPDATE both matches and burns the token.
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscribers
            SET status = 'active', confirmed_at = $2, confirm_token = NULL
            WHERE confirm_token = $1
            RETURNING {SUBSCRIBER_COLUMNS}
            "#
        ))
        .bind(token)
        .bind(confirmed_at)
        .fetch_optional(&self.db_pool)
        .await?;

        row.as_ref().map(subscriber_from_row).transpose()
    }
}

pub struct PgIssueStore {
    db_pool: PgPool,
}

impl PgIssueStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

fn issue_from_row(row: &PgRow) -> Result<Issue, StoreError> {
    let status: String = row.try_get("status")?;
    let image_name: Option<String> = row.try_get("image_name")?;
    let image_content_type: Option<String> = row.try_get("image_content_type")?;
    let image_data: Option<Vec<u8>> = row.try_get("image_data")?;

    let image = match (image_name, image_content_type, image_data) {
        (Some(file_name), Some(content_type), Some(data)) => Some(InlineImage {
            file_name,
            content_type,
            data,
        }),
        _ => None,
    };

    Ok(Issue {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        subject: row.try_get("subject")?,
        content: row.try_get("content")?,
        status: IssueStatus::parse(&status).map_err(StoreError::InvalidRecord)?,
        scheduled_time: row.try_get("scheduled_time")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
        image,
    })
}

#[async_trait]
impl IssueStore for PgIssueStore {
    #[tracing::instrument(
        name = "Insert a new issue into the database",
        skip_all,
        fields(issue_id = %issue.id)
    )]
    async fn add(&self, issue: Issue) -> Result<Issue, StoreError> {
        let image = issue.image.as_ref();

        sqlx::query(&format!(
            r#"
            INSERT INTO issues ({ISSUE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#
        ))
        .bind(issue.id)
        .bind(&issue.title)
        .bind(&issue.subject)
        .bind(&issue.content)
        .bind(issue.status.as_ref())
        .bind(issue.scheduled_time)
        .bind(issue.sent_at)
        .bind(issue.created_at)
        .bind(image.map(|i| i.file_name.clone()))
        .bind(image.map(|i| i.content_type.clone()))
        .bind(image.map(|i| i.data.clone()))
        .execute(&self.db_pool)
        .await
        .map_err(|err| {
            tracing::error!("Failed to execute query: {:?}", err);
            err
        })?;

        Ok(issue)
    }

    #[tracing::instrument(name = "Get issues from the database", skip(self))]
    async fn list(&self) -> Result<Vec<Issue>, StoreError> {
        sqlx::query(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues ORDER BY created_at, id"
        ))
        .fetch_all(&self.db_pool)
        .await?
        .iter()
        .map(issue_from_row)
        .collect()
    }

    #[tracing::instrument(name = "Get an issue from the database", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Issue>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        row.as_ref().map(issue_from_row).transpose()
    }
}
