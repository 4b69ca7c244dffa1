//! Persistence for subscribers and issues.
//!
//! Handlers only ever see the [`SubscriberStore`] and [`IssueStore`] traits;
//! `startup` picks the backend from configuration.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Issue, Subscriber};

pub mod json_file;
pub mod postgres;

pub use json_file::{JsonIssueStore, JsonSubscriberStore};
pub use postgres::{PgIssueStore, PgSubscriberStore};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} does not hold valid records")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode records")]
    Encode(#[source] serde_json::Error),
    #[error("Database query failed")]
    Database(#[from] sqlx::Error),
    #[error("Stored record is invalid: {0}")]
    InvalidRecord(String),
}

/// Outcome of adding a subscriber: emails are unique regardless of case.
#[derive(Debug)]
pub enum SubscriberInsert {
    Created(Subscriber),
    AlreadyExists(Subscriber),
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn add(&self, subscriber: Subscriber) -> Result<SubscriberInsert, StoreError>;

    async fn list(&self) -> Result<Vec<Subscriber>, StoreError>;

    /// Activates the subscriber holding `token` and burns the token, so a
    /// token confirms at most once. `None` when no subscriber holds it.
    async fn confirm(
        &self,
        token: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError>;
}

#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn add(&self, issue: Issue) -> Result<Issue, StoreError>;

    async fn list(&self) -> Result<Vec<Issue>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Issue>, StoreError>;
}
