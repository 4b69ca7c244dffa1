use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{InlineImage, Issue, IssueStatus, Subscriber};
use crate::store::{IssueStore, StoreError, SubscriberInsert, SubscriberStore};

const SUBSCRIBERS_FILE: &str = "subscribers.json";
const ISSUES_FILE: &str = "issues.json";

enum Mutation<R> {
    Changed(R),
    Unchanged(R),
}

/// A JSON array on disk. Every read-modify-write cycle holds the lock, so
/// concurrent requests served by this process cannot clobber each other.
struct JsonCollection<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _records: PhantomData<fn() -> T>,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            _records: PhantomData,
        }
    }

    async fn read(&self) -> Result<Vec<T>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn update<R>(
        &self,
        mutate: impl FnOnce(&mut Vec<T>) -> Mutation<R>,
    ) -> Result<R, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        match mutate(&mut records) {
            Mutation::Changed(result) => {
                self.save(&records).await?;
                Ok(result)
            }
            Mutation::Unchanged(result) => Ok(result),
        }
    }

    async fn load(&self) -> Result<Vec<T>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupted {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, records: &[T]) -> Result<(), StoreError> {
        let encoded = serde_json::to_string_pretty(records).map_err(StoreError::Encode)?;
        let write_error = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_error)?;
        }

        // Write next to the target and rename, so readers never see half a file.
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, encoded)
            .await
            .map_err(write_error)?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(write_error)
    }
}

pub struct JsonSubscriberStore {
    records: JsonCollection<Subscriber>,
}

impl JsonSubscriberStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            records: JsonCollection::new(path.into()),
        }
    }

    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(SUBSCRIBERS_FILE))
    }
}

#[async_trait]
impl SubscriberStore for JsonSubscriberStore {
    #[tracing::instrument(
        name = "Saving a subscriber in the local subscriber file",
        skip(self, subscriber),
        fields(subscriber_email = %subscriber.email)
    )]
    async fn add(&self, subscriber: Subscriber) -> Result<SubscriberInsert, StoreError> {
        self.records
            .update(|records| {
                let identity = subscriber.email.identity();

                match records.iter().find(|s| s.email.identity() == identity) {
                    Some(existing) => Mutation::Unchanged(SubscriberInsert::AlreadyExists(
                        existing.clone(),
                    )),
                    None => {
                        records.push(subscriber.clone());
                        Mutation::Changed(SubscriberInsert::Created(subscriber))
                    }
                }
            })
            .await
    }

    async fn list(&self) -> Result<Vec<Subscriber>, StoreError> {
        self.records.read().await
    }

    #[tracing::instrument(name = "Confirming a subscriber in the local subscriber file", skip_all)]
    async fn confirm(
        &self,
        token: &str,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, StoreError> {
        self.records
            .update(|records| match records.iter_mut().find(|s| s.has_token(token)) {
                Some(subscriber) => {
                    subscriber.confirm(confirmed_at);
                    Mutation::Changed(Some(subscriber.clone()))
                }
                None => Mutation::Unchanged(None),
            })
            .await
    }
}

/// On-disk shape of an issue; the image travels as base64.
#[derive(Serialize, Deserialize)]
struct IssueRecord {
    id: Uuid,
    title: String,
    subject: String,
    content: String,
    status: IssueStatus,
    #[serde(default)]
    scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<ImageRecord>,
}

#[derive(Serialize, Deserialize)]
struct ImageRecord {
    file_name: String,
    content_type: String,
    base64: String,
}

impl From<Issue> for IssueRecord {
    fn from(issue: Issue) -> Self {
        IssueRecord {
            id: issue.id,
            title: issue.title,
            subject: issue.subject,
            content: issue.content,
            status: issue.status,
            scheduled_time: issue.scheduled_time,
            sent_at: issue.sent_at,
            created_at: issue.created_at,
            image: issue.image.map(|image| ImageRecord {
                file_name: image.file_name,
                content_type: image.content_type,
                base64: STANDARD.encode(image.data),
            }),
        }
    }
}

impl TryFrom<IssueRecord> for Issue {
    type Error = StoreError;

    fn try_from(record: IssueRecord) -> Result<Self, Self::Error> {
        let image = match record.image {
            Some(image) => Some(InlineImage {
                data: STANDARD.decode(&image.base64).map_err(|e| {
                    StoreError::InvalidRecord(format!("issue {} image: {}", record.id, e))
                })?,
                file_name: image.file_name,
                content_type: image.content_type,
            }),
            None => None,
        };

        Ok(Issue {
            id: record.id,
            title: record.title,
            subject: record.subject,
            content: record.content,
            status: record.status,
            scheduled_time: record.scheduled_time,
            sent_at: record.sent_at,
            created_at: record.created_at,
            image,
        })
    }
}

pub struct JsonIssueStore {
    records: JsonCollection<IssueRecord>,
}

impl JsonIssueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            records: JsonCollection::new(path.into()),
        }
    }

    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(ISSUES_FILE))
    }
}

#[async_trait]
impl IssueStore for JsonIssueStore {
    #[tracing::instrument(
        name = "Saving an issue in the local issue file",
        skip_all,
        fields(issue_id = %issue.id)
    )]
    async fn add(&self, issue: Issue) -> Result<Issue, StoreError> {
        let record = IssueRecord::from(issue.clone());

        self.records
            .update(|records| {
                records.push(record);
                Mutation::Changed(())
            })
            .await?;

        Ok(issue)
    }

    async fn list(&self) -> Result<Vec<Issue>, StoreError> {
        self.records
            .read()
            .await?
            .into_iter()
            .map(Issue::try_from)
            .collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Issue>, StoreError> {
        self.records
            .read()
            .await?
            .into_iter()
            .find(|record| record.id == id)
            .map(Issue::try_from)
            .transpose()
    }
}
