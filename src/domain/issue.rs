use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::issue_content::InlineImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Draft,
    Scheduled,
    Sent,
}

impl IssueStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, IssueStatus::Sent)
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, IssueStatus::Scheduled)
    }

    pub fn parse(status: &str) -> Result<IssueStatus, String> {
        match status.trim().to_lowercase().as_str() {
            "draft" => Ok(IssueStatus::Draft),
            "scheduled" => Ok(IssueStatus::Scheduled),
            "sent" => Ok(IssueStatus::Sent),
            _ => Err(format!("{} is not a valid issue status", status)),
        }
    }
}

impl AsRef<str> for IssueStatus {
    fn as_ref(&self) -> &str {
        match self {
            IssueStatus::Draft => "draft",
            IssueStatus::Scheduled => "scheduled",
            IssueStatus::Sent => "sent",
        }
    }
}

/// One newsletter edition. Issues are written once and never updated.
#[derive(Debug, Clone)]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    pub subject: String,
    pub content: String,
    pub status: IssueStatus,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub image: Option<InlineImage>,
}

#[derive(Debug)]
pub struct NewIssue {
    pub title: String,
    pub subject: String,
    pub content: String,
    pub status: IssueStatus,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub image: Option<InlineImage>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct NewIssueBody {
    pub title: String,
    pub subject: String,
    pub content: String,
    pub status: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub image_data: Option<String>,
    pub image_name: Option<String>,
    #[serde(rename = "sendViaMailerLite")]
    pub send_via_mailer_lite: bool,
    #[serde(rename = "mailerLiteGroup", alias = "mailerLiteGroupId")]
    pub mailer_lite_group: Option<String>,
}

impl TryFrom<NewIssueBody> for NewIssue {
    type Error = String;

    fn try_from(body: NewIssueBody) -> Result<Self, Self::Error> {
        if body.title.trim().is_empty()
            || body.subject.trim().is_empty()
            || body.content.trim().is_empty()
        {
            return Err("Missing required fields".to_string());
        }

        let status = match body.status.as_deref() {
            Some(status) if !status.trim().is_empty() => IssueStatus::parse(status)?,
            _ => IssueStatus::Draft,
        };

        let image = match body.image_data.as_deref() {
            Some(data_uri) if !data_uri.trim().is_empty() => {
                Some(InlineImage::from_data_uri(data_uri, body.image_name)?)
            }
            _ => None,
        };

        Ok(NewIssue {
            title: body.title,
            subject: body.subject,
            content: body.content,
            status,
            scheduled_time: body.scheduled_time,
            image,
        })
    }
}

impl From<NewIssue> for Issue {
    fn from(new_issue: NewIssue) -> Self {
        let now = Utc::now();

        Issue {
            id: Uuid::new_v4(),
            title: new_issue.title,
            subject: new_issue.subject,
            content: new_issue.content,
            status: new_issue.status,
            scheduled_time: new_issue.scheduled_time,
            sent_at: new_issue.status.is_sent().then_some(now),
            created_at: now,
            image: new_issue.image,
        }
    }
}
