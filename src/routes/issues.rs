use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::delivery::{deliver_issue, DeliveryReport, DeliveryRequest};
use crate::domain::{Issue, IssueStatus, NewIssue, NewIssueBody};
use crate::email_client::EmailClient;
use crate::mailerlite_client::MailerLiteClient;
use crate::routes::{error_chain_fmt, json_error};
use crate::startup::DeliverySettings;
use crate::store::{IssueStore, StoreError, SubscriberStore};

/// How an issue is rendered in responses. Image bytes never leave the store.
#[derive(serde::Serialize)]
pub struct IssueResponse<'a> {
    pub id: Uuid,
    pub title: &'a str,
    pub subject: &'a str,
    pub content: &'a str,
    pub status: IssueStatus,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryReport>,
}

impl<'a> From<&'a Issue> for IssueResponse<'a> {
    fn from(issue: &'a Issue) -> Self {
        IssueResponse {
            id: issue.id,
            title: &issue.title,
            subject: &issue.subject,
            content: &issue.content,
            status: issue.status,
            scheduled_time: issue.scheduled_time,
            sent_at: issue.sent_at,
            created_at: issue.created_at,
            image_name: issue.image.as_ref().map(|image| image.file_name.as_str()),
            delivery: None,
        }
    }
}

#[tracing::instrument(
    name = "Creating a new issue handler",
    skip(body, issues, subscribers, email_client, campaign_client, delivery),
    fields(
        title = %body.title,
        status = ?body.status,
        send_via_mailer_lite = body.send_via_mailer_lite
    )
)]
pub async fn handle_create_issue(
    body: web::Json<NewIssueBody>,
    issues: web::Data<dyn IssueStore>,
    subscribers: web::Data<dyn SubscriberStore>,
    email_client: web::Data<EmailClient>,
    campaign_client: web::Data<Option<MailerLiteClient>>,
    delivery: web::Data<DeliverySettings>,
) -> Result<HttpResponse, IssueError> {
    let body = body.into_inner();
    let use_campaign_api = body.send_via_mailer_lite;
    let group_id = body
        .mailer_lite_group
        .clone()
        .filter(|group| !group.trim().is_empty())
        .or_else(|| delivery.default_group_id.clone());

    let new_issue: NewIssue = body.try_into().map_err(IssueError::ValidationError)?;
    let issue = issues
        .add(Issue::from(new_issue))
        .await
        .map_err(IssueError::StoreError)?;

    let report = match issue.status {
        IssueStatus::Sent => Some(
            deliver_issue(
                DeliveryRequest {
                    issue: &issue,
                    use_campaign_api,
                    group_id: group_id.as_deref(),
                },
                subscribers.get_ref(),
                &email_client,
                campaign_client.get_ref().as_ref(),
            )
            .await
            .map_err(IssueError::DeliveryError)?,
        ),
        IssueStatus::Scheduled => {
            tracing::info!(
                scheduled_time = ?issue.scheduled_time,
                "Issue stored as scheduled, it will not be sent automatically"
            );
            None
        }
        IssueStatus::Draft => None,
    };

    let mut response = IssueResponse::from(&issue);
    response.delivery = report;

    Ok(HttpResponse::Created().json(response))
}

#[tracing::instrument(name = "Listing issues handler", skip_all)]
pub async fn handle_list_issues(
    issues: web::Data<dyn IssueStore>,
) -> Result<HttpResponse, IssueError> {
    let issues = issues.list().await.map_err(IssueError::StoreError)?;
    let responses: Vec<IssueResponse> = issues.iter().map(IssueResponse::from).collect();

    Ok(HttpResponse::Ok().json(responses))
}

#[tracing::instrument(name = "Get an issue handler", skip(issues))]
pub async fn handle_get_issue(
    issues: web::Data<dyn IssueStore>,
    issue_id: web::Path<String>,
) -> Result<HttpResponse, IssueError> {
    let issue_id = Uuid::parse_str(&issue_id).map_err(|_| IssueError::NotFound)?;
    let issue = issues
        .get(issue_id)
        .await
        .map_err(IssueError::StoreError)?
        .ok_or(IssueError::NotFound)?;

    Ok(HttpResponse::Ok().json(IssueResponse::from(&issue)))
}

#[derive(thiserror::Error)]
pub enum IssueError {
    #[error("{0}")]
    ValidationError(String),
    #[error("Issue not found")]
    NotFound,
    #[error("Failed to access the issue store")]
    StoreError(#[source] StoreError),
    #[error("The issue was stored but could not be delivered")]
    DeliveryError(#[source] StoreError),
}

impl std::fmt::Debug for IssueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for IssueError {
    fn status_code(&self) -> StatusCode {
        match self {
            IssueError::ValidationError(_) => StatusCode::BAD_REQUEST,
            IssueError::NotFound => StatusCode::NOT_FOUND,
            IssueError::StoreError(_) | IssueError::DeliveryError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), self.to_string())
    }
}
