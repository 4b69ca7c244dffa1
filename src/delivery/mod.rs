//! Outbound delivery of an issue, either through the campaign API or one
//! message per recipient over the direct mail transport.

use crate::domain::issue_content::render_document;
use crate::domain::Issue;
use crate::email_client::{EmailClient, OutgoingEmail};
use crate::mailerlite_client::MailerLiteClient;
use crate::routes::error_chain;
use crate::store::{StoreError, SubscriberStore};

pub mod personalize;
pub mod recipients;

pub use personalize::{personalize_html, personalize_text};
pub use recipients::{merge_recipients, resolve_recipients, Recipient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Campaign,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FailedSend {
    pub recipient: String,
    pub reason: String,
}

/// Outcome of one delivery run. Logged and returned to the caller, never stored.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeliveryReport {
    pub channel: DeliveryChannel,
    /// Messages accepted by the direct transport.
    pub sent: usize,
    /// Recipients left out because of their status.
    pub skipped: usize,
    pub failed: Vec<FailedSend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_error: Option<String>,
}

impl DeliveryReport {
    fn campaign(campaign_id: Option<String>, campaign_error: Option<String>) -> Self {
        DeliveryReport {
            channel: DeliveryChannel::Campaign,
            sent: 0,
            skipped: 0,
            failed: Vec::new(),
            campaign_id,
            campaign_error,
        }
    }
}

pub struct DeliveryRequest<'a> {
    pub issue: &'a Issue,
    /// Ask for the campaign API. Ignored when no campaign client is configured.
    pub use_campaign_api: bool,
    pub group_id: Option<&'a str>,
}

/// Delivers `request.issue`.
///
/// The campaign path is tried first when requested and available; a failure
/// that allows fallback continues with the direct path. Only reading the local
/// subscriber store can fail the whole run.
#[tracing::instrument(
    name = "Delivering an issue",
    skip_all,
    fields(
        issue_id = %request.issue.id,
        use_campaign_api = request.use_campaign_api,
    )
)]
pub async fn deliver_issue(
    request: DeliveryRequest<'_>,
    subscribers: &dyn SubscriberStore,
    email_client: &EmailClient,
    campaign_client: Option<&MailerLiteClient>,
) -> Result<DeliveryReport, StoreError> {
    let issue = request.issue;
    let html = render_document(&issue.content);
    let mut campaign_error = None;

    match (request.use_campaign_api, campaign_client) {
        (true, Some(client)) => {
            match client
                .create_and_send_campaign(&issue.subject, &html, request.group_id)
                .await
            {
                Ok(receipt) => {
                    tracing::info!(
                        campaign_id = ?receipt.campaign_id,
                        "Issue handed to the campaign API"
                    );
                    return Ok(DeliveryReport::campaign(receipt.campaign_id, None));
                }
                Err(failure) => {
                    let reason = failure_reason(&failure);

                    if !failure.allows_fallback() {
                        tracing::error!("Campaign delivery failed without fallback: {}", reason);
                        return Ok(DeliveryReport::campaign(
                            failure.campaign_id().map(String::from),
                            Some(reason),
                        ));
                    }

                    tracing::warn!(
                        "Campaign delivery failed, falling back to direct mail: {}",
                        reason
                    );
                    campaign_error = Some(reason);
                }
            }
        }
        (true, None) => {
            tracing::info!("No campaign API key configured, delivering directly");
        }
        (false, _) => {}
    }

    let recipients = resolve_recipients(subscribers, campaign_client).await?;
    let mut report = send_direct(issue, &html, &recipients, email_client).await;
    report.campaign_error = campaign_error;

    tracing::info!(
        sent = report.sent,
        failed = report.failed.len(),
        skipped = report.skipped,
        "Direct delivery finished"
    );

    Ok(report)
}

/// Sends one personalized message per deliverable recipient, in order.
/// A failed send is recorded and the loop carries on.
async fn send_direct(
    issue: &Issue,
    html: &str,
    recipients: &[Recipient],
    email_client: &EmailClient,
) -> DeliveryReport {
    let mut report = DeliveryReport {
        channel: DeliveryChannel::Direct,
        sent: 0,
        skipped: 0,
        failed: Vec::new(),
        campaign_id: None,
        campaign_error: None,
    };

    for recipient in recipients {
        if !recipient.status.accepts_delivery() {
            report.skipped += 1;
            continue;
        }

        let email = OutgoingEmail {
            recipient: recipient.email.clone(),
            subject: issue.subject.clone(),
            html_content: personalize_html(html, recipient),
            text_content: Some(personalize_text(&issue.content, recipient)),
            inline_image: issue.image.clone(),
        };

        match email_client.send_email(&email).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                let reason = failure_reason(&e);
                tracing::error!("Failed to send issue to {}: {}", recipient.email, reason);
                report.failed.push(FailedSend {
                    recipient: recipient.email.to_string(),
                    reason,
                });
            }
        }
    }

    report
}

/// One-line reason for a report: every message in the chain, joined by `: `.
fn failure_reason(e: &(dyn std::error::Error + 'static)) -> String {
    error_chain(e)
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
