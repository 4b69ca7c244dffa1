use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde_aux::field_attributes::{deserialize_default_from_null, deserialize_string_from_number};
use std::time;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// First page size when reading the remote subscriber list.
pub const SUBSCRIBERS_PAGE_LIMIT: u16 = 250;

/// Client for the MailerLite-compatible campaign API.
#[derive(Clone, Debug)]
pub struct MailerLiteClient {
    http_client: Client,
    base_url: String,
    api_key: Secret<String>,
    sender: CampaignSender,
}

/// The `from_name`/`from_email` pair stamped on every campaign.
#[derive(Clone, Debug)]
pub struct CampaignSender {
    pub name: String,
    pub email: String,
}

#[derive(thiserror::Error, Debug)]
pub enum CampaignError {
    #[error("The campaign API refused the credentials ({0})")]
    Unauthorized(StatusCode),
    #[error("The campaign API rejected the target group: {body}")]
    InvalidGroup { body: String },
    #[error("The campaign API answered {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("Failed to reach the campaign API")]
    Transport(#[from] reqwest::Error),
    #[error("The campaign API answered with an unexpected body")]
    Decode(#[source] serde_json::Error),
}

/// Where in the create-then-send pair a campaign delivery broke down.
#[derive(thiserror::Error, Debug)]
pub enum CampaignFailure {
    #[error("Failed to create the campaign")]
    Create(#[source] CampaignError),
    #[error("Failed to send campaign {campaign_id}")]
    Send {
        campaign_id: String,
        #[source]
        error: CampaignError,
    },
}

impl CampaignFailure {
    /// Whether the issue may still go out through the direct mailer.
    ///
    /// A transport error on the send action may have reached the remote, so
    /// falling back could deliver the issue twice.
    pub fn allows_fallback(&self) -> bool {
        match self {
            CampaignFailure::Create(_) => true,
            CampaignFailure::Send { error, .. } => !matches!(error, CampaignError::Transport(_)),
        }
    }

    pub fn campaign_id(&self) -> Option<&str> {
        match self {
            CampaignFailure::Create(_) => None,
            CampaignFailure::Send { campaign_id, .. } => Some(campaign_id),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CampaignReceipt {
    pub campaign_id: Option<String>,
}

#[derive(serde::Serialize)]
struct CreateCampaignBody<'a> {
    subject: &'a str,
    html: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    from_name: &'a str,
    from_email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<&'a str>>,
}

#[derive(serde::Serialize)]
struct AddSubscriberBody<'a> {
    email: &'a str,
    fields: SubscriberFields<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<&'a str>>,
}

#[derive(serde::Serialize)]
struct SubscriberFields<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profession: Option<&'a str>,
}

/// A subscriber as listed by the remote API. Every field is optional because
/// the remote is not trusted to be well formed.
#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RemoteSubscriber {
    pub email: Option<String>,
    pub status: Option<String>,
    #[serde(deserialize_with = "deserialize_default_from_null")]
    pub fields: RemoteSubscriberFields,
    pub subscribed_at: Option<String>,
    pub created_at: Option<String>,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RemoteSubscriberFields {
    pub name: Option<String>,
    pub profession: Option<String>,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Group {
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub id: String,
    pub name: String,
}

/// List endpoints answer either with a bare array or wrapped in `data`.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Listing::Wrapped { data } => data,
            Listing::Bare(items) => items,
        }
    }
}

impl MailerLiteClient {
    pub fn new(
        base_url: String,
        api_key: Secret<String>,
        sender: CampaignSender,
        timeout: Option<time::Duration>,
    ) -> Result<MailerLiteClient, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(MailerLiteClient {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            sender,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.api_key.expose_secret())
            .header("Accept", "application/json")
    }

    /// Creates a regular campaign and returns its id, when the remote
    /// reported one.
    #[tracing::instrument(name = "Creating a campaign", skip(self, html))]
    pub async fn create_campaign(
        &self,
        subject: &str,
        html: &str,
        group_id: Option<&str>,
    ) -> Result<Option<String>, CampaignError> {
        let url = format!("{}/campaigns", self.base_url);
        let body = CreateCampaignBody {
            subject,
            html,
            kind: "regular",
            from_name: &self.sender.name,
            from_email: &self.sender.email,
            groups: group_id.map(|group| vec![group]),
        };

        let response = self
            .authorized(self.http_client.post(&url))
            .json(&body)
            .send()
            .await?;
        let text = check_status(response).await?.text().await?;

        if text.trim().is_empty() {
            return Ok(None);
        }

        let payload: serde_json::Value =
            serde_json::from_str(&text).map_err(CampaignError::Decode)?;

        Ok(campaign_id(&payload))
    }

    #[tracing::instrument(name = "Sending a campaign", skip(self))]
    pub async fn send_campaign(&self, campaign_id: &str) -> Result<(), CampaignError> {
        let url = format!("{}/campaigns/{}/actions/send", self.base_url, campaign_id);

        let response = self
            .authorized(self.http_client.post(&url))
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }

    pub async fn create_and_send_campaign(
        &self,
        subject: &str,
        html: &str,
        group_id: Option<&str>,
    ) -> Result<CampaignReceipt, CampaignFailure> {
        let campaign_id = self
            .create_campaign(subject, html, group_id)
            .await
            .map_err(CampaignFailure::Create)?;

        match campaign_id {
            Some(campaign_id) => {
                self.send_campaign(&campaign_id)
                    .await
                    .map_err(|error| CampaignFailure::Send {
                        campaign_id: campaign_id.clone(),
                        error,
                    })?;

                Ok(CampaignReceipt {
                    campaign_id: Some(campaign_id),
                })
            }
            None => {
                tracing::warn!("Campaign created without an id, leaving it to the remote queue");
                Ok(CampaignReceipt { campaign_id: None })
            }
        }
    }

    /// Reads the first page of remote subscribers. Records that do not decode
    /// are skipped one by one.
    #[tracing::instrument(name = "Listing remote subscribers", skip(self))]
    pub async fn list_subscribers(&self) -> Result<Vec<RemoteSubscriber>, CampaignError> {
        let url = format!("{}/subscribers", self.base_url);

        let response = self
            .authorized(self.http_client.get(&url))
            .query(&[("limit", SUBSCRIBERS_PAGE_LIMIT)])
            .send()
            .await?;
        let listing: Listing<serde_json::Value> = decode(check_status(response).await?).await?;

        let subscribers = listing
            .into_items()
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<RemoteSubscriber>(item) {
                Ok(subscriber) => Some(subscriber),
                Err(e) => {
                    tracing::warn!("Skipping malformed remote subscriber: {}", e);
                    None
                }
            })
            .collect();

        Ok(subscribers)
    }

    /// Adds a subscriber to the remote list. When the remote rejects the group,
    /// the subscriber is added once more without it.
    #[tracing::instrument(name = "Adding a remote subscriber", skip(self, name, profession))]
    pub async fn add_subscriber(
        &self,
        email: &str,
        name: Option<&str>,
        profession: Option<&str>,
        group_id: Option<&str>,
    ) -> Result<(), CampaignError> {
        let attempt = self
            .post_subscriber(email, name, profession, group_id)
            .await;

        match attempt {
            Err(CampaignError::InvalidGroup { body }) if group_id.is_some() => {
                tracing::warn!("Remote rejected the group ({}), retrying without it", body);
                self.post_subscriber(email, name, profession, None).await
            }
            other => other,
        }
    }

    async fn post_subscriber(
        &self,
        email: &str,
        name: Option<&str>,
        profession: Option<&str>,
        group_id: Option<&str>,
    ) -> Result<(), CampaignError> {
        let url = format!("{}/subscribers", self.base_url);
        let body = AddSubscriberBody {
            email,
            fields: SubscriberFields { name, profession },
            groups: group_id.map(|group| vec![group]),
        };

        let response = self
            .authorized(self.http_client.post(&url))
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }

    #[tracing::instrument(name = "Listing remote groups", skip(self))]
    pub async fn list_groups(&self) -> Result<Vec<Group>, CampaignError> {
        let url = format!("{}/groups", self.base_url);

        let response = self.authorized(self.http_client.get(&url)).send().await?;
        let listing: Listing<Group> = decode(check_status(response).await?).await?;

        Ok(listing.into_items())
    }
}

async fn check_status(response: Response) -> Result<Response, CampaignError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CampaignError::Unauthorized(status),
        StatusCode::UNPROCESSABLE_ENTITY if rejects_groups(&body) => {
            CampaignError::InvalidGroup { body }
        }
        _ => CampaignError::Rejected { status, body },
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, CampaignError> {
    let bytes = response.bytes().await?;

    serde_json::from_slice(&bytes).map_err(CampaignError::Decode)
}

/// Validation errors come back as `{"errors": {"groups.0": [...]}}`.
fn rejects_groups(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|payload| payload.get("errors").cloned())
        .and_then(|errors| errors.as_object().cloned())
        .map(|errors| {
            errors
                .keys()
                .any(|key| key == "groups" || key.starts_with("groups."))
        })
        .unwrap_or(false)
}

fn campaign_id(payload: &serde_json::Value) -> Option<String> {
    let id = payload
        .get("id")
        .or_else(|| payload.pointer("/data/id"))?;

    match id {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
