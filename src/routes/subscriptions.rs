use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::{
    delivery::{resolve_recipients, Recipient},
    domain::{NewSubscriber, NewSubscriberBody, Subscriber, SubscriberStatus},
    email_client::{EmailClient, OutgoingEmail},
    mailerlite_client::MailerLiteClient,
    routes::{error_chain_fmt, json_error},
    startup::{ApplicationBaseUrl, DeliverySettings},
    store::{StoreError, SubscriberInsert, SubscriberStore},
};

/// Public view of a stored subscriber: everything but the confirmation token.
#[derive(serde::Serialize)]
pub struct SubscriberResponse<'a> {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newsletter_id: Option<&'a str>,
    pub email: &'a str,
    pub name: Option<&'a str>,
    pub profession: Option<&'a str>,
    pub status: SubscriberStatus,
    pub subscribed_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Subscriber> for SubscriberResponse<'a> {
    fn from(subscriber: &'a Subscriber) -> Self {
        SubscriberResponse {
            id: subscriber.id,
            newsletter_id: subscriber.newsletter_id.as_deref(),
            email: subscriber.email.as_ref(),
            name: subscriber.name.as_ref().map(|name| name.as_ref()),
            profession: subscriber.profession.as_deref(),
            status: subscriber.status,
            subscribed_at: subscriber.subscribed_at,
            confirmed_at: subscriber.confirmed_at,
        }
    }
}

#[derive(serde::Serialize)]
struct SubscriberList<'a> {
    subscribers: &'a [Recipient],
    count: usize,
}

#[tracing::instrument(
    name = "Creating a new subscriber handler",
    skip(body, store, email_client, campaign_client, base_url, delivery),
    fields(
        subscriber_email = %body.email,
    )
)]
pub async fn handle_create_subscription(
    body: web::Json<NewSubscriberBody>,
    store: web::Data<dyn SubscriberStore>,
    email_client: web::Data<EmailClient>,
    campaign_client: web::Data<Option<MailerLiteClient>>,
    base_url: web::Data<ApplicationBaseUrl>,
    delivery: web::Data<DeliverySettings>,
) -> Result<HttpResponse, SubscribeError> {
    let new_subscriber: NewSubscriber = body
        .into_inner()
        .try_into()
        .map_err(SubscribeError::ValidationError)?;
    let campaign_client = campaign_client.get_ref().as_ref();

    // With a campaign API the remote runs its own double opt-in.
    let confirm_token = match campaign_client {
        Some(_) => None,
        None => Some(generate_confirmation_token()),
    };

    let subscriber = match store
        .add(Subscriber::new_unconfirmed(new_subscriber, confirm_token))
        .await?
    {
        SubscriberInsert::Created(subscriber) => {
            match campaign_client {
                Some(client) => {
                    let default_group_id = delivery.default_group_id.as_deref();
                    sync_remote_subscriber(client, &subscriber, default_group_id).await
                }
                None => {
                    if let Some(token) = subscriber.confirm_token.as_deref() {
                        if let Err(err) =
                            send_confirmation_email(&email_client, &subscriber, &base_url.0, token)
                                .await
                        {
                            tracing::error!(
                                "Failed to send a confirmation email to {}: {:?}",
                                subscriber.email,
                                err
                            );
                        }
                    }
                }
            }
            subscriber
        }
        SubscriberInsert::AlreadyExists(subscriber) => {
            tracing::info!("{} is already subscribed", subscriber.email);
            subscriber
        }
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "subscriber": SubscriberResponse::from(&subscriber)
    })))
}

#[tracing::instrument(name = "Listing subscribers handler", skip_all)]
pub async fn handle_list_subscribers(
    store: web::Data<dyn SubscriberStore>,
    campaign_client: web::Data<Option<MailerLiteClient>>,
) -> Result<HttpResponse, SubscribeError> {
    let recipients = resolve_recipients(store.get_ref(), campaign_client.get_ref().as_ref()).await?;

    Ok(HttpResponse::Ok().json(SubscriberList {
        subscribers: &recipients,
        count: recipients.len(),
    }))
}

/// Adds the subscriber to the remote list. Failures are logged only.
async fn sync_remote_subscriber(
    client: &MailerLiteClient,
    subscriber: &Subscriber,
    default_group_id: Option<&str>,
) {
    let group_id = subscriber.newsletter_id.as_deref().or(default_group_id);

    if let Err(err) = client
        .add_subscriber(
            subscriber.email.as_ref(),
            subscriber.name.as_ref().map(|name| name.as_ref()),
            subscriber.profession.as_deref(),
            group_id,
        )
        .await
    {
        tracing::error!(
            "Failed to add {} to the remote list: {:?}",
            subscriber.email,
            err
        );
    }
}

#[tracing::instrument(
    name = "Send a confirmation email to a new subscriber",
    fields(
        base_url = %base_url
    ),
    skip(email_client, subscriber, confirm_token)
)]
async fn send_confirmation_email(
    email_client: &EmailClient,
    subscriber: &Subscriber,
    base_url: &str,
    confirm_token: &str,
) -> Result<(), crate::email_client::EmailError> {
    let confirmation_link = format!("{}/subscribers/confirm?token={}", base_url, confirm_token);
    let greeting = match &subscriber.name {
        Some(name) => format!("Hi {},", name.as_ref()),
        None => "Hi,".to_string(),
    };
    let html_body = format!(
        r#"<!doctype html><html><body>
            <p>{}</p>
            <p>Thanks for signing up to Learn Drop! Click <a href="{}">here</a> to confirm your subscription.</p>
        </body></html>"#,
        crate::domain::issue_content::escape_html(&greeting),
        confirmation_link
    );
    let text_body = format!(
        "{}\n\nThanks for signing up to Learn Drop! Visit {} to confirm your subscription.",
        greeting, confirmation_link
    );

    email_client
        .send_email(&OutgoingEmail {
            recipient: subscriber.email.clone(),
            subject: "Confirm your Learn Drop subscription".to_string(),
            html_content: html_body,
            text_content: Some(text_body),
            inline_image: None,
        })
        .await
}

/// 20 random bytes, hex encoded.
pub fn generate_confirmation_token() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill(&mut bytes);

    hex::encode(bytes)
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("{0}")]
    ValidationError(String),
    #[error("Failed to access the subscriber store")]
    StoreError(#[from] StoreError),
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::ValidationError(_) => StatusCode::BAD_REQUEST,
            SubscribeError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), self.to_string())
    }
}
