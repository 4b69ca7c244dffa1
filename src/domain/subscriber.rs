use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::new_subscriber::NewSubscriber;
use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;
use crate::domain::subscriber_status::SubscriberStatus;

/// A subscriber as kept by the local subscriber store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newsletter_id: Option<String>,
    pub email: SubscriberEmail,
    #[serde(default)]
    pub name: Option<SubscriberName>,
    #[serde(default)]
    pub profession: Option<String>,
    pub status: SubscriberStatus,
    pub subscribed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_token: Option<String>,
}

impl Subscriber {
    pub fn new_unconfirmed(new_subscriber: NewSubscriber, confirm_token: Option<String>) -> Self {
        Subscriber {
            id: Uuid::new_v4(),
            newsletter_id: new_subscriber.newsletter_id,
            email: new_subscriber.email,
            name: new_subscriber.name,
            profession: new_subscriber.profession,
            status: SubscriberStatus::Unconfirmed,
            subscribed_at: Utc::now(),
            confirmed_at: None,
            confirm_token,
        }
    }

    /// Flips the subscriber to active and burns its confirmation token.
    pub fn confirm(&mut self, confirmed_at: DateTime<Utc>) {
        self.status = SubscriberStatus::Active;
        self.confirmed_at = Some(confirmed_at);
        self.confirm_token = None;
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.confirm_token.as_deref() == Some(token)
    }
}
