//! Recipient resolution: the local subscriber store merged with the remote
//! subscriber list, one entry per email address.

use std::collections::HashMap;

use crate::domain::{Subscriber, SubscriberEmail, SubscriberStatus};
use crate::mailerlite_client::{MailerLiteClient, RemoteSubscriber};
use crate::store::{StoreError, SubscriberStore};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Recipient {
    pub email: SubscriberEmail,
    pub name: Option<String>,
    pub profession: Option<String>,
    pub status: SubscriberStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed_at: Option<String>,
}

impl From<&Subscriber> for Recipient {
    fn from(subscriber: &Subscriber) -> Self {
        Recipient {
            email: subscriber.email.clone(),
            name: subscriber
                .name
                .as_ref()
                .map(|name| name.as_ref().to_string()),
            profession: subscriber.profession.clone(),
            status: subscriber.status,
            subscribed_at: Some(subscriber.subscribed_at.to_rfc3339()),
        }
    }
}

impl TryFrom<RemoteSubscriber> for Recipient {
    type Error = String;

    fn try_from(remote: RemoteSubscriber) -> Result<Self, Self::Error> {
        let email = remote
            .email
            .ok_or_else(|| "remote subscriber has no email".to_string())?;
        let email = SubscriberEmail::parse(email)?;
        let status = match remote.status.as_deref() {
            Some(status) => SubscriberStatus::parse(status)?,
            None => return Err(format!("remote subscriber {} has no status", email)),
        };

        Ok(Recipient {
            email,
            name: non_blank(remote.fields.name),
            profession: non_blank(remote.fields.profession),
            status,
            subscribed_at: remote.subscribed_at.or(remote.created_at),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Merges both sources by case-insensitive email.
///
/// Local entries come first in their original order, followed by remote-only
/// entries in remote order. On conflict the local fields win, but a field the
/// local record lacks is taken from the remote one.
pub fn merge_recipients(local: Vec<Recipient>, remote: Vec<Recipient>) -> Vec<Recipient> {
    let mut merged: Vec<Recipient> = Vec::with_capacity(local.len() + remote.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for recipient in local.into_iter().chain(remote) {
        let identity = recipient.email.identity();

        match positions.get(&identity) {
            Some(&position) => {
                let kept = &mut merged[position];
                kept.name = kept.name.take().or(recipient.name);
                kept.profession = kept.profession.take().or(recipient.profession);
                kept.subscribed_at = kept.subscribed_at.take().or(recipient.subscribed_at);
            }
            None => {
                positions.insert(identity, merged.len());
                merged.push(recipient);
            }
        }
    }

    merged
}

/// Reads the local store and, when a campaign client is configured, the first
/// page of remote subscribers. A failing remote degrades to the local list.
#[tracing::instrument(name = "Resolving recipients", skip_all)]
pub async fn resolve_recipients(
    store: &dyn SubscriberStore,
    campaign_client: Option<&MailerLiteClient>,
) -> Result<Vec<Recipient>, StoreError> {
    let local: Vec<Recipient> = store.list().await?.iter().map(Recipient::from).collect();

    let remote = match campaign_client {
        Some(client) => match client.list_subscribers().await {
            Ok(remote) => remote
                .into_iter()
                .filter_map(|remote| match Recipient::try_from(remote) {
                    Ok(recipient) => Some(recipient),
                    Err(e) => {
                        tracing::warn!("Skipping remote subscriber: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    "Failed to list remote subscribers, using local ones only"
                );
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let recipients = merge_recipients(local, remote);
    tracing::info!("Resolved {} recipients", recipients.len());

    Ok(recipients)
}
