use serde::Deserialize;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;

#[derive(Debug)]
pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub name: Option<SubscriberName>,
    pub profession: Option<String>,
    pub newsletter_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct NewSubscriberBody {
    #[serde(default)]
    pub email: String,
    pub name: Option<String>,
    pub profession: Option<String>,
    #[serde(rename = "newsletterId", alias = "newsletter_id")]
    pub newsletter_id: Option<String>,
}

impl TryFrom<NewSubscriberBody> for NewSubscriber {
    type Error = String;

    fn try_from(body: NewSubscriberBody) -> Result<Self, Self::Error> {
        if body.email.trim().is_empty() {
            return Err("Missing required field: email".to_string());
        }

        let email = SubscriberEmail::parse(body.email)?;
        let name = SubscriberName::parse_optional(body.name)?;

        Ok(NewSubscriber {
            email,
            name,
            profession: non_blank(body.profession),
            newsletter_id: non_blank(body.newsletter_id),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
