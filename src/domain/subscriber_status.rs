#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Unconfirmed,
    Active,
    Unsubscribed,
    Bounced,
    Junk,
}

impl SubscriberStatus {
    pub fn is_unconfirmed(&self) -> bool {
        matches!(self, SubscriberStatus::Unconfirmed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriberStatus::Active)
    }

    /// Unsubscribed, bounced and junk addresses never receive an issue.
    pub fn accepts_delivery(&self) -> bool {
        matches!(
            self,
            SubscriberStatus::Unconfirmed | SubscriberStatus::Active
        )
    }

    pub fn parse(status: &str) -> Result<SubscriberStatus, String> {
        match status.to_lowercase().as_str() {
            "unconfirmed" => Ok(SubscriberStatus::Unconfirmed),
            "active" => Ok(SubscriberStatus::Active),
            "unsubscribed" => Ok(SubscriberStatus::Unsubscribed),
            "bounced" => Ok(SubscriberStatus::Bounced),
            "junk" => Ok(SubscriberStatus::Junk),
            _ => Err(format!("{} is not a valid subscriber status", status)),
        }
    }
}

impl AsRef<str> for SubscriberStatus {
    fn as_ref(&self) -> &str {
        match self {
            SubscriberStatus::Unconfirmed => "unconfirmed",
            SubscriberStatus::Active => "active",
            SubscriberStatus::Unsubscribed => "unsubscribed",
            SubscriberStatus::Bounced => "bounced",
            SubscriberStatus::Junk => "junk",
        }
    }
}
