pub mod issue;
pub mod issue_content;
pub mod new_subscriber;
pub mod subscriber;
pub mod subscriber_email;
pub mod subscriber_name;
pub mod subscriber_status;

pub use issue::{Issue, IssueStatus, NewIssue, NewIssueBody};
pub use issue_content::InlineImage;
pub use new_subscriber::{NewSubscriber, NewSubscriberBody};
pub use subscriber::Subscriber;
pub use subscriber_email::SubscriberEmail;
pub use subscriber_name::SubscriberName;
pub use subscriber_status::SubscriberStatus;
