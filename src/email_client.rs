use std::sync::Arc;
use std::time;

use async_trait::async_trait;
use lettre::{
    address::AddressError,
    message::{
        header::{ContentDisposition, ContentId, ContentType},
        Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;

use crate::config::{SmtpSecurity, SmtpSettings};
use crate::domain::{InlineImage, SubscriberEmail};

/// Content id the issue HTML uses to reference the inline image (`cid:newsletter-image`).
pub const INLINE_IMAGE_CONTENT_ID: &str = "newsletter-image";

const SMTP_TIMEOUT: time::Duration = time::Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub recipient: SubscriberEmail,
    pub subject: String,
    pub html_content: String,
    pub text_content: Option<String>,
    pub inline_image: Option<InlineImage>,
}

#[derive(thiserror::Error, Debug)]
pub enum EmailError {
    #[error("{0} is not a deliverable address")]
    InvalidAddress(String, #[source] AddressError),
    #[error("Failed to build the email message")]
    Build(#[from] lettre::error::Error),
    #[error("{0} is not a valid attachment content type")]
    InvalidContentType(String),
    #[error("SMTP transport failed")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Mail transport rejected the message: {0}")]
    Rejected(String),
}

/// Whatever actually moves a message off the box.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, sender: &Mailbox, email: &OutgoingEmail) -> Result<(), EmailError>;
}

pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(settings: &SmtpSettings) -> Result<Self, EmailError> {
        let mut builder = match settings.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?,
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            }
        }
        .port(settings.port);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().clone(),
            ));
        }

        let timeout = settings
            .timeout_seconds
            .map(time::Duration::from_secs)
            .unwrap_or(SMTP_TIMEOUT);

        Ok(Self {
            mailer: builder.timeout(Some(timeout)).build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn deliver(&self, sender: &Mailbox, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = build_message(sender, email)?;
        let response = self.mailer.send(message).await?;

        tracing::debug!("SMTP server answered {:?}", response.code());

        Ok(())
    }
}

/// Builds the MIME message: a plain/HTML alternative, wrapped in a
/// `multipart/related` together with the inline image when there is one.
pub fn build_message(sender: &Mailbox, email: &OutgoingEmail) -> Result<Message, EmailError> {
    let recipient: Mailbox = email
        .recipient
        .as_ref()
        .parse()
        .map_err(|e| EmailError::InvalidAddress(email.recipient.to_string(), e))?;

    let text = email
        .text_content
        .clone()
        .unwrap_or_else(|| email.html_content.clone());
    let alternative = MultiPart::alternative_plain_html(text, email.html_content.clone());

    let body = match &email.inline_image {
        Some(image) => MultiPart::related()
            .multipart(alternative)
            .singlepart(inline_image_part(image)?),
        None => alternative,
    };

    let message = Message::builder()
        .from(sender.clone())
        .to(recipient)
        .subject(email.subject.clone())
        .multipart(body)?;

    Ok(message)
}

fn inline_image_part(image: &InlineImage) -> Result<SinglePart, EmailError> {
    let content_type = ContentType::parse(&image.content_type)
        .map_err(|_| EmailError::InvalidContentType(image.content_type.clone()))?;

    Ok(SinglePart::builder()
        .header(content_type)
        .header(ContentDisposition::inline_with_name(&image.file_name))
        .header(ContentId::from(format!("<{}>", INLINE_IMAGE_CONTENT_ID)))
        .body(image.data.clone()))
}

#[derive(Clone)]
pub struct EmailClient {
    sender: Mailbox,
    transport: Arc<dyn MailTransport>,
}

impl EmailClient {
    pub fn new(sender: Mailbox, transport: Arc<dyn MailTransport>) -> EmailClient {
        EmailClient { sender, transport }
    }

    pub fn smtp(sender: Mailbox, settings: &SmtpSettings) -> Result<EmailClient, EmailError> {
        let transport = SmtpTransport::new(settings)?;

        Ok(EmailClient::new(sender, Arc::new(transport)))
    }

    #[tracing::instrument(
        name = "Sending an email",
        skip(self, email),
        fields(recipient = %email.recipient, subject = %email.subject)
    )]
    pub async fn send_email(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        self.transport.deliver(&self.sender, email).await
    }
}
