use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::message::Mailbox;
use once_cell::sync::Lazy;
use reqwest::Response;
use secrecy::Secret;
use tempfile::TempDir;
use wiremock::MockServer;

use learn_drop::{
    config::{get_configuration, StorageBackend},
    email_client::{EmailClient, EmailError, MailTransport, OutgoingEmail},
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
};

// Logs are only printed when TEST_LOG is set, e.g. `TEST_LOG=true cargo test`.
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber).expect("Failed to init the tracing subscriber.");
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber).expect("Failed to init the tracing subscriber.");
    };
});

/// Mail transport that keeps every message in memory.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_for(&self, email: &str) {
        self.failing.lock().unwrap().insert(email.to_lowercase());
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(&self, _sender: &Mailbox, email: &OutgoingEmail) -> Result<(), EmailError> {
        if self
            .failing
            .lock()
            .unwrap()
            .contains(&email.recipient.identity())
        {
            return Err(EmailError::Rejected("mailbox unavailable".into()));
        }

        self.sent.lock().unwrap().push(email.clone());

        Ok(())
    }
}

pub struct ConfirmationLink {
    pub html: reqwest::Url,
    pub plain_text: reqwest::Url,
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub data_dir: TempDir,
    pub mailbox: Arc<RecordingTransport>,
    pub mailerlite_server: MockServer,
    pub api_client: reqwest::Client,
}

impl TestApp {
    /// Spawns the application with file stores and no MailerLite API key.
    pub async fn spawn_app() -> TestApp {
        Self::spawn(false).await
    }

    /// Spawns the application with a MailerLite API key pointing at a mock server.
    pub async fn spawn_app_with_mailerlite() -> TestApp {
        Self::spawn(true).await
    }

    async fn spawn(with_mailerlite: bool) -> TestApp {
        Lazy::force(&TRACING);

        let mut config = get_configuration().expect("Missing configuration file.");
        let data_dir = tempfile::tempdir().expect("Failed to create a data directory.");
        let mailerlite_server = MockServer::start().await;

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.set_storage_backend(StorageBackend::File);
        config.set_data_dir(data_dir.path().to_path_buf());
        config.set_mailerlite_base_url(mailerlite_server.uri());
        config.set_mailerlite_api_key(
            with_mailerlite.then(|| Secret::new("test-api-key".to_string())),
        );

        let mailbox = Arc::new(RecordingTransport::default());
        let sender = config
            .get_email_client_sender()
            .expect("Sender email is not valid.");
        let email_client = EmailClient::new(sender, mailbox.clone());

        let application = Application::build_with_email_client(config, email_client)
            .await
            .expect("Failed to build application.");
        let port = application.get_port();

        tokio::spawn(application.run_until_stop());

        let api_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
            data_dir,
            mailbox,
            mailerlite_server,
            api_client,
        }
    }

    pub async fn post_subscriber(&self, body: serde_json::Value) -> Response {
        self.api_client
            .post(&format!("{}/subscribers", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_subscribers(&self) -> Response {
        self.api_client
            .get(&format!("{}/subscribers", self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_subscribers_json(&self) -> serde_json::Value {
        self.get_subscribers()
            .await
            .json()
            .await
            .expect("Subscriber list is not JSON.")
    }

    pub async fn post_issue(&self, body: serde_json::Value) -> Response {
        self.api_client
            .post(&format!("{}/issues", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get(&self, path: &str) -> Response {
        self.api_client
            .get(&format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Extracts the confirmation link from a recorded email, pointing it at
    /// the test server.
    pub fn get_confirmation_link(&self, email: &OutgoingEmail) -> ConfirmationLink {
        let get_link = |s: &str| {
            let links: Vec<_> = linkify::LinkFinder::new()
                .links(s)
                .filter(|l| *l.kind() == linkify::LinkKind::Url)
                .collect();
            assert_eq!(links.len(), 1);

            let raw_link = links[0].as_str().to_owned();
            let mut confirmation_link = reqwest::Url::parse(&raw_link).unwrap();
            assert_eq!(confirmation_link.host_str().unwrap(), "127.0.0.1");
            confirmation_link.set_port(Some(self.port)).unwrap();

            confirmation_link
        };

        ConfirmationLink {
            html: get_link(&email.html_content),
            plain_text: get_link(email.text_content.as_deref().unwrap()),
        }
    }

    /// Subscribes `email` and follows the link from the confirmation email.
    pub async fn create_confirmed_subscriber(&self, email: &str, name: Option<&str>) {
        let response = self
            .post_subscriber(serde_json::json!({ "email": email, "name": name }))
            .await;
        assert_eq!(response.status().as_u16(), 200);

        let confirmation_email = self
            .mailbox
            .sent()
            .into_iter()
            .rev()
            .find(|sent| sent.recipient.as_ref() == email)
            .expect("No confirmation email was sent.");
        let confirmation_link = self.get_confirmation_link(&confirmation_email);

        let response = self
            .api_client
            .get(confirmation_link.html)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 303);
    }
}
