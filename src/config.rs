use std::path::PathBuf;
use std::time;

use config::{Config, ConfigError, File};
use lettre::message::Mailbox;
use secrecy::{ExposeSecret, Secret};
use serde_aux::field_attributes::{
    deserialize_number_from_string, deserialize_option_number_from_string,
};
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};

use crate::domain::SubscriberEmail;
use crate::mailerlite_client::{CampaignSender, MailerLiteClient};

#[derive(Debug)]
pub enum Environment {
    Development,
    Production,
}

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub storage: StorageSettings,
    pub database: Option<DatabaseSettings>,
    pub email_client: EmailClientSettings,
    pub mailerlite: MailerLiteSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub base_url: String,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Postgres,
}

#[derive(serde::Deserialize, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    // secrecy protects secret information and prevents them to be exposed (eg: via logs)
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub name: String,
    pub require_ssl: bool,
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailClientSettings {
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub smtp: SmtpSettings,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS, usually port 465.
    Tls,
    Starttls,
    /// Plain text, only meant for local relays and test catchers.
    None,
}

#[derive(serde::Deserialize, Clone)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub security: SmtpSecurity,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub timeout_seconds: Option<u64>,
}

#[derive(serde::Deserialize, Clone)]
pub struct MailerLiteSettings {
    pub base_url: String,
    pub api_key: Option<Secret<String>>,
    pub default_group_id: Option<String>,
    pub from_name: String,
    pub from_email: String,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub timeout_milliseconds: Option<u64>,
}

impl Settings {
    pub fn get_address(&self) -> String {
        format!(
            "{}:{}",
            self.application.get_host(),
            self.application.get_port()
        )
    }

    pub fn get_app_base_url(&self) -> String {
        self.application.get_base_url()
    }

    pub fn get_email_client_sender(&self) -> Result<Mailbox, String> {
        self.email_client.get_sender()
    }

    pub fn set_app_port(&mut self, port: u16) {
        self.application.port = port;
    }

    pub fn set_storage_backend(&mut self, backend: StorageBackend) {
        self.storage.backend = backend;
    }

    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.storage.data_dir = data_dir;
    }

    pub fn set_mailerlite_base_url(&mut self, new_base_url: String) {
        self.mailerlite.base_url = new_base_url;
    }

    pub fn set_mailerlite_api_key(&mut self, api_key: Option<Secret<String>>) {
        self.mailerlite.api_key = api_key;
    }
}

impl DatabaseSettings {
    /// Connection options for the server itself, used to create databases.
    pub fn get_server_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .password(self.password.expose_secret())
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    pub fn get_db_options(&self) -> PgConnectOptions {
        let mut db_options = self.get_server_options().database(&self.name);

        db_options.log_statements(tracing::log::LevelFilter::Trace);

        db_options
    }

    pub fn set_name(&mut self, new_db_name: String) {
        self.name = new_db_name;
    }
}

impl ApplicationSettings {
    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_host(&self) -> String {
        self.host.clone()
    }

    pub fn get_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }
}

impl EmailClientSettings {
    pub fn get_sender(&self) -> Result<Mailbox, String> {
        let email = SubscriberEmail::parse(self.sender_email.clone())?;
        let address = email
            .as_ref()
            .parse()
            .map_err(|e| format!("{} is not a valid sender: {}", email, e))?;

        Ok(Mailbox::new(self.sender_name.clone(), address))
    }
}

impl MailerLiteSettings {
    /// The API key, unless it is missing or blank.
    pub fn get_api_key(&self) -> Option<Secret<String>> {
        self.api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .cloned()
    }

    pub fn get_default_group_id(&self) -> Option<String> {
        self.default_group_id
            .as_ref()
            .map(|group| group.trim().to_string())
            .filter(|group| !group.is_empty())
    }

    /// Builds the campaign client when an API key is configured.
    pub fn client(&self) -> Result<Option<MailerLiteClient>, reqwest::Error> {
        let api_key = match self.get_api_key() {
            Some(api_key) => api_key,
            None => return Ok(None),
        };

        let client = MailerLiteClient::new(
            self.base_url.clone(),
            api_key,
            CampaignSender {
                name: self.from_name.clone(),
                email: self.from_email.clone(),
            },
            self.timeout_milliseconds.map(time::Duration::from_millis),
        )?;

        Ok(Some(client))
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            unknown_env => Err(format!(
                "{} is not supported environment. Use either 'development' or 'production'.",
                unknown_env
            )),
        }
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let root_path = std::env::current_dir()
        .map_err(|e| {
            ConfigError::Message(format!("Failed to determine the current directory: {}", e))
        })?;
    let config_directory = root_path.join("config");
    // Uses development environment by default
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "development".into())
        .try_into()
        .map_err(ConfigError::Message)?;
    let config_base_filepath = config_directory.join("base");
    let config_env_filepath = config_directory.join(environment.as_str());

    // It merges the base configuration file with the one from the specific environment (development or production)
    let settings = Config::builder()
        .add_source(File::from(config_base_filepath).required(true))
        .add_source(File::from(config_env_filepath).required(true))
        // E.g APP_MAILERLITE__API_KEY would set Settings.mailerlite.api_key
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    tracing::info!("Application environment = {:?}", environment);

    settings.try_deserialize()
}
