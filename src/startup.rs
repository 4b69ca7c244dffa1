use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{error::InternalError, http::StatusCode, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing_actix_web::TracingLogger;

use crate::config::{DatabaseSettings, Settings, StorageBackend};
use crate::email_client::EmailClient;
use crate::mailerlite_client::MailerLiteClient;
use crate::routes::{
    handle_confirm_subscription, handle_create_issue, handle_create_subscription,
    handle_get_issue, handle_list_groups, handle_list_issues, handle_list_subscribers,
    health_check, json_error,
};
use crate::store::{
    IssueStore, JsonIssueStore, JsonSubscriberStore, PgIssueStore, PgSubscriberStore,
    SubscriberStore,
};

/// Issue bodies carry the inline image as a data URI.
const JSON_PAYLOAD_LIMIT: usize = 10 * 1024 * 1024;

pub struct Application {
    pub port: u16,
    pub server: Server,
}

/// Public URL of the service, used to build confirmation links.
pub struct ApplicationBaseUrl(pub String);

pub struct DeliverySettings {
    pub default_group_id: Option<String>,
}

struct Stores {
    subscribers: Arc<dyn SubscriberStore>,
    issues: Arc<dyn IssueStore>,
}

impl Application {
    pub async fn build(config: Settings) -> anyhow::Result<Self> {
        let sender = config
            .get_email_client_sender()
            .map_err(|e| anyhow::anyhow!("Sender email is not valid: {}", e))?;
        let email_client = EmailClient::smtp(sender, &config.email_client.smtp)
            .context("Failed to set up the SMTP transport")?;

        Self::build_with_email_client(config, email_client).await
    }

    /// Same as [`Application::build`] but with an already assembled email
    /// client, so callers can swap the mail transport.
    pub async fn build_with_email_client(
        config: Settings,
        email_client: EmailClient,
    ) -> anyhow::Result<Self> {
        let stores = build_stores(&config).await?;
        let campaign_client = config
            .mailerlite
            .client()
            .context("Failed to build the MailerLite client")?;

        if campaign_client.is_none() {
            tracing::info!(
                "No MailerLite API key configured, using local confirmation and direct mail"
            );
        }

        let listener = TcpListener::bind(config.get_address())
            .with_context(|| format!("Failed to bind {}", config.get_address()))?;
        let port = listener.local_addr()?.port();
        let server = run(
            listener,
            stores,
            email_client,
            campaign_client,
            config.get_app_base_url(),
            DeliverySettings {
                default_group_id: config.mailerlite.get_default_group_id(),
            },
        )?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stop(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

async fn build_stores(config: &Settings) -> anyhow::Result<Stores> {
    match config.storage.backend {
        StorageBackend::File => {
            tracing::info!("Using JSON file stores in {:?}", config.storage.data_dir);

            Ok(Stores {
                subscribers: Arc::new(JsonSubscriberStore::in_dir(&config.storage.data_dir)),
                issues: Arc::new(JsonIssueStore::in_dir(&config.storage.data_dir)),
            })
        }
        StorageBackend::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("The postgres storage backend needs a database section")?;
            let db_pool = get_connection_db_pool(database);

            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .context("Failed to run database migrations")?;

            Ok(Stores {
                subscribers: Arc::new(PgSubscriberStore::new(db_pool.clone())),
                issues: Arc::new(PgIssueStore::new(db_pool)),
            })
        }
    }
}

fn run(
    listener: TcpListener,
    stores: Stores,
    email_client: EmailClient,
    campaign_client: Option<MailerLiteClient>,
    base_url: String,
    delivery: DeliverySettings,
) -> Result<Server, std::io::Error> {
    let subscribers: web::Data<dyn SubscriberStore> = web::Data::from(stores.subscribers);
    let issues: web::Data<dyn IssueStore> = web::Data::from(stores.issues);
    let email_client = web::Data::new(email_client);
    let campaign_client = web::Data::new(campaign_client);
    let base_url = web::Data::new(ApplicationBaseUrl(base_url));
    let delivery = web::Data::new(delivery);

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default()
            .limit(JSON_PAYLOAD_LIMIT)
            .error_handler(|err, _req| {
                let response = json_error(StatusCode::BAD_REQUEST, err.to_string());
                InternalError::from_response(err, response).into()
            });

        // App is where your application logic lives: routing, middlewares, request handler, etc
        App::new()
            .wrap(TracingLogger::default())
            .app_data(json_config)
            .route("/health_check", web::get().to(health_check))
            .route("/subscribers", web::post().to(handle_create_subscription))
            .route("/subscribers", web::get().to(handle_list_subscribers))
            .route(
                "/subscribers/confirm",
                web::get().to(handle_confirm_subscription),
            )
            .route("/issues", web::post().to(handle_create_issue))
            .route("/issues", web::get().to(handle_list_issues))
            .route("/issues/{issue_id}", web::get().to(handle_get_issue))
            .route("/groups", web::get().to(handle_list_groups))
            .app_data(subscribers.clone())
            .app_data(issues.clone())
            .app_data(email_client.clone())
            .app_data(campaign_client.clone())
            .app_data(base_url.clone())
            .app_data(delivery.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}
