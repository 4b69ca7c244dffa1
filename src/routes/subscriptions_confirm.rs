use actix_web::{http::header::LOCATION, http::StatusCode, web, HttpResponse, ResponseError};
use chrono::Utc;
use serde::Deserialize;

use crate::routes::{error_chain_fmt, json_error};
use crate::startup::ApplicationBaseUrl;
use crate::store::{StoreError, SubscriberStore};

#[derive(Deserialize, Debug)]
pub struct Parameters {
    pub token: Option<String>,
}

#[tracing::instrument(
    name = "Confirm a newsletter subscription",
    skip(store, base_url, parameters)
)]
pub async fn handle_confirm_subscription(
    store: web::Data<dyn SubscriberStore>,
    base_url: web::Data<ApplicationBaseUrl>,
    parameters: web::Query<Parameters>,
) -> Result<HttpResponse, ConfirmError> {
    let token = parameters
        .token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ConfirmError::MissingToken)?;

    let subscriber = store
        .confirm(token, Utc::now())
        .await?
        .ok_or(ConfirmError::UnknownToken)?;

    tracing::info!("{} confirmed the subscription", subscriber.email);

    Ok(HttpResponse::SeeOther()
        .insert_header((LOCATION, format!("{}/subscribe/confirmation", base_url.0)))
        .finish())
}

#[derive(thiserror::Error)]
pub enum ConfirmError {
    #[error("Missing token")]
    MissingToken,
    #[error("Invalid or expired token")]
    UnknownToken,
    #[error("Failed to access the subscriber store")]
    StoreError(#[from] StoreError),
}

impl std::fmt::Debug for ConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for ConfirmError {
    fn status_code(&self) -> StatusCode {
        match self {
            ConfirmError::MissingToken => StatusCode::BAD_REQUEST,
            ConfirmError::UnknownToken => StatusCode::NOT_FOUND,
            ConfirmError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), self.to_string())
    }
}
