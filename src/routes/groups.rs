use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};

use crate::mailerlite_client::{CampaignError, MailerLiteClient};
use crate::routes::{error_chain_fmt, json_error};

#[tracing::instrument(name = "Listing remote groups handler", skip_all)]
pub async fn handle_list_groups(
    campaign_client: web::Data<Option<MailerLiteClient>>,
) -> Result<HttpResponse, GroupsError> {
    let client = campaign_client
        .get_ref()
        .as_ref()
        .ok_or(GroupsError::NotConfigured)?;
    let groups = client.list_groups().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "groups": groups })))
}

#[derive(thiserror::Error)]
pub enum GroupsError {
    #[error("MailerLite API key is not configured")]
    NotConfigured,
    #[error("Failed to list MailerLite groups")]
    RemoteError(#[from] CampaignError),
}

impl std::fmt::Debug for GroupsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for GroupsError {
    fn status_code(&self) -> StatusCode {
        match self {
            GroupsError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            GroupsError::RemoteError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        json_error(self.status_code(), self.to_string())
    }
}
