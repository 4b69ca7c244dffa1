use actix_web::{HttpRequest, HttpResponse, Responder};

/// Liveness probe. Does not touch the stores or the remote API.
#[tracing::instrument(name = "Health check handler", skip_all)]
pub async fn health_check(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().finish()
}
