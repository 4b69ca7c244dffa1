use actix_web::{http::StatusCode, HttpResponse};

mod groups;
mod health_check;
mod issues;
mod subscriptions;
mod subscriptions_confirm;

pub use groups::*;
pub use health_check::*;
pub use issues::*;
pub use subscriptions::*;
pub use subscriptions_confirm::*;

/// Body of every error response: `{"error": "<message>"}`.
pub fn json_error(status: StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message }))
}

/// The error followed by each of its sources, outermost first.
pub fn error_chain<'a>(
    e: &'a (dyn std::error::Error + 'static),
) -> impl Iterator<Item = &'a (dyn std::error::Error + 'static)> {
    std::iter::successors(Some(e), |current| current.source())
}

pub fn error_chain_fmt(
    e: &(impl std::error::Error + 'static),
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    let mut chain = error_chain(e);
    if let Some(top) = chain.next() {
        writeln!(f, "{}", top)?;
    }
    for cause in chain {
        writeln!(f, "Caused by:\n\t{}", cause)?;
    }
    Ok(())
}
