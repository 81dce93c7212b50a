use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::subscriptions::{SubscriptionError, SubscriptionService};

#[derive(Deserialize, Debug)]
pub struct Parameters {
    pub newsletter_public_id: String,
    pub token: String,
}

/// Target of the link embedded in the confirmation email.
#[tracing::instrument(
    name = "Unsubscribe from a newsletter handler",
    skip(parameters, service),
    fields(newsletter_public_id = %parameters.newsletter_public_id)
)]
pub async fn handle_unsubscribe(
    parameters: web::Query<Parameters>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    service
        .unsubscribe(&parameters.newsletter_public_id, &parameters.token)
        .await?;

    Ok(HttpResponse::Ok().finish())
}
