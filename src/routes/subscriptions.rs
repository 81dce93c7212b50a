use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::subscriptions::{SubscriptionError, SubscriptionService};

pub(crate) const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Deserialize)]
pub struct SubscribeBody {
    pub email: String,
}

#[derive(Deserialize, Debug)]
pub struct PageParameters {
    pub page_size: Option<i64>,
    pub page_number: Option<i64>,
}

#[tracing::instrument(
    name = "Subscribe to a newsletter handler",
    skip(newsletter_public_id, body, service),
    fields(
        subscriber_email = %body.email,
        newsletter_public_id = %newsletter_public_id
    )
)]
pub async fn handle_subscribe(
    newsletter_public_id: web::Path<String>,
    body: web::Json<SubscribeBody>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    service.subscribe(&newsletter_public_id, &body.email).await?;

    Ok(HttpResponse::Created().finish())
}

#[tracing::instrument(name = "List subscribed newsletters handler", skip(service))]
pub async fn handle_subscribed_newsletters(
    email: web::Path<String>,
    parameters: web::Query<PageParameters>,
    service: web::Data<SubscriptionService>,
) -> Result<HttpResponse, SubscriptionError> {
    let page = service
        .subscribed_newsletters(
            &email,
            parameters.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            parameters.page_number.unwrap_or(1),
        )
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

impl ResponseError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::InvalidEmail(_)
            | SubscriptionError::InvalidNewsletterId(_)
            | SubscriptionError::InvalidPage(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::NewsletterNotFound => StatusCode::NOT_FOUND,
            SubscriptionError::AlreadySubscribed => StatusCode::CONFLICT,
            SubscriptionError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            SubscriptionError::TokenIssue(_)
            | SubscriptionError::JobPayload(_)
            | SubscriptionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
