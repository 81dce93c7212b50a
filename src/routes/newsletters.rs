use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::newsletter::Newsletter;
use crate::domain::newsletter_public_id::NewsletterPublicId;
use crate::domain::page::Page;
use crate::newsletters::{NewsletterError, NewsletterService};
use crate::routes::subscriptions::{PageParameters, DEFAULT_PAGE_SIZE};

#[derive(Deserialize)]
pub struct CreateNewsletterBody {
    pub name: String,
    pub description: Option<String>,
}

/// What anyone holding the public id may see.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicNewsletter {
    pub public_id: NewsletterPublicId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What the creator of the newsletter sees.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedNewsletter {
    pub id: Uuid,
    #[serde(flatten)]
    pub public: PublicNewsletter,
}

impl From<Newsletter> for PublicNewsletter {
    fn from(newsletter: Newsletter) -> Self {
        Self {
            public_id: newsletter.public_id,
            name: newsletter.name,
            description: newsletter.description,
            created_at: newsletter.created_at,
        }
    }
}

impl From<Newsletter> for OwnedNewsletter {
    fn from(newsletter: Newsletter) -> Self {
        Self {
            id: newsletter.id,
            public: PublicNewsletter::from(newsletter),
        }
    }
}

#[tracing::instrument(
    name = "Create a newsletter handler",
    skip(request, body, service),
    fields(newsletter_name = %body.name)
)]
pub async fn handle_create_newsletter(
    request: HttpRequest,
    body: web::Json<CreateNewsletterBody>,
    service: web::Data<NewsletterService>,
) -> Result<HttpResponse, NewsletterError> {
    let creator_id = service.authenticate(extract_bearer(&request)?)?;
    let body = body.into_inner();
    let newsletter = service.create(creator_id, body.name, body.description).await?;

    Ok(HttpResponse::Created().json(OwnedNewsletter::from(newsletter)))
}

#[tracing::instrument(name = "List own newsletters handler", skip(request, service))]
pub async fn handle_own_newsletters(
    request: HttpRequest,
    parameters: web::Query<PageParameters>,
    service: web::Data<NewsletterService>,
) -> Result<HttpResponse, NewsletterError> {
    let creator_id = service.authenticate(extract_bearer(&request)?)?;
    let page = service
        .newsletters_by_creator(
            creator_id,
            parameters.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            parameters.page_number.unwrap_or(1),
        )
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        data: page
            .data
            .into_iter()
            .map(OwnedNewsletter::from)
            .collect::<Vec<_>>(),
        pagination: page.pagination,
    }))
}

#[tracing::instrument(name = "Get a newsletter handler", skip(service))]
pub async fn handle_get_newsletter(
    newsletter_public_id: web::Path<String>,
    service: web::Data<NewsletterService>,
) -> Result<HttpResponse, NewsletterError> {
    let newsletter = service.newsletter(&newsletter_public_id).await?;

    Ok(HttpResponse::Ok().json(PublicNewsletter::from(newsletter)))
}

fn extract_bearer(request: &HttpRequest) -> Result<&str, NewsletterError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(NewsletterError::MissingCredentials)?
        .to_str()
        .map_err(|_| NewsletterError::MissingCredentials)?
        .strip_prefix("Bearer ")
        .ok_or(NewsletterError::MissingCredentials)?
        .trim();

    if token.is_empty() {
        return Err(NewsletterError::MissingCredentials);
    }

    Ok(token)
}

impl ResponseError for NewsletterError {
    fn status_code(&self) -> StatusCode {
        match self {
            NewsletterError::InvalidName(_)
            | NewsletterError::InvalidNewsletterId(_)
            | NewsletterError::InvalidPage(_) => StatusCode::BAD_REQUEST,
            NewsletterError::NewsletterNotFound => StatusCode::NOT_FOUND,
            NewsletterError::MissingCredentials | NewsletterError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            NewsletterError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
