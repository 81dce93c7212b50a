use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::newsletter_name::NewsletterName;
use crate::domain::newsletter_public_id::NewsletterPublicId;

/// `id` stays internal; subscribers only ever see `public_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Newsletter {
    pub id: Uuid,
    pub public_id: NewsletterPublicId,
    pub creator_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Newsletter {
    pub fn new(creator_id: Uuid, name: NewsletterName, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_id: NewsletterPublicId::from(Uuid::new_v4()),
            creator_id,
            name: name.as_ref().to_string(),
            description: description
                .map(|description| description.trim().to_string())
                .filter(|description| !description.is_empty()),
            created_at: Utc::now(),
        }
    }
}
