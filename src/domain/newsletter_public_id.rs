use uuid::Uuid;

/// Public-facing identifier of a newsletter, as it appears in links and routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct NewsletterPublicId(Uuid);

impl NewsletterPublicId {
    pub fn parse(value: &str) -> Result<NewsletterPublicId, String> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|_| format!("{} is not a valid newsletter identifier", value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for NewsletterPublicId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for NewsletterPublicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
