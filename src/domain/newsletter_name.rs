use unicode_segmentation::UnicodeSegmentation;

const MAX_CHAR_LENGTH: usize = 256;
const FORBIDDEN_CHARS: [char; 9] = ['/', '{', '}', '"', '>', '<', '\\', '(', ')'];

/// Newsletter names end up in confirmation emails, so markup characters are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsletterName(String);

impl NewsletterName {
    pub fn parse(name: String) -> Result<NewsletterName, String> {
        let name = name.trim().to_string();
        let is_empty = name.is_empty();
        let is_too_long = name.graphemes(true).count() > MAX_CHAR_LENGTH;
        let contains_forbidden_chars = name.chars().any(|char| FORBIDDEN_CHARS.contains(&char));

        if is_empty || is_too_long || contains_forbidden_chars {
            return Err(format!("{} is not a valid newsletter name", name));
        }

        Ok(Self(name))
    }
}

impl AsRef<str> for NewsletterName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
