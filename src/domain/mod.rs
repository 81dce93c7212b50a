pub mod email_job;
pub mod newsletter;
pub mod newsletter_name;
pub mod newsletter_public_id;
pub mod page;
pub mod subscriber_email;
pub mod subscription;
