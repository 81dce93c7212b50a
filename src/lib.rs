pub mod cache;
pub mod config;
pub mod domain;
pub mod email_client;
pub mod newsletters;
pub mod outbox;
pub mod routes;
pub mod startup;
pub mod store;
pub mod subscriptions;
pub mod telemetry;
pub mod token;
