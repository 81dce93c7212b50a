//! Background delivery of the `email_jobs` outbox.
//!
//! The dispatcher wakes up on a fixed interval, fetches a bounded batch of
//! unsent jobs and runs one worker per job. Only the jobs whose worker
//! reported success are marked sent, so a failed delivery is retried on the
//! next tick (at-least-once, without a retry limit).

pub mod dispatcher;
pub mod worker;

pub use dispatcher::{DispatchError, OutboxDispatcher, TickReport};
pub use worker::{CompletedJobs, DeliveryError, DeliveryWorker};
