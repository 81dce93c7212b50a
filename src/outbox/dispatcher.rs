use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::DispatcherSettings;
use crate::domain::email_job::EmailJobKind;
use crate::outbox::worker::{CompletedJobs, DeliveryWorker};
use crate::store::{StoreError, SubscriptionStore};

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("Outbox store failed during the tick.")]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub sent: usize,
    // Pending jobs of unknown types, left untouched
    pub unsupported: i64,
}

pub struct OutboxDispatcher {
    store: Arc<dyn SubscriptionStore>,
    worker: DeliveryWorker,
    settings: DispatcherSettings,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        worker: DeliveryWorker,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            worker,
            settings,
        }
    }

    /// Ticks until `shutdown` flips to true or its sender goes away. A tick
    /// that already started always finishes its batch first.
    pub async fn run_until_stopped(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.settings.get_interval();
        let mut ticker = interval_at(Instant::now() + period, period);

        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Starting email job processing every {:?}, {} jobs per batch",
            period,
            self.settings.max_jobs
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        tracing::error!("Error processing email job batch: {:?}", err);
                    }
                }
            }
        }

        tracing::info!("Email job processing stopped");
    }

    /// Fetches one batch, delivers it concurrently and marks the delivered
    /// subset as sent. Failed jobs stay pending for the next tick.
    #[tracing::instrument(name = "Dispatch email jobs", skip(self))]
    pub async fn tick(&self) -> Result<TickReport, DispatchError> {
        let unsupported = self.unsupported_jobs().await;
        let jobs = self
            .store
            .unsent_email_jobs(self.settings.max_jobs, &EmailJobKind::SUPPORTED)
            .await?;

        if jobs.is_empty() {
            return Ok(TickReport {
                unsupported,
                ..TickReport::default()
            });
        }

        let fetched = jobs.len();
        let completed = CompletedJobs::default();
        let mut workers = JoinSet::new();

        tracing::debug!("Processing {} email jobs", fetched);

        for job in jobs {
            let worker = self.worker.clone();
            let completed = completed.clone();

            workers.spawn(async move { worker.process(job, &completed).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                tracing::error!("Email job worker did not finish: {:?}", err);
            }
        }

        let delivered = completed.take().await;

        if delivered.is_empty() {
            return Ok(TickReport {
                fetched,
                sent: 0,
                unsupported,
            });
        }

        let sent = self.store.mark_email_jobs_sent(&delivered).await?;

        tracing::info!("{} of {} email jobs sent", sent, fetched);

        Ok(TickReport {
            fetched,
            sent: sent as usize,
            unsupported,
        })
    }

    /// Jobs of unknown types are never fetched, so they are only reported
    /// here. A failed count does not stop the tick.
    async fn unsupported_jobs(&self) -> i64 {
        match self
            .store
            .count_unsupported_email_jobs(&EmailJobKind::SUPPORTED)
            .await
        {
            Ok(0) => 0,
            Ok(count) => {
                tracing::warn!(
                    "{} unsent email jobs have an unsupported type and are skipped",
                    count
                );
                count
            }
            Err(err) => {
                tracing::warn!("Failed to count email jobs of unsupported types: {:?}", err);
                0
            }
        }
    }
}
