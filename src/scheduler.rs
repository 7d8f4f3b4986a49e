use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::pipeline::{ScrapeRunResult, Scraper};
use crate::storage::StoreError;

/// The one orchestrator, shared by the scheduler and the admin API.
///
/// Holding the lock is what serializes runs.
pub type SharedScraper = Arc<Mutex<Scraper>>;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to load saved searches: {0}")]
    Store(#[from] StoreError),

    #[error("scrape run panicked")]
    Panicked,

    #[error("scrape run was cancelled")]
    Cancelled,
}

/// Run one pass in its own task, waiting for any pass already in progress.
///
/// A panic inside the pass is caught at the join point and reported as
/// [`RunError::Panicked`]; the shared orchestrator stays usable.
pub async fn run_once(scraper: SharedScraper) -> Result<ScrapeRunResult, RunError> {
    let handle = tokio::spawn(async move {
        let mut scraper = scraper.lock().await;
        scraper.run().await
    });

    match handle.await {
        Ok(result) => Ok(result?),
        Err(e) if e.is_panic() => {
            error!(error = %e, "Recovered from panic in scrape run");
            Err(RunError::Panicked)
        }
        Err(_) => Err(RunError::Cancelled),
    }
}

/// Fires a scrape pass at startup and then on every interval tick
pub struct Scheduler {
    scraper: SharedScraper,
    interval: Duration,
}

impl Scheduler {
    pub fn new(scraper: SharedScraper, interval: Duration) -> Self {
        Self { scraper, interval }
    }

    /// Loop until `shutdown` flips to true or its sender goes away.
    ///
    /// Shutdown interrupts the wait between passes, never a pass itself.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match run_once(self.scraper.clone()).await {
                        Ok(result) => info!(summary = %result, "Scheduled scrape finished"),
                        Err(e) => error!(error = %e, "Scheduled scrape failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }
}
