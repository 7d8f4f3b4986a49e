use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{Listing, SavedSearch};
use crate::notify::{NotificationBatcher, NotifyError};
use crate::pipeline::lookback;
use crate::scrapers::{FetchError, ListingSource};
use crate::storage::{SearchStore, SeenLedger, StoreError};

/// Why a single saved search could not be processed
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("seen-item ledger failed: {0}")]
    Ledger(#[from] StoreError),

    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),
}

/// A search that failed during a run
#[derive(Debug)]
pub struct SearchFailure {
    pub search_id: i64,
    pub search_name: String,
    pub error: ScrapeError,
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search {} ({}): {}", self.search_id, self.search_name, self.error)
    }
}

/// Summary of one pass over every active search
#[derive(Debug, Default)]
pub struct ScrapeRunResult {
    pub new_listings: Vec<Listing>,
    pub processed_searches: usize,
    pub failures: Vec<SearchFailure>,
}

/// JSON view of a run, as returned by the admin API
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub processed_searches: usize,
    pub new_listings: Vec<Listing>,
    pub errors: Vec<String>,
}

impl ScrapeRunResult {
    pub fn report(&self) -> RunReport {
        RunReport {
            processed_searches: self.processed_searches,
            new_listings: self.new_listings.clone(),
            errors: self.failures.iter().map(ToString::to_string).collect(),
        }
    }
}

impl fmt::Display for ScrapeRunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {} searches, {} new listings, {} errors",
            self.processed_searches,
            self.new_listings.len(),
            self.failures.len()
        )
    }
}

/// Runs every active saved search through fetch, lookback filter, dedup and notify
///
/// Searches are handled one after another; the listing source is borrowed
/// mutably for the whole run.
pub struct Scraper {
    source: Box<dyn ListingSource>,
    searches: Arc<dyn SearchStore>,
    ledger: Arc<dyn SeenLedger>,
    notifier: Option<NotificationBatcher>,
    lookback: Duration,
}

impl Scraper {
    pub fn new(
        source: Box<dyn ListingSource>,
        searches: Arc<dyn SearchStore>,
        ledger: Arc<dyn SeenLedger>,
        lookback: Duration,
    ) -> Self {
        Self {
            source,
            searches,
            ledger,
            notifier: None,
            lookback,
        }
    }

    pub fn with_notifier(mut self, notifier: NotificationBatcher) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Process every active search once.
    ///
    /// Only failing to load the saved searches is an error; anything that
    /// goes wrong for an individual search is recorded in the result.
    pub async fn run(&mut self) -> Result<ScrapeRunResult, StoreError> {
        info!(source = self.source.source_name(), "Scraping...");

        let searches = self.searches.list_active_searches()?;
        let mut result = ScrapeRunResult::default();

        for search in &searches {
            match self.process_search(search).await {
                Ok(new_listings) => {
                    debug!(
                        search_id = search.id,
                        new_items_count = new_listings.len(),
                        "Completed search"
                    );
                    result.processed_searches += 1;
                    result.new_listings.extend(new_listings);
                }
                Err(e) => {
                    error!(search_id = search.id, error = %e, "Error processing search");
                    result.failures.push(SearchFailure {
                        search_id: search.id,
                        search_name: search.name.clone(),
                        error: e,
                    });
                }
            }
        }

        info!(summary = %result, "Scraping complete");
        Ok(result)
    }

    async fn process_search(&mut self, search: &SavedSearch) -> Result<Vec<Listing>, ScrapeError> {
        let listings = self.source.fetch(&search.params).await?;
        info!(search_id = search.id, count = listings.len(), "Items found");

        let cutoff = lookback::cutoff(Utc::now(), self.lookback);
        let recent = lookback::filter_recent(listings, cutoff);
        info!(
            search_id = search.id,
            count = recent.len(),
            %cutoff,
            "Items remaining after lookback filter"
        );

        let mut new_listings = Vec::new();
        for listing in recent {
            if self.claim(search.id, &listing)? {
                new_listings.push(listing);
            }
        }

        if let Some(notifier) = &self.notifier {
            if !new_listings.is_empty() {
                info!(search_id = search.id, "Posting Discord notification for search");
                notifier.notify(&new_listings, search).await?;
            }
        }

        Ok(new_listings)
    }

    /// Mark a listing seen for this search; `true` when it was not seen before.
    fn claim(&self, search_id: i64, listing: &Listing) -> Result<bool, StoreError> {
        if self.ledger.is_seen(search_id, listing.id)? {
            debug!(item_id = listing.id, search_id, "Item already seen");
            return Ok(false);
        }
        self.ledger.mark_seen(search_id, listing.id)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Price;
    use crate::notify::{WebhookMessage, WebhookTransport};
    use crate::scrapers::types::SearchParams;
    use crate::storage::SqliteStore;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Scripted {
        Listings(Vec<Listing>),
        Unauthorized,
        ServerError,
    }

    /// Answers each search text from a script and counts calls.
    #[derive(Default)]
    struct FakeSource {
        script: HashMap<String, Scripted>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeSource {
        fn with(mut self, text: &str, response: Scripted) -> Self {
            self.script.insert(text.to_string(), response);
            self
        }
    }

    #[async_trait]
    impl ListingSource for FakeSource {
        async fn fetch(&mut self, params: &SearchParams) -> Result<Vec<Listing>, FetchError> {
            let text = params.search_text().to_string();
            self.calls.lock().unwrap().push(text.clone());
            match self.script.get(&text) {
                Some(Scripted::Listings(listings)) => Ok(listings.clone()),
                Some(Scripted::Unauthorized) => {
                    Err(FetchError::Auth("API still returned 401".to_string()))
                }
                Some(Scripted::ServerError) => {
                    Err(FetchError::RemoteStatus(StatusCode::INTERNAL_SERVER_ERROR))
                }
                None => Ok(Vec::new()),
            }
        }

        fn source_name(&self) -> &'static str {
            "Fake"
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        delivered: Mutex<Vec<WebhookMessage>>,
        fail_first: bool,
    }

    #[async_trait]
    impl WebhookTransport for RecordingTransport {
        async fn deliver(&self, message: &WebhookMessage) -> Result<(), NotifyError> {
            let mut delivered = self.delivered.lock().unwrap();
            if self.fail_first && delivered.is_empty() {
                delivered.push(message.clone());
                return Err(NotifyError::Status {
                    status: 500,
                    body: "discord down".to_string(),
                });
            }
            delivered.push(message.clone());
            Ok(())
        }
    }

    /// Ledger whose reads always fail.
    struct BrokenLedger;

    impl SeenLedger for BrokenLedger {
        fn is_seen(&self, _: i64, _: u64) -> crate::storage::Result<bool> {
            Err(StoreError::LockPoisoned)
        }

        fn mark_seen(&self, _: i64, _: u64) -> crate::storage::Result<()> {
            Err(StoreError::LockPoisoned)
        }
    }

    /// Store that cannot list searches.
    struct BrokenStore;

    impl SearchStore for BrokenStore {
        fn create_search(&self, _: &SavedSearch) -> crate::storage::Result<i64> {
            Err(StoreError::LockPoisoned)
        }

        fn get_search(&self, _: i64) -> crate::storage::Result<Option<SavedSearch>> {
            Err(StoreError::LockPoisoned)
        }

        fn list_searches(&self) -> crate::storage::Result<Vec<SavedSearch>> {
            Err(StoreError::LockPoisoned)
        }
    }

    fn listing(id: u64, age: Duration) -> Listing {
        Listing {
            id,
            title: format!("item {id}"),
            price: Price {
                amount: "20.0".into(),
                currency_code: "GBP".into(),
            },
            size_title: None,
            brand_title: Some("Barbour".into()),
            url: format!("https://www.vinted.co.uk/items/{id}"),
            photo_url: None,
            uploaded_at: Utc::now() - age,
        }
    }

    fn five_listings_two_stale() -> Vec<Listing> {
        vec![
            listing(1, Duration::hours(1)),
            listing(2, Duration::hours(30)),
            listing(3, Duration::hours(5)),
            listing(4, Duration::days(3)),
            listing(5, Duration::minutes(10)),
        ]
    }

    fn store_with(searches: &[(&str, bool)]) -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        for (text, active) in searches {
            let mut search = SavedSearch::new(SearchParams::new(*text).unwrap());
            search.active = *active;
            store.create_search(&search).unwrap();
        }
        Arc::new(store)
    }

    fn scraper(
        source: FakeSource,
        store: &Arc<SqliteStore>,
        transport: Option<Arc<RecordingTransport>>,
    ) -> Scraper {
        let scraper = Scraper::new(
            Box::new(source),
            store.clone(),
            store.clone(),
            Duration::hours(24),
        );
        match transport {
            Some(transport) => scraper.with_notifier(NotificationBatcher::new(
                transport,
                10,
                std::time::Duration::from_secs(10),
            )),
            None => scraper,
        }
    }

    #[tokio::test]
    async fn fresh_unseen_listings_are_marked_and_notified_once() {
        let store = store_with(&[("barbour jacket", true)]);
        let transport = Arc::new(RecordingTransport::default());
        let source =
            FakeSource::default().with("barbour jacket", Scripted::Listings(five_listings_two_stale()));
        let mut scraper = scraper(source, &store, Some(transport.clone()));

        let result = scraper.run().await.unwrap();

        let ids: Vec<u64> = result.new_listings.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert_eq!(result.processed_searches, 1);
        assert!(result.failures.is_empty());
        assert_eq!(store.seen_records(1).unwrap().len(), 3);
        assert!(!store.is_seen(1, 2).unwrap());

        let delivered = transport.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].embeds.len(), 3);
        assert_eq!(delivered[0].content, "🔍 **barbour jacket**: 3 new item(s) found");
    }

    #[tokio::test]
    async fn seen_listings_are_not_reported_again() {
        let store = store_with(&[("barbour jacket", true)]);
        let transport = Arc::new(RecordingTransport::default());
        let source =
            FakeSource::default().with("barbour jacket", Scripted::Listings(five_listings_two_stale()));
        let mut scraper = scraper(source, &store, Some(transport.clone()));

        scraper.run().await.unwrap();
        let second = scraper.run().await.unwrap();

        assert!(second.new_listings.is_empty());
        assert_eq!(second.processed_searches, 1);
        assert_eq!(transport.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_failing_search_does_not_stop_the_next() {
        let store = store_with(&[("broken", true), ("expired", true), ("jackets", true)]);
        let transport = Arc::new(RecordingTransport::default());
        let source = FakeSource::default()
            .with("broken", Scripted::ServerError)
            .with("expired", Scripted::Unauthorized)
            .with("jackets", Scripted::Listings(vec![listing(10, Duration::hours(2))]));
        let calls = source.calls.clone();
        let mut scraper = scraper(source, &store, Some(transport.clone()));

        let result = scraper.run().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["broken", "expired", "jackets"]);
        assert_eq!(result.processed_searches, 1);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].search_id, 1);
        assert!(matches!(
            result.failures[1].error,
            ScrapeError::Fetch(FetchError::Auth(_))
        ));
        assert_eq!(result.new_listings.len(), 1);
        assert_eq!(result.new_listings[0].id, 10);
        assert_eq!(
            result.to_string(),
            "processed 1 searches, 1 new listings, 2 errors"
        );
    }

    #[tokio::test]
    async fn failed_notification_keeps_listings_marked() {
        let store = store_with(&[("first", true), ("second", true)]);
        let transport = Arc::new(RecordingTransport {
            fail_first: true,
            ..Default::default()
        });
        let source = FakeSource::default()
            .with("first", Scripted::Listings(vec![listing(1, Duration::hours(1))]))
            .with("second", Scripted::Listings(vec![listing(2, Duration::hours(1))]));
        let mut scraper = scraper(source, &store, Some(transport.clone()));

        let result = scraper.run().await.unwrap();

        assert_eq!(result.failures.len(), 1);
        assert!(matches!(result.failures[0].error, ScrapeError::Notify(_)));
        assert!(store.is_seen(1, 1).unwrap());
        assert_eq!(result.processed_searches, 1);
        assert_eq!(transport.delivered.lock().unwrap().len(), 2);

        let again = scraper.run().await.unwrap();
        assert!(again.new_listings.is_empty());
        assert!(again.failures.is_empty());
    }

    #[tokio::test]
    async fn inactive_searches_are_skipped() {
        let store = store_with(&[("paused", false), ("live", true)]);
        let source = FakeSource::default();
        let calls = source.calls.clone();
        let mut scraper = scraper(source, &store, None);

        let result = scraper.run().await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["live"]);
        assert_eq!(result.processed_searches, 1);
    }

    #[tokio::test]
    async fn without_notifier_listings_are_still_recorded() {
        let store = store_with(&[("jackets", true)]);
        let source = FakeSource::default()
            .with("jackets", Scripted::Listings(vec![listing(4, Duration::hours(3))]));
        let mut scraper = scraper(source, &store, None);

        let result = scraper.run().await.unwrap();

        assert_eq!(result.new_listings.len(), 1);
        assert!(store.is_seen(1, 4).unwrap());
    }

    #[tokio::test]
    async fn ledger_failure_is_a_search_failure_without_notification() {
        let store = store_with(&[("jackets", true)]);
        let transport = Arc::new(RecordingTransport::default());
        let source = FakeSource::default()
            .with("jackets", Scripted::Listings(vec![listing(4, Duration::hours(3))]));
        let mut scraper = Scraper::new(
            Box::new(source),
            store.clone(),
            Arc::new(BrokenLedger),
            Duration::hours(24),
        )
        .with_notifier(NotificationBatcher::new(
            transport.clone(),
            10,
            std::time::Duration::from_secs(10),
        ));

        let result = scraper.run().await.unwrap();

        assert_eq!(result.processed_searches, 0);
        assert!(result.new_listings.is_empty());
        assert!(matches!(result.failures[0].error, ScrapeError::Ledger(_)));
        assert!(transport.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_search_list_fails_the_run() {
        let ledger = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut scraper = Scraper::new(
            Box::new(FakeSource::default()),
            Arc::new(BrokenStore),
            ledger,
            Duration::hours(24),
        );

        assert!(scraper.run().await.is_err());
    }

    #[test]
    fn report_renders_failures_as_messages() {
        let result = ScrapeRunResult {
            new_listings: Vec::new(),
            processed_searches: 2,
            failures: vec![SearchFailure {
                search_id: 3,
                search_name: "jackets".to_string(),
                error: ScrapeError::Fetch(FetchError::RemoteStatus(StatusCode::FORBIDDEN)),
            }],
        };

        let report = result.report();
        assert_eq!(report.processed_searches, 2);
        assert_eq!(
            report.errors,
            vec!["search 3 (jackets): fetch failed: API request failed with status: 403 Forbidden"]
        );
    }
}
