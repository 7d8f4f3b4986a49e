use crate::models::Listing;
use crate::scrapers::{FetchError, SearchParams};
use async_trait::async_trait;

/// Common trait for listing sources
///
/// `fetch` takes `&mut self`: a source owns session and proxy state that is
/// advanced on every request, so it must have a single caller at a time.
#[async_trait]
pub trait ListingSource: Send {
    /// Fetch the current listings for a search, newest first
    async fn fetch(&mut self, params: &SearchParams) -> Result<Vec<Listing>, FetchError>;

    /// Get the name of the marketplace
    fn source_name(&self) -> &'static str;
}
