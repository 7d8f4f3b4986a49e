pub mod lookback;
pub mod orchestrator;

pub use orchestrator::{ScrapeRunResult, Scraper};
