pub mod error;
pub mod proxy;
pub mod traits;
pub mod types;
pub mod vinted;

pub use error::FetchError;
pub use proxy::ProxyPool;
pub use traits::ListingSource;
pub use types::SearchParams;
pub use vinted::VintedClient;
