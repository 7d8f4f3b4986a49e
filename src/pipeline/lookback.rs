use chrono::{DateTime, Duration, Utc};

use crate::models::Listing;

/// Oldest upload time still worth reporting; saturates at the earliest representable time.
pub fn cutoff(now: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(lookback)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Keep the listings uploaded strictly after `cutoff`, in their original order.
pub fn filter_recent(listings: Vec<Listing>, cutoff: DateTime<Utc>) -> Vec<Listing> {
    listings
        .into_iter()
        .filter(|listing| listing.uploaded_at > cutoff)
        .collect()
}
