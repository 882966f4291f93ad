//! Client-side cache of API result-sets.

pub mod key;
pub mod store;
pub mod tags;

use chrono::{DateTime, Utc};

pub use key::CacheKey;
pub use store::{CacheStore, FetchFn, QueryState, ReadState, Subscription, DEFAULT_KEEP_UNUSED_FOR};
pub use tags::{invalidated_by, tags_for, Tag, TagId, TagSet};

/// Human-readable age of a fetch, e.g. "5m ago".
pub fn age_display(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - fetched_at).num_minutes();
    if minutes < 1 {
        // Clock skew lands here too
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
