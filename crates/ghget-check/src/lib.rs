//! Release polling on top of the fetch, select, install and store crates.
//!
//! - [`UpdateChecker`] - one pass over the subscriptions
//! - [`notify_pending`] - announce newly recorded releases
//! - [`search_with_releases`] - repository search enriched with the latest
//!   release of each hit

mod checker;
mod error;
mod notify;
mod search;

pub use checker::{UpdateCheckOptions, UpdateCheckSummary, UpdateChecker};
pub use error::{CheckError, Result};
pub use notify::{NOTIFY_SCAN_LIMIT, Notification, Notifier, NotifyError, notify_pending};
pub use search::{DEFAULT_MAX_CONCURRENT, SearchHit, search_with_releases};
