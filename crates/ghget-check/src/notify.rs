use std::collections::HashMap;

use ghget_model::{UpdateEvent, UpdateState};
use ghget_store::Store;
use tracing::{debug, warn};

use crate::error::Result;

/// How many recent events are scanned for pending notifications.
pub const NOTIFY_SCAN_LIMIT: usize = 200;

pub type NotifyError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event_id: String,
    /// The subscription's display title, or its id if it no longer exists.
    pub title: String,
    /// `"<tag> - <release title>"`, or the tag alone.
    pub body: String,
}

impl Notification {
    fn for_event(event: &UpdateEvent, titles: &HashMap<String, String>) -> Self {
        let title = titles
            .get(&event.subscription_id)
            .cloned()
            .unwrap_or_else(|| event.subscription_id.clone());
        let body = match event.title.as_deref().map(str::trim) {
            Some(release_title) if !release_title.is_empty() => {
                format!("{} - {}", event.tag, release_title)
            }
            _ => event.tag.clone(),
        };
        Self {
            event_id: event.id.clone(),
            title,
            body,
        }
    }
}

/// Delivers a notification somewhere a user will see it.
pub trait Notifier {
    fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        (**self).notify(notification)
    }
}

/// Announces up to `limit` of the newest `New` events and marks each
/// delivered one as `Notified`. Returns how many were delivered.
///
/// A delivery failure leaves the event `New` so the next run retries it.
pub fn notify_pending<S: Store, N: Notifier>(store: &S, notifier: &N, limit: usize) -> Result<usize> {
    let titles: HashMap<String, String> = store
        .subscriptions()?
        .into_iter()
        .map(|s| {
            let title = s.display_title();
            (s.id, title)
        })
        .collect();

    let pending: Vec<UpdateEvent> = store
        .events(None, NOTIFY_SCAN_LIMIT)?
        .into_iter()
        .filter(|e| e.state == UpdateState::New)
        .take(limit)
        .collect();

    let mut notified = 0;
    for event in &pending {
        let notification = Notification::for_event(event, &titles);
        match notifier.notify(&notification) {
            Ok(()) => {
                store.update_event_state(&event.id, UpdateState::Notified)?;
                notified += 1;
            }
            Err(err) => warn!(event = %event.id, error = %err, "notification delivery failed"),
        }
    }

    debug!(pending = pending.len(), notified, "pending notifications processed");
    Ok(notified)
}
