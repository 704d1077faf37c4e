//! Durable storage for subscriptions, update events, settings and the
//! ETag cache, on top of an embedded sled database.
//!
//! Records are stored as JSON so that optional fields can be added later
//! without rewriting existing rows.

mod error;
mod keys;
mod sled_store;

use std::sync::Arc;

use ghget_model::{Subscription, UpdateEvent, UpdateState};

pub use error::{Result, StoreError};
pub use sled_store::{SCHEMA_VERSION, SledStore};

/// Everything the checker and the worker need from persistence.
///
/// Each call is atomic on its own. Implementations must allow concurrent
/// readers alongside a single writer.
pub trait Store: Send + Sync {
    /// All subscriptions in the order they were first added.
    fn subscriptions(&self) -> Result<Vec<Subscription>>;

    fn subscription(&self, id: &str) -> Result<Option<Subscription>>;

    fn upsert_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Removes the subscription. Its events stay in place.
    fn delete_subscription(&self, id: &str) -> Result<bool>;

    fn add_event(&self, event: &UpdateEvent) -> Result<()>;

    fn event(&self, id: &str) -> Result<Option<UpdateEvent>>;

    /// Newest first, optionally restricted to one subscription.
    fn events(&self, subscription_id: Option<&str>, limit: usize) -> Result<Vec<UpdateEvent>>;

    /// Moves an event to `state`, rejecting transitions the state machine
    /// does not allow.
    fn update_event_state(&self, id: &str, state: UpdateState) -> Result<UpdateEvent>;

    fn setting(&self, key: &str) -> Result<Option<String>>;

    fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Parses a setting, falling back to `default` when it is missing or
    /// does not parse.
    fn setting_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T>
    where
        Self: Sized,
    {
        Ok(self
            .setting(key)?
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(default))
    }
}

impl<T: Store> Store for Arc<T> {
    fn subscriptions(&self) -> Result<Vec<Subscription>> {
        (**self).subscriptions()
    }

    fn subscription(&self, id: &str) -> Result<Option<Subscription>> {
        (**self).subscription(id)
    }

    fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        (**self).upsert_subscription(subscription)
    }

    fn delete_subscription(&self, id: &str) -> Result<bool> {
        (**self).delete_subscription(id)
    }

    fn add_event(&self, event: &UpdateEvent) -> Result<()> {
        (**self).add_event(event)
    }

    fn event(&self, id: &str) -> Result<Option<UpdateEvent>> {
        (**self).event(id)
    }

    fn events(&self, subscription_id: Option<&str>, limit: usize) -> Result<Vec<UpdateEvent>> {
        (**self).events(subscription_id, limit)
    }

    fn update_event_state(&self, id: &str, state: UpdateState) -> Result<UpdateEvent> {
        (**self).update_event_state(id, state)
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        (**self).setting(key)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_setting(key, value)
    }
}

impl<T: Store> Store for &T {
    fn subscriptions(&self) -> Result<Vec<Subscription>> {
        (**self).subscriptions()
    }

    fn subscription(&self, id: &str) -> Result<Option<Subscription>> {
        (**self).subscription(id)
    }

    fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        (**self).upsert_subscription(subscription)
    }

    fn delete_subscription(&self, id: &str) -> Result<bool> {
        (**self).delete_subscription(id)
    }

    fn add_event(&self, event: &UpdateEvent) -> Result<()> {
        (**self).add_event(event)
    }

    fn event(&self, id: &str) -> Result<Option<UpdateEvent>> {
        (**self).event(id)
    }

    fn events(&self, subscription_id: Option<&str>, limit: usize) -> Result<Vec<UpdateEvent>> {
        (**self).events(subscription_id, limit)
    }

    fn update_event_state(&self, id: &str, state: UpdateState) -> Result<UpdateEvent> {
        (**self).update_event_state(id, state)
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        (**self).setting(key)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_setting(key, value)
    }
}
