use std::path::Path;

use ghget_fetch::{CacheError, EtagCache};
use ghget_model::{Subscription, UpdateEvent, UpdateState};
use sled::IVec;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use tracing::{debug, warn};

use crate::Store;
use crate::error::{Result, StoreError};
use crate::keys::DbKeys;

/// Version written to the `meta` tree of a new database.
pub const SCHEMA_VERSION: u32 = 1;

fn abort<E: Into<StoreError>>(err: E) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err.into())
}

pub struct SledStore {
    db: sled::Db,
    subscriptions: sled::Tree,
    subscription_order: sled::Tree,
    events: sled::Tree,
    events_by_time: sled::Tree,
    events_by_subscription: sled::Tree,
    settings: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened store");
        Self::from_db(db)
    }

    /// A database that lives only as long as the value.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let store = Self {
            subscriptions: db.open_tree("subscriptions")?,
            subscription_order: db.open_tree("subscription_order")?,
            events: db.open_tree("events")?,
            events_by_time: db.open_tree("events_by_time")?,
            events_by_subscription: db.open_tree("events_by_subscription")?,
            settings: db.open_tree("settings")?,
            db,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let meta = self.db.open_tree("meta")?;
        let stored = meta
            .get(DbKeys::SCHEMA_VERSION)?
            .and_then(|raw| <[u8; 4]>::try_from(raw.as_ref()).ok())
            .map(u32::from_be_bytes);

        match stored {
            None => {
                meta.insert(DbKeys::SCHEMA_VERSION, &SCHEMA_VERSION.to_be_bytes()[..])?;
            }
            Some(version) if version > SCHEMA_VERSION => {
                warn!(version, supported = SCHEMA_VERSION, "store was written by a newer version");
            }
            Some(_) => {}
        }
        Ok(())
    }

    pub fn schema_version(&self) -> Result<Option<u32>> {
        let meta = self.db.open_tree("meta")?;
        Ok(meta
            .get(DbKeys::SCHEMA_VERSION)?
            .and_then(|raw| <[u8; 4]>::try_from(raw.as_ref()).ok())
            .map(u32::from_be_bytes))
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn decode_event(&self, id: &[u8]) -> Result<Option<UpdateEvent>> {
        match self.events.get(id)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn order_keys(&self, id: &str) -> Result<Vec<IVec>> {
        let mut keys = Vec::new();
        for entry in self.subscription_order.iter() {
            let (key, value) = entry?;
            if value.as_ref() == id.as_bytes() {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

impl Store for SledStore {
    fn subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for entry in self.subscription_order.iter() {
            let (_, id) = entry?;
            if let Some(raw) = self.subscriptions.get(&id)? {
                subscriptions.push(serde_json::from_slice(&raw)?);
            }
        }
        Ok(subscriptions)
    }

    fn subscription(&self, id: &str) -> Result<Option<Subscription>> {
        match self.subscriptions.get(id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn upsert_subscription(&self, subscription: &Subscription) -> Result<()> {
        subscription.validate()?;
        let value = serde_json::to_vec(subscription)?;
        let seq = self.db.generate_id()?.to_be_bytes();
        let id = subscription.id.as_bytes();

        (&self.subscriptions, &self.subscription_order).transaction(
            |(subs, order)| -> ConflictableTransactionResult<(), StoreError> {
                let previous = subs.insert(id, value.as_slice())?;
                if previous.is_none() {
                    order.insert(&seq[..], id)?;
                }
                Ok(())
            },
        )?;
        debug!(id = %subscription.id, repo = %subscription.full_name(), "saved subscription");
        Ok(())
    }

    fn delete_subscription(&self, id: &str) -> Result<bool> {
        let order_keys = self.order_keys(id)?;
        let removed = (&self.subscriptions, &self.subscription_order).transaction(
            |(subs, order)| -> ConflictableTransactionResult<bool, StoreError> {
                let removed = subs.remove(id.as_bytes())?;
                for key in &order_keys {
                    order.remove(key.as_ref())?;
                }
                Ok(removed.is_some())
            },
        )?;
        Ok(removed)
    }

    fn add_event(&self, event: &UpdateEvent) -> Result<()> {
        let value = serde_json::to_vec(event)?;
        let id = event.id.as_bytes();
        let by_time = DbKeys::event_by_time(&event.created_at, &event.id);
        let by_subscription =
            DbKeys::event_by_subscription(&event.subscription_id, &event.created_at, &event.id);

        (&self.events, &self.events_by_time, &self.events_by_subscription).transaction(
            |(events, by_time_tree, by_sub_tree)| -> ConflictableTransactionResult<(), StoreError> {
                events.insert(id, value.as_slice())?;
                by_time_tree.insert(by_time.as_slice(), id)?;
                by_sub_tree.insert(by_subscription.as_slice(), id)?;
                Ok(())
            },
        )?;
        debug!(id = %event.id, subscription = %event.subscription_id, state = %event.state, "recorded event");
        Ok(())
    }

    fn event(&self, id: &str) -> Result<Option<UpdateEvent>> {
        self.decode_event(id.as_bytes())
    }

    fn events(&self, subscription_id: Option<&str>, limit: usize) -> Result<Vec<UpdateEvent>> {
        let index: Box<dyn Iterator<Item = sled::Result<(IVec, IVec)>>> = match subscription_id {
            Some(sub) => Box::new(
                self.events_by_subscription
                    .scan_prefix(DbKeys::subscription_events_prefix(sub))
                    .rev(),
            ),
            None => Box::new(self.events_by_time.iter().rev()),
        };

        let mut events = Vec::new();
        for entry in index {
            if events.len() >= limit {
                break;
            }
            let (_, id) = entry?;
            if let Some(event) = self.decode_event(&id)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn update_event_state(&self, id: &str, state: UpdateState) -> Result<UpdateEvent> {
        let key = id.as_bytes();
        let updated = self
            .events
            .transaction(|events| -> ConflictableTransactionResult<UpdateEvent, StoreError> {
                let Some(raw) = events.get(key)? else {
                    return Err(abort(StoreError::EventNotFound(id.to_string())));
                };
                let event: UpdateEvent = serde_json::from_slice(&raw).map_err(abort)?;
                if !event.state.can_transition_to(state) {
                    return Err(abort(StoreError::InvalidTransition {
                        id: id.to_string(),
                        from: event.state,
                        to: state,
                    }));
                }
                let updated = event.with_state(state);
                events.insert(key, serde_json::to_vec(&updated).map_err(abort)?)?;
                Ok(updated)
            })?;
        Ok(updated)
    }

    fn setting(&self, key: &str) -> Result<Option<String>> {
        let Some(raw) = self.settings.get(key.as_bytes())? else {
            return Ok(None);
        };
        match String::from_utf8(raw.to_vec()) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                warn!(key, "ignoring setting that is not valid UTF-8");
                Ok(None)
            }
        }
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.settings.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }
}

impl EtagCache for SledStore {
    fn get_etag(&self, url: &str) -> std::result::Result<Option<String>, CacheError> {
        Ok(self.setting(&DbKeys::etag(url))?)
    }

    fn set_etag(&self, url: &str, etag: &str) -> std::result::Result<(), CacheError> {
        Ok(self.set_setting(&DbKeys::etag(url), etag)?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use ghget_model::{ReleaseInfo, RepositoryId};

    use super::*;

    fn subscription(repo: &str) -> Subscription {
        Subscription::new(RepositoryId::parse(repo).unwrap())
    }

    fn event(subscription_id: &str, release_id: i64, minutes_ago: i64) -> UpdateEvent {
        let release = ReleaseInfo {
            id: release_id,
            tag_name: format!("v{release_id}"),
            name: None,
            published_at: Utc::now(),
            prerelease: false,
            draft: false,
            html_url: String::new(),
            body: None,
            assets: vec![],
        };
        let mut event = UpdateEvent::new(subscription_id, &release, None);
        event.created_at = Utc::now() - Duration::minutes(minutes_ago);
        event
    }

    #[test]
    fn test_new_store_records_schema_version() {
        let store = SledStore::temporary().unwrap();
        assert_eq!(store.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_subscriptions_keep_insert_order() {
        let store = SledStore::temporary().unwrap();
        let a = subscription("o/a");
        let b = subscription("o/b");
        let c = subscription("o/c");
        for sub in [&b, &a, &c] {
            store.upsert_subscription(sub).unwrap();
        }
        store
            .upsert_subscription(&b.with_last_checked(Utc::now()))
            .unwrap();

        let names: Vec<_> = store
            .subscriptions()
            .unwrap()
            .into_iter()
            .map(|s| s.repo)
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(store.subscription(&b.id).unwrap().unwrap().last_checked_at.is_some());
    }

    #[test]
    fn test_upsert_validates() {
        let store = SledStore::temporary().unwrap();
        let mut sub = subscription("o/a");
        sub.install.timeout_secs = 0;
        assert!(matches!(store.upsert_subscription(&sub), Err(StoreError::Invalid(_))));
        assert!(store.subscriptions().unwrap().is_empty());
    }

    #[test]
    fn test_delete_keeps_events() {
        let store = SledStore::temporary().unwrap();
        let sub = subscription("o/a");
        store.upsert_subscription(&sub).unwrap();
        store.add_event(&event(&sub.id, 1, 0)).unwrap();

        assert!(store.delete_subscription(&sub.id).unwrap());
        assert!(!store.delete_subscription(&sub.id).unwrap());
        assert!(store.subscriptions().unwrap().is_empty());
        assert_eq!(store.events(Some(&sub.id), 10).unwrap().len(), 1);

        store.upsert_subscription(&sub).unwrap();
        assert_eq!(store.subscriptions().unwrap().len(), 1);
    }

    #[test]
    fn test_events_newest_first_with_limit() {
        let store = SledStore::temporary().unwrap();
        store.add_event(&event("s1", 1, 30)).unwrap();
        store.add_event(&event("s2", 2, 20)).unwrap();
        store.add_event(&event("s1", 3, 10)).unwrap();

        let all: Vec<_> = store.events(None, 10).unwrap().iter().map(|e| e.release_id).collect();
        assert_eq!(all, vec![3, 2, 1]);

        let s1: Vec<_> = store.events(Some("s1"), 10).unwrap().iter().map(|e| e.release_id).collect();
        assert_eq!(s1, vec![3, 1]);

        assert_eq!(store.events(None, 2).unwrap().len(), 2);
        assert!(store.events(Some("s"), 10).unwrap().is_empty());
    }

    #[test]
    fn test_state_transitions_are_enforced() {
        let store = SledStore::temporary().unwrap();
        let ev = event("s1", 1, 0);
        store.add_event(&ev).unwrap();

        let notified = store.update_event_state(&ev.id, UpdateState::Notified).unwrap();
        assert_eq!(notified.state, UpdateState::Notified);
        assert_eq!(store.event(&ev.id).unwrap().unwrap().state, UpdateState::Notified);

        let err = store.update_event_state(&ev.id, UpdateState::New).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let err = store.update_event_state("missing", UpdateState::Failed).unwrap_err();
        assert!(matches!(err, StoreError::EventNotFound(_)));
    }

    #[test]
    fn test_settings_and_etags() {
        let store = SledStore::temporary().unwrap();
        assert_eq!(store.setting("k").unwrap(), None);
        store.set_setting("k", "v").unwrap();
        assert_eq!(store.setting("k").unwrap().as_deref(), Some("v"));

        store.set_setting("interval", "soon").unwrap();
        assert_eq!(store.setting_or("interval", 60u32).unwrap(), 60);
        assert_eq!(store.setting_or("absent", true).unwrap(), true);

        store.set_etag("https://api/x", "\"e1\"").unwrap();
        assert_eq!(store.get_etag("https://api/x").unwrap().as_deref(), Some("\"e1\""));
        assert_eq!(store.setting("etag:https://api/x").unwrap().as_deref(), Some("\"e1\""));
    }
}
