use chrono::{DateTime, Utc};

pub(crate) struct DbKeys;

impl DbKeys {
    pub const SCHEMA_VERSION: &'static [u8] = b"schema_version";
    pub const ETAG_PREFIX: &'static str = "etag:";

    /// Big-endian, sign-flipped nanoseconds so byte order equals time order.
    pub fn timestamp(at: &DateTime<Utc>) -> [u8; 8] {
        let nanos = at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000));
        ((nanos as u64) ^ (1 << 63)).to_be_bytes()
    }

    pub fn event_by_time(at: &DateTime<Utc>, event_id: &str) -> Vec<u8> {
        let mut key = Self::timestamp(at).to_vec();
        key.extend_from_slice(event_id.as_bytes());
        key
    }

    pub fn subscription_events_prefix(subscription_id: &str) -> Vec<u8> {
        let mut key = subscription_id.as_bytes().to_vec();
        key.push(0);
        key
    }

    pub fn event_by_subscription(subscription_id: &str, at: &DateTime<Utc>, event_id: &str) -> Vec<u8> {
        let mut key = Self::subscription_events_prefix(subscription_id);
        key.extend_from_slice(&Self::timestamp(at));
        key.extend_from_slice(event_id.as_bytes());
        key
    }

    pub fn etag(url: &str) -> String {
        format!("{}{url}", Self::ETAG_PREFIX)
    }
}
