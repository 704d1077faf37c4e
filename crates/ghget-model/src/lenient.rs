use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Decodes a field, substituting its default when the stored value does not
/// have the expected shape.
pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
