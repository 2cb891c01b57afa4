use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;

/// Opaque payload bytes, as deposited by a producer.
pub type Payload = Vec<u8>;

/// Metadata tracked alongside every live item, stored in the `meta-<item_key>`
/// hash. `Serialize` only, since this crate never reads metadata back from
/// JSON — it exists for operator tooling that wants to dump an [`Item`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Metadata {
    pub process_count: i64,
    pub bail_count: i64,
    pub time_created: OffsetDateTime,
    pub time_enqueued: OffsetDateTime,
    pub last_error: Option<String>,
}

impl Metadata {
    pub(crate) fn new(now: OffsetDateTime) -> Self {
        Self {
            process_count: 0,
            bail_count: 0,
            time_created: now,
            time_enqueued: now,
            last_error: None,
        }
    }

    /// Parse the reply of `HGETALL meta-<item_key>`.
    pub(crate) fn from_redis_map(map: &HashMap<String, String>) -> crate::Result<Self> {
        let parse_f64 = |field: &str| -> crate::Result<f64> {
            map.get(field)
                .ok_or_else(|| {
                    crate::QueueError::Invariant(format!("metadata missing field {field}"))
                })?
                .parse::<f64>()
                .map_err(|e| crate::QueueError::Invariant(format!("bad {field}: {e}")))
        };
        let parse_i64 = |field: &str, default: i64| -> crate::Result<i64> {
            match map.get(field) {
                Some(v) => v
                    .parse::<i64>()
                    .map_err(|e| crate::QueueError::Invariant(format!("bad {field}: {e}"))),
                None => Ok(default),
            }
        };

        Ok(Self {
            process_count: parse_i64("process_count", 0)?,
            bail_count: parse_i64("bail_count", 0)?,
            time_created: seconds_to_time(parse_f64("time_created")?)?,
            time_enqueued: seconds_to_time(parse_f64("time_enqueued")?)?,
            last_error: map.get("last_error").cloned().filter(|s| !s.is_empty()),
        })
    }
}

fn seconds_to_time(secs: f64) -> crate::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs as i64)
        .map_err(|e| crate::QueueError::Invariant(format!("bad timestamp: {e}")))
}

/// An immutable `(item_key, payload, metadata)` triple, the unit of exchange
/// between every layer of this crate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Item {
    pub item_key: String,
    pub payload: Payload,
    pub metadata: Metadata,
}

impl Item {
    pub(crate) fn new(item_key: String, payload: Payload, metadata: Metadata) -> Self {
        Self {
            item_key,
            payload,
            metadata,
        }
    }

    /// Render as a JSON object, for operator tooling built on top of
    /// [`crate::QueueHandle::raw_items_unprocessed`] and friends.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
