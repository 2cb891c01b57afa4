//! Deterministic Redis key names for sublists and per-item records.
//!
//! The source implementation dispatches on sublist name through a runtime
//! name-to-accessor map; here that's a closed enum matched by a total
//! function, which is the idiomatic Rust equivalent.

use std::fmt;

/// One of the four sublists backing a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SublistTag {
    Unprocessed,
    Working,
    /// Present for API symmetry with the source design; unused by any core
    /// path (see spec §3).
    Processed,
    Failed,
}

impl SublistTag {
    fn as_str(self) -> &'static str {
        match self {
            SublistTag::Unprocessed => "unprocessed",
            SublistTag::Working => "working",
            SublistTag::Processed => "processed",
            SublistTag::Failed => "failed",
        }
    }

    /// Parses the user-facing sublist name used by [`crate::QueueHandle::queue_length`]
    /// and friends. Unknown names are a usage error.
    pub fn parse(name: &str) -> crate::Result<Self> {
        match name {
            "unprocessed" => Ok(SublistTag::Unprocessed),
            "working" => Ok(SublistTag::Working),
            "processed" => Ok(SublistTag::Processed),
            "failed" => Ok(SublistTag::Failed),
            other => Err(crate::QueueError::InvalidArgument(format!(
                "unknown sublist name: {other}"
            ))),
        }
    }
}

impl fmt::Display for SublistTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction to peek from, used by [`crate::QueueHandle::peek_item`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeekDirection {
    /// The oldest end of the sublist (the tail, where consumers pop from).
    Front,
    /// The newest end of the sublist (the head, where producers push to).
    Back,
}

/// Key names for one queue. `Q_t` for sublists (single underscore), plus
/// `item-<item_key>` / `meta-<item_key>` record keys.
#[derive(Clone, Debug)]
pub struct QueueKeys {
    queue_name: String,
}

impl QueueKeys {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn sublist(&self, tag: SublistTag) -> String {
        format!("{}_{}", self.queue_name, tag.as_str())
    }

    pub fn new_item_key(&self) -> String {
        format!("{}-{}", self.queue_name, random_hex_128())
    }

    pub fn payload_key(item_key: &str) -> String {
        format!("item-{item_key}")
    }

    pub fn meta_key(item_key: &str) -> String {
        format!("meta-{item_key}")
    }

    pub fn temp_failed_key(&self) -> String {
        format!("temp-failed-{}", random_hex_128())
    }
}

/// A fresh 128-bit random value, hex-encoded. Collision probability is
/// negligible; a collision on item-key creation is treated as a fatal
/// invariant violation rather than silently overwritten (spec §3).
pub(crate) fn random_hex_128() -> String {
    let bytes: [u8; 16] = rand::random();
    let mut s = String::with_capacity(32);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sublist_keys_use_single_underscore() {
        let keys = QueueKeys::new("orders");
        assert_eq!(keys.sublist(SublistTag::Unprocessed), "orders_unprocessed");
        assert_eq!(keys.sublist(SublistTag::Working), "orders_working");
        assert_eq!(keys.sublist(SublistTag::Processed), "orders_processed");
        assert_eq!(keys.sublist(SublistTag::Failed), "orders_failed");
    }

    #[test]
    fn record_keys_have_expected_prefixes() {
        assert_eq!(QueueKeys::payload_key("orders-abc"), "item-orders-abc");
        assert_eq!(QueueKeys::meta_key("orders-abc"), "meta-orders-abc");
    }

    #[test]
    fn new_item_key_is_prefixed_and_unique() {
        let keys = QueueKeys::new("orders");
        let a = keys.new_item_key();
        let b = keys.new_item_key();
        assert!(a.starts_with("orders-"));
        assert_eq!(a.len(), "orders-".len() + 32);
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert!(SublistTag::parse("unprocessed").is_ok());
        assert!(SublistTag::parse("bogus").is_err());
    }
}
