pub(crate) mod ack;
mod consumer;
pub(crate) mod expiry;
pub(crate) mod failed;
mod inspect;
mod legacy;
mod producer;
mod requeue;

use std::collections::HashMap;

use redis::AsyncCommands;

use crate::config::QueueConfig;
use crate::gateway::Gateway;
use crate::item::{Item, Metadata};
use crate::keys::QueueKeys;
use crate::script::RequeueScript;
use crate::{QueueError, Result};

/// A handle to one named queue. Cheap to clone: the connection pool is
/// reference-counted internally, so a single `QueueHandle` can be shared
/// across concurrently-running producer and consumer tasks.
#[derive(Clone)]
pub struct QueueHandle {
    pub(crate) gateway: Gateway,
    pub(crate) keys: QueueKeys,
    pub(crate) config: QueueConfig,
    pub(crate) requeue_script: RequeueScript,
}

impl QueueHandle {
    /// Validate `config`, establish a pooled connection, and return a handle
    /// ready to enqueue, claim, and acknowledge items.
    #[tracing::instrument(skip(config), fields(queue = %config.queue_name))]
    pub async fn connect(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        let gateway = Gateway::connect(
            &config.redis_url(),
            config.redis_options.max_connections.max(1),
            config.redis_options.connection_timeout,
        )
        .await?;
        let keys = QueueKeys::new(config.queue_name.clone());
        Ok(Self {
            gateway,
            keys,
            config,
            requeue_script: RequeueScript::new(),
        })
    }

    pub fn queue_name(&self) -> &str {
        self.keys.queue_name()
    }

    /// Load payload + metadata for an item that is known to still have both
    /// records, without touching `process_count`. Used by every path that
    /// inspects or relocates an item without "claiming" it.
    pub(crate) async fn load_item_record(
        &self,
        conn: &mut redis::aio::Connection,
        item_key: &str,
    ) -> Result<Item> {
        let meta_key = QueueKeys::meta_key(item_key);
        let payload_key = QueueKeys::payload_key(item_key);

        let map: HashMap<String, String> = conn.hgetall(&meta_key).await?;
        if map.is_empty() {
            return Err(QueueError::Invariant(format!(
                "item {item_key} has no metadata"
            )));
        }
        let metadata = Metadata::from_redis_map(&map)?;

        let payload: Option<Vec<u8>> = conn.get(&payload_key).await?;
        let payload =
            payload.ok_or_else(|| QueueError::Invariant(format!("item {item_key} has no payload")))?;

        Ok(Item::new(item_key.to_owned(), payload, metadata))
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("queue_name", &self.keys.queue_name())
            .finish()
    }
}
