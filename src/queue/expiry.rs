//! Component C10: reclaiming items stuck in `_working` past their expiry.

use std::collections::HashMap;

use redis::AsyncCommands;
use time::{Duration as TimeDuration, OffsetDateTime};

use crate::item::{Item, Metadata};
use crate::keys::{QueueKeys, SublistTag};
use crate::script::{Placement, RequeuePolicy};
use crate::Result;

use super::QueueHandle;

/// What to do with an item that's been in `_working` longer than its
/// expiry timeout; see [`QueueHandle::handle_expired_items`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiredItemAction {
    /// Run it back through the requeue script with the same policy as
    /// [`QueueHandle::requeue_busy`]: bump `process_count`, land at the
    /// head of `_unprocessed`, or divert to `_failed` past the retry limit.
    Requeue,
    /// Pull it out of `_working` and leave its `item-`/`meta-` records in
    /// place, for an operator who wants to inspect a stuck item by hand
    /// before it disappears for good.
    Drop,
}

impl QueueHandle {
    /// Snapshot `_working`, and for every item whose `time_enqueued` is
    /// older than `timeout`, apply `action`. Returns the items that were
    /// actually reclaimed. This races by design with a consumer that's
    /// simply slow rather than dead: picking a `timeout` generous enough
    /// for the expected processing time is the caller's job, not something
    /// this method can infer.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name(), ?action))]
    pub async fn handle_expired_items(
        &self,
        timeout: std::time::Duration,
        action: ExpiredItemAction,
    ) -> Result<Vec<Item>> {
        let mut conn = self.gateway.connection().await?;
        let working = self.keys.sublist(SublistTag::Working);

        let item_keys: Vec<String> = conn.lrange(&working, 0, -1).await?;
        if item_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for item_key in &item_keys {
            pipe.hgetall(QueueKeys::meta_key(item_key));
        }
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut *conn).await?;

        let now = OffsetDateTime::now_utc();
        let timeout = TimeDuration::try_from(timeout).unwrap_or(TimeDuration::MAX);

        let mut reclaimed = Vec::new();
        for (item_key, map) in item_keys.iter().zip(maps.iter()) {
            if map.is_empty() {
                tracing::warn!(item_key = %item_key, "item in _working has no metadata; skipping");
                continue;
            }
            let metadata = match Metadata::from_redis_map(map) {
                Ok(m) => m,
                Err(err) => {
                    tracing::warn!(item_key = %item_key, error = %err, "unreadable metadata in _working; skipping");
                    continue;
                }
            };

            if now - metadata.time_enqueued <= timeout {
                continue;
            }

            match action {
                ExpiredItemAction::Requeue => {
                    let policy = RequeuePolicy {
                        increment_process_count: true,
                        placement: Placement::Head,
                    };
                    match self
                        .requeue_script
                        .invoke(
                            &mut conn,
                            &self.keys,
                            &working,
                            item_key,
                            self.config.requeue_limit,
                            policy,
                            Some("expired in _working"),
                        )
                        .await
                    {
                        Ok(true) => match self.load_item_record(&mut conn, item_key).await {
                            Ok(item) => reclaimed.push(item),
                            Err(err) => tracing::warn!(
                                item_key = %item_key,
                                error = %err,
                                "requeued expired item but could not reload its record",
                            ),
                        },
                        Ok(false) => tracing::debug!(
                            item_key = %item_key,
                            "item already absent from _working during expiry reclaim (benign race)",
                        ),
                        Err(err) => tracing::error!(
                            item_key = %item_key,
                            error = %err,
                            "requeue script invocation failed during expiry reclaim",
                        ),
                    }
                }
                ExpiredItemAction::Drop => {
                    let removed: i64 = conn.lrem(&working, 1, item_key).await?;
                    if removed > 0 {
                        let payload = conn
                            .get(QueueKeys::payload_key(item_key))
                            .await
                            .unwrap_or_default();
                        reclaimed.push(Item::new(item_key.clone(), payload, metadata));
                    }
                }
            }
        }

        Ok(reclaimed)
    }
}
