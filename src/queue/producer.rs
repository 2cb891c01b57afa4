//! Component C5: the producer path.

use redis::AsyncCommands;
use time::OffsetDateTime;

use crate::item::{Item, Metadata, Payload};
use crate::keys::{QueueKeys, SublistTag};
use crate::{QueueError, Result};

use super::QueueHandle;

impl QueueHandle {
    /// Mint an item key, persist payload and metadata, and push the item
    /// onto the head of `_unprocessed`, for every payload in `payloads`, in
    /// order. Returns the minted items in the same order.
    ///
    /// An empty `payloads` is a usage error. A colliding item key (the
    /// `SETNX` on `item-<item_key>` finds the key already set) is treated
    /// as a fatal invariant violation rather than silently overwritten.
    #[tracing::instrument(skip(self, payloads), fields(queue = %self.queue_name(), count = payloads.len()))]
    pub async fn enqueue_items(&self, payloads: &[Payload]) -> Result<Vec<Item>> {
        if payloads.is_empty() {
            return Err(QueueError::InvalidArgument(
                "enqueue_items requires at least one payload".into(),
            ));
        }

        let mut conn = self.gateway.connection().await?;
        let unprocessed = self.keys.sublist(SublistTag::Unprocessed);
        let mut items = Vec::with_capacity(payloads.len());

        for payload in payloads {
            let item_key = self.keys.new_item_key();
            let now = OffsetDateTime::now_utc();

            let created: bool = conn
                .set_nx(QueueKeys::payload_key(&item_key), payload.as_slice())
                .await?;
            if !created {
                return Err(QueueError::Invariant(format!(
                    "item key collision creating {item_key}"
                )));
            }

            let metadata = Metadata::new(now);
            conn.hset_multiple::<_, _, _, ()>(
                QueueKeys::meta_key(&item_key),
                &[
                    ("process_count", metadata.process_count.to_string()),
                    ("bail_count", metadata.bail_count.to_string()),
                    (
                        "time_created",
                        metadata.time_created.unix_timestamp().to_string(),
                    ),
                    (
                        "time_enqueued",
                        metadata.time_enqueued.unix_timestamp().to_string(),
                    ),
                ],
            )
            .await?;

            conn.lpush::<_, _, ()>(&unprocessed, &item_key).await?;

            items.push(Item::new(item_key, payload.clone(), metadata));
        }

        Ok(items)
    }
}
