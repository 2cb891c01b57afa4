//! Component C7: the acknowledge path.

use std::sync::{Arc, Mutex};

use redis::AsyncCommands;

use crate::item::Item;
use crate::keys::{QueueKeys, SublistTag};
use crate::Result;

use super::QueueHandle;

/// Outcome of [`QueueHandle::mark_items_as_processed`]: `flushed` items were
/// removed from `_working` and had their records purged; `failed` items
/// were already absent from `_working` (most likely because the expiry
/// reclaimer already recovered them).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AckOutcome {
    pub flushed: Vec<String>,
    pub failed: Vec<String>,
}

impl QueueHandle {
    /// Remove every item in `items` from `_working` and purge its payload
    /// and metadata. Idempotent: acknowledging an item that's already gone
    /// from `_working` is reported in `failed`, never an error.
    #[tracing::instrument(skip(self, items), fields(queue = %self.queue_name(), count = items.len()))]
    pub async fn mark_items_as_processed(&self, items: &[Item]) -> Result<AckOutcome> {
        if items.is_empty() {
            return Ok(AckOutcome::default());
        }

        let mut conn = self.gateway.connection().await?;
        let working = self.keys.sublist(SublistTag::Working);

        let flushed = Arc::new(Mutex::new(Vec::new()));
        let failed = Arc::new(Mutex::new(Vec::new()));

        let mut batch = crate::gateway::Batch::new();
        for item in items {
            let item_key = item.item_key.clone();
            let flushed = Arc::clone(&flushed);
            let failed = Arc::clone(&failed);
            let handler_key = item_key.clone();
            batch.push(
                redis::cmd("LREM").arg(&working).arg(1).arg(item_key).to_owned(),
                move |reply| match reply {
                    Ok(redis::Value::Int(removed)) if removed >= 1 => {
                        flushed.lock().unwrap().push(handler_key);
                    }
                    Ok(_) => failed.lock().unwrap().push(handler_key),
                    Err(err) => {
                        tracing::warn!(item_key = %handler_key, error = %err, "LREM failed during ack");
                        failed.lock().unwrap().push(handler_key);
                    }
                },
            );
        }
        batch.wait_all_responses(&mut conn).await?;

        let flushed = Arc::try_unwrap(flushed)
            .expect("no outstanding references after drain")
            .into_inner()
            .unwrap();
        let failed = Arc::try_unwrap(failed)
            .expect("no outstanding references after drain")
            .into_inner()
            .unwrap();

        for chunk in flushed.chunks(100) {
            let mut record_keys = Vec::with_capacity(chunk.len() * 2);
            for item_key in chunk {
                record_keys.push(QueueKeys::meta_key(item_key));
                record_keys.push(QueueKeys::payload_key(item_key));
            }
            let expected = record_keys.len();
            let deleted: usize = conn.del(&record_keys).await?;
            if deleted != expected {
                tracing::warn!(
                    expected,
                    deleted,
                    "DEL during ack cleanup removed fewer keys than expected; \
                     another client likely cleaned up first",
                );
            }
        }

        Ok(AckOutcome { flushed, failed })
    }
}
