//! Component C8: the four requeue dispatchers, all backed by the
//! component-C4 atomic script (spec §4.6).

use crate::item::Item;
use crate::keys::SublistTag;
use crate::script::{Placement, RequeuePolicy};
use crate::Result;

use super::QueueHandle;

impl QueueHandle {
    /// A worker voluntarily returns an item it never started processing:
    /// moved back to the tail of `_unprocessed` (near-immediate
    /// reprocessing), without incrementing `process_count`.
    #[tracing::instrument(skip(self, items), fields(queue = %self.queue_name(), count = items.len()))]
    pub async fn unclaim(&self, items: &[Item]) -> Result<usize> {
        self.requeue_via_script(
            items,
            SublistTag::Working,
            RequeuePolicy {
                increment_process_count: false,
                placement: Placement::Tail,
            },
            None,
        )
        .await
    }

    /// Retry after failure: increments `process_count`, and on success
    /// moves the item to the head of `_unprocessed` (back of the line).
    #[tracing::instrument(skip(self, items), fields(queue = %self.queue_name(), count = items.len()))]
    pub async fn requeue_busy(&self, items: &[Item]) -> Result<usize> {
        self.requeue_via_script(
            items,
            SublistTag::Working,
            RequeuePolicy {
                increment_process_count: true,
                placement: Placement::Head,
            },
            None,
        )
        .await
    }

    /// Same as [`Self::requeue_busy`], additionally recording `error` as
    /// each item's `last_error`.
    #[tracing::instrument(skip(self, items, error), fields(queue = %self.queue_name(), count = items.len()))]
    pub async fn requeue_busy_error(&self, items: &[Item], error: &str) -> Result<usize> {
        self.requeue_via_script(
            items,
            SublistTag::Working,
            RequeuePolicy {
                increment_process_count: true,
                placement: Placement::Head,
            },
            Some(error),
        )
        .await
    }

    /// Operator-triggered retry of parked items: pulls from `_failed`,
    /// unconditionally increments `process_count` (so a retried item starts
    /// from `old + 1`, not 0 — preserved from the source, see spec §9), and
    /// places survivors at the tail of `_unprocessed`.
    #[tracing::instrument(skip(self, items), fields(queue = %self.queue_name(), count = items.len()))]
    pub async fn requeue_failed_items(&self, items: &[Item]) -> Result<usize> {
        self.requeue_via_script(
            items,
            SublistTag::Failed,
            RequeuePolicy {
                increment_process_count: true,
                placement: Placement::Tail,
            },
            None,
        )
        .await
    }

    pub(crate) async fn requeue_via_script(
        &self,
        items: &[Item],
        source_tag: SublistTag,
        policy: RequeuePolicy,
        error: Option<&str>,
    ) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut conn = self.gateway.connection().await?;
        let source = self.keys.sublist(source_tag);
        let mut moved = 0usize;

        for item in items {
            let outcome = self
                .requeue_script
                .invoke(
                    &mut conn,
                    &self.keys,
                    &source,
                    &item.item_key,
                    self.config.requeue_limit,
                    policy,
                    error,
                )
                .await;

            match outcome {
                Ok(true) => {
                    moved += 1;
                    if self.config.warn_on_requeue {
                        tracing::warn!(item_key = %item.item_key, source = %source, "requeued item");
                    }
                }
                Ok(false) => {
                    tracing::debug!(
                        item_key = %item.item_key,
                        source = %source,
                        "item already absent from source sublist during requeue (benign race)",
                    );
                }
                Err(err) => {
                    tracing::error!(item_key = %item.item_key, error = %err, "requeue script invocation failed");
                }
            }
        }

        Ok(moved)
    }
}
