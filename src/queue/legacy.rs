//! Singular-item convenience wrappers around the bulk operations, kept for
//! callers migrating from a one-item-at-a-time calling convention. Each is a
//! thin forward; the bulk form is the one true implementation.

use crate::item::{Item, Payload};
use crate::Result;

use super::QueueHandle;

impl QueueHandle {
    /// Forwards to [`Self::enqueue_items`] with a single payload.
    pub async fn enqueue_item(&self, payload: Payload) -> Result<Item> {
        let mut items = self.enqueue_items(std::slice::from_ref(&payload)).await?;
        Ok(items.remove(0))
    }

    /// Forwards to [`Self::mark_items_as_processed`] with a single item.
    /// Returns whether the item was actually found in `_working`.
    pub async fn mark_item_as_done(&self, item: &Item) -> Result<bool> {
        let outcome = self
            .mark_items_as_processed(std::slice::from_ref(item))
            .await?;
        Ok(!outcome.flushed.is_empty())
    }

    /// Forwards to [`Self::unclaim`] with a single item.
    pub async fn unclaim_item(&self, item: &Item) -> Result<bool> {
        Ok(self.unclaim(std::slice::from_ref(item)).await? > 0)
    }

    /// Forwards to [`Self::requeue_busy`] with a single item.
    pub async fn requeue_busy_item(&self, item: &Item) -> Result<bool> {
        Ok(self.requeue_busy(std::slice::from_ref(item)).await? > 0)
    }

    /// Forwards to [`Self::requeue_busy_error`] with a single item.
    pub async fn requeue_busy_item_error(&self, item: &Item, error: &str) -> Result<bool> {
        Ok(self
            .requeue_busy_error(std::slice::from_ref(item), error)
            .await?
            > 0)
    }

    /// Forwards to [`Self::requeue_failed_items`] with a single item.
    pub async fn requeue_failed_item(&self, item: &Item) -> Result<bool> {
        Ok(self
            .requeue_failed_items(std::slice::from_ref(item))
            .await?
            > 0)
    }
}
