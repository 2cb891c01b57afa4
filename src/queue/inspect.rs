//! Component C14: inspection and maintenance surface layered on top of the
//! core state machine.

use std::time::Duration;

use redis::AsyncCommands;

use crate::item::Item;
use crate::keys::{PeekDirection, SublistTag};
use crate::Result;

use super::QueueHandle;

impl QueueHandle {
    /// Delete every sublist backing this queue. Leaves any `item-`/`meta-`
    /// records behind; this is a blunt reset, not a safe drain.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name()))]
    pub async fn flush_queue(&self) -> Result<()> {
        let mut conn = self.gateway.connection().await?;
        let keys = [
            self.keys.sublist(SublistTag::Unprocessed),
            self.keys.sublist(SublistTag::Working),
            self.keys.sublist(SublistTag::Processed),
            self.keys.sublist(SublistTag::Failed),
        ];
        let _: usize = conn.del(&keys).await?;
        Ok(())
    }

    /// Number of items currently in `subqueue`.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name(), ?subqueue))]
    pub async fn queue_length(&self, subqueue: SublistTag) -> Result<usize> {
        let mut conn = self.gateway.connection().await?;
        let len: usize = conn.llen(self.keys.sublist(subqueue)).await?;
        Ok(len)
    }

    /// Look at, without removing, the item at either end of `subqueue`.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name(), ?subqueue))]
    pub async fn peek_item(
        &self,
        subqueue: SublistTag,
        direction: PeekDirection,
    ) -> Result<Option<Item>> {
        let mut conn = self.gateway.connection().await?;
        let sublist = self.keys.sublist(subqueue);
        let index: isize = match direction {
            PeekDirection::Front => -1,
            PeekDirection::Back => 0,
        };
        let item_key: Option<String> = conn.lindex(&sublist, index).await?;
        match item_key {
            None => Ok(None),
            Some(item_key) => Ok(Some(self.load_item_record(&mut conn, &item_key).await?)),
        }
    }

    /// Age of the oldest item in `subqueue` (the one a consumer would claim
    /// next), derived from `time_enqueued`, or `None` if it's empty.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name(), ?subqueue))]
    pub async fn get_item_age(&self, subqueue: SublistTag) -> Result<Option<Duration>> {
        let Some(item) = self.peek_item(subqueue, PeekDirection::Front).await? else {
            return Ok(None);
        };
        let age = time::OffsetDateTime::now_utc() - item.metadata.time_enqueued;
        Ok(Some(Duration::try_from(age).unwrap_or(Duration::ZERO)))
    }

    /// Percentage (0.0-100.0) of Redis's configured `maxmemory` currently in
    /// use, read from `INFO memory`. `Some(0.0)` if `maxmemory` is unset,
    /// matching the source behavior of "no limit configured".
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name()))]
    pub async fn percent_memory_used(&self) -> Result<Option<f64>> {
        let mut conn = self.gateway.connection().await?;
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut *conn)
            .await?;
        let Some(used) = parse_info_field(&info, "used_memory") else {
            return Ok(None);
        };
        let max = parse_info_field(&info, "maxmemory").unwrap_or(0.0);
        if max <= 0.0 {
            return Ok(Some(0.0));
        }
        Ok(Some((used / max) * 100.0))
    }

    /// Raw snapshot of up to `number_of_items` items from `_unprocessed`,
    /// without claiming or removing them. Diagnostic only; `0` means "no
    /// limit".
    pub async fn raw_items_unprocessed(&self, number_of_items: usize) -> Result<Vec<Item>> {
        self.raw_items(SublistTag::Unprocessed, number_of_items)
            .await
    }

    /// Same as [`Self::raw_items_unprocessed`], for `_working`.
    pub async fn raw_items_working(&self, number_of_items: usize) -> Result<Vec<Item>> {
        self.raw_items(SublistTag::Working, number_of_items).await
    }

    /// Same as [`Self::raw_items_unprocessed`], for `_failed`.
    pub async fn raw_items_failed(&self, number_of_items: usize) -> Result<Vec<Item>> {
        self.raw_items(SublistTag::Failed, number_of_items).await
    }

    async fn raw_items(&self, tag: SublistTag, number_of_items: usize) -> Result<Vec<Item>> {
        let mut conn = self.gateway.connection().await?;
        let sublist = self.keys.sublist(tag);
        let end: isize = if number_of_items == 0 {
            -1
        } else {
            number_of_items as isize - 1
        };
        let item_keys: Vec<String> = conn.lrange(&sublist, 0, end).await?;

        let mut items = Vec::with_capacity(item_keys.len());
        for item_key in item_keys {
            match self.load_item_record(&mut conn, &item_key).await {
                Ok(item) => items.push(item),
                Err(err) => {
                    tracing::warn!(item_key = %item_key, error = %err, "skipping unreadable record during raw snapshot");
                }
            }
        }
        Ok(items)
    }
}

fn parse_info_field(info: &str, field: &str) -> Option<f64> {
    let prefix = format!("{field}:");
    info.lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .and_then(|v| v.trim().parse::<f64>().ok())
}
