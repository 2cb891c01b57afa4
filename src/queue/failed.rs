//! Component C9: inspecting and garbage-collecting the failed area.

use std::sync::{Arc, Mutex};

use redis::AsyncCommands;
use time::{Duration as TimeDuration, OffsetDateTime};

use crate::item::Item;
use crate::keys::{QueueKeys, SublistTag};
use crate::script::{Placement, RequeuePolicy};
use crate::{QueueError, Result};

use super::QueueHandle;

/// What to do with every item currently in `_failed`; see
/// [`QueueHandle::handle_failed_items`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailedItemAction {
    /// Run the requeue script against `_failed` without bumping
    /// `process_count`, placing survivors at the head of `_unprocessed`.
    Requeue,
    /// Drop the item out of `_failed` and leave its records in place for
    /// the caller to inspect separately.
    Return,
}

/// Filters for [`QueueHandle::remove_failed_items`]. `None` disables a
/// filter rather than matching everything, since the source left both
/// thresholds without a meaningful default.
#[derive(Clone, Debug)]
pub struct RemoveFailedItemsOptions {
    pub min_age: Option<std::time::Duration>,
    pub min_fail_count: Option<i64>,
    pub chunk: usize,
    pub log_limit: usize,
}

impl Default for RemoveFailedItemsOptions {
    fn default() -> Self {
        Self {
            min_age: None,
            min_fail_count: None,
            chunk: 100,
            log_limit: 100,
        }
    }
}

/// Result of one [`QueueHandle::remove_failed_items`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoveFailedItemsOutcome {
    pub removed: usize,
    pub retained: usize,
    pub errors: usize,
}

impl QueueHandle {
    /// Snapshot `_failed` into a temporary key (so concurrent
    /// `requeue_failed_items`/`handle_failed_items` calls don't see a
    /// half-drained list), walk up to `max_count` items through `callback`
    /// in FIFO order, then restore anything beyond `max_count` back onto
    /// `_failed`. `max_count == 0` means "no limit".
    ///
    /// A callback error bumps the error count and keeps going: one bad item
    /// never aborts the sweep. Returns `(items_seen, callback_errors)`.
    #[tracing::instrument(skip(self, callback), fields(queue = %self.queue_name(), max_count))]
    pub async fn process_failed_items<F, E>(
        &self,
        max_count: usize,
        mut callback: F,
    ) -> Result<(usize, usize)>
    where
        F: FnMut(&Item) -> std::result::Result<(), E>,
        E: std::fmt::Display,
    {
        let mut conn = self.gateway.connection().await?;
        let failed_key = self.keys.sublist(SublistTag::Failed);

        let exists: bool = conn.exists(&failed_key).await?;
        if !exists {
            return Ok((0, 0));
        }

        let temp_key = self.keys.temp_failed_key();
        let renamed: bool = conn.rename_nx(&failed_key, &temp_key).await?;
        if !renamed {
            return Err(QueueError::Invariant(format!(
                "temp failed-area key {temp_key} already exists"
            )));
        }

        let range_end: isize = if max_count == 0 {
            -1
        } else {
            max_count as isize - 1
        };
        let item_keys: Vec<String> = conn.lrange(&temp_key, 0, range_end).await?;

        let mut item_count = 0usize;
        let mut error_count = 0usize;
        for item_key in &item_keys {
            match self.load_item_record(&mut conn, item_key).await {
                Ok(item) => {
                    item_count += 1;
                    if let Err(err) = callback(&item) {
                        error_count += 1;
                        tracing::warn!(item_key = %item_key, error = %err, "process_failed_items callback failed");
                    }
                }
                Err(err) => {
                    error_count += 1;
                    tracing::warn!(item_key = %item_key, error = %err, "failed to load failed-item record");
                }
            }
        }

        if max_count != 0 {
            let _: () = conn.ltrim(&temp_key, item_keys.len() as isize, -1).await?;
            loop {
                let spillover: Option<String> = conn.rpoplpush(&temp_key, &failed_key).await?;
                if spillover.is_none() {
                    break;
                }
            }
        }

        let _: usize = conn.del(&temp_key).await?;

        Ok((item_count, error_count))
    }

    /// Act on every item currently parked in `_failed`. See
    /// [`FailedItemAction`] for the two dispositions.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name(), ?action))]
    pub async fn handle_failed_items(&self, action: FailedItemAction) -> Result<usize> {
        let mut conn = self.gateway.connection().await?;
        let failed_key = self.keys.sublist(SublistTag::Failed);
        let item_keys: Vec<String> = conn.lrange(&failed_key, 0, -1).await?;
        if item_keys.is_empty() {
            return Ok(0);
        }

        let last_errors: Vec<Option<String>> = if matches!(action, FailedItemAction::Requeue) {
            let mut pipe = redis::pipe();
            for item_key in &item_keys {
                pipe.hget(QueueKeys::meta_key(item_key), "last_error");
            }
            pipe.query_async(&mut *conn).await?
        } else {
            Vec::new()
        };

        let mut handled = 0usize;
        for (index, item_key) in item_keys.iter().enumerate() {
            match action {
                FailedItemAction::Requeue => {
                    let last_error = last_errors[index].clone();
                    let policy = RequeuePolicy {
                        increment_process_count: false,
                        placement: Placement::Head,
                    };
                    match self
                        .requeue_script
                        .invoke(
                            &mut conn,
                            &self.keys,
                            &failed_key,
                            item_key,
                            self.config.requeue_limit,
                            policy,
                            last_error.as_deref(),
                        )
                        .await
                    {
                        Ok(true) => handled += 1,
                        Ok(false) => tracing::debug!(
                            item_key = %item_key,
                            "item already absent from _failed during handle_failed_items (benign race)",
                        ),
                        Err(err) => tracing::error!(item_key = %item_key, error = %err, "requeue script invocation failed"),
                    }
                }
                FailedItemAction::Return => {
                    let removed: i64 = conn.lrem(&failed_key, -1, item_key).await?;
                    if removed > 0 {
                        handled += 1;
                    }
                }
            }
        }

        Ok(handled)
    }

    /// Garbage-collect a bounded slice of `_failed`: items older than
    /// `min_age` or failed at least `min_fail_count` times are dropped
    /// (their payload and metadata records deleted); everything else is put
    /// back at the head of `_failed` so it stays in FIFO position for the
    /// next sweep. Call this repeatedly (e.g. from a cron task) to vacuum a
    /// failed area larger than one `chunk`.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name()))]
    pub async fn remove_failed_items(
        &self,
        options: RemoveFailedItemsOptions,
    ) -> Result<RemoveFailedItemsOutcome> {
        let now = OffsetDateTime::now_utc();
        let min_age = options
            .min_age
            .map(|d| TimeDuration::try_from(d).unwrap_or(TimeDuration::MAX));
        let min_fail_count = options.min_fail_count;

        let to_drop: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let to_retain: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let drop_ref = Arc::clone(&to_drop);
        let retain_ref = Arc::clone(&to_retain);
        let mut logged = 0usize;
        let log_limit = options.log_limit;

        let (_, callback_errors) = self
            .process_failed_items(
                options.chunk,
                move |item: &Item| -> std::result::Result<(), std::convert::Infallible> {
                    let age = now - item.metadata.time_created;
                    let stale = min_fail_count.is_some_and(|mfc| item.metadata.process_count >= mfc)
                        || min_age.is_some_and(|ma| age > ma);

                    if logged < log_limit {
                        tracing::debug!(
                            item_key = %item.item_key,
                            stale,
                            process_count = item.metadata.process_count,
                            "remove_failed_items decision"
                        );
                        logged += 1;
                    }

                    if stale {
                        drop_ref.lock().unwrap().push(item.item_key.clone());
                    } else {
                        retain_ref.lock().unwrap().push(item.item_key.clone());
                    }
                    Ok(())
                },
            )
            .await?;

        let to_drop = Arc::try_unwrap(to_drop)
            .expect("no outstanding references after drain")
            .into_inner()
            .unwrap();
        let to_retain = Arc::try_unwrap(to_retain)
            .expect("no outstanding references after drain")
            .into_inner()
            .unwrap();

        let mut conn = self.gateway.connection().await?;

        for chunk in to_drop.chunks(100) {
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
                    "DEL during remove_failed_items removed fewer keys than expected",
                );
            }
        }

        if !to_retain.is_empty() {
            let failed_key = self.keys.sublist(SublistTag::Failed);
            for item_key in &to_retain {
                let _: usize = conn.lpush(&failed_key, item_key).await?;
            }
        }

        Ok(RemoveFailedItemsOutcome {
            removed: to_drop.len(),
            retained: to_retain.len(),
            errors: callback_errors,
        })
    }
}
