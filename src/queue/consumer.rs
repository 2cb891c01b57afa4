//! Component C6: the claim path, single and bulk, blocking and
//! non-blocking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use redis::AsyncCommands;

use crate::gateway::Batch;
use crate::item::{Item, Metadata};
use crate::keys::{QueueKeys, SublistTag};
use crate::{QueueError, Result};

use super::QueueHandle;

impl QueueHandle {
    /// Claim up to `number_of_items` from `_unprocessed`, without waiting
    /// for new work to arrive. `number_of_items` must be at least 1.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name(), requested = number_of_items))]
    pub async fn claim_items_nonblocking(&self, number_of_items: usize) -> Result<Vec<Item>> {
        require_positive(number_of_items)?;
        if number_of_items == 1 {
            let mut conn = self.gateway.connection().await?;
            return Ok(self
                .claim_one_nonblocking(&mut conn)
                .await?
                .into_iter()
                .collect());
        }
        self.claim_bulk_nonblocking(number_of_items).await
    }

    /// Claim up to `number_of_items` from `_unprocessed`, waiting up to
    /// `claim_wait_timeout` if nothing is immediately available.
    #[tracing::instrument(skip(self), fields(queue = %self.queue_name(), requested = number_of_items))]
    pub async fn claim_items(&self, number_of_items: usize) -> Result<Vec<Item>> {
        require_positive(number_of_items)?;
        if number_of_items == 1 {
            return Ok(self.claim_one_blocking().await?.into_iter().collect());
        }
        self.claim_bulk_blocking(number_of_items).await
    }

    async fn claim_one_nonblocking(
        &self,
        conn: &mut redis::aio::Connection,
    ) -> Result<Option<Item>> {
        let unprocessed = self.keys.sublist(SublistTag::Unprocessed);
        let working = self.keys.sublist(SublistTag::Working);

        let item_key: Option<String> = conn.rpoplpush(&unprocessed, &working).await?;
        match item_key {
            None => Ok(None),
            Some(item_key) => Ok(Some(self.load_claimed_item(conn, &item_key).await?)),
        }
    }

    async fn claim_one_blocking(&self) -> Result<Option<Item>> {
        let mut conn = self.gateway.connection().await?;

        // Cheap fast path: most of the time there's already work waiting.
        if let Some(item) = self.claim_one_nonblocking(&mut conn).await? {
            return Ok(Some(item));
        }

        let unprocessed = self.keys.sublist(SublistTag::Unprocessed);
        let working = self.keys.sublist(SublistTag::Working);
        let timeout = self.config.claim_wait_timeout.as_secs_f64();

        let item_key: Option<String> = conn.brpoplpush(&unprocessed, &working, timeout).await?;
        match item_key {
            None => Ok(None),
            Some(item_key) => Ok(Some(self.load_claimed_item(&mut conn, &item_key).await?)),
        }
    }

    /// Best-effort bulk claim: `LLEN`-clamp `requested` to what's actually
    /// queued, pipeline that many `RPOPLPUSH`, then enrich every popped key
    /// (`HINCRBY process_count` + `HGETALL` + `GET`) through a single
    /// [`Batch`] round trip. A concurrent enqueue between the `LLEN` and the
    /// pops merely shortens this batch; per-item enrichment failures are
    /// logged and skipped rather than failing the whole call.
    async fn claim_bulk_nonblocking(&self, requested: usize) -> Result<Vec<Item>> {
        let mut conn = self.gateway.connection().await?;
        let unprocessed = self.keys.sublist(SublistTag::Unprocessed);
        let working = self.keys.sublist(SublistTag::Working);

        let available: usize = conn.llen(&unprocessed).await?;
        let clamp = requested.min(available);
        if clamp == 0 {
            return Ok(Vec::new());
        }

        let mut pop_pipe = redis::pipe();
        for _ in 0..clamp {
            pop_pipe.cmd("RPOPLPUSH").arg(&unprocessed).arg(&working);
        }
        let popped: Vec<Option<String>> = pop_pipe.query_async(&mut *conn).await?;
        let item_keys: Vec<String> = popped.into_iter().flatten().collect();
        if item_keys.is_empty() {
            return Ok(Vec::new());
        }

        self.enrich_claimed_batch(&mut conn, item_keys).await
    }

    /// If the first pipelined pass finds nothing, issue a single
    /// `BRPOPLPUSH` to wait for one item, then pipeline `requested - 1`
    /// further `RPOPLPUSH` once work is known to exist.
    async fn claim_bulk_blocking(&self, requested: usize) -> Result<Vec<Item>> {
        let first_pass = self.claim_bulk_nonblocking(requested).await?;
        if !first_pass.is_empty() {
            return Ok(first_pass);
        }

        let mut conn = self.gateway.connection().await?;
        let unprocessed = self.keys.sublist(SublistTag::Unprocessed);
        let working = self.keys.sublist(SublistTag::Working);
        let timeout = self.config.claim_wait_timeout.as_secs_f64();

        let item_key: Option<String> = conn.brpoplpush(&unprocessed, &working, timeout).await?;
        let Some(item_key) = item_key else {
            return Ok(Vec::new());
        };

        let mut items = Vec::with_capacity(requested);
        match self.load_claimed_item(&mut conn, &item_key).await {
            Ok(item) => items.push(item),
            Err(err) => {
                tracing::error!(item_key = %item_key, error = %err, "failed to load blocking-claimed item");
            }
        }

        if requested > 1 {
            let mut rest = self.claim_bulk_nonblocking(requested - 1).await?;
            items.append(&mut rest);
        }
        Ok(items)
    }

    /// Increment `process_count` and load payload + metadata for a single
    /// item already moved into `_working`. Used by the single-item claim
    /// paths, where pipelining a batch of one wouldn't save a round trip.
    async fn load_claimed_item(
        &self,
        conn: &mut redis::aio::Connection,
        item_key: &str,
    ) -> Result<Item> {
        let meta_key = QueueKeys::meta_key(item_key);
        let payload_key = QueueKeys::payload_key(item_key);

        // Fire-and-forget in spirit: the item is already safely in
        // `_working`, so we don't need the post-increment value to decide
        // anything here, only to record it.
        let _: i64 = conn.hincr(&meta_key, "process_count", 1).await?;

        let map: HashMap<String, String> = conn.hgetall(&meta_key).await?;
        if map.is_empty() {
            return Err(QueueError::Invariant(format!(
                "claimed item {item_key} has no metadata"
            )));
        }
        let metadata = Metadata::from_redis_map(&map)?;

        let payload: Option<Vec<u8>> = conn.get(&payload_key).await?;
        let payload = payload.ok_or_else(|| {
            QueueError::Invariant(format!("claimed item {item_key} has no payload"))
        })?;

        Ok(Item::new(item_key.to_owned(), payload, metadata))
    }

    /// Enrich a batch of already-claimed item keys (already moved into
    /// `_working` by the caller) in one pipelined round trip: for each key,
    /// queue `HINCRBY process_count`, `HGETALL`, and `GET` onto a [`Batch`],
    /// drain it once, then assemble `Item`s in the original key order. A key
    /// whose metadata or payload can't be read is logged and dropped; it
    /// stays in `_working` and is picked back up by the expiry reclaimer.
    async fn enrich_claimed_batch(
        &self,
        conn: &mut redis::aio::Connection,
        item_keys: Vec<String>,
    ) -> Result<Vec<Item>> {
        let slots: Arc<Mutex<Vec<ClaimedSlot>>> = Arc::new(Mutex::new(
            item_keys.iter().map(|_| ClaimedSlot::default()).collect(),
        ));

        let mut batch = Batch::new();
        for (index, item_key) in item_keys.iter().enumerate() {
            let meta_key = QueueKeys::meta_key(item_key);
            let payload_key = QueueKeys::payload_key(item_key);

            let handler_key = item_key.clone();
            batch.push(
                redis::cmd("HINCRBY")
                    .arg(&meta_key)
                    .arg("process_count")
                    .arg(1)
                    .to_owned(),
                move |reply| {
                    if let Err(err) = reply {
                        tracing::error!(item_key = %handler_key, error = %err, "HINCRBY failed during bulk claim enrichment");
                    }
                },
            );

            let meta_slots = Arc::clone(&slots);
            let handler_key = item_key.clone();
            batch.push(redis::cmd("HGETALL").arg(&meta_key).to_owned(), move |reply| {
                let parsed: std::result::Result<HashMap<String, String>, redis::RedisError> =
                    reply.and_then(|v| redis::FromRedisValue::from_redis_value(&v));
                match parsed {
                    Ok(map) => meta_slots.lock().unwrap()[index].metadata = Some(map),
                    Err(err) => tracing::error!(item_key = %handler_key, error = %err, "HGETALL failed during bulk claim enrichment"),
                }
            });

            let payload_slots = Arc::clone(&slots);
            let handler_key = item_key.clone();
            batch.push(redis::cmd("GET").arg(&payload_key).to_owned(), move |reply| {
                let parsed: std::result::Result<Option<Vec<u8>>, redis::RedisError> =
                    reply.and_then(|v| redis::FromRedisValue::from_redis_value(&v));
                match parsed {
                    Ok(payload) => payload_slots.lock().unwrap()[index].payload = payload,
                    Err(err) => tracing::error!(item_key = %handler_key, error = %err, "GET failed during bulk claim enrichment"),
                }
            });
        }
        batch.wait_all_responses(conn).await?;

        let slots = Arc::try_unwrap(slots)
            .expect("no outstanding references after drain")
            .into_inner()
            .unwrap();

        let mut items = Vec::with_capacity(item_keys.len());
        for (item_key, slot) in item_keys.into_iter().zip(slots) {
            match (slot.metadata, slot.payload) {
                (Some(map), Some(payload)) if !map.is_empty() => {
                    match Metadata::from_redis_map(&map) {
                        Ok(metadata) => items.push(Item::new(item_key, payload, metadata)),
                        Err(err) => tracing::error!(
                            item_key = %item_key,
                            error = %err,
                            "unreadable metadata for a claimed item; it remains in _working \
                             and will be recovered by the expiry reclaimer",
                        ),
                    }
                }
                _ => tracing::error!(
                    item_key = %item_key,
                    "missing metadata or payload for a claimed item; it remains in _working \
                     and will be recovered by the expiry reclaimer",
                ),
            }
        }
        Ok(items)
    }
}

#[derive(Default, Debug)]
struct ClaimedSlot {
    metadata: Option<HashMap<String, String>>,
    payload: Option<Vec<u8>>,
}

fn require_positive(number_of_items: usize) -> Result<()> {
    if number_of_items == 0 {
        return Err(QueueError::InvalidArgument(
            "number_of_items must be at least 1".into(),
        ));
    }
    Ok(())
}
