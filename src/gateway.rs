//! Thin async-pipelined wrapper over a pooled Redis connection (component
//! C1). Exposes request/reply via the pool directly, plus [`Batch`] for the
//! "post command + callback, drain later" pattern used by the bulk claim,
//! bulk ack, and bulk metadata-fetch paths.

use bb8_redis::RedisConnectionManager;

use crate::{QueueError, Result};

pub(crate) type Pool = bb8::Pool<RedisConnectionManager>;
pub(crate) type PooledConnection<'a> = bb8::PooledConnection<'a, RedisConnectionManager>;

/// Owns the connection pool for one queue. Cheap to clone (the pool itself
/// is reference-counted), so a [`crate::QueueHandle`] can be shared across
/// concurrently-running consumer tasks.
#[derive(Clone)]
pub(crate) struct Gateway {
    pool: Pool,
}

impl Gateway {
    pub async fn connect(
        redis_url: &str,
        max_connections: u32,
        connection_timeout: Option<std::time::Duration>,
    ) -> Result<Self> {
        let manager = RedisConnectionManager::new(redis_url)?;
        let mut builder = bb8::Pool::builder().max_size(max_connections);
        if let Some(timeout) = connection_timeout {
            builder = builder.connection_timeout(timeout);
        }
        let pool = builder.build(manager).await?;
        Ok(Self { pool })
    }

    pub async fn connection(&self) -> Result<PooledConnection<'_>> {
        self.pool.get().await.map_err(QueueError::from)
    }
}

pub(crate) type BatchReply = redis::RedisResult<redis::Value>;

/// A sequence of commands to be sent in a single pipelined round trip, each
/// paired with a completion handler. Mirrors the source design's
/// "pipelined with callback" contract (spec §4.1, §9): handlers fire in the
/// order replies arrive, which for a single connection equals dispatch
/// order.
pub(crate) struct Batch {
    pipe: redis::Pipeline,
    handlers: Vec<Box<dyn FnOnce(BatchReply) + Send>>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            pipe: redis::pipe(),
            handlers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Queue `cmd`, to be matched with `handler` once the batch drains.
    pub fn push<F>(&mut self, cmd: redis::Cmd, handler: F)
    where
        F: FnOnce(BatchReply) + Send + 'static,
    {
        self.pipe.add_command(cmd);
        self.handlers.push(Box::new(handler));
    }

    /// Send every queued command in one round trip and invoke each handler
    /// with its reply. A connection-level failure fails the whole batch: it
    /// is logged once and every outstanding handler is invoked with that
    /// error, so callers can still account for (and skip) every item they
    /// queued.
    pub async fn wait_all_responses(self, conn: &mut redis::aio::Connection) -> Result<()> {
        if self.handlers.is_empty() {
            return Ok(());
        }
        let expected = self.handlers.len();
        match self.pipe.query_async::<_, Vec<redis::Value>>(conn).await {
            Ok(replies) => {
                for (reply, handler) in replies.into_iter().zip(self.handlers) {
                    handler(Ok(reply));
                }
            }
            Err(err) => {
                tracing::error!(error = %err, count = expected, "pipelined batch failed");
                for handler in self.handlers {
                    handler(Err(clone_for_fanout(&err)));
                }
            }
        }
        Ok(())
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

/// `redis::RedisError` isn't `Clone`; rebuild an equivalent one for each
/// handler that needs to be told "the batch this was part of failed".
fn clone_for_fanout(err: &redis::RedisError) -> redis::RedisError {
    redis::RedisError::from((err.kind(), "batch failed", err.to_string()))
}
