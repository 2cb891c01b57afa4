use std::time::Duration;

use crate::{QueueError, Result};

/// Construction parameters for a [`crate::QueueHandle`]. See spec §6 for the
/// meaning and default of every field.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Redis endpoint host.
    pub server: String,
    /// Redis endpoint port.
    pub port: u16,
    /// Logical queue name; drives every sublist and record key.
    pub queue_name: String,
    /// Redis logical database to `SELECT` at connection time. Default 0.
    pub db: i64,
    /// Items in *working* older than this are eligible for reclamation.
    pub busy_expiry_time: Duration,
    /// How long a blocking claim waits for a new item.
    pub claim_wait_timeout: Duration,
    /// When `process_count` exceeds this, an item is parked in *failed*.
    pub requeue_limit: i64,
    /// Emit a diagnostic event on every successful requeue.
    pub warn_on_requeue: bool,
    /// Opaque extra options forwarded to the underlying Redis client
    /// builder (TLS settings, connection timeouts, etc).
    pub redis_options: RedisOptions,
}

/// Passthrough options for the pooled Redis connection manager.
#[derive(Clone, Debug, Default)]
pub struct RedisOptions {
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Bound on how long a reconnect attempt may take before giving up.
    pub connection_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_owned(),
            port: 6379,
            queue_name: String::new(),
            db: 0,
            busy_expiry_time: Duration::from_secs(30),
            claim_wait_timeout: Duration::from_secs(1),
            requeue_limit: 5,
            warn_on_requeue: false,
            redis_options: RedisOptions {
                max_connections: 10,
                connection_timeout: Some(Duration::from_secs(60)),
            },
        }
    }
}

impl QueueConfig {
    /// Construct a config for `queue_name` against `server:port`, with every
    /// other field left at its documented default.
    pub fn new(server: impl Into<String>, port: u16, queue_name: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }

    pub fn db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn busy_expiry_time(mut self, d: Duration) -> Self {
        self.busy_expiry_time = d;
        self
    }

    pub fn claim_wait_timeout(mut self, d: Duration) -> Self {
        self.claim_wait_timeout = d;
        self
    }

    pub fn requeue_limit(mut self, limit: i64) -> Self {
        self.requeue_limit = limit;
        self
    }

    pub fn warn_on_requeue(mut self, warn: bool) -> Self {
        self.warn_on_requeue = warn;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(QueueError::InvalidArgument(
                "server must not be empty".into(),
            ));
        }
        if self.queue_name.trim().is_empty() {
            return Err(QueueError::InvalidArgument(
                "queue_name must not be empty".into(),
            ));
        }
        if self.requeue_limit < 0 {
            return Err(QueueError::InvalidArgument(
                "requeue_limit must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.server, self.port, self.db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.db, 0);
        assert_eq!(cfg.busy_expiry_time, Duration::from_secs(30));
        assert_eq!(cfg.claim_wait_timeout, Duration::from_secs(1));
        assert_eq!(cfg.requeue_limit, 5);
        assert!(!cfg.warn_on_requeue);
    }

    #[test]
    fn rejects_empty_queue_name() {
        let cfg = QueueConfig::new("localhost", 6379, "");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_requeue_limit() {
        let cfg = QueueConfig::new("localhost", 6379, "q").requeue_limit(-1);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builds_redis_url_with_selected_db() {
        let cfg = QueueConfig::new("localhost", 6379, "q").db(3);
        assert_eq!(cfg.redis_url(), "redis://localhost:6379/3");
    }
}
