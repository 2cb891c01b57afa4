//! `workq` is a reliable FIFO work queue backed by Redis lists.
//!
//! A queue is a set of four Redis lists (the *sublists*): `_unprocessed`,
//! `_working`, `_processed` (present for symmetry, unused by any core path),
//! and `_failed`. Producers push onto `_unprocessed`; consumers atomically
//! move an item from `_unprocessed` to `_working` to claim it, and either
//! acknowledge it (removing it from `_working` and purging its records) or
//! requeue it. An item that exhausts its retry budget is diverted to
//! `_failed` instead of being requeued indefinitely. See [`QueueHandle`] for
//! the full operation surface.
//!
//! ```no_run
//! use workq::{QueueConfig, QueueHandle};
//!
//! # async fn run() -> workq::Result<()> {
//! let handle = QueueHandle::connect(QueueConfig::new("127.0.0.1", 6379, "orders")).await?;
//! handle.enqueue_items(&[b"payload".to_vec()]).await?;
//! let claimed = handle.claim_items(1).await?;
//! handle.mark_items_as_processed(&claimed).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod gateway;
mod item;
mod keys;
mod queue;
mod script;

pub use config::{QueueConfig, RedisOptions};
pub use error::{QueueError, Result};
pub use item::{Item, Metadata, Payload};
pub use keys::{PeekDirection, SublistTag};
pub use queue::ack::AckOutcome;
pub use queue::expiry::ExpiredItemAction;
pub use queue::failed::{FailedItemAction, RemoveFailedItemsOptions, RemoveFailedItemsOutcome};
pub use queue::QueueHandle;
