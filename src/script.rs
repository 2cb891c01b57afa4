//! Component C4: the server-side requeue script. `redis::Script` already
//! caches scripts server-side by SHA and transparently falls back from
//! `EVALSHA` to `EVAL` on a `NOSCRIPT` reply, so there is no hand-rolled
//! script-cache bookkeeping here.

use redis::Script;
use time::OffsetDateTime;

use crate::keys::QueueKeys;

const REQUEUE_SCRIPT_SOURCE: &str = include_str!("../lua/requeue.lua");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Placement {
    Head,
    Tail,
}

impl Placement {
    fn as_str(self) -> &'static str {
        match self {
            Placement::Head => "head",
            Placement::Tail => "tail",
        }
    }
}

/// The four requeue dispatchers' shared policy: which sublist to pull from,
/// whether to bump `process_count`, and which end of `_unprocessed` a
/// successful requeue lands on.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RequeuePolicy {
    pub increment_process_count: bool,
    pub placement: Placement,
}

#[derive(Clone)]
pub(crate) struct RequeueScript {
    script: Script,
}

impl RequeueScript {
    pub fn new() -> Self {
        Self {
            script: Script::new(REQUEUE_SCRIPT_SOURCE),
        }
    }

    /// Invoke the script for a single item. Returns `true` if the item was
    /// found in `source` and moved, `false` if it had already been removed
    /// by a concurrent client (a benign race, not an error).
    pub async fn invoke(
        &self,
        conn: &mut redis::aio::Connection,
        keys: &QueueKeys,
        source: &str,
        item_key: &str,
        requeue_limit: i64,
        policy: RequeuePolicy,
        error: Option<&str>,
    ) -> crate::Result<bool> {
        use crate::keys::SublistTag;

        let ok_dest = keys.sublist(SublistTag::Unprocessed);
        let fail_dest = keys.sublist(SublistTag::Failed);
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let moved: i64 = self
            .script
            .key(source)
            .key(ok_dest)
            .key(fail_dest)
            .arg(item_key)
            .arg(requeue_limit)
            .arg(policy.placement.as_str())
            .arg(error.unwrap_or(""))
            .arg(if policy.increment_process_count { "1" } else { "0" })
            .arg(now)
            .invoke_async(conn)
            .await?;

        Ok(moved == 1)
    }
}

impl Default for RequeueScript {
    fn default() -> Self {
        Self::new()
    }
}
