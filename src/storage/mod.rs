pub mod clicks;
pub mod clock;
pub mod schema;
pub mod sqlite;
pub mod startup;

pub use clicks::{SqliteClickStore, StoreOptions};
pub use clock::{Clock, SystemClock};

use crate::error::StoreResult;
use crate::types::{BannerId, ClickStat};
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// Per-banner, per-minute click counters.
///
/// Implementations must fold concurrent increments for the same
/// (banner, minute) into a single bucket without losing any of them, and
/// must surface every backend failure to the caller.
#[async_trait]
pub trait ClickStore: Send + Sync {
    /// Count one event for `banner_id` in the current wall-clock minute.
    async fn record_event(&self, banner_id: BannerId) -> StoreResult<()>;

    /// Buckets whose minute lies in `[from, to]`, ascending. Minutes without
    /// events are not synthesized.
    async fn query_range(
        &self,
        banner_id: BannerId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<ClickStat>>;

    /// Cheap reachability check.
    async fn ping(&self) -> StoreResult<()>;

    /// Release backend resources. Later calls fail with `StoreError::Closed`.
    async fn close(&self) -> StoreResult<()>;
}
