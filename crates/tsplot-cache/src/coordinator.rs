//! The query coordinator - the heart of the cache. Services range
//! requests: finds hits, allocates placeholders for misses, dispatches
//! backend fetches, and coalesces completion into one user callback per
//! logical query.
//!
//! Expressed as structured concurrency rather than threaded continuations:
//! `request_data` spawns one task per logical query, which reserves its
//! range synchronously (under the index's single lock, so two concurrent
//! callers can never both decide the same gap is empty) and then awaits,
//! for every fragment still a placeholder, a [`tokio::sync::Notify`] that
//! the task owning that placeholder's fetch fires once after populating it.
//! No literal `OutstandingQuery`/`pending` counter is materialized; joining
//! N awaits is the counter.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::builder::{self, validate_pwe};
use crate::datasource::DataSource;
use crate::eviction::{EvictionPolicy, Unbounded};
use crate::fragment::Fragment;
use crate::index::IntervalIndex;
use crate::wire::clamp_time_range;

/// Construction-time knobs threaded through from [`crate::config::CacheConfig`].
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    pub default_request_hint: i64,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            default_request_hint: 0,
        }
    }
}

/// Per-(series, resolution) indices, a notification table for in-flight
/// placeholders, a [`DataSource`], and an [`EvictionPolicy`] hook.
///
/// Generic over the `DataSource` implementation, so tests can supply an
/// in-memory fake without spinning up a transport.
pub struct Coordinator<D: DataSource> {
    datasource: Arc<D>,
    options: CoordinatorOptions,
    eviction: Arc<dyn EvictionPolicy>,
    indices: Mutex<HashMap<(Uuid, u8), Arc<IntervalIndex>>>,
    // Keyed by the fragment's (uuid, pwe, end) -- unique within an index
    // because fragments are pairwise disjoint -- rather than by pointer
    // identity, so the notify a second query registers for a
    // not-yet-created placeholder... is never needed: a placeholder always
    // exists (reserved) before anyone can observe it as a collected
    // fragment. See DESIGN.md for why this is safe to key structurally.
    waiters: Mutex<HashMap<(Uuid, u8, i64), Arc<tokio::sync::Notify>>>,
}

impl<D: DataSource + 'static> Coordinator<D> {
    pub fn new(datasource: D, options: CoordinatorOptions) -> Arc<Self> {
        Self::with_eviction_policy(datasource, options, Arc::new(Unbounded))
    }

    /// Build a coordinator from a deserialized [`crate::config::CacheConfig`],
    /// translating its `eviction_policy` knob into a concrete
    /// [`EvictionPolicy`] via [`crate::config::EvictionPolicyKind::build`].
    pub fn from_config(datasource: D, config: &crate::config::CacheConfig) -> Arc<Self> {
        Self::with_eviction_policy(datasource, config.into(), config.eviction_policy.build())
    }

    pub fn with_eviction_policy(
        datasource: D,
        options: CoordinatorOptions,
        eviction: Arc<dyn EvictionPolicy>,
    ) -> Arc<Self> {
        Arc::new(Self {
            datasource: Arc::new(datasource),
            options,
            eviction,
            indices: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        })
    }

    fn index_for(&self, uuid: Uuid, pwe: u8) -> Arc<IntervalIndex> {
        self.indices
            .lock()
            .entry((uuid, pwe))
            .or_insert_with(|| Arc::new(IntervalIndex::new()))
            .clone()
    }

    fn waiter_for(&self, uuid: Uuid, pwe: u8, end: i64) -> Arc<tokio::sync::Notify> {
        self.waiters
            .lock()
            .entry((uuid, pwe, end))
            .or_insert_with(|| Arc::new(tokio::sync::Notify::new()))
            .clone()
    }

    /// Service a range request. Returns
    /// immediately -- "fire and forget" -- having kicked off whatever
    /// backend fetches are needed; `callback` fires exactly once,
    /// asynchronously (even on a total cache hit, via a
    /// [`tokio::task::yield_now`] before it runs), with the fragments that
    /// collectively cover `[start, end]` in ascending order with no
    /// interior gap in coverage.
    pub fn request_data<F>(
        self: &Arc<Self>,
        uuid: Uuid,
        start: i64,
        end: i64,
        pwe: u8,
        request_hint: Option<i64>,
        callback: F,
    ) where
        F: FnOnce(Vec<Arc<Fragment>>) + Send + 'static,
    {
        let this = Arc::clone(self);
        let request_hint = request_hint.unwrap_or(this.options.default_request_hint);
        tokio::spawn(async move {
            this.run_request(uuid, start, end, pwe, request_hint, callback)
                .await;
        });
    }

    async fn run_request<F>(
        self: Arc<Self>,
        uuid: Uuid,
        start: i64,
        end: i64,
        pwe: u8,
        request_hint: i64,
        callback: F,
    ) where
        F: FnOnce(Vec<Arc<Fragment>>) + Send + 'static,
    {
        if let Err(e) = validate_pwe(pwe) {
            tracing::warn!(%uuid, pwe, error = %e, "rejecting request_data for invalid resolution");
            tokio::task::yield_now().await;
            callback(Vec::new());
            return;
        }

        let Some((start, end)) = clamp_time_range(start, end) else {
            tracing::debug!(%uuid, start, end, "request fully outside backend time bounds, short-circuiting");
            tokio::task::yield_now().await;
            callback(Vec::new());
            return;
        };

        let index = self.index_for(uuid, pwe);
        let (collected, created) = index.reserve(pwe, start, end, request_hint);

        for fragment in &created {
            self.eviction.on_insert(uuid, pwe, fragment);
            let this = Arc::clone(&self);
            let fragment = Arc::clone(fragment);
            tokio::spawn(async move {
                this.fill_placeholder(uuid, pwe, fragment).await;
            });
        }

        // Subscribe to every still-unpopulated fragment in `collected`
        // before yielding control, so a fill that races ahead of us can
        // never be missed: `Notify::notified()` only drops wakeups that
        // predate its own creation, and we create it while the fragment is
        // still (as far as we can tell) a placeholder, then re-check.
        let pending: Vec<(Arc<Fragment>, Arc<tokio::sync::Notify>)> = collected
            .iter()
            .filter(|f| f.is_placeholder())
            .map(|f| (Arc::clone(f), self.waiter_for(uuid, pwe, f.end)))
            .collect();

        if pending.is_empty() {
            tracing::info!(%uuid, pwe, start, end, fragments = collected.len(), "request_data served entirely from cache");
            tokio::task::yield_now().await;
            callback(collected);
            return;
        }

        for (fragment, notify) in pending {
            while fragment.is_placeholder() {
                let notified = notify.notified();
                if fragment.is_placeholder() {
                    notified.await;
                }
            }
        }

        tracing::info!(%uuid, pwe, start, end, fragments = collected.len(), "request_data completed after backend fill");
        callback(collected);
    }

    /// Fetch, build, and populate one placeholder this task reserved, then
    /// wake every `request_data` task awaiting it (possibly more than one,
    /// if a later overlapping query coalesced onto this placeholder before
    /// it filled).
    async fn fill_placeholder(self: Arc<Self>, uuid: Uuid, pwe: u8, fragment: Arc<Fragment>) {
        let index = self.index_for(uuid, pwe);
        let prev = index.predecessor(fragment.start);
        let next = index.successor(fragment.end);

        tracing::trace!(%uuid, pwe, start = fragment.start, end = fragment.end, "issuing backend fetch for placeholder");
        let window = self
            .datasource
            .aligned_windows(uuid, fragment.start, fragment.end, pwe)
            .await;

        {
            let _span = tracing::trace_span!("fragment build", %uuid, pwe, start = fragment.start, end = fragment.end)
                .entered();
            builder::fill_fragment(
                &fragment,
                &window.points,
                prev.as_deref(),
                next.as_deref(),
                window.generation,
            );
        }

        self.waiter_for(uuid, pwe, fragment.end)
            .notify_waiters();
        // The notify is no longer needed once the fragment is populated --
        // `is_placeholder()` false short-circuits every future waiter's
        // loop before it ever calls `notified()` again -- but we leave the
        // entry in place rather than remove it: a concurrent `request_data`
        // call may be mid-way through `waiter_for` for this exact key and
        // removing it here could hand that caller a fresh `Notify` nobody
        // will ever fire again. Harmless garbage, bounded by the number of
        // distinct fragment ends ever created.
    }
}
