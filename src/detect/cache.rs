//! Two-tier throttle on snapshot recomputation.
//!
//! Ingestion tolerates a slightly older snapshot than status queries do, so
//! a burst of requests rebuilds at most once per `ingest_ttl` while every
//! event is still recorded in the log.

use chrono::{DateTime, Duration, Utc};

use crate::detect::snapshot::{Snapshot, SnapshotBuilder};

#[derive(Debug)]
pub struct SnapshotCache {
    ingest_ttl: Duration,
    query_ttl: Duration,
    cached: Option<Snapshot>,
}

impl SnapshotCache {
    pub fn new(ingest_ttl: Duration, query_ttl: Duration) -> Self {
        Self {
            ingest_ttl,
            query_ttl,
            cached: None,
        }
    }

    /// The cached snapshot if it was built less than `ttl` before `now`.
    ///
    /// A snapshot stamped after `now` means the clock stepped backwards and
    /// is treated as stale.
    pub fn fresh(&self, now: DateTime<Utc>, ttl: Duration) -> Option<&Snapshot> {
        self.cached.as_ref().filter(|snap| {
            let age = now - snap.last_updated;
            age >= Duration::zero() && age < ttl
        })
    }

    pub fn fresh_for_query(&self, now: DateTime<Utc>) -> Option<&Snapshot> {
        self.fresh(now, self.query_ttl)
    }

    /// Called after an event has been recorded.
    pub fn on_ingest(&mut self, builder: &mut SnapshotBuilder, now: DateTime<Utc>) -> Snapshot {
        self.get_or_rebuild(builder, now, self.ingest_ttl)
    }

    /// Called for a status read with no new event. Rebuilds once stale even
    /// if nothing was recorded, since the window itself moves with time.
    pub fn on_query(&mut self, builder: &mut SnapshotBuilder, now: DateTime<Utc>) -> Snapshot {
        self.get_or_rebuild(builder, now, self.query_ttl)
    }

    fn get_or_rebuild(
        &mut self,
        builder: &mut SnapshotBuilder,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Snapshot {
        if let Some(snap) = self.fresh(now, ttl) {
            return snap.clone();
        }
        let snap = builder.rebuild(now);
        self.cached = Some(snap.clone());
        snap
    }

    pub fn last_built(&self) -> Option<DateTime<Utc>> {
        self.cached.as_ref().map(|s| s.last_updated)
    }
}
