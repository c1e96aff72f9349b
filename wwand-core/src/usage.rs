use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::Serialize;
use tracing::debug;
use wwand_at::{Bearer, BearerBucket};

/// One closed accounting interval, handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub three_g: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn store(&self, record: UsageRecord) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    at: DateTime<Utc>,
    rx: u64,
    tx: u64,
}

#[derive(Debug, Clone, Copy)]
struct Session {
    bucket: BearerBucket,
    baseline: Baseline,
}

/// Bearer-bucket usage accounting for one live connection.
///
/// Invariants: a record is never emitted with a zero byte delta or zero
/// duration, and the baseline resets exactly once per closed interval.
/// Bearer changes within a bucket (HSDPA → HSUPA) are absorbed.
#[derive(Debug, Default)]
pub struct UsageTracker {
    session: Option<Session>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    /// Starts tracking with the current counters as the session baseline.
    pub fn start(&mut self, bucket: BearerBucket, now: DateTime<Utc>, rx: u64, tx: u64) {
        debug!(?bucket, rx, tx, "usage tracking started");
        self.session = Some(Session {
            bucket,
            baseline: Baseline { at: now, rx, tx },
        });
    }

    pub fn stop(&mut self) {
        self.session = None;
    }

    /// Handles a bearer notification while tracking. A change *between*
    /// buckets closes the current interval, returning the record to persist
    /// (tagged with the bucket being closed) and resetting the baseline;
    /// anything else is absorbed.
    pub fn on_bearer_change(
        &mut self,
        bearer: Bearer,
        now: DateTime<Utc>,
        rx: u64,
        tx: u64,
    ) -> Option<UsageRecord> {
        let session = self.session.as_mut()?;
        let bucket = bearer.bucket();

        if bucket == session.bucket {
            return None;
        }

        debug!(from = ?session.bucket, to = ?bucket, "bearer bucket changed");
        let record = interval_record(session, now, rx, tx);

        session.bucket = bucket;
        session.baseline = Baseline { at: now, rx, tx };

        record
    }

    /// Reads the open interval without closing it, for the flush-on-close
    /// path. The baseline is left untouched.
    pub fn snapshot(&self, now: DateTime<Utc>, rx: u64, tx: u64) -> Option<UsageRecord> {
        let session = self.session.as_ref()?;
        interval_record(session, now, rx, tx)
    }
}

/// `None` when the interval would violate the no-zero-delta or
/// no-zero-duration invariants.
fn interval_record(
    session: &Session,
    now: DateTime<Utc>,
    rx: u64,
    tx: u64,
) -> Option<UsageRecord> {
    let baseline = session.baseline;
    let rx_bytes = rx.saturating_sub(baseline.rx);
    let tx_bytes = tx.saturating_sub(baseline.tx);

    if rx_bytes + tx_bytes == 0 || now <= baseline.at {
        return None;
    }

    Some(UsageRecord {
        three_g: session.bucket == BearerBucket::ThreeG,
        start: baseline.at,
        end: now,
        rx_bytes,
        tx_bytes,
    })
}
