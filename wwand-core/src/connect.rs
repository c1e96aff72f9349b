use crate::device::{NetCounters, NetStats};
use crate::usage::{UsageStore, UsageTracker};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use wwand_at::Bearer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection attempt already in progress")]
    AlreadyConnecting,
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("connection closed while dialing")]
    Aborted,
    #[error("dialer failed: {0}")]
    Dial(String),
}

/// OS-level PPP/IP connection establishment, external to this core.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn connect(&self) -> color_eyre::Result<()>;

    async fn disconnect(&self) -> color_eyre::Result<()>;
}

struct Inner {
    state: ConnectionState,
    tracker: UsageTracker,
    /// Most recent bearer notification; seeds the tracker bucket on connect.
    last_bearer: Bearer,
}

/// Connect/disconnect state machine for one device session, owning the
/// usage tracker. Created once per device; shared by reference so a second
/// caller observes `AlreadyConnecting` while a dial is pending.
///
/// The inner mutex is never held across an await.
pub struct Connection<D, S, C> {
    inner: Mutex<Inner>,
    dialer: D,
    store: S,
    counters: C,
    events: broadcast::Sender<ConnectionEvent>,
}

impl<D, S, C> Connection<D, S, C>
where
    D: Dialer,
    S: UsageStore,
    C: NetCounters,
{
    pub fn new(dialer: D, store: S, counters: C) -> Self {
        let (events, _) = broadcast::channel(16);

        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                tracker: UsageTracker::new(),
                last_bearer: Bearer::Gprs,
            }),
            dialer,
            store,
            counters,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Dials up. Rejects immediately while another attempt is pending or a
    /// connection is already up.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                ConnectionState::Connecting => {
                    return Err(ConnectError::AlreadyConnecting)
                }
                ConnectionState::Connected => return Err(ConnectError::AlreadyConnected),
                ConnectionState::Disconnected => inner.state = ConnectionState::Connecting,
            }
        }

        info!("dialing");
        if let Err(e) = self.dialer.connect().await {
            self.inner.lock().unwrap().state = ConnectionState::Disconnected;
            return Err(ConnectError::Dial(e.to_string()));
        }

        let stats = self.sample_counters().await;
        {
            let mut inner = self.inner.lock().unwrap();
            // a close may have claimed the session while the dial was
            // pending; it must not be resurrected here
            if inner.state != ConnectionState::Connecting {
                debug!("dial completed after close, dropping the session");
                return Err(ConnectError::Aborted);
            }
            let bucket = inner.last_bearer.bucket();
            inner
                .tracker
                .start(bucket, Utc::now(), stats.rx_bytes, stats.tx_bytes);
            inner.state = ConnectionState::Connected;
        }

        info!("connected");
        let _ = self.events.send(ConnectionEvent::Connected);

        Ok(())
    }

    /// Tears down: flushes the open usage interval, stops tracking and
    /// notifies listeners. With `hotplug` the device is already physically
    /// gone and the dialer is not invoked.
    pub async fn close(&self, hotplug: bool) -> Result<(), ConnectError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ConnectionState::Disconnected {
                return Err(ConnectError::NotConnected);
            }
            // claim the teardown before the counter sample suspends, so a
            // concurrent close observes NotConnected and a pending dial
            // cannot commit over it
            inner.state = ConnectionState::Disconnected;
        }

        let stats = self.sample_counters().await;
        let record = {
            let mut inner = self.inner.lock().unwrap();
            let record =
                inner
                    .tracker
                    .snapshot(Utc::now(), stats.rx_bytes, stats.tx_bytes);
            inner.tracker.stop();
            record
        };

        if let Some(record) = record {
            if let Err(e) = self.store.store(record).await {
                warn!("failed to persist final usage record: {e}");
            }
        }

        info!(hotplug, "disconnected");
        let _ = self.events.send(ConnectionEvent::Disconnected);

        if !hotplug {
            self.dialer
                .disconnect()
                .await
                .map_err(|e| ConnectError::Dial(e.to_string()))?;
        }

        Ok(())
    }

    /// Routes a bearer-change notification. While tracking, a bucket
    /// crossing persists the closed interval.
    pub async fn handle_bearer_change(&self, bearer: Bearer) {
        let tracking = {
            let mut inner = self.inner.lock().unwrap();
            inner.last_bearer = bearer;
            inner.tracker.is_tracking()
        };

        if !tracking {
            debug!(?bearer, "bearer change while not tracking");
            return;
        }

        let stats = self.sample_counters().await;
        let record = self.inner.lock().unwrap().tracker.on_bearer_change(
            bearer,
            Utc::now(),
            stats.rx_bytes,
            stats.tx_bytes,
        );

        if let Some(record) = record {
            if let Err(e) = self.store.store(record).await {
                warn!("failed to persist usage record: {e}");
            }
        }
    }

    async fn sample_counters(&self) -> NetStats {
        match self.counters.counters().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("failed to read interface counters: {e}");
                NetStats::default()
            }
        }
    }
}
