//! MAC-layer frame engine of a LoRaWAN 1.0 network server.
//!
//! The engine ingests raw PHY payloads received by gateways, authenticates
//! and decrypts them against persistent device state, advances per-device
//! frame counters under an explicit replay/reset policy, and produces
//! wire-correct downlink and join-accept payloads.
//!
//! It owns no tasks or sockets: gateway transports call
//! [`MacEngine::ingest_frame`], the application layer calls the downlink
//! encoders, and every state mutation runs inside a transaction of the
//! [`store::Store`] backend handed in at construction.
//!
//! ```
//! use lorawan_ns::store::MemoryStore;
//! use lorawan_ns::{Config, MacEngine};
//!
//! let engine = MacEngine::new(MemoryStore::new(), Config::default());
//! let err = engine.ingest_frame(&[0x00], &[]).unwrap_err();
//! assert_eq!(err, lorawan_ns::Error::BadFrame);
//! ```

pub mod codec;
pub mod counter;
pub mod creator;
pub mod crypto;
pub mod event;
pub mod keys;
pub mod parser;
pub mod region;
pub mod store;

mod downlink;
mod ingest;
mod join;

pub use downlink::TxData;
pub use ingest::{Frame, GatewayRx, Ingest, JoinContext};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use event::{Event, EventScope, EventSink, TracingSink};
use keys::{DevAddr, DevEui};
use store::Store;

/// Engine configuration, treated as immutable for the lifetime of the
/// engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest frame-counter value still treated as evidence of a device
    /// reboot rather than a giant forward jump.
    pub max_lost_after_reset: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self { max_lost_after_reset: 10 }
    }
}

/// Everything that can go wrong while handling a frame. Errors abort the
/// surrounding store transaction; no partial state survives them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("malformed frame")]
    BadFrame,
    #[error("FPort 0 with piggybacked FOpts")]
    DoubleFopts,
    #[error("unknown DevEUI {0}")]
    UnknownDevEui(DevEui),
    #[error("AppEUI mismatch for {0}")]
    BadAppEui(DevEui),
    #[error("unknown DevAddr {0}")]
    UnknownDevAddr(DevAddr),
    #[error("unknown profile {0}")]
    UnknownProfile(String),
    #[error("unknown network {0}")]
    UnknownNetwork(String),
    #[error("bad MIC")]
    BadMic,
    #[error("frame counter gap too large at {fcnt}")]
    FcntGapTooLarge { fcnt: u32, last_rx: Option<DateTime<Utc>> },
    #[error("node is ignored")]
    IgnoredNode,
    #[error("DevAddr space exhausted")]
    DevAddrExhausted,
    #[error("store: {0}")]
    Store(String),
}

/// The frame engine. Cheap to share behind an `Arc`; all methods take
/// `&self` and may run concurrently across gateway connections.
pub struct MacEngine<S> {
    pub(crate) store: S,
    pub(crate) config: Config,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) rng: Mutex<Box<dyn RngCore + Send>>,
}

impl<S: Store> MacEngine<S> {
    /// Creates an engine over `store`, logging events through `tracing`
    /// and drawing randomness from the OS.
    pub fn new(store: S, config: Config) -> Self {
        Self {
            store,
            config,
            events: Arc::new(TracingSink),
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        }
    }

    /// Replaces the event sink.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the random generator; AppNonce and DevAddr generation draw
    /// from it.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn emit(&self, scope: &EventScope, event: &Event) {
        self.events.emit(scope, event);
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
