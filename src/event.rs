//! Warning and info reporting.
//!
//! The engine never changes an outcome because of an event; callers that
//! need programmatic access install their own [`EventSink`], everyone else
//! gets the [`TracingSink`] forwarding to `tracing`.

use crate::keys::{DevAddr, DevEui};

/// The entity an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    Device(DevEui),
    Node(DevAddr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Uplinks were lost between the previous and the current reception.
    UplinksMissed { missed: u32 },
    /// A device rejoined without ever sending an uplink in its previous
    /// session.
    RepeatedReset { count: u32 },
    /// A small frame counter after a large one reset the session state.
    FcntReset { fcnt: u32 },
    /// A join-accept was issued.
    Joined { devaddr: DevAddr },
    /// Application data on a MAC-command downlink was discarded.
    DownlinkDataDropped { bytes: usize },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, scope: &EventScope, event: &Event);
}

/// Default sink logging warnings and infos through `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, scope: &EventScope, event: &Event) {
        let subject = match scope {
            EventScope::Device(deveui) => format!("device {deveui}"),
            EventScope::Node(devaddr) => format!("node {devaddr}"),
        };
        match event {
            Event::UplinksMissed { missed } => {
                tracing::warn!("{subject}: {missed} uplinks missed");
            }
            Event::RepeatedReset { count } => {
                tracing::warn!("{subject}: repeated reset ({count} resets)");
            }
            Event::FcntReset { fcnt } => {
                tracing::warn!("{subject}: frame counter reset to {fcnt}");
            }
            Event::Joined { devaddr } => {
                tracing::info!("{subject}: joined as {devaddr}");
            }
            Event::DownlinkDataDropped { bytes } => {
                tracing::warn!("{subject}: {bytes} bytes of downlink data dropped");
            }
        }
    }
}

/// Sink that drops everything. Handy in benchmarks and tests.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _scope: &EventScope, _event: &Event) {}
}
