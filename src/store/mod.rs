//! Record families and the transactional store contract.
//!
//! The engine is a library of pure-plus-transactional operations: every
//! mutation of node, device, multicast or pending state runs inside a
//! [`Store::transaction`] and either commits completely or leaves no trace.
//! Backends must provide single-row linearisability: two transactions
//! touching the same row are serialised, rows of different devices may
//! proceed in parallel.

mod memory;

pub use memory::{MemoryStore, MemoryTxn};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::counter::FcntCheck;
use crate::keys::{AppEui, AppKey, AppSKey, DevAddr, DevEui, NwkSKey};
use crate::region::Region;
use crate::Error;

/// A provisioned device, keyed by DevEUI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub deveui: DevEui,
    pub appeui: Option<AppEui>,
    pub appkey: AppKey,
    pub profile: String,
    /// Most recently assigned address, reused on rejoin.
    pub node: Option<DevAddr>,
    pub appargs: Option<String>,
    pub last_join: Option<DateTime<Utc>>,
}

/// ADR parameters a node currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdrUse {
    pub power: u8,
    pub datr: u8,
}

/// Receive-window parameters a node currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxWin {
    pub rx1_dr_offset: u8,
    pub rx2_dr: u8,
    pub rx2_freq: u32,
}

/// One device-status report, collected via the DevStatus MAC command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevStat {
    pub time: DateTime<Utc>,
    pub battery: u8,
    pub margin: i8,
}

/// Reception quality of one uplink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkQuality {
    pub rssi: i16,
    pub snr: f64,
}

/// An active session, keyed by DevAddr. Created by the first join-accept,
/// mutated in place afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub devaddr: DevAddr,
    pub profile: String,
    pub nwkskey: NwkSKey,
    pub appskey: AppSKey,
    /// Undefined until the first uplink after a join.
    pub fcntup: Option<u32>,
    pub fcntdown: u32,
    pub adr_use: AdrUse,
    pub rxwin_use: RxWin,
    pub first_reset: Option<DateTime<Utc>>,
    pub last_reset: Option<DateTime<Utc>>,
    pub reset_count: u32,
    pub last_rx: Option<DateTime<Utc>>,
    pub last_gateways: Vec<[u8; 8]>,
    pub devstat: Vec<DevStat>,
    pub devstat_fcnt: Option<u32>,
    pub last_qs: Vec<LinkQuality>,
    pub adr_flag: bool,
    pub adr_set: Option<AdrUse>,
    pub adr_failed: Vec<String>,
    pub rxwin_failed: Vec<String>,
    pub appargs: Option<String>,
}

/// Shared settings of a group of devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub network: String,
    pub can_join: bool,
    pub fcnt_check: FcntCheck,
}

/// Up to 25 address bits reserved below the NwkID, written value-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubId {
    pub value: u32,
    pub len: u8,
}

/// A network this server serves; its NwkID is the low 7 bits of the NetID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub netid: [u8; 3],
    pub subid: Option<SubId>,
    pub region: Region,
}

impl Network {
    pub fn nwk_id(&self) -> u8 {
        self.netid[2] & 0x7F
    }

    /// Whether `devaddr` lies inside this network's address prefix.
    pub fn matches(&self, devaddr: &DevAddr) -> bool {
        let addr = devaddr.to_u32();
        if addr >> 25 != u32::from(self.nwk_id()) {
            return false;
        }
        match self.subid {
            None => true,
            Some(SubId { value, len }) => {
                let len = u32::from(len.min(25));
                len == 0 || (addr >> (25 - len)) & ((1 << len) - 1) == value
            }
        }
    }
}

/// Addresses whose traffic is silently dropped; an absent mask means exact
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredNode {
    pub devaddr: DevAddr,
    pub mask: Option<DevAddr>,
}

impl IgnoredNode {
    pub fn matches(&self, devaddr: &DevAddr) -> bool {
        match self.mask {
            None => self.devaddr == *devaddr,
            Some(mask) => {
                devaddr.to_u32() & mask.to_u32() == self.devaddr.to_u32() & mask.to_u32()
            }
        }
    }
}

/// A class-C multicast group sharing one address and key pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulticastChannel {
    pub devaddr: DevAddr,
    pub nwkskey: NwkSKey,
    pub appskey: AppSKey,
    pub fcntdown: u32,
}

/// Downlinks queued for a device, purged on reset or rejoin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pending {
    pub devaddr: DevAddr,
    pub frames: Vec<Vec<u8>>,
}

/// Scoped handle over the record families. Reads take a write lock on the
/// touched row; writes become visible on commit.
pub trait Transaction {
    fn device(&mut self, deveui: &DevEui) -> Result<Option<Device>, Error>;
    fn put_device(&mut self, device: Device) -> Result<(), Error>;

    fn node(&mut self, devaddr: &DevAddr) -> Result<Option<Node>, Error>;
    fn put_node(&mut self, node: Node) -> Result<(), Error>;
    fn node_exists(&mut self, devaddr: &DevAddr) -> Result<bool, Error>;

    fn profile(&mut self, id: &str) -> Result<Option<Profile>, Error>;
    fn network(&mut self, name: &str) -> Result<Option<Network>, Error>;
    fn networks(&mut self) -> Result<Vec<Network>, Error>;

    fn multicast_channel(&mut self, devaddr: &DevAddr) -> Result<Option<MulticastChannel>, Error>;
    fn put_multicast_channel(&mut self, channel: MulticastChannel) -> Result<(), Error>;

    fn purge_pending(&mut self, devaddr: &DevAddr) -> Result<(), Error>;
}

/// A transactional key/value backend holding the record families.
pub trait Store: Send + Sync {
    type Txn<'a>: Transaction
    where
        Self: 'a;

    /// Runs `f` inside a transaction; commits when it returns `Ok`, aborts
    /// without observable effect when it returns `Err`.
    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Self::Txn<'_>) -> Result<R, Error>,
    ) -> Result<R, Error>;

    /// Lock-free snapshot of the ignored-node rows, scanned before every
    /// data uplink.
    fn dirty_ignored_nodes(&self) -> Result<Vec<IgnoredNode>, Error>;
}
