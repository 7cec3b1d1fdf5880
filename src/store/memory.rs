//! In-memory store backend.
//!
//! Holds all record families behind one mutex and stages every transaction
//! on a copy of the tables, so an aborted transaction leaves nothing
//! behind. Single-row linearisability follows from the global lock; a
//! production backend replaces this with row-level locks or CAS.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{
    Device, IgnoredNode, MulticastChannel, Network, Node, Pending, Profile, Store, Transaction,
};
use crate::keys::{DevAddr, DevEui};
use crate::Error;

#[derive(Debug, Default, Clone)]
struct Tables {
    devices: HashMap<DevEui, Device>,
    nodes: HashMap<DevAddr, Node>,
    profiles: HashMap<String, Profile>,
    networks: HashMap<String, Network>,
    ignored: Vec<IgnoredNode>,
    multicast: HashMap<DevAddr, MulticastChannel>,
    pending: HashMap<DevAddr, Pending>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provisions a device outside any engine operation.
    pub fn put_device(&self, device: Device) {
        self.tables.lock().devices.insert(device.deveui, device);
    }

    pub fn put_profile(&self, profile: Profile) {
        self.tables.lock().profiles.insert(profile.id.clone(), profile);
    }

    pub fn put_network(&self, network: Network) {
        self.tables.lock().networks.insert(network.name.clone(), network);
    }

    pub fn put_node(&self, node: Node) {
        self.tables.lock().nodes.insert(node.devaddr, node);
    }

    pub fn put_multicast_channel(&self, channel: MulticastChannel) {
        self.tables.lock().multicast.insert(channel.devaddr, channel);
    }

    pub fn add_ignored_node(&self, row: IgnoredNode) {
        self.tables.lock().ignored.push(row);
    }

    pub fn put_pending(&self, pending: Pending) {
        self.tables.lock().pending.insert(pending.devaddr, pending);
    }

    pub fn get_device(&self, deveui: &DevEui) -> Option<Device> {
        self.tables.lock().devices.get(deveui).cloned()
    }

    pub fn get_node(&self, devaddr: &DevAddr) -> Option<Node> {
        self.tables.lock().nodes.get(devaddr).cloned()
    }

    pub fn get_multicast_channel(&self, devaddr: &DevAddr) -> Option<MulticastChannel> {
        self.tables.lock().multicast.get(devaddr).cloned()
    }

    pub fn get_pending(&self, devaddr: &DevAddr) -> Option<Pending> {
        self.tables.lock().pending.get(devaddr).cloned()
    }
}

pub struct MemoryTxn<'a> {
    staged: &'a mut Tables,
}

impl Transaction for MemoryTxn<'_> {
    fn device(&mut self, deveui: &DevEui) -> Result<Option<Device>, Error> {
        Ok(self.staged.devices.get(deveui).cloned())
    }

    fn put_device(&mut self, device: Device) -> Result<(), Error> {
        self.staged.devices.insert(device.deveui, device);
        Ok(())
    }

    fn node(&mut self, devaddr: &DevAddr) -> Result<Option<Node>, Error> {
        Ok(self.staged.nodes.get(devaddr).cloned())
    }

    fn put_node(&mut self, node: Node) -> Result<(), Error> {
        self.staged.nodes.insert(node.devaddr, node);
        Ok(())
    }

    fn node_exists(&mut self, devaddr: &DevAddr) -> Result<bool, Error> {
        Ok(self.staged.nodes.contains_key(devaddr))
    }

    fn profile(&mut self, id: &str) -> Result<Option<Profile>, Error> {
        Ok(self.staged.profiles.get(id).cloned())
    }

    fn network(&mut self, name: &str) -> Result<Option<Network>, Error> {
        Ok(self.staged.networks.get(name).cloned())
    }

    fn networks(&mut self) -> Result<Vec<Network>, Error> {
        Ok(self.staged.networks.values().cloned().collect())
    }

    fn multicast_channel(&mut self, devaddr: &DevAddr) -> Result<Option<MulticastChannel>, Error> {
        Ok(self.staged.multicast.get(devaddr).cloned())
    }

    fn put_multicast_channel(&mut self, channel: MulticastChannel) -> Result<(), Error> {
        self.staged.multicast.insert(channel.devaddr, channel);
        Ok(())
    }

    fn purge_pending(&mut self, devaddr: &DevAddr) -> Result<(), Error> {
        self.staged.pending.remove(devaddr);
        Ok(())
    }
}

impl Store for MemoryStore {
    type Txn<'a>
        = MemoryTxn<'a>
    where
        Self: 'a;

    fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Self::Txn<'_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut guard = self.tables.lock();
        let mut staged = guard.clone();
        let mut txn = MemoryTxn { staged: &mut staged };
        match f(&mut txn) {
            Ok(res) => {
                *guard = staged;
                Ok(res)
            }
            Err(err) => Err(err),
        }
    }

    fn dirty_ignored_nodes(&self) -> Result<Vec<IgnoredNode>, Error> {
        Ok(self.tables.lock().ignored.clone())
    }
}
