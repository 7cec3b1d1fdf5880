//! Downlink encoding for unicast sessions and multicast channels.
//!
//! Both encoders bump the corresponding `fcntdown` inside a transaction
//! before assembling the frame, so every emitted downlink carries a
//! counter value used exactly once per address.

use crate::creator::DataPayloadCreator;
use crate::event::{Event, EventScope};
use crate::keys::{AppSKey, DevAddr, NwkSKey};
use crate::parser::FCtrl;
use crate::store::{Store, Transaction};
use crate::{Error, MacEngine};

/// One downlink handed down by the application layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TxData {
    /// Application port; 0 sends `fopts` as an encrypted MAC-command
    /// payload, `None` sends a bare header (ACK-only).
    pub port: Option<u8>,
    pub data: Vec<u8>,
    pub confirmed: bool,
    /// Sets the FPending bit, telling the device more frames are queued.
    pub pending: bool,
}

impl<S: Store> MacEngine<S> {
    /// Builds a downlink for one device session, advancing its `fcntdown`.
    pub fn encode_unicast(
        &self,
        devaddr: &DevAddr,
        adr: bool,
        ack: bool,
        fopts: &[u8],
        tx: &TxData,
    ) -> Result<Vec<u8>, Error> {
        self.store.transaction(|txn| {
            let mut node = txn.node(devaddr)?.ok_or(Error::UnknownDevAddr(*devaddr))?;
            node.fcntdown = node.fcntdown.wrapping_add(1);
            let fcnt = node.fcntdown;
            let nwkskey = node.nwkskey;
            let appskey = node.appskey;
            txn.put_node(node)?;
            self.encode_frame(devaddr, adr, ack, fcnt, fopts, tx, &nwkskey, &appskey)
        })
    }

    /// Builds a downlink for a multicast channel, advancing its
    /// `fcntdown`. Multicast frames carry no ADR, ACK or FOpts.
    pub fn encode_multicast(&self, devaddr: &DevAddr, tx: &TxData) -> Result<Vec<u8>, Error> {
        self.store.transaction(|txn| {
            let mut channel = txn
                .multicast_channel(devaddr)?
                .ok_or(Error::UnknownDevAddr(*devaddr))?;
            channel.fcntdown = channel.fcntdown.wrapping_add(1);
            let fcnt = channel.fcntdown;
            let nwkskey = channel.nwkskey;
            let appskey = channel.appskey;
            txn.put_multicast_channel(channel)?;
            self.encode_frame(devaddr, false, false, fcnt, &[], tx, &nwkskey, &appskey)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_frame(
        &self,
        devaddr: &DevAddr,
        adr: bool,
        ack: bool,
        fcnt: u32,
        fopts: &[u8],
        tx: &TxData,
        nwkskey: &NwkSKey,
        appskey: &AppSKey,
    ) -> Result<Vec<u8>, Error> {
        let fctrl = ((adr as u8) << 7) | ((ack as u8) << 5) | ((tx.pending as u8) << 4);
        let mut creator = DataPayloadCreator::new();
        creator
            .set_uplink(false)
            .set_confirmed(tx.confirmed)
            .set_dev_addr(devaddr)
            .set_fctrl(&FCtrl::new(fctrl, false))
            .set_fcnt(fcnt);

        match tx.port {
            Some(0) => {
                // MAC commands ride as the payload; application data has
                // no place in this frame
                if !tx.data.is_empty() {
                    self.emit(
                        &EventScope::Node(*devaddr),
                        &Event::DownlinkDataDropped { bytes: tx.data.len() },
                    );
                }
                creator.set_f_port(0);
                creator.build(fopts, &[], nwkskey, appskey)
            }
            Some(port) => {
                creator.set_f_port(port);
                creator.build(&tx.data, fopts, nwkskey, appskey)
            }
            None => {
                if !tx.data.is_empty() {
                    self.emit(
                        &EventScope::Node(*devaddr),
                        &Event::DownlinkDataDropped { bytes: tx.data.len() },
                    );
                }
                creator.build(&[], fopts, nwkskey, appskey)
            }
        }
    }
}
