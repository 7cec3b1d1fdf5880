//! Join handling: address allocation and the join-accept answer.

use parking_lot::Mutex;
use rand::RngCore;

use crate::creator::JoinAcceptCreator;
use crate::crypto;
use crate::event::{Event, EventScope};
use crate::ingest::{GatewayRx, JoinContext};
use crate::keys::{AppNonce, DevAddr};
use crate::region;
use crate::store::{Device, Network, Node, Store, SubId, Transaction};
use crate::{Error, MacEngine};

/// RX1 delay announced in every join-accept, in seconds.
const JOIN_RX_DELAY: u8 = 1;

/// Random candidates tried before giving up on a free address.
const DEVADDR_ATTEMPTS: usize = 3;

/// Picks an address for a joining device: the previously assigned one when
/// there is any, otherwise `<NwkID:7, SubID bits, random bits>` avoiding
/// collisions with existing sessions.
pub(crate) fn allocate_devaddr(
    txn: &mut impl Transaction,
    network: &Network,
    device: &Device,
    rng: &Mutex<Box<dyn RngCore + Send>>,
) -> Result<DevAddr, Error> {
    if let Some(devaddr) = device.node {
        return Ok(devaddr);
    }

    let (sub_value, sub_len) = match network.subid {
        Some(SubId { value, len }) => (value, u32::from(len.min(25))),
        None => (0, 0),
    };
    let random_bits = 25 - sub_len;
    let prefix = (u32::from(network.nwk_id()) << 25) | (sub_value << random_bits);

    for _ in 0..DEVADDR_ATTEMPTS {
        let suffix = if random_bits == 0 {
            0
        } else {
            rng.lock().next_u32() & ((1u32 << random_bits) - 1)
        };
        let candidate = DevAddr::from(prefix | suffix);
        if !txn.node_exists(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(Error::DevAddrExhausted)
}

impl<S: Store> MacEngine<S> {
    /// Answers a validated join-request: derives the session keys, rewrites
    /// the device and node records, purges queued downlinks and returns the
    /// encrypted join-accept payload.
    ///
    /// `gateways` are the receptions of the join-request; they become the
    /// node's gateway set until the first uplink.
    pub fn handle_accept(
        &self,
        context: &JoinContext,
        gateways: &[GatewayRx],
    ) -> Result<Vec<u8>, Error> {
        let JoinContext { network, device, devaddr, dev_nonce, .. } = context;

        let mut app_nonce_bytes = [0u8; 3];
        self.rng.lock().fill_bytes(&mut app_nonce_bytes);
        let app_nonce = AppNonce::new(app_nonce_bytes);

        let appkey = device.appkey;
        let nwkskey =
            crypto::derive_session_key(0x01, appkey.inner(), &app_nonce, &network.netid, dev_nonce)
                .into();
        let appskey =
            crypto::derive_session_key(0x02, appkey.inner(), &app_nonce, &network.netid, dev_nonce)
                .into();
        let now = self.now();

        self.store.transaction(|txn| {
            let mut device = txn
                .device(&device.deveui)?
                .ok_or(Error::UnknownDevEui(device.deveui))?;
            device.node = Some(*devaddr);
            device.last_join = Some(now);

            let prior = txn.node(devaddr)?;
            let (first_reset, reset_count, devstat) = match &prior {
                // the previous session never carried an uplink: the device
                // is rebooting in a loop
                Some(prev) if prev.last_rx.is_none() => {
                    let count = prev.reset_count.saturating_add(1);
                    self.emit(&EventScope::Node(*devaddr), &Event::RepeatedReset { count });
                    (prev.first_reset, count, prev.devstat.clone())
                }
                Some(prev) => (Some(now), 0, prev.devstat.clone()),
                None => (Some(now), 0, Vec::new()),
            };

            let rxwin_use = region::default_rxwin(network.region);
            let node = Node {
                devaddr: *devaddr,
                profile: device.profile.clone(),
                nwkskey,
                appskey,
                fcntup: None,
                fcntdown: 0,
                adr_use: region::default_adr(network.region),
                rxwin_use,
                first_reset,
                last_reset: Some(now),
                reset_count,
                last_rx: None,
                last_gateways: gateways.iter().map(|g| g.mac).collect(),
                devstat,
                devstat_fcnt: None,
                last_qs: Vec::new(),
                adr_flag: false,
                adr_set: None,
                adr_failed: Vec::new(),
                rxwin_failed: Vec::new(),
                appargs: device.appargs.clone(),
            };

            txn.purge_pending(devaddr)?;
            txn.put_node(node)?;
            txn.put_device(device)?;
            self.emit(&EventScope::Device(context.device.deveui), &Event::Joined { devaddr: *devaddr });

            let mut accept = JoinAcceptCreator::new();
            accept
                .set_app_nonce(&app_nonce)
                .set_net_id(network.netid)
                .set_dev_addr(devaddr)
                .set_dl_settings(rxwin_use.rx1_dr_offset, rxwin_use.rx2_dr)
                .set_rx_delay(JOIN_RX_DELAY);
            Ok(accept.build(appkey.inner()))
        })
    }
}
