//! Uplink ingestion: the path from raw gateway bytes to a typed outcome.
//!
//! Join-requests are validated and answered later through
//! [`MacEngine::handle_accept`]; data frames authenticate, advance the
//! frame-counter state machine and decrypt, all inside one store
//! transaction so concurrent gateway deliveries cannot interleave partial
//! counter updates.

use crate::counter::{check_fcnt, FcntDecision};
use crate::event::{Event, EventScope};
use crate::join;
use crate::keys::{DevAddr, DevNonce};
use crate::parser::{self, DataHeader, PhyPayload};
use crate::region;
use crate::store::{Device, LinkQuality, Network, Node, Profile, Store, Transaction};
use crate::{Error, MacEngine};

/// Entries kept in a node's reception-quality history.
const MAX_QS_HISTORY: usize = 50;

/// Reception metadata reported by one gateway that heard the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatewayRx {
    pub mac: [u8; 8],
    pub rssi: i16,
    pub snr: f64,
}

/// A fully decoded data frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub confirmed: bool,
    pub devaddr: DevAddr,
    pub adr: bool,
    pub adr_ack_req: bool,
    pub ack: bool,
    /// Full 32-bit frame counter; for ignored frames the raw 16-bit value.
    pub fcnt: u32,
    pub fport: Option<u8>,
    /// MAC commands, piggybacked or transported as a port-0 payload.
    pub fopts: Vec<u8>,
    /// Decrypted application payload.
    pub data: Vec<u8>,
}

/// A validated join-request waiting for [`MacEngine::handle_accept`].
#[derive(Debug, Clone, PartialEq)]
pub struct JoinContext {
    pub network: Network,
    pub profile: Profile,
    pub device: Device,
    pub devaddr: DevAddr,
    pub dev_nonce: DevNonce,
}

/// Outcome of [`MacEngine::ingest_frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// The frame is not for this server, or joining is disabled.
    Ignore(Option<Frame>),
    /// A valid join-request; the caller decides when to answer it.
    Join(JoinContext),
    /// A fresh uplink; counter state has been advanced.
    Uplink(Frame),
    /// A repeated counter value; state was left untouched and every
    /// gateway delivery observes the same outcome.
    Retransmit(Frame),
}

impl<S: Store> MacEngine<S> {
    /// Parses one PHY payload and runs it through the join or data path.
    ///
    /// Equal frames arriving through several gateways may be ingested
    /// concurrently; deduplication of the resulting outcomes is the
    /// caller's concern.
    pub fn ingest_frame(&self, phy_payload: &[u8], gateways: &[GatewayRx]) -> Result<Ingest, Error> {
        match parser::parse(phy_payload.to_vec())? {
            PhyPayload::JoinRequest(request) => self.ingest_join(request),
            PhyPayload::Data(data) if data.is_uplink() => self.ingest_data(data, gateways),
            _ => Err(Error::BadFrame),
        }
    }

    fn ingest_join(&self, request: parser::JoinRequestPayload<Vec<u8>>) -> Result<Ingest, Error> {
        let dev_eui = request.dev_eui();
        let app_eui = request.app_eui();
        let dev_nonce = request.dev_nonce();

        self.store.transaction(|txn| {
            let device = txn.device(&dev_eui)?.ok_or(Error::UnknownDevEui(dev_eui))?;
            if let Some(expected) = device.appeui {
                if expected != app_eui {
                    return Err(Error::BadAppEui(dev_eui));
                }
            }
            if !request.validate_mic(device.appkey.inner()) {
                return Err(Error::BadMic);
            }
            let profile = txn
                .profile(&device.profile)?
                .ok_or_else(|| Error::UnknownProfile(device.profile.clone()))?;
            let network = txn
                .network(&profile.network)?
                .ok_or_else(|| Error::UnknownNetwork(profile.network.clone()))?;
            if !profile.can_join {
                return Ok(Ingest::Ignore(None));
            }
            let devaddr = join::allocate_devaddr(txn, &network, &device, &self.rng)?;
            Ok(Ingest::Join(JoinContext { network, profile, device, devaddr, dev_nonce }))
        })
    }

    fn ingest_data(
        &self,
        payload: parser::EncryptedDataPayload<Vec<u8>>,
        gateways: &[GatewayRx],
    ) -> Result<Ingest, Error> {
        let devaddr = payload.fhdr().dev_addr();

        // The ignored-node scan runs on dirty reads, before any lock is
        // taken; ignored traffic must not cost a transaction.
        for row in self.store.dirty_ignored_nodes()? {
            if row.matches(&devaddr) {
                return Ok(Ingest::Ignore(Some(raw_frame(&payload))));
            }
        }

        self.store.transaction(|txn| {
            let node = match txn.node(&devaddr)? {
                Some(node) => node,
                None => {
                    // an address inside a served prefix is a configuration
                    // problem; anything else is foreign traffic
                    let local = txn.networks()?.iter().any(|n| n.matches(&devaddr));
                    return Err(if local {
                        Error::UnknownDevAddr(devaddr)
                    } else {
                        Error::IgnoredNode
                    });
                }
            };
            let profile = txn
                .profile(&node.profile)?
                .ok_or_else(|| Error::UnknownProfile(node.profile.clone()))?;

            let fcnt16 = payload.fhdr().fcnt();
            let decision = check_fcnt(
                profile.fcnt_check,
                self.config.max_lost_after_reset,
                node.fcntup,
                fcnt16,
            );
            let fcntup = match decision {
                FcntDecision::GapTooLarge => {
                    return Err(Error::FcntGapTooLarge {
                        fcnt: u32::from(fcnt16),
                        last_rx: node.last_rx,
                    })
                }
                FcntDecision::Uplink { fcntup, .. } | FcntDecision::Reset { fcntup } => fcntup,
                FcntDecision::Retransmit => node.fcntup.unwrap_or(0),
            };

            if !payload.validate_mic(node.nwkskey.inner(), fcntup) {
                return Err(Error::BadMic);
            }
            let frame = decrypt_frame(payload, &node, fcntup)?;

            match decision {
                FcntDecision::Retransmit => Ok(Ingest::Retransmit(frame)),
                FcntDecision::Reset { fcntup } => {
                    let network = txn
                        .network(&profile.network)?
                        .ok_or_else(|| Error::UnknownNetwork(profile.network.clone()))?;
                    txn.purge_pending(&devaddr)?;
                    let mut node = node;
                    node.fcntup = Some(fcntup);
                    node.fcntdown = 0;
                    node.adr_use = region::default_adr(network.region);
                    node.rxwin_use = region::default_rxwin(network.region);
                    node.last_reset = Some(self.now());
                    node.devstat_fcnt = None;
                    node.last_qs = Vec::new();
                    self.emit(&EventScope::Node(devaddr), &Event::FcntReset { fcnt: fcntup });
                    self.record_rx(&mut node, gateways);
                    txn.put_node(node)?;
                    Ok(Ingest::Uplink(frame))
                }
                FcntDecision::Uplink { fcntup, missed } => {
                    if let Some(missed) = missed {
                        self.emit(&EventScope::Node(devaddr), &Event::UplinksMissed { missed });
                    }
                    let mut node = node;
                    node.fcntup = Some(fcntup);
                    self.record_rx(&mut node, gateways);
                    txn.put_node(node)?;
                    Ok(Ingest::Uplink(frame))
                }
                FcntDecision::GapTooLarge => unreachable!("rejected above"),
            }
        })
    }

    fn record_rx(&self, node: &mut Node, gateways: &[GatewayRx]) {
        node.last_rx = Some(self.now());
        node.last_gateways = gateways.iter().map(|g| g.mac).collect();
        for gateway in gateways {
            node.last_qs.insert(0, LinkQuality { rssi: gateway.rssi, snr: gateway.snr });
        }
        node.last_qs.truncate(MAX_QS_HISTORY);
    }
}

/// Decodes an ignored frame without keys: header fields plus the still
/// encrypted payload bytes.
fn raw_frame(payload: &parser::EncryptedDataPayload<Vec<u8>>) -> Frame {
    let fhdr = payload.fhdr();
    let fctrl = fhdr.fctrl();
    let bytes = payload.as_data_bytes();
    let body_start = 1 + payload.fhdr_length() + 1;
    let data = if payload.f_port().is_some() {
        bytes[body_start..bytes.len() - 4].to_vec()
    } else {
        Vec::new()
    };
    Frame {
        confirmed: payload.is_confirmed(),
        devaddr: fhdr.dev_addr(),
        adr: fctrl.adr(),
        adr_ack_req: fctrl.adr_ack_req(),
        ack: fctrl.ack(),
        fcnt: u32::from(fhdr.fcnt()),
        fport: payload.f_port(),
        fopts: fhdr.fopts().to_vec(),
        data,
    }
}

/// Decrypts the frame body according to its port. MAC commands transported
/// as a port-0 payload surface in `fopts`.
fn decrypt_frame(
    payload: parser::EncryptedDataPayload<Vec<u8>>,
    node: &Node,
    fcnt: u32,
) -> Result<Frame, Error> {
    let confirmed = payload.is_confirmed();
    let fport = payload.f_port();
    let fhdr = payload.fhdr();
    let fctrl = fhdr.fctrl();
    let devaddr = fhdr.dev_addr();
    let adr = fctrl.adr();
    let adr_ack_req = fctrl.adr_ack_req();
    let ack = fctrl.ack();
    let fopts_raw = fhdr.fopts().to_vec();

    if fport == Some(0) && !fopts_raw.is_empty() {
        return Err(Error::DoubleFopts);
    }

    let decrypted = payload.decrypt(Some(&node.nwkskey), Some(&node.appskey), fcnt)?;
    let (fopts, data) = match fport {
        Some(0) => (decrypted.frm_payload().to_vec(), Vec::new()),
        Some(_) => (fopts_raw, decrypted.frm_payload().to_vec()),
        None => (fopts_raw, Vec::new()),
    };

    Ok(Frame { confirmed, devaddr, adr, adr_ack_req, ack, fcnt, fport, fopts, data })
}
