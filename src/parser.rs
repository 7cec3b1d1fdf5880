// Copyright (c) 2017,2018,2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Types and methods for parsing LoRaWAN PHY payloads.
//!
//! The wrappers keep the raw frame bytes and expose typed accessors;
//! decryption reuses the underlying buffer. EUIs and device addresses are
//! returned in canonical order, reversed from their wire representation.

use crate::crypto;
use crate::keys::{AppEui, AppNonce, AppSKey, DevAddr, DevEui, DevNonce, NwkSKey, AES128, MIC};
use crate::Error;

/// PhyPayload represents a physical LoRaWAN payload: a join-request, a
/// join-accept or a data frame.
#[derive(Debug, PartialEq, Eq)]
pub enum PhyPayload<T> {
    JoinRequest(JoinRequestPayload<T>),
    JoinAccept(EncryptedJoinAcceptPayload<T>),
    Data(EncryptedDataPayload<T>),
}

/// Trait for types wrapping a complete PHY payload.
pub trait AsPhyPayloadBytes {
    fn as_bytes(&self) -> &[u8];

    /// The MIC carried in the last four bytes of the payload.
    fn mic(&self) -> MIC {
        let data = self.as_bytes();
        let len = data.len();
        MIC([data[len - 4], data[len - 3], data[len - 2], data[len - 1]])
    }

    fn mhdr(&self) -> MHDR {
        MHDR(self.as_bytes()[0])
    }
}

/// Parses a payload as a LoRaWAN physical payload.
pub fn parse<T: AsRef<[u8]> + AsMut<[u8]>>(data: T) -> Result<PhyPayload<T>, Error> {
    let bytes = data.as_ref();
    if bytes.len() < 5 {
        return Err(Error::BadFrame);
    }
    let mhdr = MHDR(bytes[0]);
    if mhdr.major() != Major::LoRaWANR1 {
        return Err(Error::BadFrame);
    }
    match mhdr.mtype() {
        MType::JoinRequest => Ok(PhyPayload::JoinRequest(JoinRequestPayload::new(data)?)),
        MType::JoinAccept => Ok(PhyPayload::JoinAccept(EncryptedJoinAcceptPayload::new(data)?)),
        MType::UnconfirmedDataUp
        | MType::ConfirmedDataUp
        | MType::UnconfirmedDataDown
        | MType::ConfirmedDataDown => Ok(PhyPayload::Data(EncryptedDataPayload::new(data)?)),
        _ => Err(Error::BadFrame),
    }
}

/// MHDR represents the LoRaWAN MAC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MHDR(pub u8);

impl MHDR {
    pub fn mtype(&self) -> MType {
        match self.0 >> 5 {
            0 => MType::JoinRequest,
            1 => MType::JoinAccept,
            2 => MType::UnconfirmedDataUp,
            3 => MType::UnconfirmedDataDown,
            4 => MType::ConfirmedDataUp,
            5 => MType::ConfirmedDataDown,
            6 => MType::RFU,
            _ => MType::Proprietary,
        }
    }

    pub fn major(&self) -> Major {
        if self.0 & 0x03 == 0 {
            Major::LoRaWANR1
        } else {
            Major::RFU
        }
    }
}

impl From<u8> for MHDR {
    fn from(v: u8) -> Self {
        MHDR(v)
    }
}

/// MType gives the message type carried by the PhyPayload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MType {
    JoinRequest,
    JoinAccept,
    UnconfirmedDataUp,
    UnconfirmedDataDown,
    ConfirmedDataUp,
    ConfirmedDataDown,
    RFU,
    Proprietary,
}

/// Major gives the supported payload format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Major {
    LoRaWANR1,
    RFU,
}

/// JoinRequestPayload represents a join-request.
#[derive(Debug, PartialEq, Eq)]
pub struct JoinRequestPayload<T>(T);

impl<T: AsRef<[u8]>> AsPhyPayloadBytes for JoinRequestPayload<T> {
    fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<T: AsRef<[u8]>> JoinRequestPayload<T> {
    pub fn new(data: T) -> Result<Self, Error> {
        let bytes = data.as_ref();
        if bytes.len() != 23 || MHDR(bytes[0]).mtype() != MType::JoinRequest {
            return Err(Error::BadFrame);
        }
        Ok(Self(data))
    }

    /// The AppEUI in canonical order.
    pub fn app_eui(&self) -> AppEui {
        AppEui::from_wire(&self.0.as_ref()[1..9]).unwrap()
    }

    /// The DevEUI in canonical order.
    pub fn dev_eui(&self) -> DevEui {
        DevEui::from_wire(&self.0.as_ref()[9..17]).unwrap()
    }

    /// The device nonce, in wire order.
    pub fn dev_nonce(&self) -> DevNonce {
        let d = self.0.as_ref();
        DevNonce::new([d[17], d[18]])
    }

    /// Verifies that the join-request carries a correct MIC.
    pub fn validate_mic(&self, key: &AES128) -> bool {
        let d = self.0.as_ref();
        self.mic() == crypto::frame_mic(key, &d[..d.len() - 4])
    }
}

/// EncryptedJoinAcceptPayload represents an encrypted join-accept.
#[derive(Debug, PartialEq, Eq)]
pub struct EncryptedJoinAcceptPayload<T>(T);

impl<T: AsRef<[u8]>> AsPhyPayloadBytes for EncryptedJoinAcceptPayload<T> {
    fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> EncryptedJoinAcceptPayload<T> {
    pub fn new(data: T) -> Result<Self, Error> {
        let bytes = data.as_ref();
        if (bytes.len() != 17 && bytes.len() != 33) || MHDR(bytes[0]).mtype() != MType::JoinAccept
        {
            return Err(Error::BadFrame);
        }
        Ok(Self(data))
    }

    /// Decrypts the join-accept in place, producing the decrypted payload.
    /// The MIC is not verified.
    pub fn decrypt(mut self, key: &AES128) -> DecryptedJoinAcceptPayload<T> {
        crypto::decrypt_join_accept(key, self.0.as_mut());
        DecryptedJoinAcceptPayload(self.0)
    }
}

/// DecryptedJoinAcceptPayload represents a decrypted join-accept.
#[derive(Debug, PartialEq, Eq)]
pub struct DecryptedJoinAcceptPayload<T>(T);

impl<T: AsRef<[u8]>> AsPhyPayloadBytes for DecryptedJoinAcceptPayload<T> {
    fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<T: AsRef<[u8]>> DecryptedJoinAcceptPayload<T> {
    /// Verifies that the decrypted join-accept carries a correct MIC.
    pub fn validate_mic(&self, key: &AES128) -> bool {
        let d = self.0.as_ref();
        self.mic() == crypto::frame_mic(key, &d[..d.len() - 4])
    }

    pub fn app_nonce(&self) -> AppNonce {
        let d = self.0.as_ref();
        AppNonce::new([d[1], d[2], d[3]])
    }

    pub fn net_id(&self) -> [u8; 3] {
        let d = self.0.as_ref();
        [d[4], d[5], d[6]]
    }

    /// The assigned device address in canonical order.
    pub fn dev_addr(&self) -> DevAddr {
        DevAddr::from_wire(&self.0.as_ref()[7..11]).unwrap()
    }

    pub fn dl_settings(&self) -> DLSettings {
        DLSettings(self.0.as_ref()[11])
    }

    pub fn rx_delay(&self) -> u8 {
        self.0.as_ref()[12] & 0x0f
    }

    /// Computes the network session key for this join exchange.
    pub fn derive_nwkskey(&self, dev_nonce: &DevNonce, key: &AES128) -> NwkSKey {
        crypto::derive_session_key(0x01, key, &self.app_nonce(), &self.net_id(), dev_nonce).into()
    }

    /// Computes the application session key for this join exchange.
    pub fn derive_appskey(&self, dev_nonce: &DevNonce, key: &AES128) -> AppSKey {
        crypto::derive_session_key(0x02, key, &self.app_nonce(), &self.net_id(), dev_nonce).into()
    }
}

/// DLSettings carried by a join-accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DLSettings(pub u8);

impl DLSettings {
    pub fn rx1_dr_offset(&self) -> u8 {
        (self.0 >> 4) & 0x07
    }

    pub fn rx2_data_rate(&self) -> u8 {
        self.0 & 0x0f
    }
}

fn fhdr_length(fctrl: u8) -> usize {
    7 + (fctrl & 0x0f) as usize
}

/// Helper trait for the shared header accessors of encrypted and decrypted
/// data payloads.
pub trait DataHeader {
    fn as_data_bytes(&self) -> &[u8];

    fn fhdr(&self) -> FHDR<'_> {
        FHDR(&self.as_data_bytes()[1..1 + self.fhdr_length()], self.is_uplink())
    }

    fn is_confirmed(&self) -> bool {
        let mtype = MHDR(self.as_data_bytes()[0]).mtype();
        mtype == MType::ConfirmedDataUp || mtype == MType::ConfirmedDataDown
    }

    fn is_uplink(&self) -> bool {
        let mtype = MHDR(self.as_data_bytes()[0]).mtype();
        mtype == MType::UnconfirmedDataUp || mtype == MType::ConfirmedDataUp
    }

    /// The FPort of the payload, if one is present.
    fn f_port(&self) -> Option<u8> {
        let fhdr_length = self.fhdr_length();
        let data = self.as_data_bytes();
        if fhdr_length + 1 >= data.len() - 5 {
            return None;
        }
        Some(data[1 + fhdr_length])
    }

    fn fhdr_length(&self) -> usize {
        fhdr_length(self.as_data_bytes()[5])
    }
}

impl<T: DataHeader> AsPhyPayloadBytes for T {
    fn as_bytes(&self) -> &[u8] {
        self.as_data_bytes()
    }
}

/// FHDR of a data payload.
#[derive(Debug, PartialEq, Eq)]
pub struct FHDR<'a>(&'a [u8], bool);

impl<'a> FHDR<'a> {
    /// The device address in canonical order.
    pub fn dev_addr(&self) -> DevAddr {
        DevAddr::from_wire(&self.0[0..4]).unwrap()
    }

    pub fn fctrl(&self) -> FCtrl {
        FCtrl(self.0[4], self.1)
    }

    /// The truncated 16-bit frame counter.
    pub fn fcnt(&self) -> u16 {
        u16::from(self.0[5]) | (u16::from(self.0[6]) << 8)
    }

    /// The raw piggybacked MAC-command bytes.
    pub fn fopts(&self) -> &'a [u8] {
        let f_opts_len = (self.0[4] & 0x0f) as usize;
        &self.0[7..7 + f_opts_len]
    }
}

/// FCtrl of a data payload; the second field tells uplink from downlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FCtrl(pub u8, pub bool);

impl FCtrl {
    pub fn new(byte: u8, uplink: bool) -> FCtrl {
        FCtrl(byte, uplink)
    }

    pub fn adr(&self) -> bool {
        self.0 >> 7 == 1
    }

    /// Set on uplinks requesting an ADR acknowledgement.
    pub fn adr_ack_req(&self) -> bool {
        self.1 && self.0 & (1 << 6) != 0
    }

    pub fn ack(&self) -> bool {
        self.0 & (1 << 5) != 0
    }

    /// Set on downlinks when more frames are queued.
    pub fn f_pending(&self) -> bool {
        !self.1 && self.0 & (1 << 4) != 0
    }

    pub fn f_opts_len(&self) -> u8 {
        self.0 & 0x0f
    }

    pub fn raw_value(&self) -> u8 {
        self.0
    }
}

/// EncryptedDataPayload represents an encrypted data frame.
#[derive(Debug, PartialEq, Eq)]
pub struct EncryptedDataPayload<T>(T);

impl<T: AsRef<[u8]>> DataHeader for EncryptedDataPayload<T> {
    fn as_data_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<T: AsRef<[u8]>> EncryptedDataPayload<T> {
    pub fn new(data: T) -> Result<Self, Error> {
        let bytes = data.as_ref();
        // the smallest frame is MHDR + bare FHDR + MIC
        if bytes.len() < 12 || 1 + fhdr_length(bytes[5]) + 4 > bytes.len() {
            return Err(Error::BadFrame);
        }
        if !matches!(
            MHDR(bytes[0]).mtype(),
            MType::ConfirmedDataUp
                | MType::ConfirmedDataDown
                | MType::UnconfirmedDataUp
                | MType::UnconfirmedDataDown
        ) {
            return Err(Error::BadFrame);
        }
        Ok(Self(data))
    }

    /// Verifies the MIC against the full 32-bit frame counter.
    pub fn validate_mic(&self, key: &AES128, fcnt: u32) -> bool {
        let d = self.0.as_ref();
        self.mic() == crypto::data_mic(key, &d[..d.len() - 4], fcnt)
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> EncryptedDataPayload<T> {
    /// Decrypts the FRMPayload in place. The MIC is not verified.
    ///
    /// MAC commands transported on port 0 (or on frames without a port) use
    /// the network session key, application payloads the application
    /// session key; the key that is not needed may be `None`.
    pub fn decrypt(
        mut self,
        nwk_skey: Option<&NwkSKey>,
        app_skey: Option<&AppSKey>,
        fcnt: u32,
    ) -> Result<DecryptedDataPayload<T>, Error> {
        let fhdr_length = self.fhdr_length();
        let dev_addr = self.fhdr().dev_addr();
        let dir = if self.is_uplink() { crypto::DIR_UP } else { crypto::DIR_DOWN };
        let key = match self.f_port() {
            Some(port) if port != 0 => app_skey.map(|k| *k.inner()),
            _ => nwk_skey.map(|k| *k.inner()),
        }
        .ok_or(Error::BadFrame)?;

        let data = self.0.as_mut();
        let len = data.len();
        let start = 1 + fhdr_length + 1;
        let end = len - 4;
        if start < end {
            let plain = crypto::cipher(&data[start..end], &key, dir, &dev_addr, fcnt);
            data[start..end].copy_from_slice(&plain);
        }
        Ok(DecryptedDataPayload(self.0))
    }
}

/// DecryptedDataPayload represents a decrypted data frame.
#[derive(Debug, PartialEq, Eq)]
pub struct DecryptedDataPayload<T>(T);

impl<T: AsRef<[u8]>> DataHeader for DecryptedDataPayload<T> {
    fn as_data_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<T: AsRef<[u8]>> DecryptedDataPayload<T> {
    /// The decrypted FRMPayload; empty when the frame carries none.
    pub fn frm_payload(&self) -> &[u8] {
        let data = self.as_data_bytes();
        let fhdr_length = self.fhdr_length();
        if data.len() < fhdr_length + 6 {
            &[]
        } else {
            &data[1 + fhdr_length + 1..data.len() - 4]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mhdr_mtype() {
        let examples = [
            (0x00, MType::JoinRequest),
            (0x20, MType::JoinAccept),
            (0x40, MType::UnconfirmedDataUp),
            (0x60, MType::UnconfirmedDataDown),
            (0x80, MType::ConfirmedDataUp),
            (0xa0, MType::ConfirmedDataDown),
            (0xc0, MType::RFU),
            (0xe0, MType::Proprietary),
        ];
        for (byte, expected) in examples {
            assert_eq!(MHDR(byte).mtype(), expected);
        }
    }

    #[test]
    fn test_parse_too_short_payload() {
        assert_eq!(parse([0x40, 0x04, 0x03, 0x02]), Err(Error::BadFrame));
        assert_eq!(parse([]), Err(Error::BadFrame));
    }

    #[test]
    fn test_parse_unsupported_major() {
        let data = [0x41, 0x04, 0x03, 0x02, 0x01, 0x00, 0x01, 0x00, 0x01, 0x02, 0x03, 0x04];
        assert_eq!(parse(data), Err(Error::BadFrame));
    }

    #[test]
    fn test_fopts_must_fit_before_mic() {
        // FOptsLen of 5 with no room for it
        let data = [0x40, 0x04, 0x03, 0x02, 0x01, 0x85, 0x01, 0x00, 0xd6, 0xc3, 0xb5, 0x82];
        assert_eq!(EncryptedDataPayload::new(data).err(), Some(Error::BadFrame));
    }

    #[test]
    fn test_f_port_absent_on_bare_fhdr() {
        let data = [0x80, 0x04, 0x03, 0x02, 0x01, 0x00, 0xff, 0x04, 0x01, 0x02, 0x03, 0x04];
        let payload = EncryptedDataPayload::new(data).unwrap();
        assert!(payload.f_port().is_none());
    }

    #[test]
    fn test_fctrl_accessors() {
        let uplink = FCtrl::new(0xff, true);
        assert!(uplink.adr());
        assert!(uplink.adr_ack_req());
        assert!(uplink.ack());
        assert!(!uplink.f_pending());
        assert_eq!(uplink.f_opts_len(), 15);

        let downlink = FCtrl::new(0xff, false);
        assert!(!downlink.adr_ack_req());
        assert!(downlink.f_pending());
    }
}
