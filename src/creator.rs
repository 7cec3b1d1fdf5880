// Copyright (c) 2017-2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Types and methods for creating LoRaWAN payloads.

use crate::codec;
use crate::crypto;
use crate::keys::{AppEui, AppNonce, AppSKey, DevAddr, DevEui, DevNonce, NwkSKey, AES128};
use crate::parser::FCtrl;
use crate::Error;

/// JoinAcceptCreator builds the binary representation of a join-accept
/// physical payload.
pub struct JoinAcceptCreator {
    data: [u8; 17],
}

impl JoinAcceptCreator {
    /// Creates a well initialized JoinAcceptCreator.
    pub fn new() -> Self {
        let mut data = [0u8; 17];
        data[0] = 0x20;
        Self { data }
    }

    pub fn set_app_nonce(&mut self, app_nonce: &AppNonce) -> &mut Self {
        self.data[1..4].copy_from_slice(app_nonce.as_ref());
        self
    }

    pub fn set_net_id(&mut self, net_id: [u8; 3]) -> &mut Self {
        self.data[4..7].copy_from_slice(&net_id);
        self
    }

    /// Sets the assigned device address; written to the frame in wire
    /// order.
    pub fn set_dev_addr(&mut self, dev_addr: &DevAddr) -> &mut Self {
        self.data[7..11].copy_from_slice(&dev_addr.to_wire());
        self
    }

    pub fn set_dl_settings(&mut self, rx1_dr_offset: u8, rx2_dr: u8) -> &mut Self {
        self.data[11] = ((rx1_dr_offset & 0x07) << 4) | (rx2_dr & 0x0f);
        self
    }

    pub fn set_rx_delay(&mut self, rx_delay: u8) -> &mut Self {
        self.data[12] = rx_delay;
        self
    }

    /// Provides the encrypted join-accept physical payload with the MIC
    /// set.
    pub fn build(&self, key: &AES128) -> Vec<u8> {
        let mut frame = self.data.to_vec();
        let mic = crypto::frame_mic(key, &frame[..13]);
        frame[13..17].copy_from_slice(&mic.0);
        let padded = codec::padded(16, &frame[1..]);
        frame.truncate(1);
        frame.extend_from_slice(&padded);
        crypto::encrypt_join_accept(key, &mut frame);
        frame
    }
}

impl Default for JoinAcceptCreator {
    fn default() -> Self {
        Self::new()
    }
}

/// JoinRequestCreator builds the binary representation of a join-request
/// physical payload. The server only consumes join-requests; the creator
/// exists for tooling and tests playing the device role.
pub struct JoinRequestCreator {
    data: [u8; 23],
}

impl JoinRequestCreator {
    pub fn new() -> Self {
        Self { data: [0u8; 23] }
    }

    pub fn set_app_eui(&mut self, app_eui: &AppEui) -> &mut Self {
        self.data[1..9].copy_from_slice(&app_eui.to_wire());
        self
    }

    pub fn set_dev_eui(&mut self, dev_eui: &DevEui) -> &mut Self {
        self.data[9..17].copy_from_slice(&dev_eui.to_wire());
        self
    }

    pub fn set_dev_nonce(&mut self, dev_nonce: &DevNonce) -> &mut Self {
        self.data[17..19].copy_from_slice(dev_nonce.as_ref());
        self
    }

    /// Provides the join-request physical payload with the MIC set.
    pub fn build(&self, key: &AES128) -> Vec<u8> {
        let mut frame = self.data.to_vec();
        let mic = crypto::frame_mic(key, &frame[..19]);
        frame[19..23].copy_from_slice(&mic.0);
        frame
    }
}

impl Default for JoinRequestCreator {
    fn default() -> Self {
        Self::new()
    }
}

/// DataPayloadCreator builds the binary representation of data-up and
/// data-down physical payloads.
///
/// By default the frame is an unconfirmed data up.
pub struct DataPayloadCreator {
    data: [u8; 256],
    data_f_port: Option<u8>,
    fcnt: u32,
}

impl DataPayloadCreator {
    pub fn new() -> Self {
        let mut data = [0u8; 256];
        data[0] = 0x40;
        Self { data, data_f_port: None, fcnt: 0 }
    }

    pub fn set_uplink(&mut self, uplink: bool) -> &mut Self {
        if uplink {
            self.data[0] &= 0xdf;
        } else {
            self.data[0] |= 0x20;
        }
        self
    }

    pub fn set_confirmed(&mut self, confirmed: bool) -> &mut Self {
        if confirmed {
            self.data[0] &= 0xbf;
            self.data[0] |= 0x80;
        } else {
            self.data[0] &= 0x7f;
            self.data[0] |= 0x40;
        }
        self
    }

    /// Sets the device address; written to the frame in wire order.
    pub fn set_dev_addr(&mut self, dev_addr: &DevAddr) -> &mut Self {
        self.data[1..5].copy_from_slice(&dev_addr.to_wire());
        self
    }

    pub fn set_fctrl(&mut self, fctrl: &FCtrl) -> &mut Self {
        self.data[5] = fctrl.raw_value();
        self
    }

    /// Sets the frame counter; the header carries its low 16 bits, the MIC
    /// and cipher consume the full value.
    pub fn set_fcnt(&mut self, fcnt: u32) -> &mut Self {
        self.fcnt = fcnt;
        self.data[6] = (fcnt & 0xff) as u8;
        self.data[7] = ((fcnt >> 8) & 0xff) as u8;
        self
    }

    pub fn set_f_port(&mut self, f_port: u8) -> &mut Self {
        self.data_f_port = Some(f_port);
        self
    }

    /// Assembles the physical payload: FOpts piggybacked in the header,
    /// FRMPayload encrypted, MIC set.
    ///
    /// Port-0 frames transport MAC commands as their payload, encrypted
    /// with the network session key; they cannot also carry piggybacked
    /// FOpts.
    pub fn build(
        &mut self,
        payload: &[u8],
        fopts: &[u8],
        nwk_skey: &NwkSKey,
        app_skey: &AppSKey,
    ) -> Result<Vec<u8>, Error> {
        let has_fport = self.data_f_port.is_some();
        let has_fport_zero = self.data_f_port == Some(0);

        if fopts.len() > 15 {
            return Err(Error::BadFrame);
        }
        if has_fport_zero && !fopts.is_empty() {
            return Err(Error::DoubleFopts);
        }
        if !has_fport && !payload.is_empty() {
            return Err(Error::BadFrame);
        }

        let mut last_filled = 8; // MHDR + FHDR without the FOpts
        self.data[5] = (self.data[5] & 0xf0) | (fopts.len() as u8 & 0x0f);
        self.data[last_filled..last_filled + fopts.len()].copy_from_slice(fopts);
        last_filled += fopts.len();

        if let Some(port) = self.data_f_port {
            self.data[last_filled] = port;
            last_filled += 1;
        }

        if last_filled + payload.len() + 4 > self.data.len() {
            return Err(Error::BadFrame);
        }
        self.data[last_filled..last_filled + payload.len()].copy_from_slice(payload);

        let enc_key = if has_fport_zero { nwk_skey.inner() } else { app_skey.inner() };
        let dir = (self.data[0] & 0x20) >> 5;
        let dev_addr = DevAddr::from_wire(&self.data[1..5]).unwrap();
        let encrypted =
            crypto::cipher(&self.data[last_filled..last_filled + payload.len()],
                           enc_key, dir, &dev_addr, self.fcnt);
        self.data[last_filled..last_filled + payload.len()].copy_from_slice(&encrypted);

        let msg_len = last_filled + payload.len();
        let mic = crypto::data_mic(nwk_skey.inner(), &self.data[..msg_len], self.fcnt);
        self.data[msg_len..msg_len + 4].copy_from_slice(&mic.0);

        Ok(self.data[..msg_len + 4].to_vec())
    }
}

impl Default for DataPayloadCreator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_key() -> AES128 {
        AES128([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ])
    }

    #[test]
    fn test_join_accept_creator() {
        let mut phy = JoinAcceptCreator::new();
        phy.set_app_nonce(&AppNonce::new([0xc7, 0x0b, 0x57]))
            .set_net_id([0x01, 0x11, 0x22])
            .set_dev_addr(&DevAddr::from(0x0203_1980))
            .set_dl_settings(0, 0)
            .set_rx_delay(0);

        assert_eq!(
            phy.build(&app_key()),
            vec![
                0x20, 0x49, 0x3e, 0xeb, 0x51, 0xfb, 0xa2, 0x11, 0x6f, 0x81, 0x0e, 0xdb, 0x37,
                0x42, 0x97, 0x51, 0x42,
            ]
        );
    }

    #[test]
    fn test_join_request_creator() {
        let mut phy = JoinRequestCreator::new();
        phy.set_app_eui(&AppEui::new([0x01, 0x02, 0x03, 0x04, 0x01, 0x02, 0x03, 0x04]))
            .set_dev_eui(&DevEui::new([0x02, 0x03, 0x04, 0x05, 0x02, 0x03, 0x04, 0x05]))
            .set_dev_nonce(&DevNonce::new([0x2d, 0x10]));

        assert_eq!(
            phy.build(&AES128([1; 16])),
            vec![
                0x00, 0x04, 0x03, 0x02, 0x01, 0x04, 0x03, 0x02, 0x01, 0x05, 0x04, 0x03, 0x02,
                0x05, 0x04, 0x03, 0x02, 0x2d, 0x10, 0x6a, 0x99, 0x0e, 0x12,
            ]
        );
    }

    #[test]
    fn test_data_payload_uplink_creator() {
        let mut phy = DataPayloadCreator::new();
        let nwk_skey = NwkSKey::from([2; 16]);
        let app_skey = AppSKey::from([1; 16]);
        phy.set_confirmed(false)
            .set_uplink(true)
            .set_f_port(1)
            .set_dev_addr(&DevAddr::from(0x0102_0304))
            .set_fctrl(&FCtrl::new(0x80, true)) // ADR, all others clear
            .set_fcnt(1);

        assert_eq!(
            phy.build(b"hello", &[], &nwk_skey, &app_skey).unwrap(),
            vec![
                0x40, 0x04, 0x03, 0x02, 0x01, 0x80, 0x01, 0x00, 0x01, 0xa6, 0x94, 0x64, 0x26,
                0x15, 0xd6, 0xc3, 0xb5, 0x82,
            ]
        );
    }

    #[test]
    fn test_data_payload_downlink_creator() {
        let mut phy = DataPayloadCreator::new();
        let nwk_skey = NwkSKey::from([2; 16]);
        let app_skey = AppSKey::from([1; 16]);
        phy.set_confirmed(true)
            .set_uplink(false)
            .set_f_port(42)
            .set_dev_addr(&DevAddr::from(0x0102_0304))
            .set_fctrl(&FCtrl::new(0x80, false))
            .set_fcnt(76543);

        assert_eq!(
            phy.build(b"hello lora", &[], &nwk_skey, &app_skey).unwrap(),
            vec![
                0xa0, 0x04, 0x03, 0x02, 0x01, 0x80, 0xff, 0x2a, 0x2a, 0x0a, 0xf1, 0xa3, 0x6a,
                0x05, 0xd0, 0x12, 0x5f, 0x88, 0x5d, 0x88, 0x1d, 0x49, 0xe1,
            ]
        );
    }

    #[test]
    fn test_fport_zero_with_fopts_is_rejected() {
        let mut phy = DataPayloadCreator::new();
        let nwk_skey = NwkSKey::from([2; 16]);
        let app_skey = AppSKey::from([1; 16]);
        phy.set_f_port(0);
        assert_eq!(
            phy.build(b"\x02", &[0x02], &nwk_skey, &app_skey),
            Err(Error::DoubleFopts)
        );
    }

    #[test]
    fn test_payload_without_fport_is_rejected() {
        let mut phy = DataPayloadCreator::new();
        let nwk_skey = NwkSKey::from([2; 16]);
        let app_skey = AppSKey::from([1; 16]);
        assert_eq!(phy.build(b"hello", &[], &nwk_skey, &app_skey), Err(Error::BadFrame));
    }
}
