// Copyright (c) 2017-2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! LoRaWAN cryptographic helpers: truncated AES-CMAC MICs, the payload
//! cipher and the join-accept block transform.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};

use crate::codec;
use crate::keys::{AppNonce, DevAddr, DevNonce, AES128, MIC};

/// Uplink direction byte of the B0/Ai blocks.
pub const DIR_UP: u8 = 0;
/// Downlink direction byte of the B0/Ai blocks.
pub const DIR_DOWN: u8 = 1;

fn aes128(key: &AES128) -> Aes128 {
    Aes128::new(GenericArray::from_slice(&key.0))
}

/// AES-128-ECB encryption of a single block.
pub fn aes_encrypt(key: &AES128, block: &[u8; 16]) -> [u8; 16] {
    let mut b = GenericArray::clone_from_slice(block);
    aes128(key).encrypt_block(&mut b);
    b.into()
}

/// AES-128-ECB decryption of a single block.
pub fn aes_decrypt(key: &AES128, block: &[u8; 16]) -> [u8; 16] {
    let mut b = GenericArray::clone_from_slice(block);
    aes128(key).decrypt_block(&mut b);
    b.into()
}

fn cmac16(key: &AES128, parts: &[&[u8]]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(&key.0));
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// The B0/Ai block of the MIC and payload cipher; `first` selects between
/// them (0x49 for MICs, 0x01 for keystream blocks).
fn helper_block(first: u8, dir: u8, devaddr_wire: &[u8], fcnt: u32, last: u8) -> [u8; 16] {
    let mut block = [0u8; 16];
    block[0] = first;
    block[5] = dir;
    block[6..10].copy_from_slice(devaddr_wire);
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    block[15] = last;
    block
}

/// Computes the MIC of a data frame. Direction and device address are read
/// from the assembled frame bytes (`msg` excludes the MIC itself); `fcnt` is
/// the full 32-bit counter.
pub fn data_mic(key: &AES128, msg: &[u8], fcnt: u32) -> MIC {
    let dir = (msg[0] & 0x20) >> 5;
    let b0 = helper_block(0x49, dir, &msg[1..5], fcnt, msg.len() as u8);
    let cmac = cmac16(key, &[&b0, msg]);
    MIC([cmac[0], cmac[1], cmac[2], cmac[3]])
}

/// Computes the MIC of a join-request or join-accept (no B0 prefix).
pub fn frame_mic(key: &AES128, msg: &[u8]) -> MIC {
    let cmac = cmac16(key, &[msg]);
    MIC([cmac[0], cmac[1], cmac[2], cmac[3]])
}

/// The FRMPayload cipher: AES-CTR with the block counter starting at 1 and
/// the keystream truncated on the final partial block.
///
/// Each keystream block is XORed into its payload block with [`codec::binxor`]
/// and prepended to the accumulator, then the accumulated blocks are reversed
/// back into natural order, so the transform is its own inverse.
pub fn cipher(data: &[u8], key: &AES128, dir: u8, devaddr: &DevAddr, fcnt: u32) -> Vec<u8> {
    let devaddr_wire = devaddr.to_wire();
    let mut acc = Vec::with_capacity(data.len());
    for (i, block) in data.chunks(16).enumerate() {
        let ai = helper_block(0x01, dir, &devaddr_wire, fcnt, (i + 1) as u8);
        let si = aes_encrypt(key, &ai);
        let mut xored = codec::binxor(&si[..block.len()], block);
        xored.extend_from_slice(&acc);
        acc = xored;
    }
    codec::reverse(&acc)
}

/// Encrypts a join-accept in place (everything after the MHDR, MIC
/// included) by running the AES decrypt primitive, so that devices recover
/// the plaintext with a plain encrypt.
pub fn encrypt_join_accept(key: &AES128, frame: &mut [u8]) {
    let cipher = aes128(key);
    for block in frame[1..].chunks_mut(16) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
}

/// The device-side reciprocal of [`encrypt_join_accept`].
pub fn decrypt_join_accept(key: &AES128, frame: &mut [u8]) {
    let cipher = aes128(key);
    for block in frame[1..].chunks_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
}

/// Derives a session key from the AppKey; `first_byte` is 0x01 for the
/// NwkSKey and 0x02 for the AppSKey.
pub fn derive_session_key(
    first_byte: u8,
    key: &AES128,
    app_nonce: &AppNonce,
    net_id: &[u8; 3],
    dev_nonce: &DevNonce,
) -> AES128 {
    let mut block = [0u8; 16];
    block[0] = first_byte;
    block[1..4].copy_from_slice(app_nonce.as_ref());
    block[4..7].copy_from_slice(net_id);
    block[7..9].copy_from_slice(dev_nonce.as_ref());
    AES128(aes_encrypt(key, &block))
}
