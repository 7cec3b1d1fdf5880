// Copyright (c) 2017-2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Key and identifier types of the frame engine.
//!
//! Multi-byte identifiers are stored in canonical (big-endian) order; the
//! parser and the creators apply the wire reversal at the boundary.

use core::fmt;
use core::str::FromStr;

use crate::codec;

/// AES128 represents a 128-bit AES key.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct AES128(pub [u8; 16]);

impl From<[u8; 16]> for AES128 {
    fn from(v: [u8; 16]) -> Self {
        AES128(v)
    }
}

/// MIC represents a 4-byte LoRaWAN message integrity code.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct MIC(pub [u8; 4]);

impl From<[u8; 4]> for MIC {
    fn from(v: [u8; 4]) -> Self {
        MIC(v)
    }
}

macro_rules! lorawan_key {
    (
        $(#[$outer:meta])*
        pub struct $type:ident(AES128);
    ) => {
        $(#[$outer])*
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq,
                 serde::Serialize, serde::Deserialize)]
        pub struct $type(pub(crate) AES128);

        impl From<[u8; 16]> for $type {
            fn from(key: [u8; 16]) -> Self {
                $type(AES128(key))
            }
        }

        impl From<AES128> for $type {
            fn from(key: AES128) -> Self {
                $type(key)
            }
        }

        impl $type {
            pub fn inner(&self) -> &AES128 {
                &self.0
            }
        }

        impl AsRef<[u8]> for $type {
            fn as_ref(&self) -> &[u8] {
                &self.0 .0
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&codec::bin_to_hex(self.as_ref()))
            }
        }
    };
}

lorawan_key!(
    /// AppKey in MSB format, provisioned on the device record.
    pub struct AppKey(AES128);
);
lorawan_key!(
    /// Network session key derived at join; signs MICs and protects port-0
    /// payloads.
    pub struct NwkSKey(AES128);
);
lorawan_key!(
    /// Application session key derived at join; protects application
    /// payloads.
    pub struct AppSKey(AES128);
);

macro_rules! fixed_len_struct {
    (
        $(#[$outer:meta])*
        pub struct $type:ident[$size:expr];
    ) => {
        $(#[$outer])*
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash,
                 serde::Serialize, serde::Deserialize)]
        pub struct $type([u8; $size]);

        impl $type {
            /// Builds the value from canonical (big-endian) bytes.
            pub fn new(data: [u8; $size]) -> Self {
                $type(data)
            }

            /// Builds the value from a canonical byte slice.
            pub fn from_slice(data: &[u8]) -> Option<Self> {
                if data.len() != $size {
                    return None;
                }
                let mut bytes = [0u8; $size];
                bytes.copy_from_slice(data);
                Some($type(bytes))
            }

            /// Builds the value from wire-order (little-endian) bytes.
            pub fn from_wire(data: &[u8]) -> Option<Self> {
                Self::from_slice(&codec::reverse(data))
            }

            /// The wire-order representation of the value.
            pub fn to_wire(&self) -> [u8; $size] {
                let mut bytes = [0u8; $size];
                for (i, b) in self.0.iter().rev().enumerate() {
                    bytes[i] = *b;
                }
                bytes
            }
        }

        impl From<[u8; $size]> for $type {
            fn from(v: [u8; $size]) -> Self {
                $type(v)
            }
        }

        impl AsRef<[u8]> for $type {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&codec::bin_to_hex(&self.0))
            }
        }

        impl FromStr for $type {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = codec::hex_to_bin(s).ok_or(())?;
                Self::from_slice(&bytes).ok_or(())
            }
        }
    };
}

fixed_len_struct! {
    /// 64-bit device EUI in canonical order.
    pub struct DevEui[8];
}

fixed_len_struct! {
    /// 64-bit application EUI in canonical order.
    pub struct AppEui[8];
}

fixed_len_struct! {
    /// 32-bit network-scoped device address in canonical order.
    pub struct DevAddr[4];
}

impl DevAddr {
    /// The NwkID carried in the top 7 bits of the address.
    pub fn nwk_id(&self) -> u8 {
        self.0[0] >> 1
    }

    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl From<u32> for DevAddr {
    fn from(v: u32) -> Self {
        DevAddr(v.to_be_bytes())
    }
}

/// 16-bit device nonce, kept in the order received on the wire; the
/// session-key derivation consumes it verbatim.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DevNonce([u8; 2]);

impl DevNonce {
    pub fn new(data: [u8; 2]) -> Self {
        DevNonce(data)
    }
}

impl From<[u8; 2]> for DevNonce {
    fn from(v: [u8; 2]) -> Self {
        DevNonce(v)
    }
}

impl AsRef<[u8]> for DevNonce {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DevNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codec::bin_to_hex(&self.0))
    }
}

/// 24-bit server nonce generated for each join-accept.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AppNonce([u8; 3]);

impl AppNonce {
    pub fn new(data: [u8; 3]) -> Self {
        AppNonce(data)
    }
}

impl From<[u8; 3]> for AppNonce {
    fn from(v: [u8; 3]) -> Self {
        AppNonce(v)
    }
}

impl AsRef<[u8]> for AppNonce {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for AppNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&codec::bin_to_hex(&self.0))
    }
}
