//! Regional defaults used when a session is created or reset.
//!
//! The full channel plans, data-rate tables and duty-cycle rules live
//! outside the engine; only the ADR and receive-window defaults installed
//! on a fresh session are looked up here.

use serde::{Deserialize, Serialize};

use crate::store::{AdrUse, RxWin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    EU868,
    US915,
    CN779,
    EU433,
    AU915,
    CN470,
    AS923,
    KR920,
    IN865,
    RU864,
}

/// ADR parameters a freshly joined or reset node is assumed to use.
pub fn default_adr(region: Region) -> AdrUse {
    match region {
        Region::EU868 => AdrUse { power: 1, datr: 0 },
        Region::US915 | Region::AU915 => AdrUse { power: 5, datr: 0 },
        Region::CN470 => AdrUse { power: 2, datr: 0 },
        Region::AS923 | Region::EU433 => AdrUse { power: 0, datr: 0 },
        Region::CN779 | Region::KR920 | Region::IN865 | Region::RU864 => {
            AdrUse { power: 1, datr: 0 }
        }
    }
}

/// Receive-window parameters a freshly joined or reset node is assumed to
/// use: no RX1 offset and the regional RX2 slot.
pub fn default_rxwin(region: Region) -> RxWin {
    let (rx2_dr, rx2_freq) = match region {
        Region::EU868 => (0, 869_525_000),
        Region::US915 | Region::AU915 => (8, 923_300_000),
        Region::CN779 => (0, 786_000_000),
        Region::EU433 => (0, 434_665_000),
        Region::CN470 => (0, 505_300_000),
        Region::AS923 => (2, 923_200_000),
        Region::KR920 => (0, 921_900_000),
        Region::IN865 => (2, 866_550_000),
        Region::RU864 => (0, 869_100_000),
    };
    RxWin { rx1_dr_offset: 0, rx2_dr, rx2_freq }
}
