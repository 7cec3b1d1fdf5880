//! Frame-counter arithmetic and the per-uplink acceptance policy.
//!
//! Counters are transmitted as their low 16 bits. Depending on the profile
//! the server tracks them either as plain 16-bit values or extends them to
//! 32 bits, and may treat a small counter after a large one as evidence of
//! a device reboot.

use serde::{Deserialize, Serialize};

/// Largest accepted forward jump between two uplinks.
pub const MAX_FCNT_GAP: u32 = 16384;

/// Frame-counter policy carried by the device profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FcntCheck {
    /// 16-bit counters, resets rejected. A rollover at 0xFFFF is
    /// indistinguishable from a reset and is accepted as a gap of 1.
    Strict16,
    /// 32-bit counters reconstructed from the transmitted low 16 bits.
    Strict32,
    /// 16-bit counters, a small counter after a large one resets the session.
    ResetAllowed,
    /// Counters accepted verbatim. For battery-less devices.
    Disabled,
}

/// Decision of [`check_fcnt`] for one received counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcntDecision {
    /// Fresh uplink; `fcntup` is the new counter state and `missed` the
    /// number of uplinks skipped since the last reception, if any.
    Uplink { fcntup: u32, missed: Option<u32> },
    /// Same counter as the previous uplink; state must not advance.
    Retransmit,
    /// Device reboot detected; the session counters start over at `fcntup`.
    Reset { fcntup: u32 },
    /// The gap exceeds [`MAX_FCNT_GAP`].
    GapTooLarge,
}

/// 16-bit wraparound distance from `last` to `new`.
pub fn fcnt16_gap(last: u32, new: u16) -> u32 {
    u32::from(new).wrapping_sub(last) & 0xFFFF
}

/// Distance of the transmitted low 16 bits from the low half of the 32-bit
/// counter state.
pub fn fcnt32_gap(last: u32, new: u16) -> u32 {
    u32::from(new).wrapping_sub(last & 0xFFFF) & 0xFFFF
}

/// Advances a 32-bit counter by a gap computed with [`fcnt32_gap`].
pub fn fcnt32_inc(last: u32, gap: u32) -> u32 {
    last.wrapping_add(gap)
}

/// Applies the counter policy to a received 16-bit counter value.
///
/// `fcntup` is the stored counter state, undefined until the first uplink
/// after a join. `max_lost_after_reset` is the largest counter value still
/// treated as a reboot rather than a forward jump.
pub fn check_fcnt(
    check: FcntCheck,
    max_lost_after_reset: u32,
    fcntup: Option<u32>,
    fcnt: u16,
) -> FcntDecision {
    let fcnt32 = u32::from(fcnt);

    // First frame of the session.
    let last = match fcntup {
        None => {
            return if fcnt32 <= 1 {
                FcntDecision::Uplink { fcntup: fcnt32, missed: None }
            } else if fcnt32 < MAX_FCNT_GAP {
                FcntDecision::Uplink { fcntup: fcnt32, missed: Some(fcnt32 - 1) }
            } else {
                FcntDecision::GapTooLarge
            };
        }
        Some(last) => last,
    };

    if matches!(check, FcntCheck::ResetAllowed | FcntCheck::Disabled)
        && fcnt32 < last
        && fcnt32 < max_lost_after_reset
    {
        return FcntDecision::Reset { fcntup: fcnt32 };
    }

    if check == FcntCheck::Disabled {
        return FcntDecision::Uplink { fcntup: fcnt32, missed: None };
    }

    if fcnt32 == last & 0xFFFF {
        return FcntDecision::Retransmit;
    }

    if check == FcntCheck::Strict32 {
        let gap = fcnt32_gap(last, fcnt);
        return if gap == 1 {
            FcntDecision::Uplink { fcntup: fcnt32_inc(last, 1), missed: None }
        } else if gap < MAX_FCNT_GAP {
            FcntDecision::Uplink { fcntup: fcnt32_inc(last, gap), missed: Some(gap - 1) }
        } else {
            FcntDecision::GapTooLarge
        };
    }

    let gap = fcnt16_gap(last, fcnt);
    if gap == 1 {
        FcntDecision::Uplink { fcntup: fcnt32, missed: None }
    } else if gap < MAX_FCNT_GAP {
        FcntDecision::Uplink { fcntup: fcnt32, missed: Some(gap - 1) }
    } else {
        FcntDecision::GapTooLarge
    }
}
