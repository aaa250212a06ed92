//! CongestionGovernor (§4.8): maps one RTT sample to a bitrate adjustment
//! with hysteresis. Thresholds and factors are matched exactly against
//! the original `PingPacketHandler.cpp`.

const RTT_HIGH_MS: i32 = 150;
const RTT_LOW_MS: i32 = 50;
const DECREASE_FACTOR: f64 = 0.80;
const INCREASE_FACTOR: f64 = 1.05;
const FLOOR_KBPS: u32 = 500;
const CEILING_KBPS: u32 = 8000;
const NOTIFY_THRESHOLD_KBPS: u32 = 50;

pub struct CongestionGovernor {
    bitrate_kbps: u32,
}

impl CongestionGovernor {
    pub fn new(initial_bitrate_kbps: u32) -> Self {
        CongestionGovernor {
            bitrate_kbps: initial_bitrate_kbps.clamp(FLOOR_KBPS, CEILING_KBPS),
        }
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    /// Feeds one RTT sample (ms). Returns `Some(new_bitrate)` iff the
    /// change exceeds [`NOTIFY_THRESHOLD_KBPS`] and the encoder should be
    /// told; `None` if the sample didn't move the needle enough to act on.
    pub fn observe_rtt(&mut self, rtt_ms: i32) -> Option<u32> {
        let old = self.bitrate_kbps;
        let new = if rtt_ms > RTT_HIGH_MS {
            ((old as f64 * DECREASE_FACTOR) as u32).max(FLOOR_KBPS)
        } else if rtt_ms < RTT_LOW_MS {
            ((old as f64 * INCREASE_FACTOR) as u32).min(CEILING_KBPS)
        } else {
            old
        };

        self.bitrate_kbps = new;

        if old.abs_diff(new) > NOTIFY_THRESHOLD_KBPS {
            Some(new)
        } else {
            None
        }
    }
}
