//! Protocol timing state
//!
//! Two layers of bookkeeping around the framer. [`ProtocolStatus`]
//! holds the session defaults (frame size limit and the guard/waiting
//! budgets, all converted from carrier cycles into samples at configure
//! time). [`FrameStatus`] tracks the frame currently in flight and the
//! response windows derived from it.

use crate::frame::FrameType;
use crate::waveform;

/// Default maximum frame size in bytes
pub(crate) const DEFAULT_MAX_FRAME_SIZE: usize = 256;

/// Session-level protocol parameters
///
/// Reset to defaults at configure time and again by every REQB/WUPB,
/// which restarts card communication.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ProtocolStatus {
    /// Frame byte budget before truncation
    pub max_frame_size: usize,

    /// Start-up frame guard time, in samples
    pub start_up_guard_time: u64,

    /// Minimum reply delay TR0, in samples
    pub frame_guard_time: u64,

    /// Maximum reply delay FWT, in samples
    pub frame_waiting_time: u64,

    /// Minimum spacing between poll requests, in samples
    pub request_guard_time: u64,
}

impl ProtocolStatus {
    /// Session defaults for the given samples-per-carrier-cycle ratio
    pub fn defaults(sample_time_unit: f32) -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            start_up_guard_time: cycles_to_samples(waveform::STARTUP_GUARD_CYCLES, sample_time_unit),
            frame_guard_time: cycles_to_samples(waveform::FRAME_GUARD_CYCLES, sample_time_unit),
            frame_waiting_time: cycles_to_samples(waveform::FRAME_WAITING_CYCLES, sample_time_unit),
            request_guard_time: cycles_to_samples(waveform::REQUEST_GUARD_CYCLES, sample_time_unit),
        }
    }
}

/// State of the frame currently being decoded or awaited
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FrameStatus {
    /// Direction expected next; `None` while searching for carrier
    pub frame_type: Option<FrameType>,

    /// Symbol rate of the locked frame
    pub symbol_rate: u32,

    /// Sample clock of the frame's opening edge
    pub frame_start: u64,

    /// Sample clock of the frame's final symbol
    pub frame_end: u64,

    /// The listener must stay quiet until this clock
    pub guard_end: u64,

    /// The listener must have replied by this clock
    pub waiting_end: u64,

    /// Last recognized poll command byte
    pub last_command: Option<u8>,

    /// Per-frame copies of the protocol budgets, in samples
    pub frame_guard_time: u64,
    pub frame_waiting_time: u64,
    pub start_up_guard_time: u64,
    pub request_guard_time: u64,
}

impl FrameStatus {
    /// Copy the session budgets onto the in-flight frame state
    pub fn apply_protocol(&mut self, protocol: &ProtocolStatus) {
        self.frame_guard_time = protocol.frame_guard_time;
        self.frame_waiting_time = protocol.frame_waiting_time;
        self.start_up_guard_time = protocol.start_up_guard_time;
        self.request_guard_time = protocol.request_guard_time;
    }
}

/// Convert a duration in carrier cycles to samples
pub(crate) fn cycles_to_samples(cycles: u32, sample_time_unit: f32) -> u64 {
    (sample_time_unit * cycles as f32) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_10mhz() {
        let unit = waveform::sample_time_unit(10_000_000);
        let protocol = ProtocolStatus::defaults(unit);

        assert_eq!(protocol.max_frame_size, 256);
        // 7000 carrier cycles at 10 MHz
        assert_eq!(protocol.request_guard_time, 5162);
        // 128 * 7 cycles
        assert_eq!(protocol.frame_guard_time, 660);
        assert!(protocol.frame_waiting_time > protocol.frame_guard_time);
    }

    #[test]
    fn test_apply_protocol() {
        let protocol = ProtocolStatus::defaults(1.0);
        let mut status = FrameStatus::default();

        status.apply_protocol(&protocol);

        assert_eq!(status.frame_guard_time, protocol.frame_guard_time);
        assert_eq!(status.frame_waiting_time, protocol.frame_waiting_time);
        assert_eq!(status.request_guard_time, protocol.request_guard_time);
    }
}
