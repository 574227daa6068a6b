//! NFC-B demodulator core
//!
//! Recovers poll frames from the signal window in four steps:
//!
//! 1. Edge detection: two moving averages, a quarter and an eighth of
//!    a symbol long, run over the same signal. Their difference swings
//!    positive on a falling signal (the slow window still holds the
//!    higher pre-edge samples) and negative on a rising one.
//!
//! 2. Start-of-frame lock: a three-stage search for the SOF shape
//!    (falling edge, 10 to 11 ETU low, rising edge, 2 to 3 ETU high,
//!    falling edge), each stage peak-tracking inside a timing window.
//!
//! 3. Symbol tracking: after lock, the next symbol boundary is
//!    predicted one period ahead and re-centered on any strong edge
//!    found within a quarter symbol of the prediction, which rides out
//!    clock drift between reader and receiver. The bit decision samples
//!    the modulation depth mid-symbol.
//!
//! 4. Framing: characters are one start bit (modulated), eight data
//!    bits LSB first, one stop bit (carrier). Ten consecutive modulated
//!    symbols signal end of frame. Completed frames are CRC-checked,
//!    classified, and emitted; anomalies before the first full byte
//!    just restart the carrier search.
//!
//! Listen-frame (BPSK subcarrier) decoding is an extension point: the
//! hook exists with the poll decoder's shape and reports no frame.

use arrayvec::ArrayVec;

#[cfg(not(test))]
use log::{debug, info};

#[cfg(test)]
use std::{println as debug, println as info};

use super::bitrate::{bitrate_table, BitrateParams, ConfigError, RateType, ACTIVE_POLL_RATES, RATE_COUNT};
use super::modulation::{Modulation, SearchStage, SearchWindow};
use super::protocol::{cycles_to_samples, FrameStatus, ProtocolStatus, DEFAULT_MAX_FRAME_SIZE};
use super::signal::{SignalParams, SignalWindow};
use crate::crc::check_crc;
use crate::frame::{
    FramePhase, FrameType, NfcFrame, TechType, FLAG_CRC_ERROR, FLAG_TRUNCATED,
};
use crate::waveform;

// Minimum edge-detector magnitude treated as a real transition
const EDGE_THRESHOLD: f32 = 0.001;

/// Classification of one demodulated symbol
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Pattern {
    /// Sample source exhausted before a symbol completed
    #[default]
    Invalid,
    /// No recognizable symbol
    NoPattern,
    /// Modulated symbol, bit value 0
    PatternL,
    /// Unmodulated symbol, bit value 1
    PatternH,
}

/// The most recently demodulated symbol
#[derive(Clone, Copy, Debug, Default)]
struct Symbol {
    pattern: Pattern,
    value: u8,
    /// Delay-compensated start and end, absolute sample clocks
    start: u64,
    end: u64,
    length: u64,
}

/// Bit-stream accumulator for the frame being read
#[derive(Clone, Debug, Default)]
struct Stream {
    /// Completed frame bytes
    buffer: ArrayVec<u8, DEFAULT_MAX_FRAME_SIZE>,

    /// Data bits of the character in progress
    data: u8,

    /// Position within the character: 0 start bit, 1..=8 data, 9 stop
    bits: u8,
}

impl Stream {
    fn clear(&mut self) {
        self.buffer.clear();
        self.data = 0;
        self.bits = 0;
    }
}

/// NFC-B decoder core
///
/// Owns all demodulation and framing state but borrows the
/// [`SignalWindow`] per call, so the window can be shared with sibling
/// technology decoders by an enclosing dispatcher.
#[derive(Clone, Debug, Default)]
pub struct NfcB {
    bitrate_params: [BitrateParams; RATE_COUNT],
    modulation_status: [Modulation; RATE_COUNT],
    symbol_status: Symbol,
    stream_status: Stream,
    frame_status: FrameStatus,
    protocol_status: ProtocolStatus,

    /// Modulation depth below which a symbol is not NFC-B
    minimum_modulation_threshold: f32,

    /// Modulation depth above which the signal is rejected outright
    maximum_modulation_threshold: f32,

    /// Sample clock of the last processed frame's end
    last_frame_end: u64,

    /// Flags carried onto every following frame until the next REQB
    chained_flags: u32,

    /// Rate locked by the SOF detector, if any
    active_rate: Option<RateType>,
}

impl NfcB {
    /// New decoder core with default thresholds
    ///
    /// [`configure()`](Self::configure) must run before any samples
    /// are processed.
    pub fn new() -> Self {
        Self {
            minimum_modulation_threshold: 0.10,
            maximum_modulation_threshold: 0.50,
            ..Self::default()
        }
    }

    /// Override the modulation depth acceptance band
    pub fn set_modulation_threshold(&mut self, minimum: f32, maximum: f32) {
        self.minimum_modulation_threshold = minimum;
        self.maximum_modulation_threshold = maximum;
    }

    /// Compute the bitrate tables and reset all decoding state
    pub fn configure(&mut self, params: &SignalParams) -> Result<(), ConfigError> {
        info!(
            "initializing NFC-B decoder: sample rate {} Hz, modulation {} -> {}",
            params.sample_rate, self.minimum_modulation_threshold, self.maximum_modulation_threshold
        );

        self.bitrate_params = bitrate_table(params)?;
        self.modulation_status = [Modulation::default(); RATE_COUNT];
        self.symbol_status = Symbol::default();
        self.stream_status.clear();
        self.frame_status = FrameStatus::default();
        self.protocol_status = ProtocolStatus::defaults(params.sample_time_unit);
        self.frame_status.apply_protocol(&self.protocol_status);
        self.last_frame_end = 0;
        self.chained_flags = 0;
        self.active_rate = None;

        for bitrate in &self.bitrate_params {
            info!(
                "{} sym/s: period1 {} period2 {} period4 {} period8 {} delay {}",
                bitrate.symbols_per_second,
                bitrate.period1,
                bitrate.period2,
                bitrate.period4,
                bitrate.period8,
                bitrate.symbol_delay_detect
            );
        }

        Ok(())
    }

    /// True once an SOF has locked a bitrate and a frame is in flight
    pub fn is_active(&self) -> bool {
        self.active_rate.is_some()
    }

    /// Run the SOF detector against the sample at the window's clock
    ///
    /// Call once per sample while no frame is in flight. Returns `true`
    /// exactly when a start of frame has just been confirmed; the core
    /// then expects [`decode()`](Self::decode) calls.
    pub fn detect(&mut self, window: &SignalWindow) -> bool {
        // ignore low power signals
        if window.power_average() <= window.params().power_level_threshold {
            return false;
        }

        for rate in ACTIVE_POLL_RATES {
            let bitrate = self.bitrate_params[rate as usize];
            let clock = window.clock();
            let modulation = &mut self.modulation_status[rate as usize];

            let signal_data = window.sample(bitrate.offset_signal_index.wrapping_add(clock));
            let filter_data = window.sample(bitrate.offset_filter_index.wrapping_add(clock));
            let detect_data = window.sample(bitrate.offset_detect_index.wrapping_add(clock));

            modulation.filter_integrate += signal_data - filter_data;
            modulation.detect_integrate += signal_data - detect_data;

            let edge = modulation.filter_integrate / bitrate.period4 as f32
                - modulation.detect_integrate / bitrate.period8 as f32;

            let deep = (window.power_average() - signal_data) / window.power_average();

            // too deep for the 10-50% ASK band, abandon the search
            if deep > self.maximum_modulation_threshold {
                modulation.stage = SearchStage::Begin;
                modulation.search.clear();
                return false;
            }

            match modulation.stage {
                SearchStage::Begin => {
                    // track the strongest falling edge
                    if edge > modulation.search.peak_value
                        && edge > EDGE_THRESHOLD
                        && deep > self.minimum_modulation_threshold
                    {
                        modulation.search.peak_value = edge;
                        modulation.search.peak_time = Some(clock);
                        modulation.search.end = clock + bitrate.period4 as u64;
                    }

                    if clock == modulation.search.end {
                        match modulation.search.peak_time {
                            Some(peak) => {
                                modulation.symbol_start =
                                    peak.saturating_sub(bitrate.period8 as u64);
                                modulation.stage = SearchStage::Idle;
                                // the rising edge must come 10 to 11 ETU later
                                modulation.search = SearchWindow {
                                    start: peak + 10 * bitrate.period1 as u64
                                        - bitrate.period2 as u64,
                                    end: peak + 11 * bitrate.period1 as u64
                                        + bitrate.period2 as u64,
                                    peak_time: None,
                                    peak_value: 0.0,
                                };
                            }
                            None => {
                                modulation.search.start = 0;
                                modulation.search.end = 0;
                            }
                        }
                    }
                }

                SearchStage::Idle => {
                    if clock > modulation.search.start && clock <= modulation.search.end {
                        // track the strongest rising edge
                        if edge < -EDGE_THRESHOLD && edge < modulation.search.peak_value {
                            modulation.search.peak_value = edge;
                            modulation.search.peak_time = Some(clock);
                            modulation.search.end = clock + bitrate.period4 as u64;
                        }

                        if clock == modulation.search.end {
                            match modulation.search.peak_time {
                                Some(peak) => {
                                    modulation.stage = SearchStage::End;
                                    // the closing edge must come 2 to 3 ETU later
                                    modulation.search = SearchWindow {
                                        start: peak + 2 * bitrate.period1 as u64
                                            - bitrate.period2 as u64,
                                        end: peak + 3 * bitrate.period1 as u64
                                            + bitrate.period2 as u64,
                                        peak_time: None,
                                        peak_value: 0.0,
                                    };
                                }
                                None => {
                                    modulation.stage = SearchStage::Begin;
                                    modulation.search.clear();
                                    modulation.symbol_start = 0;
                                    modulation.symbol_end = 0;
                                }
                            }
                        }
                    } else if edge.abs() > EDGE_THRESHOLD {
                        // the SOF low must be free of modulation changes
                        modulation.stage = SearchStage::Begin;
                        modulation.search.clear();
                        modulation.symbol_start = 0;
                        modulation.symbol_end = 0;

                        return false;
                    }
                }

                SearchStage::End => {
                    if clock > modulation.search.start && clock <= modulation.search.end {
                        if edge > modulation.search.peak_value
                            && edge > EDGE_THRESHOLD
                            && deep > self.minimum_modulation_threshold
                        {
                            modulation.search.peak_value = edge;
                            modulation.search.peak_time = Some(clock);
                            modulation.search.end = clock + bitrate.period8 as u64;
                        }

                        if clock == modulation.search.end {
                            match modulation.search.peak_time {
                                Some(peak) => {
                                    modulation.symbol_end =
                                        peak.saturating_sub(bitrate.period8 as u64);
                                    modulation.symbol_sync = 0;

                                    self.frame_status.frame_type = Some(FrameType::Poll);
                                    self.frame_status.symbol_rate = bitrate.symbols_per_second;
                                    self.frame_status.frame_start = modulation
                                        .symbol_start
                                        .saturating_sub(bitrate.symbol_delay_detect as u64);
                                    self.frame_status.frame_end = 0;

                                    modulation.stage = SearchStage::Begin;
                                    modulation.search.clear();

                                    self.active_rate = Some(rate);

                                    debug!(
                                        "[{:<14}] NFC-B SOF locked at {} sym/s",
                                        clock, bitrate.symbols_per_second
                                    );

                                    return true;
                                }
                                None => {
                                    modulation.stage = SearchStage::Begin;
                                    modulation.search.clear();
                                    modulation.symbol_start = 0;
                                    modulation.symbol_end = 0;
                                }
                            }
                        }
                    }
                }
            }
        }

        false
    }

    /// Decode the frame in flight
    ///
    /// Pulls samples from `chunk` through the window until the frame
    /// completes or the chunk is exhausted. Completed frames are
    /// appended to `frames`. Returns `true` when more samples are
    /// needed to finish the current frame.
    pub fn decode<I>(
        &mut self,
        window: &mut SignalWindow,
        chunk: &mut I,
        frames: &mut Vec<NfcFrame>,
    ) -> bool
    where
        I: Iterator<Item = f32>,
    {
        match self.frame_status.frame_type {
            Some(FrameType::Poll) => self.decode_poll_frame(window, chunk, frames),
            Some(FrameType::Listen) => self.decode_listen_frame(window, chunk, frames),
            None => {
                self.active_rate = None;
                false
            }
        }
    }

    // Assemble poll-frame characters from demodulated symbols
    //
    // Character layout: start bit (always modulated), eight data bits
    // LSB first, stop bit (always carrier). A frame ends on ten
    // consecutive modulated symbols, a malformed start/stop bit, or a
    // completed character that would overflow the frame size budget.
    fn decode_poll_frame<I>(
        &mut self,
        window: &mut SignalWindow,
        chunk: &mut I,
        frames: &mut Vec<NfcFrame>,
    ) -> bool
    where
        I: Iterator<Item = f32>,
    {
        let params = *window.params();

        loop {
            let pattern = self.decode_poll_frame_symbol(window, chunk);
            if pattern != Pattern::PatternL && pattern != Pattern::PatternH {
                // ran out of samples mid-frame
                return true;
            }

            let bits = self.stream_status.bits;
            let data = self.stream_status.data;
            let bytes = self.stream_status.buffer.len();

            let mut frame_end = false;
            let mut stream_error = false;
            let mut truncate_error = false;

            // ten consecutive modulated symbols are the end of frame
            if bits == 9 && data == 0 && pattern == Pattern::PatternL {
                frame_end = true;
            }
            // start bit must be modulated, stop bit must not
            else if (bits == 0 && pattern == Pattern::PatternH)
                || (bits == 9 && pattern == Pattern::PatternL)
            {
                stream_error = true;
            }
            // a completed character with the buffer already full
            else if bits == 9 && bytes == self.protocol_status.max_frame_size {
                truncate_error = true;
            }

            if frame_end || stream_error || truncate_error {
                // a valid frame must contain at least one byte
                if bytes > 0 {
                    self.frame_status.frame_end = self.symbol_status.end;

                    let mut frame = NfcFrame::new(TechType::NfcB, FrameType::Poll);
                    frame.set_frame_rate(self.frame_status.symbol_rate);
                    frame.set_sample_bounds(
                        self.frame_status.frame_start,
                        self.frame_status.frame_end,
                        params.sample_rate,
                    );

                    if truncate_error || stream_error {
                        frame.set_frame_flags(FLAG_TRUNCATED);
                    }

                    frame.extend_payload(&self.stream_status.buffer);

                    // clear modulation for the next frame search
                    if let Some(rate) = self.active_rate {
                        let modulation = &mut self.modulation_status[rate as usize];
                        modulation.symbol_start = 0;
                        modulation.symbol_end = 0;
                        modulation.symbol_sync = 0;
                        modulation.filter_integrate = 0.0;
                        modulation.detect_integrate = 0.0;
                        modulation.phase_integrate = 0.0;
                    }

                    self.stream_status.clear();

                    self.process(&mut frame, &params);

                    debug!("[{:<14}] {}", window.clock(), frame);
                    frames.push(frame);

                    return false;
                }

                // nothing accumulated, restart the carrier search
                self.reset_modulation();

                return false;
            }

            // accumulate the next bit
            if self.stream_status.bits < 9 {
                if self.stream_status.bits > 0 {
                    self.stream_status.data |=
                        self.symbol_status.value << (self.stream_status.bits - 1);
                }
                self.stream_status.bits += 1;
            } else {
                self.stream_status.buffer.push(self.stream_status.data);
                self.stream_status.data = 0;
                self.stream_status.bits = 0;
            }
        }
    }

    // Listen-frame hook
    //
    // BPSK subcarrier demodulation is not implemented; drop the rate
    // selection so the dispatcher returns to carrier search.
    fn decode_listen_frame<I>(
        &mut self,
        _window: &mut SignalWindow,
        _chunk: &mut I,
        _frames: &mut Vec<NfcFrame>,
    ) -> bool
    where
        I: Iterator<Item = f32>,
    {
        self.active_rate = None;

        false
    }

    // Demodulate one ASK symbol
    //
    // Advances the window one sample at a time. Strong edges within a
    // quarter symbol of the predicted boundary re-center the symbol
    // clock; the bit decision reads the modulation depth at the
    // mid-symbol sync point. Returns `Pattern::Invalid` when the chunk
    // runs dry first.
    fn decode_poll_frame_symbol<I>(&mut self, window: &mut SignalWindow, chunk: &mut I) -> Pattern
    where
        I: Iterator<Item = f32>,
    {
        self.symbol_status.pattern = Pattern::Invalid;

        let Some(rate) = self.active_rate else {
            return Pattern::Invalid;
        };

        let bitrate = self.bitrate_params[rate as usize];
        let minimum_threshold = self.minimum_modulation_threshold;

        while window.next_sample(chunk) {
            let clock = window.clock();
            let modulation = &mut self.modulation_status[rate as usize];

            let signal_data = window.sample(bitrate.offset_signal_index.wrapping_add(clock));
            let filter_data = window.sample(bitrate.offset_filter_index.wrapping_add(clock));
            let detect_data = window.sample(bitrate.offset_detect_index.wrapping_add(clock));

            modulation.filter_integrate += signal_data - filter_data;
            modulation.detect_integrate += signal_data - detect_data;

            let edge = (modulation.filter_integrate / bitrate.period4 as f32
                - modulation.detect_integrate / bitrate.period8 as f32)
                .abs();

            let deep = (window.power_average() - signal_data) / window.power_average();

            // edge re-synchronization window around the predicted boundary
            if clock > modulation.search.start && clock < modulation.search.end {
                if edge > modulation.search.peak_value
                    && edge > EDGE_THRESHOLD
                    && deep > minimum_threshold
                {
                    modulation.search.peak_value = edge;
                    modulation.symbol_end = clock.saturating_sub(bitrate.period8 as u64);
                    modulation.symbol_sync = 0;
                }
            }

            // estimate the next symbol timing
            if modulation.symbol_sync == 0 {
                modulation.symbol_start = modulation.symbol_end;
                modulation.symbol_end = modulation.symbol_start + bitrate.period1 as u64;
                modulation.symbol_sync = modulation.symbol_start + bitrate.period2 as u64;
            }

            // bit decision at the mid-symbol sync point
            if clock == modulation.symbol_sync {
                let (pattern, value) = if deep > minimum_threshold {
                    (Pattern::PatternL, 0)
                } else {
                    (Pattern::PatternH, 1)
                };

                let delay = bitrate.symbol_delay_detect as u64;
                let start = modulation.symbol_start.saturating_sub(delay);
                let end = modulation.symbol_end.saturating_sub(delay);

                self.symbol_status = Symbol {
                    pattern,
                    value,
                    start,
                    end,
                    length: end - start,
                };

                // arm the re-synchronization window for the next boundary
                modulation.search.start = modulation.symbol_end - bitrate.period4 as u64;
                modulation.search.end = modulation.symbol_end + bitrate.period4 as u64;
                modulation.symbol_sync = 0;
                modulation.search.peak_value = 0.0;

                break;
            }
        }

        self.symbol_status.pattern
    }

    // Classify an emitted frame and derive the response windows
    fn process(&mut self, frame: &mut NfcFrame, params: &SignalParams) {
        // poll frames start from the session default response budget
        if frame.is_poll_frame() {
            self.frame_status.frame_waiting_time = self.protocol_status.frame_waiting_time;
        }

        if !self.process_reqb(frame, params) {
            self.process_other(frame);
        }

        frame.set_frame_flags(self.chained_flags);

        if frame.is_poll_frame() {
            if let Some(rate) = self.active_rate {
                let delay = self.bitrate_params[rate as usize].symbol_delay_detect as u64;

                // the listener must not modulate before guard_end and
                // must have replied before waiting_end
                self.frame_status.guard_end =
                    self.frame_status.frame_end + self.frame_status.frame_guard_time + delay;
                self.frame_status.waiting_end =
                    self.frame_status.frame_end + self.frame_status.frame_waiting_time + delay;

                self.frame_status.frame_type = Some(FrameType::Listen);
            }
        } else {
            self.frame_status.frame_type = None;
            self.frame_status.last_command = None;
        }

        self.last_frame_end = self.frame_status.frame_end;
        self.frame_status.frame_start = 0;
        self.frame_status.frame_end = 0;
    }

    // REQB/WUPB recognition
    //
    // A REQB restarts card communication, so the protocol parameters
    // fall back to their defaults and the ATQB response window applies.
    fn process_reqb(&mut self, frame: &mut NfcFrame, params: &SignalParams) -> bool {
        if frame.is_poll_frame() {
            if frame[0] == waveform::REQB_COMMAND && frame.len() == waveform::REQB_FRAME_LENGTH {
                let unit = params.sample_time_unit;

                self.frame_status.last_command = Some(waveform::REQB_COMMAND);

                self.protocol_status.max_frame_size = DEFAULT_MAX_FRAME_SIZE;
                self.protocol_status.frame_guard_time =
                    cycles_to_samples(waveform::FRAME_GUARD_CYCLES, unit);
                self.protocol_status.frame_waiting_time =
                    cycles_to_samples(waveform::FRAME_WAITING_CYCLES, unit);

                self.frame_status.frame_guard_time =
                    cycles_to_samples(waveform::FRAME_GUARD_CYCLES, unit);
                self.frame_status.frame_waiting_time =
                    cycles_to_samples(waveform::REQB_WAITING_CYCLES, unit);

                self.chained_flags = 0;

                frame.set_frame_phase(FramePhase::Selection);
                if !check_crc(frame.payload()) {
                    frame.set_frame_flags(FLAG_CRC_ERROR);
                }

                return true;
            }
        }

        if frame.is_listen_frame()
            && self.frame_status.last_command == Some(waveform::REQB_COMMAND)
        {
            frame.set_frame_phase(FramePhase::Selection);

            return true;
        }

        false
    }

    // Everything that is not a recognized selection command
    fn process_other(&mut self, frame: &mut NfcFrame) {
        frame.set_frame_phase(FramePhase::Application);
        if !check_crc(frame.payload()) {
            frame.set_frame_flags(FLAG_CRC_ERROR);
        }
    }

    // Drop all modulation, stream, and frame state and return to
    // carrier search
    fn reset_modulation(&mut self) {
        for modulation in &mut self.modulation_status {
            modulation.reset();
        }

        self.stream_status.clear();
        self.symbol_status = Symbol::default();

        self.frame_status.frame_type = None;
        self.frame_status.frame_start = 0;
        self.frame_status.frame_end = 0;

        self.active_rate = None;
    }
}
