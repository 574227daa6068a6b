//! Signal window
//!
//! A power-of-two ring buffer of baseband power samples with a
//! monotonic 64-bit sample clock. The window is owned by the decoder;
//! the demodulator core reads it through delayed indices that are
//! simply `clock + offset` masked into the ring, so no per-rate copies
//! of the signal are kept.
//!
//! The window also maintains the slow exponential power average used
//! to gate detection and to normalize modulation depth.

use crate::waveform;

/// Ring buffer length in samples
///
/// Must exceed the largest detector delay plus one symbol at the
/// lowest supported sample rate, with a wide margin.
pub(crate) const SIGNAL_BUFFER_LEN: usize = 1 << 16;

const SIGNAL_BUFFER_MASK: u64 = SIGNAL_BUFFER_LEN as u64 - 1;

/// Parameters fixed at configure time
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalParams {
    /// Input sample rate in Hz
    pub sample_rate: u32,

    /// Samples per carrier cycle, `sample_rate / 13.56 MHz`
    pub sample_time_unit: f32,

    /// Minimum power average required to search for modulation
    pub power_level_threshold: f32,

    /// Exponential power average weight for the previous estimate
    pub power_average_w0: f32,

    /// Exponential power average weight for the new sample
    pub power_average_w1: f32,
}

impl SignalParams {
    pub(crate) fn new(sample_rate: u32, power_level_threshold: f32) -> Self {
        let power_average_w0 = 1.0 - 1e3 / sample_rate as f32;

        Self {
            sample_rate,
            sample_time_unit: waveform::sample_time_unit(sample_rate),
            power_level_threshold,
            power_average_w0,
            power_average_w1: 1.0 - power_average_w0,
        }
    }
}

/// Sample ring buffer and power tracker
#[derive(Clone)]
pub struct SignalWindow {
    params: SignalParams,
    clock: u64,
    power_average: f32,
    data: Box<[f32]>,
}

impl SignalWindow {
    pub(crate) fn new(params: SignalParams) -> Self {
        Self {
            params,
            clock: 0,
            power_average: 0.0,
            data: vec![0.0f32; SIGNAL_BUFFER_LEN].into_boxed_slice(),
        }
    }

    /// Pull one sample from the caller's chunk into the window
    ///
    /// Advances the sample clock, stores the sample, and updates the
    /// power average. Returns `false` when the chunk is exhausted; the
    /// window state is untouched in that case and the caller re-enters
    /// with its next chunk.
    #[inline]
    pub fn next_sample<I>(&mut self, chunk: &mut I) -> bool
    where
        I: Iterator<Item = f32>,
    {
        let Some(value) = chunk.next() else {
            return false;
        };

        self.clock += 1;
        self.data[(self.clock & SIGNAL_BUFFER_MASK) as usize] = value;

        if self.clock == 1 {
            // first sample seeds the average
            self.power_average = value;
        } else {
            self.power_average =
                self.power_average * self.params.power_average_w0 + value * self.params.power_average_w1;
        }

        true
    }

    /// Current sample clock; one-based, zero before any sample
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Slow exponential average of the signal power
    pub fn power_average(&self) -> f32 {
        self.power_average
    }

    /// Read the sample stored for clock index `index`
    ///
    /// `index` is masked into the ring; callers are responsible for
    /// staying within the buffer's history depth.
    #[inline]
    pub fn sample(&self, index: u64) -> f32 {
        self.data[(index & SIGNAL_BUFFER_MASK) as usize]
    }

    /// Configure-time parameters
    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    /// Clear the clock, buffer, and power average
    pub fn reset(&mut self) {
        self.clock = 0;
        self.power_average = 0.0;
        self.data.fill(0.0);
    }
}

impl std::fmt::Debug for SignalWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalWindow")
            .field("params", &self.params)
            .field("clock", &self.clock)
            .field("power_average", &self.power_average)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_next_sample_clock() {
        let mut window = SignalWindow::new(SignalParams::new(10_000_000, 0.01));
        assert_eq!(window.clock(), 0);

        let mut chunk = [0.5f32, 0.25].into_iter();
        assert!(window.next_sample(&mut chunk));
        assert_eq!(window.clock(), 1);
        assert_approx_eq!(window.sample(1), 0.5f32);

        assert!(window.next_sample(&mut chunk));
        assert!(!window.next_sample(&mut chunk));
        assert_eq!(window.clock(), 2);
    }

    #[test]
    fn test_power_average_seeded() {
        let mut window = SignalWindow::new(SignalParams::new(10_000_000, 0.01));

        let mut chunk = std::iter::repeat(0.8f32).take(100);
        while window.next_sample(&mut chunk) {}

        // seeded from the first sample, constant input holds it there
        assert_approx_eq!(window.power_average(), 0.8f32);
    }

    #[test]
    fn test_power_average_tracks() {
        let mut window = SignalWindow::new(SignalParams::new(1_000_000, 0.01));

        let mut high = std::iter::repeat(1.0f32).take(10);
        while window.next_sample(&mut high) {}

        // a long run at a lower level drags the average down slowly
        let mut low = std::iter::repeat(0.5f32).take(1000);
        while window.next_sample(&mut low) {}

        assert!(window.power_average() < 1.0);
        assert!(window.power_average() > 0.5);
    }

    #[test]
    fn test_ring_wraps() {
        let mut window = SignalWindow::new(SignalParams::new(10_000_000, 0.01));

        let total = SIGNAL_BUFFER_LEN as u64 + 10;
        let mut chunk = (0..total).map(|n| n as f32);
        while window.next_sample(&mut chunk) {}

        assert_eq!(window.clock(), total);
        // the most recent sample is at the current clock
        assert_approx_eq!(window.sample(window.clock()), (total - 1) as f32);
    }

    #[test]
    fn test_reset() {
        let mut window = SignalWindow::new(SignalParams::new(10_000_000, 0.01));
        let mut chunk = std::iter::once(1.0f32);
        window.next_sample(&mut chunk);

        window.reset();
        assert_eq!(window.clock(), 0);
        assert_approx_eq!(window.power_average(), 0.0f32);
        assert_approx_eq!(window.sample(1), 0.0f32);
    }
}
