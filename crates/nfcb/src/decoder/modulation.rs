//! Per-rate demodulation state
//!
//! Each bitrate keeps its own pair of moving-average integrators, the
//! start-of-frame search state, and the predicted timing of the symbol
//! currently on the wire. Everything is plain sample-clock arithmetic;
//! the state is cleared as one unit whenever a search is abandoned.

/// Start-of-frame search progress
///
/// The NFC-B SOF is a falling edge, ten to eleven ETU of modulation,
/// a rising edge, two to three ETU of carrier, and a closing falling
/// edge. One stage per expected edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum SearchStage {
    /// Searching for the opening falling edge
    #[default]
    Begin,
    /// Inside the SOF low, waiting for the rising edge
    Idle,
    /// Inside the SOF high, waiting for the closing falling edge
    End,
}

/// Peak tracker for one edge search
///
/// `start`/`end` bound the window in sample clocks (`end` doubles as
/// the deadline that closes an open-ended search). The strongest edge
/// seen so far is held in `peak_value` at `peak_time`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SearchWindow {
    pub start: u64,
    pub end: u64,
    pub peak_time: Option<u64>,
    pub peak_value: f32,
}

impl SearchWindow {
    pub fn clear(&mut self) {
        *self = SearchWindow::default();
    }
}

/// Mutable demodulation state for one bitrate
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Modulation {
    /// Moving sum over the last quarter symbol
    pub filter_integrate: f32,

    /// Moving sum over the last eighth symbol
    pub detect_integrate: f32,

    /// Subcarrier phase accumulator, reserved for BPSK listen decoding
    pub phase_integrate: f32,

    pub stage: SearchStage,
    pub search: SearchWindow,

    /// Start of the symbol being tracked, absolute sample clock
    pub symbol_start: u64,

    /// Predicted end of the symbol being tracked
    pub symbol_end: u64,

    /// Mid-symbol clock where the bit decision is taken; zero requests
    /// a fresh prediction from `symbol_end`
    pub symbol_sync: u64,
}

impl Modulation {
    /// Drop all search and symbol state
    ///
    /// Also rebases the moving-sum integrators to zero; they resettle
    /// from the ring contents within a quarter symbol and stop
    /// accumulating floating-point drift across frames.
    pub fn reset(&mut self) {
        *self = Modulation::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_search() {
        let mut modulation = Modulation {
            filter_integrate: 12.5,
            detect_integrate: 6.0,
            stage: SearchStage::End,
            symbol_start: 100,
            symbol_end: 194,
            symbol_sync: 147,
            ..Modulation::default()
        };
        modulation.search.peak_time = Some(90);
        modulation.search.peak_value = 0.25;

        modulation.reset();

        assert_eq!(modulation.stage, SearchStage::Begin);
        assert_eq!(modulation.search.peak_time, None);
        assert_eq!(modulation.symbol_end, 0);
        assert_eq!(modulation.filter_integrate, 0.0);
    }

    #[test]
    fn test_search_window_clear() {
        let mut search = SearchWindow {
            start: 10,
            end: 20,
            peak_time: Some(15),
            peak_value: 0.5,
        };
        search.clear();

        assert_eq!(search.start, 0);
        assert_eq!(search.end, 0);
        assert_eq!(search.peak_time, None);
        assert_eq!(search.peak_value, 0.0);
    }
}
