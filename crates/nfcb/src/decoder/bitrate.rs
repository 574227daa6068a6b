//! Per-bitrate symbol timing tables
//!
//! All symbol timing is precomputed at configure time from the sample
//! rate. Each rate derives its periods from the 13.56 MHz carrier:
//! a full symbol is `128 >> rate` carrier cycles, and the half, quarter
//! and eighth periods drive the edge-detector integrators and the
//! search windows.
//!
//! Rates are chained: each rate's detector pipeline is delayed by the
//! previous rate's full symbol so a single pass over the signal window
//! can service every rate. Emitted timing is compensated by this delay.

use thiserror::Error;

use super::signal::{SignalParams, SIGNAL_BUFFER_LEN};
use crate::waveform;

/// Symbol rates of the 14443 family
///
/// Only 106 kbps polling is searched in this revision; the 212 and
/// 424 kbps tables are computed and kept ready for the higher-rate
/// selection commands. 848 kbps is reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum RateType {
    #[strum(serialize = "106k")]
    R106k = 0,
    #[strum(serialize = "212k")]
    R212k = 1,
    #[strum(serialize = "424k")]
    R424k = 2,
}

/// Number of rate tables kept by the decoder
pub(crate) const RATE_COUNT: usize = 3;

/// Rates the SOF detector actually searches
pub(crate) const ACTIVE_POLL_RATES: [RateType; 1] = [RateType::R106k];

/// Rejected configuration
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The sample rate cannot resolve a symbol
    ///
    /// Every configured rate needs at least eight samples per symbol
    /// for the quarter/eighth-period integrators to exist.
    #[error("sample rate {sample_rate} Hz is too low for {rate} symbols ({period1} samples per symbol, need at least 8)")]
    SampleRateTooLow {
        sample_rate: u32,
        rate: RateType,
        period1: u32,
    },
}

/// Precomputed timing for one symbol rate
#[derive(Clone, Copy, Debug, Default)]
pub struct BitrateParams {
    /// Symbols per second at this rate
    pub symbols_per_second: u32,

    /// Samples per full symbol
    pub period1: u32,

    /// Samples per half symbol
    pub period2: u32,

    /// Samples per quarter symbol, the slow integrator length
    pub period4: u32,

    /// Samples per eighth symbol, the fast integrator length
    pub period8: u32,

    /// Cumulative delay of this rate's detector pipeline, in samples
    pub symbol_delay_detect: u32,

    /// Ring offset of the current sample
    pub offset_signal_index: u64,

    /// Ring offset one full symbol back
    pub offset_symbol_index: u64,

    /// Ring offset at the tail of the slow integrator
    pub offset_filter_index: u64,

    /// Ring offset at the tail of the fast integrator
    pub offset_detect_index: u64,

    /// Exponential symbol average weight for the previous estimate
    pub symbol_average_w0: f32,

    /// Exponential symbol average weight for the new sample
    pub symbol_average_w1: f32,
}

/// Build the timing tables for every configured rate
///
/// Fails when the sample rate is too low to resolve the fastest
/// configured rate's symbols.
pub(crate) fn bitrate_table(
    params: &SignalParams,
) -> Result<[BitrateParams; RATE_COUNT], ConfigError> {
    let mut table = [BitrateParams::default(); RATE_COUNT];
    let mut delay = 0u32;

    for (index, slot) in table.iter_mut().enumerate() {
        let rate = match index {
            0 => RateType::R106k,
            1 => RateType::R212k,
            _ => RateType::R424k,
        };

        let cycles = 128u32 >> index;
        let unit = params.sample_time_unit;

        let period1 = (unit * cycles as f32).round() as u32;
        if period1 < 8 {
            return Err(ConfigError::SampleRateTooLow {
                sample_rate: params.sample_rate,
                rate,
                period1,
            });
        }

        let period2 = (unit * (cycles >> 1) as f32).round() as u32;
        let period4 = (unit * (cycles >> 2) as f32).round() as u32;
        let period8 = (unit * (cycles >> 3) as f32).round() as u32;

        let buffer_len = SIGNAL_BUFFER_LEN as u64;
        let symbol_average_w0 = 1.0 - 5.0 / period1 as f32;

        *slot = BitrateParams {
            symbols_per_second: (waveform::CARRIER_HZ / cycles as f32) as u32,
            period1,
            period2,
            period4,
            period8,
            symbol_delay_detect: delay,
            offset_signal_index: buffer_len - delay as u64,
            offset_symbol_index: buffer_len - delay as u64 - period1 as u64,
            offset_filter_index: buffer_len - delay as u64 - period4 as u64,
            offset_detect_index: buffer_len - delay as u64 - period8 as u64,
            symbol_average_w0,
            symbol_average_w1: 1.0 - symbol_average_w0,
        };

        delay += period1;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    fn params(sample_rate: u32) -> SignalParams {
        SignalParams::new(sample_rate, 0.01)
    }

    #[test]
    fn test_table_10mhz() {
        let table = bitrate_table(&params(10_000_000)).unwrap();

        let r106 = &table[RateType::R106k as usize];
        assert_eq!(r106.symbols_per_second, 105_937);
        assert_eq!(r106.period1, 94);
        assert_eq!(r106.period2, 47);
        assert_eq!(r106.period4, 24);
        assert_eq!(r106.period8, 12);
        assert_eq!(r106.symbol_delay_detect, 0);
        assert_eq!(r106.offset_signal_index, SIGNAL_BUFFER_LEN as u64);
        assert_eq!(r106.offset_filter_index, SIGNAL_BUFFER_LEN as u64 - 24);
        assert_eq!(r106.offset_detect_index, SIGNAL_BUFFER_LEN as u64 - 12);

        let r212 = &table[RateType::R212k as usize];
        assert_eq!(r212.period1, 47);
        assert_eq!(r212.symbol_delay_detect, 94);

        let r424 = &table[RateType::R424k as usize];
        assert_eq!(r424.period1, 24);
        assert_eq!(r424.symbol_delay_detect, 94 + 47);
        assert_eq!(
            r424.offset_signal_index,
            SIGNAL_BUFFER_LEN as u64 - (94 + 47)
        );
    }

    #[test]
    fn test_symbol_average_weights() {
        let table = bitrate_table(&params(10_000_000)).unwrap();
        let r106 = &table[RateType::R106k as usize];

        assert_approx_eq!(r106.symbol_average_w0 + r106.symbol_average_w1, 1.0f32);
        assert_approx_eq!(r106.symbol_average_w0, 1.0 - 5.0 / 94.0, 1e-6);
    }

    #[test]
    fn test_sample_rate_too_low() {
        // 2 MHz leaves fewer than 8 samples per 424 kbps symbol
        match bitrate_table(&params(2_000_000)) {
            Err(ConfigError::SampleRateTooLow { rate, period1, .. }) => {
                assert_eq!(rate, RateType::R424k);
                assert!(period1 < 8);
            }
            other => panic!("expected SampleRateTooLow, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_rate_boundary() {
        // one quarter of the carrier frequency is the floor
        assert!(bitrate_table(&params(3_390_000)).is_ok());
        assert!(bitrate_table(&params(3_000_000)).is_err());
    }
}
