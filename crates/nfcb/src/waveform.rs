//! NFC-B waveform parameters
//!
//! Wire-level constants for ISO/IEC 14443-3 Type B and helpers to map
//! carrier-cycle timing onto the input sample clock. The poll direction
//! is ASK with roughly 10% modulation depth: a logic 0 is one elementary
//! time unit (ETU) of modulated carrier, a logic 1 is one ETU of plain
//! carrier. An ETU is 128 carrier cycles at the base 106 kbps rate.

/// Carrier frequency of the operating field (Hz)
pub const CARRIER_HZ: f32 = 13.56e6;

/// Listen-side subcarrier frequency (Hz), fc/16
pub const SUBCARRIER_HZ: f32 = CARRIER_HZ / 16.0;

/// Elementary time unit at 106 kbps, in seconds
pub const ETU_SECONDS: f32 = 128.0 / CARRIER_HZ;

/// REQB/WUPB command byte
///
/// REQB and WUPB share the 0x05 anti-collision prefix; they differ only
/// in a PARAM bit, so recognizing 0x05 covers both.
pub const REQB_COMMAND: u8 = 0x05;

/// Length of a REQB/WUPB frame, CRC included
pub const REQB_FRAME_LENGTH: usize = 5;

/// Frame guard time TR0min, in carrier cycles
pub const FRAME_GUARD_CYCLES: u32 = 128 * 7;

/// Default frame waiting time, 256 × 16 × 2⁴ carrier cycles
pub const FRAME_WAITING_CYCLES: u32 = 256 * 16 * (1 << 4);

/// Default start-up frame guard time, 256 × 16 carrier cycles
pub const STARTUP_GUARD_CYCLES: u32 = 256 * 16;

/// Minimum time between consecutive poll requests, in carrier cycles
pub const REQUEST_GUARD_CYCLES: u32 = 7000;

/// ATQB response window: the answer must start within 128 × 18 cycles
pub const REQB_WAITING_CYCLES: u32 = 128 * 18;

/// Ratio of the sample clock to the carrier frequency
///
/// Multiply a duration in carrier cycles by this to get samples.
pub fn sample_time_unit(sample_rate: u32) -> f32 {
    sample_rate as f32 / CARRIER_HZ
}

/// Samples per 106 kbps symbol at the given sampling rate, fractional
pub fn samples_per_etu(sample_rate: u32) -> f32 {
    sample_time_unit(sample_rate) * 128.0
}

/// Expand one byte into its ten line symbols
///
/// NFC-B poll characters are one start bit (modulated, 0), eight data
/// bits least-significant first, and one stop bit (unmodulated, 1).
/// `true` is unmodulated carrier.
#[cfg(test)]
pub fn character_symbols(byte: u8) -> [bool; 10] {
    let mut symbols = [false; 10];
    for (bit, symbol) in symbols[1..9].iter_mut().enumerate() {
        *symbol = (byte >> bit) & 1 == 1;
    }
    symbols[9] = true;
    symbols
}

/// Expand a payload into the full poll-frame symbol stream
///
/// Prepends the start of frame (ten ETU of modulation, then
/// `sof_high_etus` of carrier) and appends the ten-ETU end of frame.
#[cfg(test)]
pub fn frame_symbols(payload: &[u8], sof_high_etus: usize) -> Vec<bool> {
    let mut symbols = vec![false; 10];
    symbols.extend(std::iter::repeat(true).take(sof_high_etus));
    for &byte in payload {
        symbols.extend_from_slice(&character_symbols(byte));
    }
    symbols.extend(std::iter::repeat(false).take(10));
    symbols
}

/// Render level runs into power samples
///
/// Each run is a duration in ETUs and a line level (`true` = carrier).
/// Boundaries accumulate in floating point so a fractional `etu_samples`
/// models a transmitter clock that drifts against the receiver's symbol
/// tables.
#[cfg(test)]
pub fn modulate_runs(
    runs: &[(f32, bool)],
    etu_samples: f32,
    high: f32,
    low: f32,
) -> nalgebra::DVector<f32> {
    let mut out: Vec<f32> = Vec::new();
    let mut edge = 0.0f64;

    for &(etus, level) in runs {
        edge += etus as f64 * etu_samples as f64;
        out.resize(edge.round() as usize, if level { high } else { low });
    }

    nalgebra::DVector::from_vec(out)
}

/// Render a symbol stream into power samples, one ETU per symbol
#[cfg(test)]
pub fn modulate_ask(
    symbols: &[bool],
    etu_samples: f32,
    high: f32,
    low: f32,
) -> nalgebra::DVector<f32> {
    let runs: Vec<(f32, bool)> = symbols.iter().map(|&level| (1.0f32, level)).collect();
    modulate_runs(&runs, etu_samples, high, low)
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_sample_time_unit() {
        assert_approx_eq!(sample_time_unit(13_560_000), 1.0f32);
        assert_approx_eq!(sample_time_unit(10_000_000), 0.73746f32, 1e-4);
        assert_approx_eq!(samples_per_etu(10_000_000), 94.395f32, 1e-2);
    }

    #[test]
    fn test_character_symbols() {
        // 0x05: start, then 1 0 1 0 0 0 0 0 LSB first, then stop
        let symbols = character_symbols(0x05);
        assert_eq!(
            symbols,
            [false, true, false, true, false, false, false, false, false, true]
        );
    }

    #[test]
    fn test_frame_symbols_shape() {
        let symbols = frame_symbols(&[0xFF], 3);
        assert_eq!(symbols.len(), 10 + 3 + 10 + 10);
        assert!(symbols[..10].iter().all(|&s| !s));
        assert!(symbols[10..13].iter().all(|&s| s));
        assert!(symbols[symbols.len() - 10..].iter().all(|&s| !s));
    }

    #[test]
    fn test_modulate_ask_levels() {
        let samples = modulate_ask(&[true, false, true], 4.0, 1.0, 0.9);
        assert_eq!(samples.len(), 12);
        assert_approx_eq!(samples[0], 1.0f32);
        assert_approx_eq!(samples[5], 0.9f32);
        assert_approx_eq!(samples[11], 1.0f32);
    }

    #[test]
    fn test_modulate_runs_fractional() {
        // fractional ETUs land on rounded sample boundaries
        let samples = modulate_runs(&[(1.5, true), (1.5, false)], 10.0, 1.0, 0.0);
        assert_eq!(samples.len(), 30);
        assert_approx_eq!(samples[14], 1.0f32);
        assert_approx_eq!(samples[15], 0.0f32);
    }
}
