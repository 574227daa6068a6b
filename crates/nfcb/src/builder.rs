use crate::decoder::{ConfigError, NfcbDecoder};

/// Builds an NFC-B decoder
///
/// The builder carries sensible defaults for a clean SDR capture; the
/// only mandatory parameter is the input sampling rate. The defaults
/// are not part of any stability guarantee, so configure anything you
/// depend on explicitly.
///
/// ```
/// use nfcb::NfcbDecoderBuilder;
///
/// let rx = NfcbDecoderBuilder::new(10_000_000).build().unwrap();
/// assert_eq!(rx.sample_rate(), 10_000_000);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct NfcbDecoderBuilder {
    sample_rate: u32,
    minimum_modulation_threshold: f32,
    maximum_modulation_threshold: f32,
    power_level_threshold: f32,
}

impl NfcbDecoderBuilder {
    /// New builder for the given input sampling rate, in Hz
    ///
    /// The rate must resolve at least eight samples per symbol at the
    /// fastest configured bitrate, i.e. be at least a quarter of the
    /// 13.56 MHz carrier; [`build()`](Self::build) rejects anything
    /// lower.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            minimum_modulation_threshold: 0.10,
            maximum_modulation_threshold: 0.50,
            power_level_threshold: 0.01,
        }
    }

    /// Modulation depth acceptance band
    ///
    /// NFC-B polling uses roughly 10% ASK. Symbols shallower than
    /// `minimum` are read as plain carrier; a signal deeper than
    /// `maximum` is rejected as not NFC-B at all. Values are clamped
    /// to `0.0..=1.0` and ordered.
    pub fn with_modulation_threshold(&mut self, minimum: f32, maximum: f32) -> &mut Self {
        self.minimum_modulation_threshold = f32::clamp(minimum, 0.0, 1.0);
        self.maximum_modulation_threshold =
            f32::clamp(maximum, self.minimum_modulation_threshold, 1.0);
        self
    }

    /// Carrier power squelch
    ///
    /// Modulation search only runs while the power average exceeds
    /// `threshold`. Raise this if noise-floor captures produce
    /// spurious searches.
    pub fn with_power_threshold(&mut self, threshold: f32) -> &mut Self {
        self.power_level_threshold = f32::max(threshold, 0.0);
        self
    }

    /// Build the decoder chain
    ///
    /// Computes the per-bitrate timing tables; fails with
    /// [`ConfigError`] when the sample rate cannot resolve them.
    pub fn build(&self) -> Result<NfcbDecoder, ConfigError> {
        NfcbDecoder::try_from(self)
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn modulation_threshold(&self) -> (f32, f32) {
        (
            self.minimum_modulation_threshold,
            self.maximum_modulation_threshold,
        )
    }

    pub(crate) fn power_threshold(&self) -> f32 {
        self.power_level_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_defaults() {
        let builder = NfcbDecoderBuilder::new(10_000_000);
        let (minimum, maximum) = builder.modulation_threshold();

        assert_approx_eq!(minimum, 0.10f32);
        assert_approx_eq!(maximum, 0.50f32);
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_threshold_clamping() {
        let mut builder = NfcbDecoderBuilder::new(10_000_000);
        builder.with_modulation_threshold(-0.5, 2.0);

        let (minimum, maximum) = builder.modulation_threshold();
        assert_approx_eq!(minimum, 0.0f32);
        assert_approx_eq!(maximum, 1.0f32);

        // maximum never drops below minimum
        builder.with_modulation_threshold(0.4, 0.1);
        let (minimum, maximum) = builder.modulation_threshold();
        assert_approx_eq!(minimum, 0.4f32);
        assert_approx_eq!(maximum, 0.4f32);
    }

    #[test]
    fn test_rejects_low_sample_rate() {
        assert!(NfcbDecoderBuilder::new(1_000_000).build().is_err());
    }
}
