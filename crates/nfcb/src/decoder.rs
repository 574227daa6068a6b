//! Full decoder chain
//!
//! [`NfcbDecoder`] owns the signal window and the NFC-B core and drives
//! them: while no frame is in flight every sample goes through the SOF
//! detector; once a start of frame locks, the core pulls samples until
//! the frame completes. Completed frames come out in frame-start order.

mod bitrate;
mod modulation;
mod nfcb;
mod protocol;
mod signal;

pub use self::bitrate::{BitrateParams, ConfigError, RateType};
pub use self::nfcb::NfcB;
pub use self::signal::{SignalParams, SignalWindow};

use crate::builder::NfcbDecoderBuilder;
use crate::frame::NfcFrame;

/// A complete NFC-B receive chain
///
/// Feed it chunks of baseband power samples (magnitude of the SDR's
/// I/Q stream, any scale) and collect decoded [`NfcFrame`]s:
///
/// ```
/// use nfcb::NfcbDecoderBuilder;
///
/// let mut rx = NfcbDecoderBuilder::new(10_000_000)
///     .with_modulation_threshold(0.10, 0.50)
///     .build()
///     .expect("sample rate too low");
///
/// let samples = vec![0.0f32; 4096];
/// let mut frames = Vec::new();
/// rx.process(&samples, &mut frames);
/// assert!(frames.is_empty());
/// ```
///
/// The decoder keeps all state between calls, so a capture can be
/// streamed through in chunks of any size.
#[derive(Clone, Debug)]
pub struct NfcbDecoder {
    signal: SignalWindow,
    nfcb: NfcB,
}

impl NfcbDecoder {
    /// Consume samples and append any completed frames
    ///
    /// Frames are appended to `frames` in frame-start order. A frame
    /// spanning the end of `samples` is continued on the next call.
    pub fn process(&mut self, samples: &[f32], frames: &mut Vec<NfcFrame>) {
        let mut chunk = samples.iter().copied();

        loop {
            if self.nfcb.is_active() {
                if self.nfcb.decode(&mut self.signal, &mut chunk, frames) {
                    // frame in flight, chunk exhausted
                    break;
                }
            } else if self.signal.next_sample(&mut chunk) {
                self.nfcb.detect(&self.signal);
            } else {
                break;
            }
        }
    }

    /// Decode frames from a source of samples
    ///
    /// Binds an iterator that consumes `samples` and yields each
    /// completed frame. The iterator returns `None` once the source is
    /// exhausted; decoder state is kept, so it may be re-bound to a
    /// later chunk of the same stream.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn iter_frames<'rx, I>(&'rx mut self, samples: I) -> impl Iterator<Item = NfcFrame> + 'rx
    where
        I: IntoIterator<Item = f32> + 'rx,
    {
        NfcbDecoderIter {
            receiver: self,
            source: samples.into_iter(),
            pending: Vec::new(),
        }
    }

    /// Input sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.signal.params().sample_rate
    }

    /// Lifetime count of processed samples
    pub fn sample_count(&self) -> u64 {
        self.signal.clock()
    }

    /// Direct access to the NFC-B core
    pub fn nfcb(&self) -> &NfcB {
        &self.nfcb
    }

    /// Clear all signal and decoding state
    ///
    /// The configured sample rate and thresholds are kept.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        let params = *self.signal.params();
        self.signal.reset();
        self.nfcb.configure(&params)
    }
}

impl TryFrom<&NfcbDecoderBuilder> for NfcbDecoder {
    type Error = ConfigError;

    fn try_from(builder: &NfcbDecoderBuilder) -> Result<Self, ConfigError> {
        let params = SignalParams::new(builder.sample_rate(), builder.power_threshold());

        let mut nfcb = NfcB::new();
        let (minimum, maximum) = builder.modulation_threshold();
        nfcb.set_modulation_threshold(minimum, maximum);
        nfcb.configure(&params)?;

        Ok(Self {
            signal: SignalWindow::new(params),
            nfcb,
        })
    }
}

struct NfcbDecoderIter<'rx, I>
where
    I: Iterator<Item = f32>,
{
    receiver: &'rx mut NfcbDecoder,
    source: I,
    pending: Vec<NfcFrame>,
}

impl<'rx, I> Iterator for NfcbDecoderIter<'rx, I>
where
    I: Iterator<Item = f32>,
{
    type Item = NfcFrame;

    fn next(&mut self) -> Option<NfcFrame> {
        while self.pending.is_empty() {
            let rx = &mut *self.receiver;

            if rx.nfcb.is_active() {
                if rx.nfcb.decode(&mut rx.signal, &mut self.source, &mut self.pending) {
                    break;
                }
            } else if rx.signal.next_sample(&mut self.source) {
                rx.nfcb.detect(&rx.signal);
            } else {
                break;
            }
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }
}
