use clap::Parser;

/// Standard input filename
const STDIN_FILE: &str = "-";

const USAGE_SHORT: &str = r#"
This program accepts raw baseband power samples in 32-bit float (f32) little-endian format, at the given sampling --rate, and decodes any NFC-B poll frames that are present. Decoded frames are printed one per line with their timing, flags, and payload bytes in hex.

See --help for more details.
"#;

const USAGE_LONG: &str = r#"
This program accepts raw baseband power samples in 32-bit float (f32) little-endian format, at the given sampling --rate, and decodes any NFC-B poll frames that are present. Decoded frames are printed one per line with their timing, flags, and payload bytes in hex.

The samples are the magnitude (or squared magnitude) of an I/Q capture centered on the 13.56 MHz carrier. Any amplitude scale works; modulation is judged relative to a running power average. The sampling rate must be at least a quarter of the carrier frequency. 10 MHz is a comfortable choice.

You can feed a capture recorded with an RTL-SDR-class frontend after magnitude conversion, for example:

    nfcbdec --rate 10000000 capture.f32

or stream from a pipeline:

    magnitude_convert | nfcbdec --rate 10000000
"#;

const ADVANCED: &str = "Advanced Detector Options";

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print NOTHING, not even decoded frames
    #[arg(short, long)]
    pub quiet: bool,

    /// Sampling rate (Hz)
    ///
    /// Set to the sampling rate of your capture. Must be at least a
    /// quarter of the 13.56 MHz carrier frequency.
    #[arg(short, long, default_value_t = 10_000_000)]
    pub rate: u32,

    /// Input file (or "-" for stdin)
    ///
    /// The input must be raw f32 little-endian power samples at
    /// --rate, one channel.
    #[arg(default_value_t = STDIN_FILE.to_string())]
    pub file: String,

    /// Minimum modulation depth accepted as NFC-B
    #[arg(long, default_value_t = 0.10)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub min_modulation: f32,

    /// Maximum modulation depth accepted as NFC-B
    #[arg(long, default_value_t = 0.50)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub max_modulation: f32,

    /// Carrier power squelch threshold
    #[arg(long, default_value_t = 0.01)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub power_threshold: f32,
}

impl Args {
    /// True if the input file is standard input
    pub fn input_is_stdin(&self) -> bool {
        self.file == STDIN_FILE
    }
}
