use std::io;

use anyhow::{anyhow, Context};
use byteorder::{LittleEndian, ReadBytesExt};
use clap::Parser;
use log::{info, LevelFilter};

use nfcb::NfcbDecoderBuilder;

mod cli;

use cli::Args;

// samples per read, sized well below one frame
const CHUNK_SAMPLES: usize = 16384;

fn main() -> anyhow::Result<()> {
    // Parse options and start logging
    let args = Args::parse();
    log_setup(&args);

    // create the decoder
    let mut rx = NfcbDecoderBuilder::new(args.rate)
        .with_modulation_threshold(args.min_modulation, args.max_modulation)
        .with_power_threshold(args.power_threshold)
        .build()
        .with_context(|| format!("unusable --rate {}", args.rate))?;

    // file setup: locks stdin in case we need it
    let stdin = io::stdin();
    let stdin_handle = stdin.lock();
    let mut inbuf = file_setup(&args, stdin_handle)?;

    let mut chunk = vec![0.0f32; CHUNK_SAMPLES];
    let mut frames = Vec::new();
    let mut frame_count = 0usize;

    loop {
        let filled = read_chunk(&mut inbuf, &mut chunk)?;
        if filled == 0 {
            break;
        }

        rx.process(&chunk[..filled], &mut frames);

        for frame in frames.drain(..) {
            frame_count += 1;
            if !args.quiet {
                println!("#{} {}", frame_count, frame);
            }
        }
    }

    info!(
        "processed {} samples ({:.3} s), {} frames",
        rx.sample_count(),
        rx.sample_count() as f64 / args.rate as f64,
        frame_count
    );

    Ok(())
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("nfcb", log_filter)
            .filter_module("nfcbdec", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}

fn file_setup<'stdin>(
    args: &Args,
    stdin: std::io::StdinLock<'stdin>,
) -> Result<Box<dyn io::BufRead + 'stdin>, anyhow::Error> {
    if args.input_is_stdin() {
        info!("NFC-B decoder reading standard input");
        if !is_terminal(&std::io::stdin()) {
            Ok(Box::new(io::BufReader::new(stdin)))
        } else {
            Err(anyhow!(
                "cowardly refusing to read radio samples from a terminal.

Pipe a source of raw f32 power samples from your SDR toolchain
into this program, or name a capture file."
            ))
        }
    } else {
        info!("NFC-B decoder reading file: \"{}\"", &args.file);
        Ok(Box::new(io::BufReader::new(
            std::fs::File::open(&args.file)
                .with_context(|| format!("Unable to open file \"{}\"", args.file))?,
        )))
    }
}

// Fill `chunk` with as many f32 samples as the input still has.
// Returns the number of samples read; zero at end of stream.
fn read_chunk<R>(reader: &mut R, chunk: &mut [f32]) -> anyhow::Result<usize>
where
    R: io::Read,
{
    let mut filled = 0usize;

    while filled < chunk.len() {
        match reader.read_f32::<LittleEndian>() {
            Ok(sample) => {
                chunk[filled] = sample;
                filled += 1;
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err).context("error reading samples"),
        }
    }

    Ok(filled)
}

#[cfg(not(target_os = "windows"))]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::fd::AsRawFd,
{
    terminal_size::terminal_size_using_fd(stream.as_raw_fd()).is_some()
}

#[cfg(target_os = "windows")]
fn is_terminal<S>(stream: &S) -> bool
where
    S: std::os::windows::io::AsRawHandle,
{
    terminal_size::terminal_size_using_handle(stream.as_raw_handle()).is_some()
}
