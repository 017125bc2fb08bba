//! Soft-decision QPSK demodulator front-end.
//!
//! Reads a baseband capture (WAV or raw I/Q), runs the demodulator
//! pipeline on a worker thread and writes soft symbols to a file while
//! reporting progress, carrier offset and PLL lock on the console.
//!
//! # Usage Examples
//!
//! ## WAV capture at the default 72 kBd
//! ```bash
//! softsym capture.wav -o capture.s
//! ```
//!
//! ## Raw cs16 I/Q, explicit sample and symbol rates
//! ```bash
//! softsym capture.iq --format cs16 -s 140000 -r 80000 -v
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::info;

use softsym::{Demod, DemodConfig, Error, IqFormat, RawIqSource, SampleSource, WavSource};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputFormat {
    /// 2-channel PCM WAV (I left, Q right)
    Wav,
    /// Complex unsigned 8-bit
    Cu8,
    /// Complex signed 8-bit
    Cs8,
    /// Complex signed 16-bit
    Cs16,
    /// Complex 32-bit float
    Cf32,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Soft-decision QPSK demodulator for baseband recordings", long_about = None)]
struct Args {
    /// Input capture file
    input: PathBuf,

    /// Output file for soft symbols (default: input with a .s extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Costas loop bandwidth in Hz
    #[arg(short = 'b', long, default_value_t = 100.0)]
    pll_bw: f32,

    /// Symbol rate in symbols per second
    #[arg(short = 'r', long, default_value_t = 72_000)]
    rate: u32,

    /// Interpolator oversampling factor
    #[arg(short = 'O', long, default_value_t = 4)]
    oversamp: usize,

    /// RRC filter roll-off
    #[arg(short = 'a', long, default_value_t = 0.6)]
    alpha: f32,

    /// RRC filter order (half-length)
    #[arg(short = 'f', long, default_value_t = 64)]
    fir_order: usize,

    /// Override the input sample rate (required for raw I/Q formats)
    #[arg(short = 's', long)]
    samplerate: Option<u32>,

    /// Input format
    #[arg(long, value_enum, default_value = "wav")]
    format: InputFormat,

    /// Status refresh interval in milliseconds
    #[arg(short = 'R', long, default_value_t = 500)]
    refresh_rate: u64,

    /// Do not print periodic status lines
    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> softsym::Result<()> {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    let source: Box<dyn SampleSource + Send> = match args.format {
        InputFormat::Wav => Box::new(WavSource::open(&args.input, args.samplerate)?),
        raw => {
            let rate = args.samplerate.ok_or_else(|| {
                Error::config("--samplerate is required for raw I/Q formats")
            })?;
            let format = match raw {
                InputFormat::Cu8 => IqFormat::Cu8,
                InputFormat::Cs8 => IqFormat::Cs8,
                InputFormat::Cs16 => IqFormat::Cs16,
                InputFormat::Cf32 => IqFormat::Cf32,
                InputFormat::Wav => unreachable!(),
            };
            Box::new(RawIqSource::open(&args.input, format, rate)?)
        }
    };

    let out_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("s"));

    info!(
        "input: {} at {} Hz, output: {}",
        args.input.display(),
        source.sample_rate(),
        out_path.display()
    );

    let config = DemodConfig {
        factor: args.oversamp,
        rrc_order: args.fir_order,
        rrc_alpha: args.alpha,
        pll_bw: args.pll_bw,
        sym_rate: args.rate,
    };

    let mut demod = Demod::init(source, &config)?;
    let sink_path = out_path.clone();
    demod.start(move || std::fs::File::create(&sink_path).map(std::io::BufWriter::new))?;
    info!("demodulator initialized");

    let total = demod.size();
    let refresh = Duration::from_millis(args.refresh_rate.max(1));

    while demod.is_running() {
        if !args.quiet {
            let percent = if total > 0 {
                demod.done() as f32 / total as f32 * 100.0
            } else {
                0.0
            };
            eprintln!(
                "({:5.1}%) carrier: {:+7.1} Hz, gain: {:7.2}, out: {} B, locked: {}",
                percent,
                demod.freq_hz(),
                demod.gain(),
                demod.bytes_out(),
                if demod.pll_locked() { "yes" } else { "no" }
            );
        }
        thread::sleep(refresh);
    }

    let bytes = demod.join()?;
    if !args.quiet {
        eprintln!(
            "decoding completed: {} bytes of soft symbols written to {}",
            bytes,
            out_path.display()
        );
    }
    Ok(())
}
