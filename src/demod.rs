//! Demodulator driver.
//!
//! Composes the whole pipeline (source, interpolator with its matched
//! filter, AGC, Gardner timing recovery, Costas loop) and runs it on a
//! dedicated worker thread. The worker reads blocks from the
//! interpolated stream, extracts one sample per symbol with a
//! fractional-delay control loop and writes two signed soft-symbol
//! bytes per symbol to the output sink.
//!
//! The owning thread can query status at any time (`is_running`,
//! `bytes_out`, `pll_locked`, `freq_hz`, `gain`, progress counters),
//! request a stop and join the worker. Fatal source or sink faults are
//! surfaced through [`Demod::join`] instead of unwinding.

use std::f32::consts::PI;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use num_complex::Complex;
use tracing::{debug, info, warn};

use crate::dsp::agc::Agc;
use crate::dsp::costas::Costas;
use crate::error::{Error, Result};
use crate::interp::Interpolator;
use crate::source::SampleSource;

/// Input block size, in interpolated samples
pub const CHUNKSIZE: usize = 32_768;

/// Output flush threshold, in bytes; must stay even so I/Q pairs are
/// never split across writes
pub const SYM_CHUNKSIZE: usize = 1_024;

/// Gardner correction divisor; larger values make the timing loop
/// stiffer. Tuned for stability at a few tenths of a percent of symbol
/// rate error.
const RESYNC_GAIN: f32 = 2_000_000.0;

/// Demodulator configuration.
#[derive(Debug, Clone)]
pub struct DemodConfig {
    /// Interpolation factor, typically 2 to 8
    pub factor: usize,
    /// RRC matched filter half-length
    pub rrc_order: usize,
    /// RRC roll-off, in `(0, 1]`
    pub rrc_alpha: f32,
    /// Costas loop bandwidth in Hz
    pub pll_bw: f32,
    /// Symbol rate in symbols per second
    pub sym_rate: u32,
}

impl Default for DemodConfig {
    fn default() -> Self {
        Self {
            factor: 4,
            rrc_order: 64,
            rrc_alpha: 0.6,
            pll_bw: 100.0,
            sym_rate: 72_000,
        }
    }
}

impl DemodConfig {
    fn validate(&self) -> Result<()> {
        if self.factor == 0 {
            return Err(Error::config("interpolation factor must be positive"));
        }
        if self.rrc_order == 0 {
            return Err(Error::config("RRC filter order must be positive"));
        }
        if !(self.rrc_alpha > 0.0 && self.rrc_alpha <= 1.0) {
            return Err(Error::config("RRC roll-off must be in (0, 1]"));
        }
        if !(self.pll_bw > 0.0) {
            return Err(Error::config("PLL bandwidth must be positive"));
        }
        if self.sym_rate == 0 {
            return Err(Error::config("symbol rate must be positive"));
        }
        Ok(())
    }
}

/// Status block shared between the worker and the owning thread.
///
/// `bytes_out` and the scalar snapshots are plain atomics; `running`
/// uses release/acquire ordering since both sides write it.
struct Status {
    running: AtomicBool,
    bytes_out: AtomicU64,
    locked: AtomicBool,
    /// Carrier frequency estimate, f32 bits, radians per symbol
    freq: AtomicU32,
    /// AGC gain, f32 bits
    gain: AtomicU32,
    done: AtomicU64,
    failure: Mutex<Option<Error>>,
}

struct Pipeline<S> {
    interp: Interpolator<S>,
    agc: Agc,
    costas: Costas,
    sym_period: f32,
}

/// A running (or runnable) QPSK soft demodulator.
pub struct Demod<S> {
    status: Arc<Status>,
    pipeline: Option<Pipeline<S>>,
    worker: Option<JoinHandle<()>>,
    sym_rate: u32,
    size: u64,
}

impl<S: SampleSource + Send + 'static> Demod<S> {
    /// Build the pipeline around `src` and prime the matched filter.
    ///
    /// Validates the configuration synchronously and discards the
    /// `rrc_order * factor` warm-up samples of the interpolated stream.
    /// No worker is spawned yet; call [`start`](Demod::start).
    pub fn init(src: S, config: &DemodConfig) -> Result<Self> {
        config.validate()?;
        if src.sample_rate() == 0 {
            return Err(Error::config("source reports a zero sample rate"));
        }

        let mut interp = Interpolator::new(src, config.rrc_alpha, config.rrc_order, config.factor);
        let sym_period = interp.sample_rate() as f32 / config.sym_rate as f32;
        if sym_period < 2.0 {
            return Err(Error::config(
                "interpolated rate must be at least twice the symbol rate",
            ));
        }

        // Flush the matched filter transient
        interp.read(config.rrc_order * config.factor)?;

        let costas = Costas::new(2.0 * PI * config.pll_bw / config.sym_rate as f32);
        let size = interp.size();
        let done = interp.done();

        debug!(
            "demodulator: {} sym/s, period {:.3} samples at {} Hz",
            config.sym_rate,
            sym_period,
            interp.sample_rate()
        );

        let status = Arc::new(Status {
            running: AtomicBool::new(true),
            bytes_out: AtomicU64::new(0),
            locked: AtomicBool::new(false),
            freq: AtomicU32::new(0.0f32.to_bits()),
            gain: AtomicU32::new(1.0f32.to_bits()),
            done: AtomicU64::new(done),
            failure: Mutex::new(None),
        });

        Ok(Self {
            status,
            pipeline: Some(Pipeline {
                interp,
                agc: Agc::new(),
                costas,
                sym_period,
            }),
            worker: None,
            sym_rate: config.sym_rate,
            size,
        })
    }

    /// Spawn the worker thread.
    ///
    /// The sink is opened inside the worker and dropped before the
    /// thread exits; an open failure is surfaced through
    /// [`join`](Demod::join) like any other fatal fault.
    pub fn start<W, F>(&mut self, open_sink: F) -> Result<()>
    where
        W: Write,
        F: FnOnce() -> io::Result<W> + Send + 'static,
    {
        let Some(pipeline) = self.pipeline.take() else {
            return Err(Error::config("demodulator already started"));
        };

        let status = Arc::clone(&self.status);
        self.worker = Some(thread::spawn(move || {
            info!("demodulator worker started");
            if let Err(e) = run_worker(pipeline, open_sink, &status) {
                warn!("demodulator worker failed: {}", e);
                if let Ok(mut failure) = status.failure.lock() {
                    *failure = Some(e);
                }
            }
            status.running.store(false, Ordering::Release);
        }));
        Ok(())
    }

    /// Whether the worker is still processing. Turns false after
    /// end-of-stream, a fatal fault, or an observed stop request.
    pub fn is_running(&self) -> bool {
        self.status.running.load(Ordering::Acquire)
    }

    /// Whether the Costas loop currently reports carrier lock.
    pub fn pll_locked(&self) -> bool {
        self.status.locked.load(Ordering::Relaxed)
    }

    /// Bytes emitted so far; monotonically non-decreasing.
    pub fn bytes_out(&self) -> u64 {
        self.status.bytes_out.load(Ordering::Relaxed)
    }

    /// Input samples consumed so far, in source units.
    pub fn done(&self) -> u64 {
        self.status.done.load(Ordering::Relaxed)
    }

    /// Total input samples, in source units.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Carrier frequency offset estimate in Hz.
    pub fn freq_hz(&self) -> f32 {
        let freq = f32::from_bits(self.status.freq.load(Ordering::Relaxed));
        freq * self.sym_rate as f32 / (2.0 * PI)
    }

    /// Current AGC gain.
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.status.gain.load(Ordering::Relaxed))
    }

    /// Request the worker to stop at the next block boundary.
    pub fn stop(&self) {
        self.status.running.store(false, Ordering::Release);
    }

    /// Stop the worker, wait for it to flush and exit, and surface any
    /// fatal fault it recorded. Returns the final byte count.
    pub fn join(mut self) -> Result<u64> {
        self.status.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            return Err(Error::source("demodulator worker panicked"));
        }
        if let Ok(mut failure) = self.status.failure.lock()
            && let Some(e) = failure.take()
        {
            return Err(e);
        }
        Ok(self.status.bytes_out.load(Ordering::Relaxed))
    }
}

/// Saturating soft-symbol clamp; the output range is `[-127, 127]`.
fn clamp(x: f32) -> i8 {
    x.clamp(-127.0, 127.0).round() as i8
}

fn run_worker<S, W, F>(mut p: Pipeline<S>, open_sink: F, status: &Status) -> Result<()>
where
    S: SampleSource,
    W: Write,
    F: FnOnce() -> io::Result<W>,
{
    let mut sink = open_sink().map_err(Error::Sink)?;

    let period = p.sym_period;
    let mut out_buf: Vec<u8> = Vec::with_capacity(SYM_CHUNKSIZE);
    let mut resync_offset = 0.0f32;
    let mut before = Complex::new(0.0f32, 0.0);
    let mut mid = before;

    let mut result = Ok(());

    'blocks: while status.running.load(Ordering::Acquire) {
        let count = match p.interp.read(CHUNKSIZE) {
            Ok(0) => {
                debug!("end of stream reached");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                result = Err(e);
                break;
            }
        };

        for i in 0..count {
            let sample = p.interp.data()[i];

            if resync_offset >= period / 2.0 && resync_offset < period / 2.0 + 1.0 {
                // Halfway through the symbol: keep the transition sample
                mid = p.agc.apply(sample);
            } else if resync_offset >= period {
                // Symbol boundary: resample, correct timing, emit
                let cur = p.agc.apply(sample);

                // Input gaps can overshoot by several periods
                while resync_offset >= period {
                    resync_offset -= period;
                }

                let resync_error = (cur.im - before.im) * mid.im;
                resync_offset += resync_error * period / RESYNC_GAIN;
                before = cur;

                let symbol = p.costas.resync(cur);

                out_buf.push(clamp(symbol.re / 2.0) as u8);
                out_buf.push(clamp(symbol.im / 2.0) as u8);
                status.bytes_out.fetch_add(2, Ordering::Relaxed);

                if out_buf.len() >= SYM_CHUNKSIZE {
                    if let Err(e) = sink.write_all(&out_buf) {
                        result = Err(Error::Sink(e));
                        break 'blocks;
                    }
                    out_buf.clear();
                }
            }
            resync_offset += 1.0;
        }

        status
            .freq
            .store(p.costas.freq().to_bits(), Ordering::Relaxed);
        status.gain.store(p.agc.gain().to_bits(), Ordering::Relaxed);
        status
            .locked
            .store(p.costas.locked(), Ordering::Relaxed);
        status.done.store(p.interp.done(), Ordering::Relaxed);
    }

    // Flush pending symbols unless the sink itself is the fault
    if !matches!(result, Err(Error::Sink(_))) {
        let flushed = sink
            .write_all(&out_buf)
            .and_then(|()| sink.flush())
            .map_err(Error::Sink);
        if result.is_ok() {
            result = flushed;
        }
    }

    debug!(
        "worker exiting, {} bytes out",
        status.bytes_out.load(Ordering::Relaxed)
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_saturates_symmetrically() {
        assert_eq!(clamp(500.0), 127);
        assert_eq!(clamp(-500.0), -127);
        assert_eq!(clamp(127.4), 127);
        assert_eq!(clamp(-127.4), -127);
        assert_eq!(clamp(0.0), 0);
        assert_eq!(clamp(63.6), 64);
        assert_eq!(clamp(-63.6), -64);
    }

    #[test]
    fn test_config_validation() {
        let ok = DemodConfig::default();
        assert!(ok.validate().is_ok());

        let mut bad = DemodConfig::default();
        bad.factor = 0;
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let mut bad = DemodConfig::default();
        bad.rrc_order = 0;
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let mut bad = DemodConfig::default();
        bad.rrc_alpha = 0.0;
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let mut bad = DemodConfig::default();
        bad.rrc_alpha = 1.5;
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let mut bad = DemodConfig::default();
        bad.rrc_alpha = f32::NAN;
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let mut bad = DemodConfig::default();
        bad.sym_rate = 0;
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let mut bad = DemodConfig::default();
        bad.pll_bw = 0.0;
        assert!(matches!(bad.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_sym_chunksize_is_even() {
        assert_eq!(SYM_CHUNKSIZE % 2, 0);
    }
}
