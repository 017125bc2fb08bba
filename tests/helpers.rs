//! Test helper utilities: in-memory sample sources, a shared byte sink
//! and synthetic signal generators.

use std::sync::{Arc, Mutex};

use num_complex::Complex;

use softsym::{Result, SampleSource};

/// In-memory sample source with a configurable per-read block cap.
pub struct VecSource {
    samples: Vec<Complex<f32>>,
    sample_rate: u32,
    pos: usize,
    max_block: usize,
    buf: Vec<Complex<f32>>,
}

impl VecSource {
    pub fn new(samples: Vec<Complex<f32>>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            pos: 0,
            max_block: usize::MAX,
            buf: Vec::new(),
        }
    }

    /// Cap every read at `max_block` samples, to exercise short reads.
    #[allow(dead_code)]
    pub fn with_max_block(mut self, max_block: usize) -> Self {
        self.max_block = max_block;
        self
    }
}

impl SampleSource for VecSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bytes_per_sample(&self) -> usize {
        std::mem::size_of::<Complex<f32>>()
    }

    fn read(&mut self, count: usize) -> Result<usize> {
        let n = count
            .min(self.max_block)
            .min(self.samples.len() - self.pos);
        self.buf.clear();
        self.buf
            .extend_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn data(&self) -> &[Complex<f32>] {
        &self.buf
    }

    fn size(&self) -> u64 {
        self.samples.len() as u64
    }

    fn done(&self) -> u64 {
        self.pos as u64
    }
}

/// A source that produces silence forever; only a stop request ends it.
pub struct EndlessSource {
    buf: Vec<Complex<f32>>,
    consumed: u64,
}

impl EndlessSource {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            consumed: 0,
        }
    }
}

impl SampleSource for EndlessSource {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn bytes_per_sample(&self) -> usize {
        std::mem::size_of::<Complex<f32>>()
    }

    fn read(&mut self, count: usize) -> Result<usize> {
        self.buf.clear();
        self.buf.resize(count, Complex::new(0.0, 0.0));
        self.consumed += count as u64;
        Ok(count)
    }

    fn data(&self) -> &[Complex<f32>] {
        &self.buf
    }

    fn size(&self) -> u64 {
        u64::MAX
    }

    fn done(&self) -> u64 {
        self.consumed
    }
}

/// Byte sink backed by a shared buffer, cloneable across threads.
#[derive(Clone)]
pub struct SharedSink(pub Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl std::io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A sink whose writes always fail, for fault-path tests.
#[allow(dead_code)]
pub struct FailingSink;

impl std::io::Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "sink closed",
        ))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Constant-symbol baseband: every sample is `value`.
#[allow(dead_code)]
pub fn dc_signal(value: Complex<f32>, num_samples: usize) -> Vec<Complex<f32>> {
    vec![value; num_samples]
}

/// Alternating-sign symbols on the Q axis, `sps` samples per symbol,
/// starting `offset` samples into the first symbol.
#[allow(dead_code)]
pub fn alternating_q_symbols(num_symbols: usize, sps: usize, offset: usize) -> Vec<Complex<f32>> {
    let mut out = Vec::with_capacity(num_symbols * sps);
    for k in 0..num_symbols {
        let q = if k % 2 == 0 { 1.0 } else { -1.0 };
        for _ in 0..sps {
            out.push(Complex::new(0.0, q));
        }
    }
    out.drain(..offset.min(out.len()));
    out
}
