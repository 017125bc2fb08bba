//! Interpolating source adapter.
//!
//! Wraps a [`SampleSource`] and exposes another source at `factor`
//! times its rate. Each input sample is held for `factor` output ticks
//! and pushed through the root-raised-cosine matched filter, so the
//! output is simultaneously upsampled and pulse-shaped. Outputs are
//! scaled by `1/sqrt(2)`.
//!
//! The first `order * factor` output samples are filter warm-up; the
//! demodulator driver discards exactly that many at startup.

use std::f32::consts::FRAC_1_SQRT_2;

use num_complex::Complex;

use crate::dsp::filter::{Filter, rrc};
use crate::error::Result;
use crate::source::SampleSource;

/// A sample source at `factor` times the rate of its backend.
pub struct Interpolator<S> {
    src: S,
    rrc: Filter,
    factor: usize,
    sample_rate: u32,
    buf: Vec<Complex<f32>>,
    count: usize,
}

impl<S: SampleSource> Interpolator<S> {
    /// Wrap `src` with an RRC interpolator of the given roll-off,
    /// half-order and integer upsampling factor.
    pub fn new(src: S, alpha: f32, order: usize, factor: usize) -> Self {
        let sample_rate = src.sample_rate() * factor as u32;
        Self {
            src,
            rrc: rrc(order, factor, alpha),
            factor,
            sample_rate,
            buf: Vec::new(),
            count: 0,
        }
    }
}

impl<S: SampleSource> SampleSource for Interpolator<S> {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bytes_per_sample(&self) -> usize {
        std::mem::size_of::<Complex<f32>>()
    }

    fn read(&mut self, count: usize) -> Result<usize> {
        if self.buf.len() < count {
            self.buf.resize(count, Complex::new(0.0, 0.0));
        }

        let produced = self.src.read(count.div_ceil(self.factor))?;
        if produced == 0 {
            self.count = 0;
            return Ok(0);
        }

        let avail = (produced * self.factor).min(count);
        let input = self.src.data();
        for i in 0..avail {
            self.buf[i] = self.rrc.advance(input[i / self.factor]) * FRAC_1_SQRT_2;
        }

        self.count = avail;
        Ok(avail)
    }

    fn data(&self) -> &[Complex<f32>] {
        &self.buf[..self.count]
    }

    // Progress is reported in backend samples
    fn size(&self) -> u64 {
        self.src.size()
    }

    fn done(&self) -> u64 {
        self.src.done()
    }
}
