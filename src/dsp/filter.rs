//! Generic FIR/IIR filter kernel and root-raised-cosine design.
//!
//! The [`Filter`] type implements a direct-form filter over complex
//! samples: an optional feedback section, a tap delay line, and a
//! feed-forward section. It is used both as the matched filter of the
//! demodulator (through [`rrc`]) and as a general building block for
//! loop filters.
//!
//! # Example
//!
//! ```
//! use num_complex::Complex;
//! use softsym::dsp::filter::rrc;
//!
//! // Root-raised-cosine matched filter, 65 taps, 4x oversampling
//! let mut filter = rrc(32, 4, 0.6);
//! assert_eq!(filter.taps(), 65);
//!
//! let y = filter.advance(Complex::new(1.0, 0.0));
//! assert!(y.re.is_finite());
//! ```

use std::f32::consts::PI;

use num_complex::Complex;

/// Direct-form digital filter over complex samples.
///
/// The filter is FIR when it has no feedback section. Coefficients are
/// fixed at construction; only the delay line mutates, one sample at a
/// time through [`advance`](Filter::advance). The delay line has the
/// same length as the feed-forward section.
#[derive(Debug)]
pub struct Filter {
    /// Feed-forward coefficients
    fwd: Vec<f32>,
    /// Feedback coefficients; index 0 is unused by convention
    back: Vec<f32>,
    /// Tap delay line, newest sample first
    mem: Vec<Complex<f32>>,
}

impl Filter {
    /// Create a FIR filter from its feed-forward coefficients.
    ///
    /// Coefficients are narrowed to `f32`; the delay line starts zeroed.
    ///
    /// # Panics
    ///
    /// Panics if `taps` is empty.
    pub fn fir(taps: &[f64]) -> Self {
        assert!(!taps.is_empty(), "filter needs at least one tap");

        Self {
            fwd: taps.iter().map(|&c| c as f32).collect(),
            back: Vec::new(),
            mem: vec![Complex::new(0.0, 0.0); taps.len()],
        }
    }

    /// Create an IIR filter from feed-forward and feedback coefficients.
    ///
    /// `back[0]` is conventionally unused (fixed at 1).
    ///
    /// # Panics
    ///
    /// Panics if `fwd` is empty or shorter than `back`.
    pub fn iir(fwd: &[f64], back: &[f64]) -> Self {
        assert!(!fwd.is_empty(), "filter needs at least one tap");
        assert!(
            back.len() <= fwd.len(),
            "feedback section longer than the delay line"
        );

        Self {
            fwd: fwd.iter().map(|&c| c as f32).collect(),
            back: back.iter().map(|&c| c as f32).collect(),
            mem: vec![Complex::new(0.0, 0.0); fwd.len()],
        }
    }

    /// Feed one sample through the filter and return the output.
    ///
    /// Runs in O(taps) and never fails.
    pub fn advance(&mut self, x: Complex<f32>) -> Complex<f32> {
        let mut x = x;

        // Feedback section computes the new delay-line head
        for i in 1..self.back.len() {
            x -= self.mem[i] * self.back[i];
        }

        let len = self.mem.len();
        self.mem.copy_within(0..len - 1, 1);
        self.mem[0] = x;

        let mut y = Complex::new(0.0, 0.0);
        for (m, c) in self.mem.iter().zip(self.fwd.iter()) {
            y += *m * *c;
        }
        y
    }

    /// Zero the delay line, keeping the coefficients.
    pub fn reset(&mut self) {
        self.mem.fill(Complex::new(0.0, 0.0));
    }

    /// Number of feed-forward taps.
    pub fn taps(&self) -> usize {
        self.fwd.len()
    }

    /// The feed-forward coefficients.
    pub fn coefficients(&self) -> &[f32] {
        &self.fwd
    }
}

impl Clone for Filter {
    /// An independent copy with its delay line reset to zero.
    fn clone(&self) -> Self {
        Self {
            fwd: self.fwd.clone(),
            back: self.back.clone(),
            mem: vec![Complex::new(0.0, 0.0); self.mem.len()],
        }
    }
}

/// Build a root-raised-cosine FIR matched filter.
///
/// The filter has `2 * order + 1` taps for an oversampling factor
/// `factor` and roll-off `alpha` in `(0, 1]`. The tap sum is left
/// unnormalized; downstream stages compensate through the interpolator
/// scale and the AGC.
pub fn rrc(order: usize, factor: usize, alpha: f32) -> Filter {
    let taps = 2 * order + 1;
    let coeffs: Vec<f64> = (0..taps)
        .map(|k| rrc_coeff(k, order, factor, alpha) as f64)
        .collect();
    Filter::fir(&coeffs)
}

/// Root-raised-cosine tap value for tap index `k`.
///
/// Both removable singularities of the closed form are special-cased:
/// the center tap (`t = 0`) and the `4*alpha*t = 1` point, which would
/// otherwise divide zero by zero.
fn rrc_coeff(k: usize, order: usize, factor: usize, alpha: f32) -> f32 {
    if k == order {
        return 1.0 - alpha + 4.0 * alpha / PI;
    }

    let t = (k as f32 - order as f32).abs() / factor as f32;
    let g = 1.0 - 16.0 * alpha * alpha * t * t;

    if g * g < 1e-10 {
        let g1 = 1.0 + 2.0 / PI;
        let g2 = (0.25 * PI / alpha).sin();
        let g3 = 1.0 - 2.0 / PI;
        let g4 = (0.25 * PI / alpha).cos();
        alpha / 2.0_f32.sqrt() * (g1 * g2 + g3 * g4)
    } else {
        let num = (PI * t * (1.0 - alpha)).sin() + 4.0 * alpha * t * (PI * t * (1.0 + alpha)).cos();
        num / (PI * t * g)
    }
}
