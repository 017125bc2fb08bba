//! Automatic Gain Control (AGC)
//!
//! Normalizes the instantaneous magnitude of the symbol stream toward a
//! fixed target so the soft-symbol clamp downstream sees a stable
//! amplitude regardless of the capture level.
//!
//! The gain follows the inverse of a first-order moving average of the
//! input magnitude: for a stationary signal of magnitude `A` the gain
//! settles at `target / A` within a few window lengths.

use num_complex::Complex;

/// Moving-average window length, in processed samples
const AGC_WINSIZE: f32 = 256.0;

/// Target output magnitude; diagonal QPSK rails land near ±127
const AGC_TARGET: f32 = 180.0;

/// Envelope floor below which the gain is frozen
const AGC_MIN_AVG: f32 = 1e-6;

/// Automatic gain control for complex samples.
#[derive(Debug, Clone)]
pub struct Agc {
    window: f32,
    target: f32,
    avg: f32,
    gain: f32,
}

impl Agc {
    /// Create an AGC with the default window and target.
    pub fn new() -> Self {
        Self::with_params(AGC_WINSIZE, AGC_TARGET)
    }

    /// Create an AGC with a custom averaging window and target magnitude.
    pub fn with_params(window: f32, target: f32) -> Self {
        Self {
            window,
            target,
            avg: target,
            gain: 1.0,
        }
    }

    /// Scale one sample by the current gain and update the gain from
    /// the observed magnitude.
    ///
    /// The gain stays strictly positive; a silent stretch freezes it
    /// instead of driving it to infinity.
    pub fn apply(&mut self, x: Complex<f32>) -> Complex<f32> {
        let mag = x.norm();
        self.avg = (self.avg * (self.window - 1.0) + mag) / self.window;
        if self.avg > AGC_MIN_AVG {
            self.gain = self.target / self.avg;
        }
        x * self.gain
    }

    /// Current gain value.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Restore the initial state.
    pub fn reset(&mut self) {
        self.avg = self.target;
        self.gain = 1.0;
    }
}

impl Default for Agc {
    fn default() -> Self {
        Self::new()
    }
}
