//! Costas loop for QPSK carrier recovery.
//!
//! A decision-directed phase-locked loop that removes residual carrier
//! frequency and phase from the recovered symbol stream. The phase
//! detector is the classic four-quadrant QPSK discriminant
//! `sign(Re) * Im - sign(Im) * Re`, driving a second-order
//! proportional-integral loop filter.
//!
//! Lock detection keeps a slow moving average of the error magnitude
//! with hysteresis between the lock and unlock thresholds. While
//! locked, the loop narrows its bandwidth to reject noise and restores
//! it on unlock.
//!
//! # Example
//!
//! ```
//! use num_complex::Complex;
//! use softsym::dsp::costas::Costas;
//!
//! let mut costas = Costas::new(0.05);
//! let y = costas.resync(Complex::new(127.0, 127.0));
//! assert!(!costas.locked());
//! assert!(y.norm() > 0.0);
//! ```

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use num_complex::Complex;

/// Loop damping factor (critically damped)
const DAMPING: f32 = FRAC_1_SQRT_2;

/// Phase detector normalization, matched to the AGC amplitude rails
const ERROR_SCALE: f32 = 255.0;

/// Moving-average window of the lock estimator, in symbols
const AVG_WINSIZE: f32 = 500.0;

/// Error averages below this mark the loop as locked
const LOCK_THRESHOLD: f32 = 0.12;

/// Error averages above this mark the loop as unlocked
const UNLOCK_THRESHOLD: f32 = 0.25;

/// Bandwidth reduction applied while the loop is locked
const LOCKED_BW_REDUCE: f32 = 3.0;

/// Symbols with squared magnitude below this do not update the lock
/// estimator; a silent stream must never read as locked
const MIN_LOCK_POWER: f32 = 1e-6;

/// Second-order Costas loop for QPSK.
#[derive(Debug, Clone)]
pub struct Costas {
    phase: f32,
    freq: f32,
    kp: f32,
    ki: f32,
    bw: f32,
    err_avg: f32,
    locked: bool,
}

impl Costas {
    /// Create a Costas loop with the given normalized bandwidth, in
    /// radians per symbol.
    pub fn new(bw: f32) -> Self {
        let (kp, ki) = loop_gains(bw, DAMPING);
        Self {
            phase: 0.0,
            freq: 0.0,
            kp,
            ki,
            bw,
            err_avg: 1.0,
            locked: false,
        }
    }

    /// Correct one symbol for the current carrier estimate and advance
    /// the loop.
    pub fn resync(&mut self, x: Complex<f32>) -> Complex<f32> {
        let y = x * Complex::from_polar(1.0, -self.phase);

        let error = (phase_error(y) / ERROR_SCALE).clamp(-1.0, 1.0);

        if y.norm_sqr() > MIN_LOCK_POWER {
            self.err_avg = (self.err_avg * (AVG_WINSIZE - 1.0) + error.abs()) / AVG_WINSIZE;
            self.update_lock();
        }

        self.freq += self.ki * error;
        self.phase = wrap_phase(self.phase + self.freq + self.kp * error);

        y
    }

    /// Whether the loop currently considers itself locked.
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Current carrier frequency estimate, in radians per symbol.
    pub fn freq(&self) -> f32 {
        self.freq
    }

    /// Current carrier phase estimate, in `[-pi, pi)`.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    fn update_lock(&mut self) {
        if !self.locked && self.err_avg < LOCK_THRESHOLD {
            self.locked = true;
            self.retune(self.bw / LOCKED_BW_REDUCE);
        } else if self.locked && self.err_avg > UNLOCK_THRESHOLD {
            self.locked = false;
            self.retune(self.bw);
        }
    }

    fn retune(&mut self, bw: f32) {
        let (kp, ki) = loop_gains(bw, DAMPING);
        self.kp = kp;
        self.ki = ki;
    }
}

/// QPSK decision-directed phase discriminant.
///
/// An exactly-zero component contributes no decision, so a symbol on an
/// axis is already an equilibrium point.
fn phase_error(y: Complex<f32>) -> f32 {
    slice(y.re) * y.im - slice(y.im) * y.re
}

fn slice(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Proportional and integral gains of a second-order loop for the given
/// normalized bandwidth and damping.
fn loop_gains(bw: f32, damping: f32) -> (f32, f32) {
    let denom = 1.0 + 2.0 * damping * bw + bw * bw;
    ((4.0 * damping * bw) / denom, (4.0 * bw * bw) / denom)
}

/// Wrap a phase to `[-pi, pi)`.
pub fn wrap_phase(mut phase: f32) -> f32 {
    while phase >= PI {
        phase -= 2.0 * PI;
    }
    while phase < -PI {
        phase += 2.0 * PI;
    }
    phase
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic pseudo-random phase generator for noise tests
    struct Lcg(u32);

    impl Lcg {
        fn next_phase(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (self.0 >> 8) as f32 / (1 << 24) as f32 * 2.0 * PI - PI
        }
    }

    fn diagonal_symbol(offset: f32) -> Complex<f32> {
        Complex::from_polar(180.0, PI / 4.0 + offset)
    }

    #[test]
    fn test_wrap_phase_range() {
        for p in [-10.0f32, -PI, -0.5, 0.0, 0.5, PI, 10.0, 42.0] {
            let w = wrap_phase(p);
            assert!((-PI..PI).contains(&w), "{} wrapped to {}", p, w);
        }
        assert_relative_eq!(wrap_phase(PI), -PI);
        assert_relative_eq!(wrap_phase(-PI), -PI);
    }

    #[test]
    fn test_static_phase_correction() {
        let mut costas = Costas::new(0.05);
        let offset = 0.3f32;

        let mut last = Complex::new(0.0, 0.0);
        for _ in 0..2_000 {
            last = costas.resync(diagonal_symbol(offset));
        }

        // Converged output sits back on the diagonal
        let angle = last.im.atan2(last.re);
        assert_relative_eq!(angle, PI / 4.0, epsilon = 0.05);
    }

    #[test]
    fn test_frequency_offset_pull_in() {
        // 100 Hz offset at 4160 symbols per second
        let sym_rate = 4160.0f32;
        let freq_offset_hz = 100.0f32;
        let step = 2.0 * PI * freq_offset_hz / sym_rate;

        let mut costas = Costas::new(2.0 * PI * 100.0 / sym_rate);

        let mut phase = 0.0f32;
        for _ in 0..(sym_rate as usize) {
            costas.resync(Complex::from_polar(180.0, PI / 4.0 + phase));
            phase = wrap_phase(phase + step);
        }

        let freq_hz = costas.freq() * sym_rate / (2.0 * PI);
        assert!(
            (freq_hz - freq_offset_hz).abs() < 2.0,
            "carrier estimate {:.2} Hz, expected ~{} Hz",
            freq_hz,
            freq_offset_hz
        );
        assert!(costas.locked(), "loop should have locked after pull-in");
    }

    #[test]
    fn test_lock_acquired_on_clean_symbols() {
        let mut costas = Costas::new(0.05);
        for _ in 0..5_000 {
            costas.resync(diagonal_symbol(0.0));
        }
        assert!(costas.locked());
    }

    #[test]
    fn test_lock_hysteresis() {
        let mut costas = Costas::new(0.05);

        // Acquire lock on clean symbols
        for _ in 0..5_000 {
            costas.resync(diagonal_symbol(0.0));
        }
        assert!(costas.locked());

        // Moderate jitter lands the error average between the two
        // thresholds; the loop must stay locked
        let mut sign = 1.0f32;
        for _ in 0..5_000 {
            costas.resync(diagonal_symbol(sign * 0.18));
            sign = -sign;
        }
        assert!(costas.locked(), "hysteresis band must not clear the lock");

        // Uniformly random phases push the error average past the
        // unlock threshold
        let mut rng = Lcg(0x1234_5678);
        for _ in 0..10_000 {
            costas.resync(Complex::from_polar(180.0, rng.next_phase()));
        }
        assert!(!costas.locked(), "noise must clear the lock");
    }

    #[test]
    fn test_zero_input_never_locks() {
        let mut costas = Costas::new(0.05);
        for _ in 0..100_000 {
            let y = costas.resync(Complex::new(0.0, 0.0));
            assert_eq!(y, Complex::new(0.0, 0.0));
        }
        assert!(!costas.locked());
        assert_relative_eq!(costas.freq(), 0.0);
    }

    #[test]
    fn test_axis_symbol_is_equilibrium() {
        let mut costas = Costas::new(0.05);
        for _ in 0..1_000 {
            costas.resync(Complex::new(180.0, 0.0));
        }
        // A purely real symbol generates no phase error
        assert_relative_eq!(costas.phase(), 0.0);
        assert_relative_eq!(costas.freq(), 0.0);
    }
}
