#![doc = include_str!("../readme.md")]

pub mod demod;
pub mod dsp;
pub mod error;
pub mod interp;
pub mod source;

pub use demod::{CHUNKSIZE, Demod, DemodConfig, SYM_CHUNKSIZE};
pub use error::{Error, Result};
pub use interp::Interpolator;
pub use source::{IqFormat, RawIqSource, SampleSource, WavSource};
