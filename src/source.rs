//! Sample sources
//!
//! This module defines the [`SampleSource`] capability that every stage
//! of the demodulator consumes, plus two concrete file-backed sources:
//! [`WavSource`] for 2-channel PCM WAV captures and [`RawIqSource`] for
//! headerless I/Q files in the common byte formats.
//!
//! A source hands out blocks of complex baseband samples through an
//! internal buffer: `read(n)` fills the buffer with up to `n` fresh
//! samples and `data()` borrows the block until the next `read`. A
//! produced count of zero signals end-of-stream.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use num_complex::Complex;

use crate::error::{Error, Result};

/// A stream of complex baseband samples.
///
/// Implementors buffer one block at a time: after `read(n)` returns
/// `Ok(p)`, `data()` holds the `p` newest samples (`p <= n`). The buffer
/// may be reallocated by every `read` call, so borrows of `data()` do
/// not survive across reads. `read` returning `Ok(0)` means the stream
/// is exhausted. Resources are released on drop.
pub trait SampleSource {
    /// Sample rate of this source in Hz.
    fn sample_rate(&self) -> u32;

    /// Size of one sample in the backing store, in bytes.
    fn bytes_per_sample(&self) -> usize;

    /// Read up to `count` samples into the internal buffer.
    ///
    /// Returns the number of samples produced, `0` at end-of-stream.
    fn read(&mut self, count: usize) -> Result<usize>;

    /// The block produced by the last `read`.
    fn data(&self) -> &[Complex<f32>];

    /// Total number of samples in the stream, when known.
    fn size(&self) -> u64;

    /// Number of samples consumed so far.
    fn done(&self) -> u64;
}

impl<T: SampleSource + ?Sized> SampleSource for Box<T> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn bytes_per_sample(&self) -> usize {
        (**self).bytes_per_sample()
    }

    fn read(&mut self, count: usize) -> Result<usize> {
        (**self).read(count)
    }

    fn data(&self) -> &[Complex<f32>] {
        (**self).data()
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn done(&self) -> u64 {
        (**self).done()
    }
}

/**
 * I/Q Data Format for raw (headerless) captures
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IqFormat {
    /// Complex unsigned 8-bit (Cu8)
    Cu8,
    /// Complex signed 8-bit (Cs8)
    Cs8,
    /// Complex signed 16-bit (Cs16)
    Cs16,
    /// Complex 32-bit float (Cf32)
    Cf32,
}

impl IqFormat {
    /// Size of one complex sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            IqFormat::Cu8 | IqFormat::Cs8 => 2,
            IqFormat::Cs16 => 4,
            IqFormat::Cf32 => 8,
        }
    }

    /// Decode one I or Q component from its little-endian bytes,
    /// normalized to roughly `[-1, 1]`.
    fn component(self, bytes: &[u8]) -> f32 {
        match self {
            IqFormat::Cu8 => (bytes[0] as f32 - 127.5) / 128.0,
            IqFormat::Cs8 => bytes[0] as i8 as f32 / 128.0,
            IqFormat::Cs16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            IqFormat::Cf32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

/// Decode a run of interleaved I/Q frames; trailing partial frames are
/// dropped.
fn decode_frames(format: IqFormat, raw: &[u8]) -> Vec<Complex<f32>> {
    let frame = format.bytes_per_sample();
    let half = frame / 2;
    raw.chunks_exact(frame)
        .map(|c| Complex::new(format.component(&c[..half]), format.component(&c[half..])))
        .collect()
}

/// Fill `buf` as far as the reader allows, stopping early at EOF.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn read_header<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::format("truncated WAV header"),
        _ => Error::Io(e),
    })
}

/// Resolve a leading `~` component against the user's home directory.
fn home_relative(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/**
 * WAV-backed sample source (I on the left channel, Q on the right)
 */
pub struct WavSource {
    reader: BufReader<File>,
    sample_rate: u32,
    bits_per_sample: u16,
    block_align: usize,
    total: u64,
    consumed: u64,
    raw: Vec<u8>,
    buf: Vec<Complex<f32>>,
}

impl WavSource {
    /// Open a 2-channel PCM WAV file as an I/Q sample source.
    ///
    /// Accepts 8-bit unsigned and 16-bit signed PCM. `rate_override`
    /// replaces the header sample rate when given (useful for captures
    /// with a wrong or missing rate). Sample values are handed to the
    /// signal chain unnormalized; the AGC owns amplitude scaling.
    pub fn open<P: AsRef<Path>>(path: P, rate_override: Option<u32>) -> Result<Self> {
        let file = File::open(home_relative(path.as_ref()))?;
        let mut reader = BufReader::new(file);

        let mut riff = [0u8; 12];
        read_header(&mut reader, &mut riff)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(Error::format("not a RIFF/WAVE file"));
        }

        let mut fmt: Option<(u16, u16, u32, u16, u16)> = None;
        let data_len = loop {
            let mut chunk = [0u8; 8];
            read_header(&mut reader, &mut chunk)?;
            let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
            match &chunk[0..4] {
                b"fmt " => {
                    if size < 16 {
                        return Err(Error::format("fmt chunk too short"));
                    }
                    let mut body = vec![0u8; size as usize];
                    read_header(&mut reader, &mut body)?;
                    fmt = Some((
                        u16::from_le_bytes([body[0], body[1]]),
                        u16::from_le_bytes([body[2], body[3]]),
                        u32::from_le_bytes([body[4], body[5], body[6], body[7]]),
                        u16::from_le_bytes([body[12], body[13]]),
                        u16::from_le_bytes([body[14], body[15]]),
                    ));
                    if size % 2 == 1 {
                        read_header(&mut reader, &mut [0u8; 1])?;
                    }
                }
                b"data" => break size,
                _ => {
                    // Unknown chunk, skip it (chunks are word-aligned)
                    let skip = size + size % 2;
                    io::copy(&mut reader.by_ref().take(skip), &mut io::sink())?;
                }
            }
        };

        let Some((audio_format, channels, sample_rate, block_align, bits_per_sample)) = fmt
        else {
            return Err(Error::format("data chunk precedes fmt chunk"));
        };

        if audio_format != 1 {
            return Err(Error::format(format!(
                "unsupported WAV encoding {} (only PCM)",
                audio_format
            )));
        }
        if channels != 2 {
            return Err(Error::format(format!(
                "expected 2 channels (I/Q), found {}",
                channels
            )));
        }
        if bits_per_sample != 8 && bits_per_sample != 16 {
            return Err(Error::format(format!(
                "unsupported sample width {} bits",
                bits_per_sample
            )));
        }
        let expected_align = channels * bits_per_sample / 8;
        if block_align != expected_align {
            return Err(Error::format("inconsistent WAV block alignment"));
        }

        Ok(Self {
            reader,
            sample_rate: rate_override.unwrap_or(sample_rate),
            bits_per_sample,
            block_align: block_align as usize,
            total: data_len / block_align as u64,
            consumed: 0,
            raw: Vec::new(),
            buf: Vec::new(),
        })
    }
}

impl SampleSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bytes_per_sample(&self) -> usize {
        self.block_align
    }

    fn read(&mut self, count: usize) -> Result<usize> {
        let remaining = (self.total - self.consumed).min(count as u64) as usize;
        self.raw.resize(remaining * self.block_align, 0);
        let got = read_up_to(&mut self.reader, &mut self.raw)?;
        let frames = got / self.block_align;

        self.buf.clear();
        self.buf.reserve(frames);
        match self.bits_per_sample {
            16 => {
                for c in self.raw[..frames * 4].chunks_exact(4) {
                    self.buf.push(Complex::new(
                        i16::from_le_bytes([c[0], c[1]]) as f32,
                        i16::from_le_bytes([c[2], c[3]]) as f32,
                    ));
                }
            }
            _ => {
                // 8-bit unsigned PCM, rescaled to the 16-bit range
                for c in self.raw[..frames * 2].chunks_exact(2) {
                    self.buf.push(Complex::new(
                        (c[0] as f32 - 128.0) * 256.0,
                        (c[1] as f32 - 128.0) * 256.0,
                    ));
                }
            }
        }

        self.consumed += frames as u64;
        Ok(frames)
    }

    fn data(&self) -> &[Complex<f32>] {
        &self.buf
    }

    fn size(&self) -> u64 {
        self.total
    }

    fn done(&self) -> u64 {
        self.consumed
    }
}

/**
 * Headerless I/Q file source
 */
pub struct RawIqSource {
    reader: BufReader<File>,
    format: IqFormat,
    sample_rate: u32,
    total: u64,
    consumed: u64,
    raw: Vec<u8>,
    buf: Vec<Complex<f32>>,
}

impl RawIqSource {
    /// Open a headerless I/Q capture. Raw files carry no rate metadata,
    /// so the sample rate must be supplied by the caller.
    pub fn open<P: AsRef<Path>>(path: P, format: IqFormat, sample_rate: u32) -> Result<Self> {
        let file = File::open(home_relative(path.as_ref()))?;
        let total = file.metadata()?.len() / format.bytes_per_sample() as u64;

        Ok(Self {
            reader: BufReader::new(file),
            format,
            sample_rate,
            total,
            consumed: 0,
            raw: Vec::new(),
            buf: Vec::new(),
        })
    }
}

impl SampleSource for RawIqSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bytes_per_sample(&self) -> usize {
        self.format.bytes_per_sample()
    }

    fn read(&mut self, count: usize) -> Result<usize> {
        let bps = self.format.bytes_per_sample();
        self.raw.resize(count * bps, 0);
        let got = read_up_to(&mut self.reader, &mut self.raw)?;
        let samples = got / bps;

        self.buf = decode_frames(self.format, &self.raw[..samples * bps]);
        self.consumed += samples as u64;
        Ok(samples)
    }

    fn data(&self) -> &[Complex<f32>] {
        &self.buf
    }

    fn size(&self) -> u64 {
        self.total
    }

    fn done(&self) -> u64 {
        self.consumed
    }
}
