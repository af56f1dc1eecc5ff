//! Interleaved PCM S16LE chunking.

use std::io::Read;
use std::time::Duration;

use bytes::Buf;

use super::{fill, wrap_io, Fill};
use crate::errors::{CaptureError, Result};
use crate::process::DiagnosticBuffer;

/// Bytes per S16LE sample.
const BYTES_PER_SAMPLE: usize = 2;

/// Default chunk duration.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(20);

/// A chunk of interleaved PCM audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Interleaved samples: `[L0, R0, L1, R1, ...]` for stereo.
    pub data: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
    pub samples_per_channel: usize,
}

impl AudioChunk {
    /// Decode little-endian 16-bit samples, keeping their interleaved order.
    pub fn from_s16le(data: &[u8], channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(CaptureError::invalid_argument("channel count must be positive"));
        }

        let frame_size = channels as usize * BYTES_PER_SAMPLE;
        if data.len() % frame_size != 0 {
            return Err(CaptureError::Alignment {
                len: data.len(),
                frame_size,
                channels,
            });
        }

        let total_samples = data.len() / BYTES_PER_SAMPLE;
        let mut cursor = data;
        let mut samples = Vec::with_capacity(total_samples);
        while cursor.has_remaining() {
            samples.push(cursor.get_i16_le());
        }

        Ok(Self {
            data: samples,
            channels,
            sample_rate,
            samples_per_channel: total_samples / channels as usize,
        })
    }

    /// Playback duration of this chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.samples_per_channel as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// Chunk size for a latency window: `round(rate * latency) * channels * 2`.
pub fn chunk_size_bytes(sample_rate: u32, channels: u16, latency: Duration) -> usize {
    let samples_per_channel = (sample_rate as f64 * latency.as_secs_f64()).round() as usize;
    samples_per_channel * channels as usize * BYTES_PER_SAMPLE
}

/// Turns a byte stream into [`AudioChunk`]s of a fixed latency window.
pub struct AudioDemuxer<R> {
    reader: R,
    channels: u16,
    sample_rate: u32,
    buf: Vec<u8>,
    diagnostics: Option<DiagnosticBuffer>,
}

impl<R: Read> AudioDemuxer<R> {
    pub fn new(reader: R, channels: u16, sample_rate: u32) -> Result<Self> {
        Self::with_latency(reader, channels, sample_rate, DEFAULT_LATENCY)
    }

    pub fn with_latency(reader: R, channels: u16, sample_rate: u32, latency: Duration) -> Result<Self> {
        if channels == 0 || sample_rate == 0 {
            return Err(CaptureError::invalid_argument(format!(
                "channels and sample rate must be positive (got {} ch @ {} Hz)",
                channels, sample_rate
            )));
        }

        let chunk_bytes = chunk_size_bytes(sample_rate, channels, latency);
        if chunk_bytes == 0 {
            return Err(CaptureError::invalid_argument(format!(
                "latency {:?} yields an empty chunk at {} Hz",
                latency, sample_rate
            )));
        }

        log::debug!(
            "Audio chunking: {} Hz, {} ch, {:?} -> {} bytes",
            sample_rate,
            channels,
            latency,
            chunk_bytes
        );

        Ok(Self {
            reader,
            channels,
            sample_rate,
            buf: vec![0u8; chunk_bytes],
            diagnostics: None,
        })
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticBuffer) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn chunk_bytes(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next chunk. `Ok(None)` signals end of stream.
    pub fn read_chunk(&mut self) -> Result<Option<AudioChunk>> {
        let mut filled = 0;
        match fill(&mut self.reader, &mut self.buf, &mut filled) {
            Ok(Fill::Complete) => {
                AudioChunk::from_s16le(&self.buf, self.channels, self.sample_rate).map(Some)
            }
            Ok(Fill::EndOfStream) => {
                if filled > 0 {
                    log::debug!("Audio stream ended mid-chunk ({} bytes discarded)", filled);
                }
                Ok(None)
            }
            Err(e) => Err(wrap_io(e, self.diagnostics.as_ref())),
        }
    }
}
