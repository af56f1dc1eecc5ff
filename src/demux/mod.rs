//! Fixed-size raw media demuxing from a byte stream.
//!
//! - `video`: YUV420p planar frames
//! - `audio`: interleaved PCM S16LE chunks

pub mod audio;
pub mod video;

pub use audio::{chunk_size_bytes, AudioChunk, AudioDemuxer, DEFAULT_LATENCY};
pub use video::{frame_size, read_frame, read_frame_with_diagnostics, StartupPolicy, VideoDemuxer, VideoFrame};

use std::io::{self, Read};

use crate::errors::CaptureError;
use crate::process::DiagnosticBuffer;

/// Outcome of filling a fixed-size window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fill {
    Complete,
    EndOfStream,
}

/// Read into `buf[*filled..]` until it is full or the reader reports end of stream.
///
/// `filled` is updated as bytes arrive, so a caller may resume after `EndOfStream`.
pub(crate) fn fill<R: Read>(reader: &mut R, buf: &mut [u8], filled: &mut usize) -> io::Result<Fill> {
    while *filled < buf.len() {
        match reader.read(&mut buf[*filled..]) {
            Ok(0) => return Ok(Fill::EndOfStream),
            Ok(n) => *filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(Fill::Complete)
}

pub(crate) fn wrap_io(source: io::Error, diagnostics: Option<&DiagnosticBuffer>) -> CaptureError {
    let text = diagnostics.map(DiagnosticBuffer::snapshot_string).unwrap_or_default();
    CaptureError::io(source, text)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io::{self, Read};

    /// Reader that hands out its data in scripted pieces.
    ///
    /// `None` entries produce a single `Ok(0)` before continuing, which is how a
    /// pipe looks while the producer has not written anything yet.
    pub struct ScriptedReader {
        steps: VecDeque<Option<Vec<u8>>>,
    }

    impl ScriptedReader {
        pub fn new(steps: Vec<Option<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None | Some(None) => Ok(0),
                Some(Some(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        let rest = data.split_off(n);
                        self.steps.push_front(Some(rest));
                    }
                    Ok(n)
                }
            }
        }
    }

    /// Reader that fails with the given error kind.
    pub struct FailingReader(pub io::ErrorKind);

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "pipe broke"))
        }
    }
}
