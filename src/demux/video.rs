//! YUV420p frame demuxing.
//!
//! The capture process writes frames back to back with no framing, so the
//! only synchronisation is the exact frame size: `width * height * 3 / 2`.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{fill, wrap_io, Fill};
use crate::errors::{CaptureError, Result};
use crate::process::DiagnosticBuffer;

/// Byte length of one YUV420p frame.
pub fn frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3 / 2
}

/// One planar 4:2:0 frame, owning copies of its planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    y: Vec<u8>,
    cb: Vec<u8>,
    cr: Vec<u8>,
    y_stride: usize,
    c_stride: usize,
}

impl VideoFrame {
    /// Slice a raw YUV420p buffer into luma and chroma planes.
    ///
    /// `data` must be exactly [`frame_size`] bytes. The luma plane is the first
    /// `w*h` bytes, followed by Cb and Cr of `w*h/4` bytes each. When `w*h` is
    /// not a multiple of 4 the final byte of the window belongs to no plane.
    pub fn from_yuv420p(data: &[u8], width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::invalid_argument(format!(
                "video width and height must be positive (got {}x{})",
                width, height
            )));
        }

        let expected = frame_size(width, height);
        if data.len() != expected {
            return Err(CaptureError::ShortRead {
                expected,
                actual: data.len(),
                width,
                height,
            });
        }

        let y_size = width as usize * height as usize;
        let c_size = y_size / 4;

        Ok(Self {
            width,
            height,
            y: data[..y_size].to_vec(),
            cb: data[y_size..y_size + c_size].to_vec(),
            cr: data[y_size + c_size..y_size + 2 * c_size].to_vec(),
            y_stride: width as usize,
            c_stride: (width as usize + 1) / 2,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Luma plane, row-major with stride [`VideoFrame::y_stride`].
    pub fn y(&self) -> &[u8] {
        &self.y
    }

    pub fn cb(&self) -> &[u8] {
        &self.cb
    }

    pub fn cr(&self) -> &[u8] {
        &self.cr
    }

    pub fn y_stride(&self) -> usize {
        self.y_stride
    }

    pub fn c_stride(&self) -> usize {
        self.c_stride
    }

    pub fn chroma_height(&self) -> usize {
        (self.height as usize + 1) / 2
    }

    /// Consume the frame, returning `(y, cb, cr)`.
    pub fn into_planes(self) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        (self.y, self.cb, self.cr)
    }
}

/// Retry schedule for the first frame while the capture process warms up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for StartupPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_wait: Duration::from_secs(5),
        }
    }
}

/// Turns a byte stream into [`VideoFrame`]s.
pub struct VideoDemuxer<R> {
    reader: R,
    width: u32,
    height: u32,
    buf: Vec<u8>,
    diagnostics: Option<DiagnosticBuffer>,
    startup: StartupPolicy,
    started: bool,
    frames_read: u64,
}

impl<R: Read> VideoDemuxer<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::invalid_argument(format!(
                "video width and height must be positive (got {}x{})",
                width, height
            )));
        }

        Ok(Self {
            reader,
            width,
            height,
            buf: vec![0u8; frame_size(width, height)],
            diagnostics: None,
            startup: StartupPolicy::default(),
            started: false,
            frames_read: 0,
        })
    }

    /// Attach the stderr ring whose contents are reported with read failures.
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticBuffer) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn with_startup(mut self, startup: StartupPolicy) -> Self {
        self.startup = startup;
        self
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn frame_size(&self) -> usize {
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

    /// Read the next frame. `Ok(None)` signals end of stream.
    pub fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        let complete = if self.started {
            self.read_next()?
        } else {
            self.read_first()?
        };

        if !complete {
            return Ok(None);
        }

        self.frames_read += 1;
        VideoFrame::from_yuv420p(&self.buf, self.width, self.height).map(Some)
    }

    fn read_next(&mut self) -> Result<bool> {
        let mut filled = 0;
        match fill(&mut self.reader, &mut self.buf, &mut filled) {
            Ok(Fill::Complete) => Ok(true),
            Ok(Fill::EndOfStream) => {
                if filled > 0 {
                    log::debug!(
                        "Video stream ended mid-frame ({} of {} bytes)",
                        filled,
                        self.buf.len()
                    );
                }
                Ok(false)
            }
            Err(e) => Err(wrap_io(e, self.diagnostics.as_ref())),
        }
    }

    fn read_first(&mut self) -> Result<bool> {
        let started = Instant::now();
        let mut filled = 0;

        loop {
            match fill(&mut self.reader, &mut self.buf, &mut filled) {
                Ok(Fill::Complete) => break,
                Ok(Fill::EndOfStream) => {}
                Err(e) if is_transient(&e) => {}
                Err(e) => return Err(wrap_io(e, self.diagnostics.as_ref())),
            }

            let waited = started.elapsed();
            if waited >= self.startup.max_wait {
                return Err(CaptureError::Timeout {
                    waited,
                    diagnostics: self
                        .diagnostics
                        .as_ref()
                        .map(DiagnosticBuffer::snapshot_string)
                        .unwrap_or_default(),
                });
            }
            std::thread::sleep(self.startup.poll_interval);
        }

        log::debug!(
            "First {}x{} frame after {:?}",
            self.width,
            self.height,
            started.elapsed()
        );
        self.started = true;
        Ok(true)
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::UnexpectedEof | io::ErrorKind::TimedOut
    )
}

/// Read exactly one frame from `reader` with no startup retry.
///
/// I/O errors carry empty diagnostics; use [`read_frame_with_diagnostics`]
/// when the reader is a capture process.
pub fn read_frame<R: Read>(reader: &mut R, width: u32, height: u32) -> Result<Option<VideoFrame>> {
    read_frame_inner(reader, width, height, None)
}

/// [`read_frame`] with I/O errors wrapped in a snapshot of `diagnostics`.
pub fn read_frame_with_diagnostics<R: Read>(
    reader: &mut R,
    width: u32,
    height: u32,
    diagnostics: &DiagnosticBuffer,
) -> Result<Option<VideoFrame>> {
    read_frame_inner(reader, width, height, Some(diagnostics))
}

fn read_frame_inner<R: Read>(
    reader: &mut R,
    width: u32,
    height: u32,
    diagnostics: Option<&DiagnosticBuffer>,
) -> Result<Option<VideoFrame>> {
    let mut buf = vec![0u8; frame_size(width, height)];
    let mut filled = 0;
    match fill(reader, &mut buf, &mut filled) {
        Ok(Fill::Complete) => VideoFrame::from_yuv420p(&buf, width, height).map(Some),
        Ok(Fill::EndOfStream) => Ok(None),
        Err(e) => Err(wrap_io(e, diagnostics)),
    }
}
