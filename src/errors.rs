use std::time::Duration;

/// Errors produced while supervising the capture process and reshaping its output.
///
/// End of stream is not an error: readers report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Read error: {source}\nstderr: {diagnostics}")]
    Io {
        #[source]
        source: std::io::Error,
        diagnostics: String,
    },
    #[error("Misaligned sample data: {len} bytes is not a multiple of {frame_size} (channels={channels})")]
    Alignment {
        len: usize,
        frame_size: usize,
        channels: u16,
    },
    #[error("YUV420p frame: expected {expected} bytes ({width}x{height}), got {actual}")]
    ShortRead {
        expected: usize,
        actual: usize,
        width: u32,
        height: u32,
    },
    #[error("No output after {waited:?}\nstderr: {diagnostics}")]
    Timeout { waited: Duration, diagnostics: String },
    #[error("Failed waiting for capture process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("Capture process is already stopped")]
    AlreadyStopped,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Network sink error: {0}")]
    Sink(#[source] std::io::Error),
}

impl CaptureError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        CaptureError::InvalidArgument(message.into())
    }

    /// Wrap a read failure with the most recent stderr of the capture process.
    pub fn io(source: std::io::Error, diagnostics: impl Into<String>) -> Self {
        CaptureError::Io {
            source,
            diagnostics: diagnostics.into(),
        }
    }

    /// Diagnostic text attached to the error, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            CaptureError::Io { diagnostics, .. } | CaptureError::Timeout { diagnostics, .. } => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
