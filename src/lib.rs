//! ffcapture: media capture through an FFmpeg subprocess
//!
//! FFmpeg does the device I/O and encoding; this crate supervises the process
//! and turns its standard output into typed media units.
//!
//! # Features
//! - Process supervision with a bounded stderr ring for diagnostics
//! - YUV420p frame and PCM S16LE chunk demuxing with a first-frame startup wait
//! - Annex-B H.264 NAL unit parsing across arbitrary read boundaries
//! - RFC 6184 RTP packetization (single NAL unit and FU-A)
//! - V4L2/ALSA device discovery into a caller-owned cache
//! - Async adapters on tokio's blocking pool
//!
//! # Usage
//! ```rust,no_run
//! use ffcapture::{CaptureConfig, Device, VideoReader};
//!
//! # fn main() -> ffcapture::Result<()> {
//! let config = CaptureConfig::default();
//! let device = Device::video("/dev/video0");
//! let mut reader = VideoReader::open(&config, &device, 1280, 720, 30.0)?;
//! while let Some(frame) = reader.read_frame()? {
//!     println!("{}x{} frame", frame.width(), frame.height());
//! }
//! reader.close()?;
//! # Ok(())
//! # }
//! ```
pub mod command;
pub mod config;
pub mod demux;
pub mod devices;
pub mod errors;
pub mod h264;
pub mod process;
pub mod readers;
pub mod rtp;
pub mod stream;

// Re-exports for convenience
pub use config::{CaptureConfig, FfcaptureConfig};
pub use demux::{AudioChunk, StartupPolicy, VideoFrame};
pub use devices::{Device, DeviceCache, DeviceKind};
pub use errors::{CaptureError, Result};
pub use h264::{NalUnit, NalUnitType};
pub use process::{CaptureCommand, CaptureProcess, StopHandle};
pub use readers::{open_h264, AudioReader, RtpReader, VideoReader};
pub use rtp::{H264Packetizer, PacketSink, PacketizerConfig, RtpPacket};

/// Initialize logging for the capture system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "ffcapture=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        os: std::env::consts::OS.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub os: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "ffcapture");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert!(!info.os.is_empty());
    }
}
