//! Configuration management for ffcapture
//!
//! Provides loading, saving and validation of the FFmpeg location, capture
//! defaults, RTP settings and the first-frame startup policy.

use crate::demux::StartupPolicy;
use crate::errors::CaptureError;
use crate::rtp::{PacketizerConfig, DEFAULT_MTU, MAX_MTU};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfcaptureConfig {
    pub ffmpeg: CaptureConfig,
    pub video: VideoDefaults,
    pub audio: AudioDefaults,
    pub rtp: RtpConfig,
    pub startup: StartupConfig,
}

/// How capture processes are launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Path to the ffmpeg binary, resolved via PATH when bare
    #[serde(rename = "path")]
    pub ffmpeg_path: String,
    /// Mirror ffmpeg stderr into the debug log
    pub verbose: bool,
}

/// Video capture defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDefaults {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// H.264 target bit rate in kbps, 0 for encoder default
    pub bit_rate_kbps: u32,
    pub profile: String,
    pub preset: String,
}

/// Audio capture defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDefaults {
    pub sample_rate: u32,
    pub channels: u16,
    /// Chunk duration in milliseconds
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpConfig {
    pub mtu: usize,
    pub payload_type: u8,
    pub ssrc: u32,
}

/// First-frame wait while the capture device warms up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            verbose: false,
        }
    }
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30.0,
            bit_rate_kbps: 0,
            profile: "main".to_string(),
            preset: "ultrafast".to_string(),
        }
    }
}

impl Default for AudioDefaults {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            latency_ms: 20,
        }
    }
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            payload_type: 96,
            ssrc: 0,
        }
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        let policy = StartupPolicy::default();
        Self {
            poll_interval_ms: policy.poll_interval.as_millis() as u64,
            max_wait_ms: policy.max_wait.as_millis() as u64,
        }
    }
}

impl CaptureConfig {
    /// An empty path means the `ffmpeg` found on PATH.
    pub fn with_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            ffmpeg_path: if path.is_empty() { "ffmpeg".to_string() } else { path },
            verbose: false,
        }
    }
}

impl StartupConfig {
    pub fn policy(&self) -> StartupPolicy {
        StartupPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }
}

impl FfcaptureConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CaptureError::Config(format!("Failed to read config file: {}", e)))?;

        let config: FfcaptureConfig = toml::from_str(&contents)
            .map_err(|e| CaptureError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CaptureError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CaptureError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CaptureError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CaptureError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("ffcapture.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CaptureError> {
        let invalid = |msg: &str| Err(CaptureError::Config(msg.to_string()));

        if self.ffmpeg.ffmpeg_path.trim().is_empty() {
            return invalid("ffmpeg path must not be empty");
        }

        if self.video.width == 0 || self.video.height == 0 {
            return invalid("Invalid default resolution");
        }
        if !(self.video.frame_rate > 0.0 && self.video.frame_rate <= 240.0) {
            return invalid("Invalid default frame rate (must be 0-240)");
        }
        if !["baseline", "main", "high"].contains(&self.video.profile.as_str()) {
            return invalid("H.264 profile must be baseline, main or high");
        }

        if self.audio.sample_rate == 0 {
            return invalid("Sample rate must be positive");
        }
        if self.audio.channels == 0 || self.audio.channels > 8 {
            return invalid("Channel count must be between 1 and 8");
        }
        if self.audio.latency_ms == 0 || self.audio.latency_ms > 1000 {
            return invalid("Audio latency must be between 1 and 1000 ms");
        }

        if self.rtp.mtu == 0 || self.rtp.mtu > MAX_MTU {
            return invalid("RTP MTU must be between 1 and 1500");
        }
        if self.rtp.payload_type > 127 {
            return invalid("RTP payload type must be below 128");
        }

        if self.startup.poll_interval_ms == 0 {
            return invalid("Startup poll interval must be positive");
        }
        if self.startup.max_wait_ms < self.startup.poll_interval_ms {
            return invalid("Startup max wait must be at least one poll interval");
        }

        Ok(())
    }

    pub fn audio_latency(&self) -> Duration {
        Duration::from_millis(self.audio.latency_ms)
    }

    /// Packetizer settings for the configured RTP section and frame rate.
    pub fn packetizer_config(&self) -> PacketizerConfig {
        PacketizerConfig {
            mtu: self.rtp.mtu,
            payload_type: self.rtp.payload_type,
            ssrc: self.rtp.ssrc,
            frame_rate: self.video.frame_rate,
            ..PacketizerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FfcaptureConfig::default();
        assert_eq!(config.ffmpeg.ffmpeg_path, "ffmpeg");
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.rtp.mtu, 1200);
        assert_eq!(config.startup.policy(), StartupPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = FfcaptureConfig::default();
        bad.video.width = 0;
        assert!(bad.validate().is_err());

        let mut bad = FfcaptureConfig::default();
        bad.rtp.mtu = 9000;
        assert!(bad.validate().is_err());

        let mut bad = FfcaptureConfig::default();
        bad.audio.channels = 0;
        assert!(bad.validate().is_err());

        let mut bad = FfcaptureConfig::default();
        bad.video.profile = "extended".into();
        assert!(bad.validate().is_err());

        let mut bad = FfcaptureConfig::default();
        bad.startup.max_wait_ms = 10;
        assert!(matches!(bad.validate(), Err(CaptureError::Config(_))));
    }

    #[test]
    fn test_config_toml_format() {
        let config = FfcaptureConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[ffmpeg]"));
        assert!(toml_string.contains("[video]"));
        assert!(toml_string.contains("[audio]"));
        assert!(toml_string.contains("[rtp]"));
        assert!(toml_string.contains("[startup]"));
        assert!(toml_string.contains("path = \"ffmpeg\""));
        assert!(toml_string.contains("latency_ms"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: FfcaptureConfig = toml::from_str(
            r#"
            [ffmpeg]
            path = "/usr/local/bin/ffmpeg"

            [rtp]
            mtu = 1400
            "#,
        )
        .unwrap();

        assert_eq!(config.ffmpeg.ffmpeg_path, "/usr/local/bin/ffmpeg");
        assert!(!config.ffmpeg.verbose);
        assert_eq!(config.rtp.mtu, 1400);
        assert_eq!(config.rtp.payload_type, 96);
        assert_eq!(config.audio, AudioDefaults::default());
    }

    #[test]
    fn test_packetizer_config_follows_frame_rate() {
        let mut config = FfcaptureConfig::default();
        config.video.frame_rate = 25.0;
        config.rtp.ssrc = 0xCAFE;
        let packetizer = config.packetizer_config();
        assert_eq!(packetizer.timestamp_increment(), 3600);
        assert_eq!(packetizer.ssrc, 0xCAFE);
    }

    #[test]
    fn test_empty_path_means_path_lookup() {
        assert_eq!(CaptureConfig::with_path("").ffmpeg_path, "ffmpeg");
        assert_eq!(CaptureConfig::with_path("/bin/ff").ffmpeg_path, "/bin/ff");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = FfcaptureConfig::load_from_file("nonexistent_ffcapture.toml");
        assert_eq!(result.unwrap(), FfcaptureConfig::default());
    }
}
