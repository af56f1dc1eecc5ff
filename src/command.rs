//! FFmpeg argument vectors for Linux capture (V4L2 video, ALSA audio).
//!
//! Every builder writes the agreed raw format to `pipe:1` and leaves stderr
//! for diagnostics.

use serde::{Deserialize, Serialize};

use crate::config::CaptureConfig;
use crate::process::CaptureCommand;

pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
pub const DEFAULT_KEY_INTERVAL: u32 = 60;
pub const DEFAULT_H264_PROFILE: &str = "main";
pub const DEFAULT_H264_PRESET: &str = "ultrafast";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    /// V4L2 device path, e.g. `/dev/video0`.
    pub device_id: String,
    /// 0 keeps the device default.
    pub width: u32,
    pub height: u32,
    /// 0.0 keeps the device default.
    pub frame_rate: f64,
    /// Output pixel format; empty means `yuv420p`.
    pub pixel_format: String,
}

impl VideoParams {
    pub fn new(device_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            device_id: device_id.into(),
            width,
            height,
            frame_rate: 0.0,
            pixel_format: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParams {
    /// ALSA identifier, e.g. `hw:0`.
    pub device_id: String,
    /// 0 keeps the device default.
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct H264Params {
    pub device_id: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Target bit rate in kbps; 0 leaves it to the encoder.
    pub bit_rate_kbps: u32,
    /// GOP size; 0 means 60.
    pub key_interval: u32,
    /// `baseline`, `main` or `high`; empty means `main`.
    pub profile: String,
    /// x264 preset; empty means `ultrafast`.
    pub preset: String,
}

impl H264Params {
    pub fn new(device_id: impl Into<String>, width: u32, height: u32, frame_rate: f64) -> Self {
        Self {
            device_id: device_id.into(),
            width,
            height,
            frame_rate,
            bit_rate_kbps: 0,
            key_interval: 0,
            profile: String::new(),
            preset: String::new(),
        }
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

/// V4L2 input options shared by raw and encoded video.
fn v4l2_input_args(device_id: &str, width: u32, height: u32, frame_rate: f64) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-f".to_string(), "v4l2".to_string()];
    if width > 0 && height > 0 {
        args.push("-video_size".into());
        args.push(format!("{}x{}", width, height));
    }
    if frame_rate > 0.0 {
        args.push("-framerate".into());
        args.push(format!("{}", frame_rate));
    }
    args.push("-i".into());
    args.push(device_id.to_string());
    args
}

pub fn video_capture_args(params: &VideoParams) -> Vec<String> {
    let mut args = v4l2_input_args(&params.device_id, params.width, params.height, params.frame_rate);

    args.push("-f".into());
    args.push("rawvideo".into());
    args.push("-pix_fmt".into());
    args.push(or_default(&params.pixel_format, DEFAULT_PIXEL_FORMAT).to_string());
    if params.width > 0 && params.height > 0 {
        args.push("-video_size".into());
        args.push(format!("{}x{}", params.width, params.height));
    }
    args.push("pipe:1".into());
    args
}

pub fn audio_capture_args(params: &AudioParams) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-f".to_string(), "alsa".to_string()];
    if params.sample_rate > 0 {
        args.push("-sample_rate".into());
        args.push(params.sample_rate.to_string());
    }
    if params.channels > 0 {
        args.push("-channels".into());
        args.push(params.channels.to_string());
    }
    args.push("-i".into());
    args.push(params.device_id.clone());

    args.extend(["-f", "s16le", "-acodec", "pcm_s16le"].map(String::from));
    if params.sample_rate > 0 {
        args.push("-ar".into());
        args.push(params.sample_rate.to_string());
    }
    if params.channels > 0 {
        args.push("-ac".into());
        args.push(params.channels.to_string());
    }
    args.push("pipe:1".into());
    args
}

/// libx264 encoding to an Annex-B elementary stream.
///
/// SPS/PPS are repeated ahead of every IDR so a receiver can join mid-stream.
pub fn h264_capture_args(params: &H264Params) -> Vec<String> {
    let mut args = v4l2_input_args(&params.device_id, params.width, params.height, params.frame_rate);

    args.extend(["-c:v", "libx264", "-preset"].map(String::from));
    args.push(or_default(&params.preset, DEFAULT_H264_PRESET).to_string());
    args.extend(["-tune", "zerolatency"].map(String::from));

    if params.frame_rate > 0.0 {
        args.push("-r".into());
        args.push(format!("{:.2}", params.frame_rate));
    }
    if params.bit_rate_kbps > 0 {
        args.push("-b:v".into());
        args.push(format!("{}k", params.bit_rate_kbps));
    }

    let key_interval = match params.key_interval {
        0 => DEFAULT_KEY_INTERVAL,
        n => n,
    };
    args.push("-g".into());
    args.push(key_interval.to_string());
    args.extend(["-force_key_frames", "expr:not(mod(n,30))"].map(String::from));

    args.push("-profile:v".into());
    args.push(or_default(&params.profile, DEFAULT_H264_PROFILE).to_string());

    args.extend(
        [
            "-pix_fmt",
            "yuv420p",
            "-an",
            "-sn",
            "-x264-params",
            "repeatheaders=1",
            "-f",
            "h264",
            "pipe:1",
        ]
        .map(String::from),
    );
    args
}

impl CaptureConfig {
    /// Command running the configured FFmpeg binary with `args`.
    pub fn command(&self, args: Vec<String>) -> CaptureCommand {
        CaptureCommand::new(self.ffmpeg_path.clone())
            .args(args)
            .verbose(self.verbose)
    }
}
