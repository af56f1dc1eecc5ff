//! Capture readers: a supervised FFmpeg process plus the demuxer for its output.
//!
//! Each reader owns its process. `close` stops it and reports how it exited;
//! dropping a reader without closing stops the process too.

use std::process::ExitStatus;
use std::time::Duration;

use crate::command::{audio_capture_args, h264_capture_args, video_capture_args, AudioParams, H264Params, VideoParams};
use crate::config::CaptureConfig;
use crate::demux::{AudioChunk, AudioDemuxer, StartupPolicy, VideoDemuxer, VideoFrame, DEFAULT_LATENCY};
use crate::devices::{Device, DeviceKind};
use crate::errors::{CaptureError, Result};
use crate::h264::{H264Reader, NalUnit};
use crate::process::{CaptureProcess, StopHandle};
use crate::rtp::{H264Packetizer, PacketizerConfig, RtpPacket};

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const DEFAULT_CHANNELS: u16 = 2;

/// Raw YUV420p frames from a V4L2 device.
pub struct VideoReader {
    demuxer: VideoDemuxer<CaptureProcess>,
}

impl VideoReader {
    pub fn open(
        config: &CaptureConfig,
        device: &Device,
        width: u32,
        height: u32,
        frame_rate: f64,
    ) -> Result<Self> {
        Self::open_with_startup(config, device, width, height, frame_rate, StartupPolicy::default())
    }

    pub fn open_with_startup(
        config: &CaptureConfig,
        device: &Device,
        width: u32,
        height: u32,
        frame_rate: f64,
        startup: StartupPolicy,
    ) -> Result<Self> {
        device.expect_kind(DeviceKind::Video)?;
        if width == 0 || height == 0 {
            return Err(CaptureError::invalid_argument(format!(
                "video width and height must be positive (got {}x{})",
                width, height
            )));
        }

        let params = VideoParams {
            frame_rate,
            ..VideoParams::new(device.id.clone(), width, height)
        };
        let process = config.command(video_capture_args(&params)).spawn()?;
        log::info!("Video capture started on {} at {}x{}", device, width, height);

        let diagnostics = process.diagnostics();
        let demuxer = VideoDemuxer::new(process, width, height)?
            .with_diagnostics(diagnostics)
            .with_startup(startup);
        Ok(Self { demuxer })
    }

    /// Next frame, or `Ok(None)` once the capture has ended.
    pub fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        self.demuxer.read_frame()
    }

    pub fn frames_read(&self) -> u64 {
        self.demuxer.frames_read()
    }

    pub fn last_diagnostics(&self) -> String {
        self.demuxer.get_ref().last_diagnostics()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.demuxer.get_ref().stop_handle()
    }

    pub fn close(&mut self) -> Result<ExitStatus> {
        self.demuxer.get_mut().stop()
    }
}

/// Interleaved S16LE chunks from an ALSA device.
pub struct AudioReader {
    demuxer: AudioDemuxer<CaptureProcess>,
    sample_rate: u32,
    channels: u16,
}

impl AudioReader {
    /// Zero sample rate, channels or latency select 48 kHz, stereo and 20 ms.
    pub fn open(
        config: &CaptureConfig,
        device: &Device,
        sample_rate: u32,
        channels: u16,
        latency: Duration,
    ) -> Result<Self> {
        device.expect_kind(DeviceKind::Audio)?;

        let sample_rate = if sample_rate == 0 { DEFAULT_SAMPLE_RATE } else { sample_rate };
        let channels = if channels == 0 { DEFAULT_CHANNELS } else { channels };
        let latency = if latency.is_zero() { DEFAULT_LATENCY } else { latency };

        let params = AudioParams {
            device_id: device.id.clone(),
            sample_rate,
            channels,
        };
        let process = config.command(audio_capture_args(&params)).spawn()?;
        log::info!(
            "Audio capture started on {} at {} Hz, {} ch",
            device,
            sample_rate,
            channels
        );

        let diagnostics = process.diagnostics();
        let demuxer = AudioDemuxer::with_latency(process, channels, sample_rate, latency)?
            .with_diagnostics(diagnostics);
        Ok(Self {
            demuxer,
            sample_rate,
            channels,
        })
    }

    pub fn read_chunk(&mut self) -> Result<Option<AudioChunk>> {
        self.demuxer.read_chunk()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn last_diagnostics(&self) -> String {
        self.demuxer.get_ref().last_diagnostics()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.demuxer.get_ref().stop_handle()
    }

    pub fn close(&mut self) -> Result<ExitStatus> {
        self.demuxer.get_mut().stop()
    }
}

/// Start libx264 capture and read its Annex-B output NAL by NAL.
pub fn open_h264(
    config: &CaptureConfig,
    device: &Device,
    params: &H264Params,
) -> Result<H264Reader<CaptureProcess>> {
    device.expect_kind(DeviceKind::Video)?;

    let params = H264Params {
        device_id: device.id.clone(),
        ..params.clone()
    };
    let process = config.command(h264_capture_args(&params)).spawn()?;
    log::info!("H.264 capture started on {}", device);

    let diagnostics = process.diagnostics();
    Ok(H264Reader::new(process).with_diagnostics(diagnostics))
}

impl H264Reader<CaptureProcess> {
    pub fn last_diagnostics(&self) -> String {
        self.get_ref().last_diagnostics()
    }

    pub fn close(&mut self) -> Result<ExitStatus> {
        self.get_mut().stop()
    }
}

/// H.264 capture packetized into RTP, one NAL unit per call.
pub struct RtpReader {
    reader: H264Reader<CaptureProcess>,
    packetizer: H264Packetizer,
}

impl RtpReader {
    pub fn open(
        config: &CaptureConfig,
        device: &Device,
        params: &H264Params,
        packetizer: PacketizerConfig,
    ) -> Result<Self> {
        // Validate the packetizer before starting a process for it.
        let packetizer = H264Packetizer::new(packetizer)?;
        let reader = open_h264(config, device, params)?;
        Ok(Self { reader, packetizer })
    }

    /// Packets for the next NAL unit, or `Ok(None)` at end of stream.
    pub fn read_packets(&mut self) -> Result<Option<Vec<RtpPacket>>> {
        Ok(self.read_nal_packets()?.map(|(_, packets)| packets))
    }

    /// Like [`RtpReader::read_packets`], also returning the unit they carry.
    pub fn read_nal_packets(&mut self) -> Result<Option<(NalUnit, Vec<RtpPacket>)>> {
        match self.reader.read_nal()? {
            Some(nal) => {
                let packets = self.packetizer.packetize(&nal);
                Ok(Some((nal, packets)))
            }
            None => Ok(None),
        }
    }

    pub fn packetizer(&self) -> &H264Packetizer {
        &self.packetizer
    }

    pub fn last_diagnostics(&self) -> String {
        self.reader.last_diagnostics()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.reader.get_ref().stop_handle()
    }

    pub fn close(&mut self) -> Result<ExitStatus> {
        self.reader.close()
    }
}
