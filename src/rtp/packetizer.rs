//! H.264 RTP packetization (RFC 6184 single NAL unit and FU-A modes).

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::packet::{RtpHeader, RtpPacket, DEFAULT_PAYLOAD_TYPE, RTP_HEADER_SIZE};
use crate::errors::{CaptureError, Result};
use crate::h264::{NalUnit, NalUnitType};

pub const DEFAULT_MTU: usize = 1200;
pub const MAX_MTU: usize = 1500;
/// 90 kHz video clock.
pub const H264_CLOCK_RATE: u32 = 90_000;
/// Space kept for the IP header beneath the RTP packet.
const NETWORK_OVERHEAD: usize = 20;
/// FU indicator plus FU header.
const FU_A_OVERHEAD: usize = 2;
const FU_A_TYPE: u8 = 28;
const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketizerConfig {
    pub mtu: usize,
    pub payload_type: u8,
    pub ssrc: u32,
    pub clock_rate: u32,
    pub frame_rate: f64,
    pub initial_sequence: u16,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            ssrc: 0,
            clock_rate: H264_CLOCK_RATE,
            frame_rate: 30.0,
            initial_sequence: 0,
        }
    }
}

impl PacketizerConfig {
    /// Timestamp advance per NAL unit: `clock_rate / frame_rate`, 3000 at 30 fps.
    pub fn timestamp_increment(&self) -> u32 {
        (self.clock_rate as f64 / self.frame_rate).round() as u32
    }
}

/// Stateful packetizer for one outgoing stream.
///
/// Every packet advances the sequence number by one. The timestamp advances
/// once per NAL unit, so all fragments of a unit share it.
pub struct H264Packetizer {
    mtu: usize,
    payload_type: u8,
    ssrc: u32,
    timestamp_increment: u32,
    sequence_number: u16,
    timestamp: u32,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl H264Packetizer {
    pub fn new(config: PacketizerConfig) -> Result<Self> {
        let mtu = if config.mtu == 0 || config.mtu > MAX_MTU {
            log::debug!("MTU {} out of range, using {}", config.mtu, DEFAULT_MTU);
            DEFAULT_MTU
        } else {
            config.mtu
        };

        if mtu <= NETWORK_OVERHEAD + RTP_HEADER_SIZE + FU_A_OVERHEAD {
            return Err(CaptureError::invalid_argument(format!(
                "MTU {} leaves no room for an FU-A fragment",
                mtu
            )));
        }
        if !(config.frame_rate.is_finite() && config.frame_rate > 0.0) || config.clock_rate == 0 {
            return Err(CaptureError::invalid_argument(format!(
                "invalid clock ({} Hz at {} fps)",
                config.clock_rate, config.frame_rate
            )));
        }

        Ok(Self {
            mtu,
            payload_type: config.payload_type & 0x7F,
            ssrc: config.ssrc,
            timestamp_increment: config.timestamp_increment(),
            sequence_number: config.initial_sequence,
            timestamp: 0,
            sps: None,
            pps: None,
        })
    }

    /// Largest NAL unit sent as a single packet.
    pub fn max_single_nal_size(&self) -> usize {
        self.mtu - NETWORK_OVERHEAD - RTP_HEADER_SIZE
    }

    /// Largest slice of NAL payload carried by one FU-A fragment.
    pub fn max_fragment_size(&self) -> usize {
        self.mtu - NETWORK_OVERHEAD - RTP_HEADER_SIZE - FU_A_OVERHEAD
    }

    pub fn packetize(&mut self, nal: &NalUnit) -> Vec<RtpPacket> {
        if nal.is_empty() {
            return Vec::new();
        }

        self.cache_parameter_set(nal);

        let timestamp = self.timestamp;
        self.timestamp = self.timestamp.wrapping_add(self.timestamp_increment);

        if nal.len() <= self.max_single_nal_size() {
            let packet = self.packet(timestamp, true, nal.data.clone());
            return vec![packet];
        }

        self.fragment(nal, timestamp)
    }

    fn fragment(&mut self, nal: &NalUnit, timestamp: u32) -> Vec<RtpPacket> {
        let header = nal.header();
        let fu_indicator = (header & 0xE0) | FU_A_TYPE;
        let nal_type = header & 0x1F;
        let chunk_size = self.max_fragment_size();

        let body = nal.data.slice(1..);
        let mut packets = Vec::with_capacity(body.len().div_ceil(chunk_size));
        let mut offset = 0;

        while offset < body.len() {
            let end = (offset + chunk_size).min(body.len());
            let is_last = end == body.len();

            let mut fu_header = nal_type;
            if offset == 0 {
                fu_header |= FU_START;
            }
            if is_last {
                fu_header |= FU_END;
            }

            let mut payload = BytesMut::with_capacity(FU_A_OVERHEAD + end - offset);
            payload.put_u8(fu_indicator);
            payload.put_u8(fu_header);
            payload.put_slice(&body[offset..end]);

            packets.push(self.packet(timestamp, is_last && nal.keyframe, payload.freeze()));
            offset = end;
        }

        log::trace!("Fragmented {} into {} FU-A packets", nal, packets.len());
        packets
    }

    fn packet(&mut self, timestamp: u32, marker: bool, payload: Bytes) -> RtpPacket {
        let mut header = RtpHeader::new(self.payload_type, self.sequence_number, timestamp, self.ssrc);
        header.marker = marker;
        self.sequence_number = self.sequence_number.wrapping_add(1);
        RtpPacket { header, payload }
    }

    fn cache_parameter_set(&mut self, nal: &NalUnit) {
        let slot = match nal.nal_type {
            NalUnitType::Sps => &mut self.sps,
            NalUnitType::Pps => &mut self.pps,
            _ => return,
        };
        if slot.is_none() {
            log::debug!("Cached {}", nal);
            *slot = Some(nal.data.clone());
        }
    }

    /// First SPS seen, including its header byte.
    pub fn sps(&self) -> Option<&Bytes> {
        self.sps.as_ref()
    }

    /// First PPS seen, including its header byte.
    pub fn pps(&self) -> Option<&Bytes> {
        self.pps.as_ref()
    }

    /// `profile-level-id` for SDP: profile_idc, constraint flags and level_idc from the SPS.
    pub fn profile_level_id(&self) -> Option<String> {
        let sps = self.sps.as_ref()?;
        let bytes = sps.get(1..4)?;
        Some(format!("{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2]))
    }

    /// Sequence number the next packet will carry.
    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    /// Timestamp the next NAL unit will carry.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }
}
