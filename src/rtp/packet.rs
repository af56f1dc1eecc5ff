//! RTP fixed header and packet serialization.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{CaptureError, Result};

pub const RTP_VERSION: u8 = 2;
/// Size of the fixed RTP header without CSRCs or extensions.
pub const RTP_HEADER_SIZE: usize = 12;
/// Dynamic payload type used for H.264.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: RTP_VERSION,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        }
    }

    fn write_to(&self, buf: &mut BytesMut) {
        // V=2, P=0, X=0, CC=0
        buf.put_u8(self.version << 6);
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub header: RtpHeader,
    pub payload: Bytes,
}

impl RtpPacket {
    /// Serialize to wire format.
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header.write_to(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn marshal_size(&self) -> usize {
        RTP_HEADER_SIZE + self.payload.len()
    }

    /// Parse a datagram. CSRC lists, header extensions and padding are skipped.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() < RTP_HEADER_SIZE {
            return Err(CaptureError::invalid_argument(format!(
                "RTP packet too short: {} bytes",
                data.len()
            )));
        }

        let mut cursor = data;
        let b0 = cursor.get_u8();
        let b1 = cursor.get_u8();

        let version = b0 >> 6;
        if version != RTP_VERSION {
            return Err(CaptureError::invalid_argument(format!(
                "unsupported RTP version {}",
                version
            )));
        }
        let padding = b0 & 0x20 != 0;
        let extension = b0 & 0x10 != 0;
        let csrc_count = (b0 & 0x0F) as usize;

        let header = RtpHeader {
            version,
            marker: b1 & 0x80 != 0,
            payload_type: b1 & 0x7F,
            sequence_number: cursor.get_u16(),
            timestamp: cursor.get_u32(),
            ssrc: cursor.get_u32(),
        };

        let truncated = || CaptureError::invalid_argument("RTP packet truncated");

        if cursor.remaining() < csrc_count * 4 {
            return Err(truncated());
        }
        cursor.advance(csrc_count * 4);

        if extension {
            if cursor.remaining() < 4 {
                return Err(truncated());
            }
            let _profile = cursor.get_u16();
            let words = cursor.get_u16() as usize;
            if cursor.remaining() < words * 4 {
                return Err(truncated());
            }
            cursor.advance(words * 4);
        }

        let mut end = cursor.len();
        if padding {
            let pad = *cursor.last().ok_or_else(truncated)? as usize;
            if pad == 0 || pad > end {
                return Err(truncated());
            }
            end -= pad;
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&cursor[..end]),
        })
    }
}
