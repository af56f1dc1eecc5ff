//! RTP packetization for H.264 NAL units
//!
//! The packetizer performs no I/O; packets are handed to a [`PacketSink`].

mod packet;
mod packetizer;
mod sink;

pub use packet::{RtpHeader, RtpPacket, DEFAULT_PAYLOAD_TYPE, RTP_HEADER_SIZE, RTP_VERSION};
pub use packetizer::{H264Packetizer, PacketizerConfig, DEFAULT_MTU, H264_CLOCK_RATE, MAX_MTU};
pub use sink::{PacketSink, UdpSink};
