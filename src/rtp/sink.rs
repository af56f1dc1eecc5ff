//! Transport boundary for finished RTP packets.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::packet::RtpPacket;
use crate::errors::{CaptureError, Result};

/// Accepts packets from a packetizer and takes care of transport.
pub trait PacketSink {
    fn send(&mut self, packet: &RtpPacket) -> Result<()>;

    fn send_all(&mut self, packets: &[RtpPacket]) -> Result<()> {
        packets.iter().try_for_each(|p| self.send(p))
    }
}

/// Collects packets in memory.
impl PacketSink for Vec<RtpPacket> {
    fn send(&mut self, packet: &RtpPacket) -> Result<()> {
        self.push(packet.clone());
        Ok(())
    }
}

/// Sends one UDP datagram per packet to a fixed peer.
pub struct UdpSink {
    socket: UdpSocket,
    peer: SocketAddr,
    max_datagram: usize,
    sent: u64,
}

impl UdpSink {
    /// Bind an ephemeral local port and connect to `addr`.
    ///
    /// Packets larger than `mtu` minus IP and UDP headers are still sent but logged.
    pub fn connect<A: ToSocketAddrs>(addr: A, mtu: usize) -> Result<Self> {
        let peer = addr
            .to_socket_addrs()
            .map_err(CaptureError::Sink)?
            .next()
            .ok_or_else(|| CaptureError::invalid_argument("address resolved to nothing"))?;

        let local: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(CaptureError::Sink)?;
        socket.connect(peer).map_err(CaptureError::Sink)?;

        let mtu = if mtu == 0 { 1500 } else { mtu };
        log::info!("RTP sink sending to {}", peer);

        Ok(Self {
            socket,
            peer,
            max_datagram: mtu.saturating_sub(28),
            sent: 0,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(CaptureError::Sink)
    }

    pub fn packets_sent(&self) -> u64 {
        self.sent
    }
}

impl PacketSink for UdpSink {
    fn send(&mut self, packet: &RtpPacket) -> Result<()> {
        let wire = packet.marshal();
        if wire.len() > self.max_datagram {
            log::warn!(
                "RTP datagram of {} bytes exceeds path budget of {}",
                wire.len(),
                self.max_datagram
            );
        }
        self.socket.send(&wire).map_err(CaptureError::Sink)?;
        self.sent += 1;
        Ok(())
    }
}
