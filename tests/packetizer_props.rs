//! Property-based tests for the H.264 parser and RTP packetizer.
//!
//! Focus: stable invariants (MTU bounds, marker semantics, sequencing,
//! shared fragment timestamps, and lossless reconstruction).

use proptest::prelude::*;

use bytes::Bytes;
use ffcapture::h264::{split_annex_b, NalParser, NalUnit};
use ffcapture::rtp::{H264Packetizer, PacketizerConfig, RtpPacket};

fn build_annex_b_stream(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut stream = Vec::new();
    for (i, nal) in nals.iter().enumerate() {
        if i % 2 == 0 {
            stream.extend_from_slice(&[0, 0, 0, 1]);
        } else {
            stream.extend_from_slice(&[0, 0, 1]);
        }
        stream.extend_from_slice(nal);
    }
    stream
}

fn reconstruct_nals_from_packets(packets: &[RtpPacket]) -> Result<Vec<Vec<u8>>, String> {
    let mut nals: Vec<Vec<u8>> = Vec::new();
    let mut current_fu: Option<Vec<u8>> = None;

    for p in packets {
        if p.payload.is_empty() {
            return Err("Empty RTP payload".to_string());
        }

        let nal_type = p.payload[0] & 0x1F;

        if nal_type == 28 {
            // FU-A
            if p.payload.len() < 3 {
                return Err("FU-A payload too short".to_string());
            }

            let fu_indicator = p.payload[0];
            let fu_header = p.payload[1];
            let start = (fu_header & 0x80) != 0;
            let end = (fu_header & 0x40) != 0;

            let orig_nal_header = (fu_indicator & 0xE0) | (fu_header & 0x1F);
            let fragment = &p.payload[2..];

            if start {
                if current_fu.is_some() {
                    return Err("FU-A start while previous FU incomplete".to_string());
                }
                let mut nal = Vec::with_capacity(1 + fragment.len());
                nal.push(orig_nal_header);
                nal.extend_from_slice(fragment);
                current_fu = Some(nal);
            } else {
                let Some(ref mut nal) = current_fu else {
                    return Err("FU-A continuation without start".to_string());
                };
                nal.extend_from_slice(fragment);
            }

            if end {
                let nal = current_fu.take().ok_or("FU-A end without start".to_string())?;
                nals.push(nal);
            }
        } else {
            // Single NAL
            if current_fu.is_some() {
                return Err("Single NAL while FU-A in progress".to_string());
            }
            nals.push(p.payload.to_vec());
        }
    }

    if current_fu.is_some() {
        return Err("FU-A did not terminate with end bit".to_string());
    }

    Ok(nals)
}

fn nal_unit_strategy() -> impl Strategy<Value = Vec<u8>> {
    // Single NAL types (1..=23), NRI=3 (0x60) and F=0.
    (1u8..=23u8, proptest::collection::vec(any::<u8>(), 0..5000)).prop_map(|(nal_type, mut rest)| {
        let mut nal = Vec::with_capacity(rest.len() + 1);
        nal.push(0x60 | nal_type);
        nal.append(&mut rest);
        nal
    })
}

/// NAL bodies that cannot contain a start code or end in a zero byte.
fn clean_nal_strategy() -> impl Strategy<Value = Vec<u8>> {
    (1u8..=23u8, proptest::collection::vec(1u8..=255u8, 0..600)).prop_map(|(nal_type, rest)| {
        let mut nal = vec![0x60 | nal_type];
        nal.extend(rest);
        nal
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// INVARIANT: packets respect the MTU budget, sequence numbers are
    /// contiguous across NAL units, every fragment of a unit shares its
    /// timestamp, and the units reconstruct byte for byte.
    #[test]
    fn h264_packetize_invariants_hold(
        mtu in 200usize..1500usize,
        initial_sequence in any::<u16>(),
        nals in proptest::collection::vec(nal_unit_strategy(), 1..6),
    ) {
        let config = PacketizerConfig { mtu, initial_sequence, ..Default::default() };
        let mut packetizer = H264Packetizer::new(config).expect("valid config");

        let mut packets = Vec::new();
        for (i, raw) in nals.iter().enumerate() {
            let nal = NalUnit::parse(Bytes::from(raw.clone())).expect("non-empty");
            let unit_packets = packetizer.packetize(&nal);
            prop_assert!(!unit_packets.is_empty());

            let expected_ts = (i as u32).wrapping_mul(3000);
            for p in &unit_packets {
                prop_assert!(p.payload.len() <= mtu - 32);
                prop_assert_eq!(p.header.timestamp, expected_ts);
                prop_assert_eq!(p.header.version, 2);
                prop_assert_eq!(p.header.payload_type, 96);
            }

            // Marker: always on a single packet; on fragments only at the end of a keyframe unit.
            if unit_packets.len() == 1 {
                prop_assert!(unit_packets[0].header.marker);
            } else {
                let (last, rest) = unit_packets.split_last().unwrap();
                prop_assert!(rest.iter().all(|p| !p.header.marker));
                prop_assert_eq!(last.header.marker, nal.keyframe);
                for p in rest {
                    prop_assert!(p.payload.len() - 2 <= mtu - 34);
                }
            }

            packets.extend(unit_packets);
        }

        for (i, p) in packets.iter().enumerate() {
            prop_assert_eq!(p.header.sequence_number, initial_sequence.wrapping_add(i as u16));
        }
        prop_assert_eq!(
            packetizer.sequence_number(),
            initial_sequence.wrapping_add(packets.len() as u16)
        );

        let reconstructed = reconstruct_nals_from_packets(&packets)
            .map_err(TestCaseError::fail)?;
        prop_assert_eq!(reconstructed, nals);
    }

    /// INVARIANT: wire format survives a marshal/unmarshal pass for any packetizer output.
    #[test]
    fn rtp_wire_format_is_stable(
        ssrc in any::<u32>(),
        nal in nal_unit_strategy(),
    ) {
        let config = PacketizerConfig { ssrc, ..Default::default() };
        let mut packetizer = H264Packetizer::new(config).expect("valid config");
        let unit = NalUnit::parse(Bytes::from(nal)).expect("non-empty");

        for packet in packetizer.packetize(&unit) {
            let wire = packet.marshal();
            prop_assert_eq!(wire.len(), 12 + packet.payload.len());
            let parsed = RtpPacket::unmarshal(&wire).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(parsed, packet);
        }
    }

    /// INVARIANT: splitting a stream at arbitrary read boundaries yields the
    /// same units as scanning it whole.
    #[test]
    fn streaming_parser_matches_whole_buffer_scan(
        nals in proptest::collection::vec(nal_unit_strategy(), 1..8),
        cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..12),
    ) {
        let stream = build_annex_b_stream(&nals);
        let expected = split_annex_b(&stream);

        let mut points: Vec<usize> = cuts.iter().map(|c| c.index(stream.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();

        let mut parser = NalParser::new();
        let mut units = Vec::new();
        let mut last = 0;
        for point in points.into_iter().chain(std::iter::once(stream.len())) {
            units.extend(parser.feed(&stream[last..point]));
            last = point;
        }
        units.extend(parser.flush());

        prop_assert_eq!(units, expected);
    }

    /// INVARIANT: without emulated start codes, parsing returns exactly the units written.
    #[test]
    fn annex_b_split_recovers_written_units(
        nals in proptest::collection::vec(clean_nal_strategy(), 1..10),
    ) {
        let stream = build_annex_b_stream(&nals);
        let units = split_annex_b(&stream);
        let recovered: Vec<Vec<u8>> = units.iter().map(|u| u.data.to_vec()).collect();
        prop_assert_eq!(recovered, nals);
    }
}
