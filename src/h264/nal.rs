//! NAL unit classification.

use bytes::Bytes;

/// NAL unit types (low 5 bits of the header byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// Non-IDR slice (P or B frame)
    SliceNonIdr,
    SliceDataPartA,
    SliceDataPartB,
    SliceDataPartC,
    /// IDR slice
    SliceIdr,
    /// Supplemental enhancement information
    Sei,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    EndSeq,
    EndStream,
    Filler,
    /// Reserved or unspecified type
    Unknown(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => NalUnitType::SliceNonIdr,
            2 => NalUnitType::SliceDataPartA,
            3 => NalUnitType::SliceDataPartB,
            4 => NalUnitType::SliceDataPartC,
            5 => NalUnitType::SliceIdr,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            10 => NalUnitType::EndSeq,
            11 => NalUnitType::EndStream,
            12 => NalUnitType::Filler,
            n => NalUnitType::Unknown(n),
        }
    }
}

impl NalUnitType {
    /// Numeric type code (0..=31).
    pub fn code(&self) -> u8 {
        match self {
            NalUnitType::SliceNonIdr => 1,
            NalUnitType::SliceDataPartA => 2,
            NalUnitType::SliceDataPartB => 3,
            NalUnitType::SliceDataPartC => 4,
            NalUnitType::SliceIdr => 5,
            NalUnitType::Sei => 6,
            NalUnitType::Sps => 7,
            NalUnitType::Pps => 8,
            NalUnitType::Aud => 9,
            NalUnitType::EndSeq => 10,
            NalUnitType::EndStream => 11,
            NalUnitType::Filler => 12,
            NalUnitType::Unknown(n) => *n,
        }
    }

    /// SPS, PPS and IDR slices: a decoder cannot start output without them.
    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            NalUnitType::Sps | NalUnitType::Pps | NalUnitType::SliceIdr
        )
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NalUnitType::Sps | NalUnitType::Pps)
    }

    pub fn is_slice(&self) -> bool {
        matches!(self, NalUnitType::SliceNonIdr | NalUnitType::SliceIdr)
    }
}

/// A NAL unit without its start code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    pub nal_type: NalUnitType,
    /// Reference IDC (2 bits)
    pub nal_ref_idc: u8,
    /// Unit bytes including the header byte
    pub data: Bytes,
    pub keyframe: bool,
}

impl NalUnit {
    /// Classify raw unit bytes. Returns `None` for an empty unit.
    pub fn parse(data: Bytes) -> Option<Self> {
        let header = *data.first()?;
        let nal_type = NalUnitType::from(header);

        Some(Self {
            nal_type,
            nal_ref_idc: (header >> 5) & 0x03,
            data,
            keyframe: nal_type.is_keyframe(),
        })
    }

    pub fn header(&self) -> u8 {
        self.data[0]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Display for NalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NALU(type={}, size={}, keyframe={})",
            self.nal_type.code(),
            self.data.len(),
            self.keyframe
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_type_parsing() {
        assert_eq!(NalUnitType::from(0x65), NalUnitType::SliceIdr);
        assert_eq!(NalUnitType::from(0x67), NalUnitType::Sps);
        assert_eq!(NalUnitType::from(0x68), NalUnitType::Pps);
        assert_eq!(NalUnitType::from(0x41), NalUnitType::SliceNonIdr);
        assert_eq!(NalUnitType::from(0x1C), NalUnitType::Unknown(28));
    }

    #[test]
    fn test_keyframe_significance() {
        assert!(NalUnitType::SliceIdr.is_keyframe());
        assert!(NalUnitType::Sps.is_keyframe());
        assert!(NalUnitType::Pps.is_keyframe());
        assert!(!NalUnitType::SliceNonIdr.is_keyframe());
        assert!(!NalUnitType::Sei.is_keyframe());
    }

    #[test]
    fn test_code_round_trip() {
        for code in 0u8..32 {
            assert_eq!(NalUnitType::from(code).code(), code);
        }
    }

    #[test]
    fn test_parse_unit() {
        let nal = NalUnit::parse(Bytes::from_static(&[0x67, 0x42, 0x00, 0x1E])).unwrap();
        assert_eq!(nal.nal_type, NalUnitType::Sps);
        assert_eq!(nal.nal_ref_idc, 3);
        assert!(nal.keyframe);
        assert_eq!(nal.header(), 0x67);
        assert_eq!(nal.to_string(), "NALU(type=7, size=4, keyframe=true)");
        assert!(NalUnit::parse(Bytes::new()).is_none());
    }
}
