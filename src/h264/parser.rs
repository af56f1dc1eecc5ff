//! Annex-B start code scanning.
//!
//! A stream is a sequence of `00 00 01` or `00 00 00 01` start codes each
//! followed by one NAL unit. [`split_annex_b`] handles a complete buffer;
//! [`NalParser`] handles a stream delivered in arbitrary chunks.

use bytes::{Bytes, BytesMut};

use super::nal::{NalUnit, NalUnitType};

/// Maximum bytes held for an unterminated unit. A longer unit is emitted
/// truncated at this size.
pub const MAX_NAL_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Locate the next start code at or after `from`, returning `(position, length)`.
pub(crate) fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((i, 3));
            }
            if data[i + 2] == 0 && i + 3 < data.len() && data[i + 3] == 1 {
                return Some((i, 4));
            }
        }
        i += 1;
    }
    None
}

/// Split a complete Annex-B buffer into NAL units.
///
/// Bytes before the first start code are ignored. The last unit runs to the
/// end of the buffer.
pub fn split_annex_b(data: &[u8]) -> Vec<NalUnit> {
    let data = Bytes::copy_from_slice(data);
    let mut units = Vec::new();

    let Some((mut pos, mut len)) = find_start_code(&data, 0) else {
        return units;
    };

    loop {
        let start = pos + len;
        let next = find_start_code(&data, start);
        let end = next.map_or(data.len(), |(p, _)| p);

        if let Some(nal) = NalUnit::parse(data.slice(start..end)) {
            units.push(nal);
        }

        match next {
            Some((p, l)) => {
                pos = p;
                len = l;
            }
            None => break,
        }
    }

    units
}

/// Streaming Annex-B parser.
///
/// A unit is emitted once the start code that follows it has been seen, so a
/// unit (or a start code) split across two reads is reassembled rather than
/// lost. Call [`NalParser::flush`] at end of stream for the final unit.
pub struct NalParser {
    buffer: BytesMut,
    /// Offset from which to resume searching for the terminating start code.
    search_from: usize,
}

impl NalParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            search_from: 0,
        }
    }

    /// Feed a chunk and return every unit it completes.
    ///
    /// The ceiling applies to the open unit only. Complete units are emitted
    /// whatever the size of the chunk.
    pub fn feed(&mut self, data: &[u8]) -> Vec<NalUnit> {
        self.buffer.extend_from_slice(data);
        let mut nals = self.extract_nals();
        if self.buffer.len() > MAX_NAL_BUFFER_SIZE {
            log::warn!(
                "Open NAL unit exceeded {} bytes, emitting it truncated",
                MAX_NAL_BUFFER_SIZE
            );
            nals.extend(self.cut_oversized());
        }
        nals
    }

    /// Emit the open unit as it stands. The last bytes stay buffered since
    /// they may begin the next start code; the rest of the oversized unit is
    /// then skipped as data before a start code.
    fn cut_oversized(&mut self) -> Option<NalUnit> {
        let (_, start_len) = find_start_code(&self.buffer, 0)?;
        let _ = self.buffer.split_to(start_len);
        let end = self.buffer.len().saturating_sub(3);
        let nal_data = self.buffer.split_to(end).freeze();
        self.search_from = 0;
        NalUnit::parse(nal_data)
    }

    fn extract_nals(&mut self) -> Vec<NalUnit> {
        let mut nals = Vec::new();

        loop {
            let Some((start, start_len)) = find_start_code(&self.buffer, 0) else {
                // Keep what could be the beginning of a start code.
                let keep = self.buffer.len().min(3);
                let _ = self.buffer.split_to(self.buffer.len() - keep);
                self.search_from = 0;
                break;
            };

            if start > 0 {
                log::trace!("Discarding {} bytes before start code", start);
                let _ = self.buffer.split_to(start);
                self.search_from = self.search_from.saturating_sub(start);
            }

            let nal_start = start_len;
            let from = self.search_from.max(nal_start);
            let Some((nal_end, _)) = find_start_code(&self.buffer, from) else {
                // Unit still open; a start code may straddle the next chunk.
                self.search_from = self.buffer.len().saturating_sub(3).max(nal_start);
                break;
            };

            let _ = self.buffer.split_to(nal_start);
            let nal_data = self.buffer.split_to(nal_end - nal_start).freeze();
            self.search_from = 0;

            if let Some(nal) = NalUnit::parse(nal_data) {
                nals.push(nal);
            }
        }

        nals
    }

    /// Emit the trailing unit, if any, and clear the parser.
    pub fn flush(&mut self) -> Option<NalUnit> {
        let nal = match find_start_code(&self.buffer, 0) {
            Some((pos, len)) => {
                let _ = self.buffer.split_to(pos + len);
                NalUnit::parse(self.buffer.split().freeze())
            }
            None => None,
        };
        self.reset();
        nal
    }

    /// Bytes held for the unit currently being assembled.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.search_from = 0;
    }
}

impl Default for NalParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Quick check for an IDR slice without building units.
pub fn contains_idr(data: &[u8]) -> bool {
    let mut from = 0;
    while let Some((pos, len)) = find_start_code(data, from) {
        let header = pos + len;
        match data.get(header) {
            Some(&b) if NalUnitType::from(b) == NalUnitType::SliceIdr => return true,
            Some(_) => from = header,
            None => return false,
        }
    }
    false
}
