use std::collections::VecDeque;
use std::io::{self, Read};

use super::nal::NalUnit;
use super::parser::NalParser;
use crate::demux::wrap_io;
use crate::errors::Result;
use crate::process::DiagnosticBuffer;

/// Read size used when pulling the Annex-B stream.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Pulls an Annex-B stream from a reader and yields one NAL unit at a time.
pub struct H264Reader<R> {
    reader: R,
    parser: NalParser,
    pending: VecDeque<NalUnit>,
    chunk: Vec<u8>,
    diagnostics: Option<DiagnosticBuffer>,
    eof: bool,
}

impl<R: Read> H264Reader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: NalParser::new(),
            pending: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE],
            diagnostics: None,
            eof: false,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticBuffer) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Next NAL unit. `Ok(None)` once the stream has ended and been drained.
    pub fn read_nal(&mut self) -> Result<Option<NalUnit>> {
        loop {
            if let Some(nal) = self.pending.pop_front() {
                return Ok(Some(nal));
            }
            if self.eof {
                return Ok(None);
            }

            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    self.eof = true;
                    self.pending.extend(self.parser.flush());
                }
                Ok(n) => {
                    let nals = self.parser.feed(&self.chunk[..n]);
                    self.pending.extend(nals);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(wrap_io(e, self.diagnostics.as_ref())),
            }
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for H264Reader<R> {
    type Item = Result<NalUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_nal().transpose()
    }
}
