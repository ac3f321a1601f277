use flate2::{Crc, Decompress, FlushDecompress, Status};
use log::warn;
use std::io::{self, Read};

use crate::error::{Error, Result};

const FHCRC: u8 = 1 << 1;
const FEXTRA: u8 = 1 << 2;
const FNAME: u8 = 1 << 3;
const FCOMMENT: u8 = 1 << 4;

const IN_CHUNK: usize = 32 * 1024;

/// Streaming gzip reader that keeps its own CRC32 and length counters so
/// the 8-byte trailer can be checked without a second pass. Trailer
/// mismatches are warnings, not errors: some producers write a wrong
/// length field for payloads of size 0.
pub struct GzipReader<R: Read> {
    inner: R,
    label: String,
    decomp: Decompress,
    crc: Crc,
    out_len: u64,
    /// Expected decompressed size, when the headers carried one.
    expected_len: Option<u64>,
    /// Remaining compressed bytes before the trailer, when known.
    budget: Option<u64>,
    in_buf: Vec<u8>,
    in_pos: usize,
    in_end: usize,
    /// Last eight raw bytes seen; becomes the trailer at end of stream.
    tail: Vec<u8>,
    finished: bool,
}

impl<R: Read> GzipReader<R> {
    /// Open a gzip stream. `expected_len` is the decompressed payload
    /// size from the package headers; `budget` is the number of
    /// compressed bytes this stream may consume, excluding the 8-byte
    /// trailer (callers derive it from `size_in_sig`).
    pub fn new(
        mut inner: R,
        label: &str,
        expected_len: Option<u64>,
        budget: Option<u64>,
    ) -> Result<Self> {
        let mut budget = budget;
        let mut head = [0_u8; 10];
        inner.read_exact(&mut head)?;
        if head[0] != 0x1f || head[1] != 0x8b || head[2] != 0x08 {
            return Err(Error::structural(label, "not a gzipped payload"));
        }
        consume(&mut budget, 10);
        let flag = head[3];
        if flag & FEXTRA != 0 {
            let mut xlen = [0_u8; 2];
            inner.read_exact(&mut xlen)?;
            let xlen = u16::from_le_bytes(xlen) as u64;
            skip(&mut inner, xlen)?;
            consume(&mut budget, 2 + xlen);
        }
        if flag & FNAME != 0 {
            consume(&mut budget, skip_until_nul(&mut inner)?);
        }
        if flag & FCOMMENT != 0 {
            consume(&mut budget, skip_until_nul(&mut inner)?);
        }
        if flag & FHCRC != 0 {
            skip(&mut inner, 2)?;
            consume(&mut budget, 2);
        }
        Ok(GzipReader {
            inner,
            label: label.to_string(),
            decomp: Decompress::new(false),
            crc: Crc::new(),
            out_len: 0,
            expected_len,
            budget,
            in_buf: vec![0_u8; IN_CHUNK],
            in_pos: 0,
            in_end: 0,
            tail: Vec::with_capacity(8),
            finished: false,
        })
    }

    fn note_raw(&mut self, bytes: &[u8]) {
        self.tail.extend_from_slice(bytes);
        let len = self.tail.len();
        if len > 8 {
            self.tail.drain(..len - 8);
        }
    }

    fn refill(&mut self) -> io::Result<usize> {
        let want = match self.budget {
            Some(b) => (b as usize).min(IN_CHUNK),
            None => IN_CHUNK,
        };
        if want == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut self.in_buf[..want])?;
        if n > 0 {
            let raw = self.in_buf[..n].to_vec();
            self.note_raw(&raw);
            if let Some(b) = self.budget.as_mut() {
                *b -= n as u64;
            }
        }
        self.in_pos = 0;
        self.in_end = n;
        Ok(n)
    }

    /// Read through the trailer and compare it against the running CRC
    /// and length. Called automatically at end of stream.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        // Input the decompressor left unconsumed is already in `tail`;
        // the trailer itself was excluded from the budget, so read it now.
        let mut rest = Vec::new();
        match self.budget {
            Some(b) => {
                let mut take = (&mut self.inner).take(b + 8);
                take.read_to_end(&mut rest)?;
            }
            None => {
                self.inner.read_to_end(&mut rest)?;
            }
        }
        self.note_raw(&rest);
        if self.tail.len() < 8 {
            warn!("{}: gzip stream too short for a trailer", self.label);
            return Ok(());
        }
        let t = &self.tail[self.tail.len() - 8..];
        let crc32 = u32::from_le_bytes([t[0], t[1], t[2], t[3]]);
        let isize = u32::from_le_bytes([t[4], t[5], t[6], t[7]]);
        if crc32 != self.crc.sum() {
            warn!(
                "{}: CRC check failed: {:08x} / {:08x}",
                self.label,
                crc32,
                self.crc.sum()
            );
        }
        if u64::from(isize) != self.out_len & 0xffff_ffff {
            warn!(
                "{}: incorrect length of data produced: {} / {}",
                self.label, isize, self.out_len
            );
        }
        if let Some(expected) = self.expected_len {
            if expected != self.out_len {
                warn!(
                    "{}: incorrect length of data produced: {} / {}",
                    self.label, expected, self.out_len
                );
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for GzipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.finished {
            return Ok(0);
        }
        loop {
            if self.in_pos == self.in_end && self.refill()? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated gzip stream",
                ));
            }
            let before_in = self.decomp.total_in();
            let before_out = self.decomp.total_out();
            let status = self
                .decomp
                .decompress(
                    &self.in_buf[self.in_pos..self.in_end],
                    buf,
                    FlushDecompress::None,
                )
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.in_pos += (self.decomp.total_in() - before_in) as usize;
            let produced = (self.decomp.total_out() - before_out) as usize;
            if produced > 0 {
                self.crc.update(&buf[..produced]);
                self.out_len += produced as u64;
            }
            match status {
                Status::StreamEnd => {
                    self.finish()?;
                    return Ok(produced);
                }
                _ if produced > 0 => return Ok(produced),
                _ => {}
            }
        }
    }
}

fn consume(budget: &mut Option<u64>, n: u64) {
    if let Some(b) = budget.as_mut() {
        *b = b.saturating_sub(n);
    }
}

fn skip<R: Read>(reader: &mut R, n: u64) -> io::Result<()> {
    let mut sink = io::sink();
    let copied = io::copy(&mut reader.take(n), &mut sink)?;
    if copied != n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated gzip header",
        ));
    }
    Ok(())
}

fn skip_until_nul<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut count = 0;
    let mut byte = [0_u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        count += 1;
        if byte[0] == 0 {
            return Ok(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let data = b"hello cpio archive".repeat(100);
        let packed = gzip(&data);
        let mut reader =
            GzipReader::new(packed.as_slice(), "test.rpm", Some(data.len() as u64), None).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_roundtrip_with_budget() {
        let data = b"budgeted stream".repeat(50);
        let packed = gzip(&data);
        let budget = packed.len() as u64 - 8;
        let mut reader = GzipReader::new(
            packed.as_slice(),
            "test.rpm",
            Some(data.len() as u64),
            Some(budget),
        )
        .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_name_field_skipped() {
        let mut enc = flate2::GzBuilder::new()
            .filename("payload.cpio")
            .comment("made up")
            .write(Vec::new(), Compression::default());
        enc.write_all(b"named").unwrap();
        let packed = enc.finish().unwrap();
        let mut reader = GzipReader::new(packed.as_slice(), "test.rpm", None, None).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"named");
    }

    #[test]
    fn test_empty_payload() {
        let packed = gzip(b"");
        let mut reader = GzipReader::new(packed.as_slice(), "test.rpm", Some(0), None).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let err = GzipReader::new(&b"not gzip data....."[..], "test.rpm", None, None);
        assert!(err.is_err());
    }
}
