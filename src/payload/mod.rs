mod cpio;
#[cfg(unix)]
pub mod extract;
mod gzip;

pub use cpio::*;
pub use gzip::GzipReader;

use bzip2::read::BzDecoder;
use std::io::{Cursor, Read};
use xz2::read::XzDecoder;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::deps::FileFlags;
use crate::error::{Error, Result};

/// Everything the file table of a package says about one file, assembled
/// from the parallel file tags.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub size: u32,
    pub user: String,
    pub group: String,
    pub flags: FileFlags,
    pub mtime: u32,
    pub digest: String,
    pub mode: u16,
    pub linkto: String,
    pub device: u32,
    pub inode: u32,
    pub rdev: u16,
}

const S_IFMT: u16 = 0o170000;

pub fn is_reg(mode: u16) -> bool {
    mode & S_IFMT == 0o100000
}

pub fn is_lnk(mode: u16) -> bool {
    mode & S_IFMT == 0o120000
}

pub fn is_dir(mode: u16) -> bool {
    mode & S_IFMT == 0o040000
}

pub fn is_fifo(mode: u16) -> bool {
    mode & S_IFMT == 0o010000
}

pub fn is_chr(mode: u16) -> bool {
    mode & S_IFMT == 0o020000
}

pub fn is_blk(mode: u16) -> bool {
    mode & S_IFMT == 0o060000
}

pub fn is_sock(mode: u16) -> bool {
    mode & S_IFMT == 0o140000
}

/// Refuse payload formats the cpio reader cannot parse. `drpm` payloads
/// are structurally valid packages but are rejected before any payload
/// work starts.
pub fn check_payload_format(format: Option<&str>) -> Result<()> {
    match format {
        None | Some("cpio") => Ok(()),
        Some(other) => Err(Error::Compat(format!(
            "unknown payload format \"{}\"",
            other
        ))),
    }
}

/// Wrap the compressed payload stream in the right decompressor. Gzip is
/// streamed with trailer bookkeeping; bzip2 payloads are decompressed in
/// one pass into memory; zstd and xz streams are handed to their stock
/// decoders.
pub fn decompressor<'a, R: Read + 'a>(
    compressor: Option<&str>,
    reader: R,
    label: &str,
    expected_len: Option<u64>,
    budget: Option<u64>,
) -> Result<Box<dyn Read + 'a>> {
    match compressor {
        None | Some("gzip") => Ok(Box::new(GzipReader::new(
            reader,
            label,
            expected_len,
            budget.map(|b| b.saturating_sub(8)),
        )?)),
        Some("bzip2") => {
            let mut compressed = Vec::new();
            let mut reader = reader;
            match budget {
                Some(b) => {
                    reader.take(b).read_to_end(&mut compressed)?;
                }
                None => {
                    reader.read_to_end(&mut compressed)?;
                }
            }
            let mut data = Vec::new();
            BzDecoder::new(compressed.as_slice()).read_to_end(&mut data)?;
            Ok(Box::new(Cursor::new(data)))
        }
        Some("zstd") => Ok(Box::new(ZstdDecoder::new(reader)?)),
        Some("xz") | Some("lzma") => Ok(Box::new(XzDecoder::new(reader))),
        Some(other) => Err(Error::Compat(format!(
            "unknown payload compression \"{}\"",
            other
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::Compression;
    use bzip2::write::BzEncoder;
    use std::io::Write;

    #[test]
    fn test_mode_classes() {
        assert!(is_reg(0o100644));
        assert!(is_dir(0o040755));
        assert!(is_lnk(0o120777));
        assert!(is_fifo(0o010644));
        assert!(is_chr(0o020644));
        assert!(is_blk(0o060644));
        assert!(is_sock(0o140755));
        assert!(!is_reg(0o040755));
    }

    #[test]
    fn test_payload_format_gate() {
        assert!(check_payload_format(None).is_ok());
        assert!(check_payload_format(Some("cpio")).is_ok());
        assert!(matches!(
            check_payload_format(Some("drpm")),
            Err(Error::Compat(_))
        ));
    }

    #[test]
    fn test_bzip2_whole_buffer() {
        let mut enc = BzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"bzip2 payload bytes").unwrap();
        let packed = enc.finish().unwrap();
        let mut out = Vec::new();
        decompressor(Some("bzip2"), packed.as_slice(), "t.rpm", None, None)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"bzip2 payload bytes");
    }

    #[test]
    fn test_unknown_compressor() {
        assert!(matches!(
            decompressor(Some("lzip"), &b""[..], "t.rpm", None, None),
            Err(Error::Compat(_))
        ));
    }
}
