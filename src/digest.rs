use md5::Md5;
use sha1::{Digest, Sha1};
use std::io::Read;

use crate::error::Result;
use crate::header::RawHeader;

const CHUNK: usize = 64 * 1024;

/// Hex sha1 over the main header exactly as stored in the file: the
/// 16-byte intro, the index and the store. Compared against the
/// signature-header tag `sha1header`.
pub fn header_sha1(raw: &RawHeader) -> String {
    let mut ctx = Sha1::new();
    ctx.update(raw.intro);
    ctx.update(&raw.index_bytes);
    ctx.update(&raw.store_bytes);
    hex::encode(ctx.finalize())
}

/// Sha1 over already-encoded header bytes; used when checking re-emitted
/// database records.
pub fn bytes_sha1(intro: &[u8], index_bytes: &[u8], store_bytes: &[u8]) -> String {
    let mut ctx = Sha1::new();
    ctx.update(intro);
    ctx.update(index_bytes);
    ctx.update(store_bytes);
    hex::encode(ctx.finalize())
}

/// Md5 over the main header bytes plus the compressed payload, streamed
/// through to end of file. Compared against the signature-header tag
/// `md5` (16 raw bytes). The payload is never decompressed for this.
pub fn package_md5<R: Read>(raw: &RawHeader, mut payload: R) -> Result<[u8; 16]> {
    let mut ctx = Md5::new();
    ctx.update(raw.intro);
    ctx.update(&raw.index_bytes);
    ctx.update(&raw.store_bytes);
    let mut buf = vec![0_u8; CHUNK];
    loop {
        let n = payload.read(&mut buf)?;
        if n == 0 {
            break;
        }
        ctx.update(&buf[..n]);
    }
    Ok(ctx.finalize().into())
}

/// Hex md5 of a byte buffer; used for per-file content checks during
/// payload verification.
pub fn content_md5(data: &[u8]) -> String {
    let mut ctx = Md5::new();
    ctx.update(data);
    hex::encode(ctx.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(intro: [u8; 16], index: &[u8], store: &[u8]) -> RawHeader {
        RawHeader {
            index_no: index.len() / 16,
            store_size: store.len(),
            intro,
            index_bytes: index.to_vec(),
            store_bytes: store.to_vec(),
            total_len: 16 + index.len() + store.len(),
        }
    }

    #[test]
    fn test_header_sha1_known_value() {
        // sha1 of 48 zero bytes
        let r = raw([0; 16], &[0; 16], &[0; 16]);
        assert_eq!(
            header_sha1(&r),
            "c17fd92682ca5b304ac71074b558dda9e8eb4d66"
        );
        assert_eq!(header_sha1(&r), bytes_sha1(&[0; 16], &[0; 16], &[0; 16]));
    }

    #[test]
    fn test_package_md5_includes_payload() {
        let r = raw([1; 16], b"0123456789abcdef", b"");
        let without = package_md5(&r, &b""[..]).unwrap();
        let with = package_md5(&r, &b"payload"[..]).unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn test_content_md5() {
        assert_eq!(content_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_md5(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
