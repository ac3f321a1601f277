pub mod arch;
mod file;
mod package;

pub use file::RpmFile;
pub use package::*;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashSet;
    use std::io::Write;

    use crate::deps::SenseFlags;
    use crate::header::{Header, Value, main_tags, signature_tags};
    use crate::lead::{LEAD_MAGIC, LEAD_SIZE};
    use crate::utils::align_n_bytes;

    use super::Package;

    /// Minimal well-formed main header for a binary package.
    pub(crate) fn minimal_header(name: &str, version: &str, release: &str) -> Header {
        let mut hdr = Header::new();
        hdr.insert("name", Value::Str(name.as_bytes().to_vec()));
        hdr.insert("version", Value::Str(version.as_bytes().to_vec()));
        hdr.insert("release", Value::Str(release.as_bytes().to_vec()));
        hdr.insert("arch", Value::Str(b"i386".to_vec()));
        hdr.insert("rpmversion", Value::Str(b"4.3.3".to_vec()));
        hdr.insert("sourcerpm", Value::Str(b"x-1.src.rpm".to_vec()));
        hdr.insert("payloadformat", Value::Str(b"cpio".to_vec()));
        hdr.insert("payloadcompressor", Value::Str(b"gzip".to_vec()));
        hdr
    }

    pub(crate) fn minimal_package(name: &str, version: &str, release: &str) -> Package {
        Package::new(minimal_header(name, version, release), Header::new(), false)
    }

    fn str_array(items: &[&str]) -> Value {
        Value::StrArray(items.iter().map(|s| s.as_bytes().to_vec()).collect())
    }

    /// Attach a requires list to a package.
    pub(crate) fn with_requires(mut pkg: Package, reqs: &[(&str, SenseFlags, &str)]) -> Package {
        pkg.header.insert(
            "requirename",
            str_array(&reqs.iter().map(|r| r.0).collect::<Vec<_>>()),
        );
        pkg.header.insert(
            "requireflags",
            Value::Uint32(reqs.iter().map(|r| r.1.bits()).collect()),
        );
        pkg.header.insert(
            "requireversion",
            str_array(&reqs.iter().map(|r| r.2).collect::<Vec<_>>()),
        );
        pkg
    }

    /// Serialize a complete binary package with a gzip payload and valid
    /// signature digests.
    pub(crate) fn build_rpm_with(header: &Header, payload: &[u8]) -> Vec<u8> {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let main = header
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();
        let main_bytes = main.file_bytes();

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload).unwrap();
        let compressed = enc.finish().unwrap();

        let sha1 = crate::digest::bytes_sha1(&main.intro(), &main.index_bytes, &main.store_bytes);
        let mut md5_input = main_bytes.clone();
        md5_input.extend_from_slice(&compressed);
        let md5 = {
            use md5::{Digest, Md5};
            let mut ctx = Md5::new();
            ctx.update(&md5_input);
            let out: [u8; 16] = ctx.finalize().into();
            out
        };

        let mut sig = Header::new();
        sig.insert("md5", Value::Bin(md5.to_vec()));
        sig.insert("sha1header", Value::Str(sha1.as_bytes().to_vec()));
        sig.insert("payloadsize", Value::Uint32(vec![payload.len() as u32]));
        sig.insert(
            "size_in_sig",
            Value::Uint32(vec![(main_bytes.len() + compressed.len()) as u32]),
        );
        let sig_encoded = sig
            .encode(signature_tags(), "header_signatures", &HashSet::new(), None)
            .unwrap();
        let sig_bytes = sig_encoded.file_bytes();
        let sig_pad = align_n_bytes(sig_encoded.store_size, 8) as usize;

        let mut lead = [0_u8; LEAD_SIZE];
        lead[0..4].copy_from_slice(&LEAD_MAGIC);
        lead[4] = 3;
        lead[76..78].copy_from_slice(&1_u16.to_be_bytes());
        lead[78..80].copy_from_slice(&5_u16.to_be_bytes());

        let mut out = Vec::new();
        out.extend_from_slice(&lead);
        out.extend_from_slice(&sig_bytes);
        out.extend(std::iter::repeat_n(0_u8, sig_pad));
        out.extend_from_slice(&main_bytes);
        out.extend_from_slice(&compressed);
        out
    }

    pub(crate) fn build_rpm_file(payload: &[u8]) -> Vec<u8> {
        build_rpm_with(&minimal_header("demo", "1.0", "1"), payload)
    }
}
