use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::Package;
use crate::digest;
use crate::error::{Error, Result};
use crate::header::{Header, main_tags, signature_tags};
use crate::lead::Lead;
#[cfg(unix)]
use crate::payload::extract::ExtractOptions;
use crate::payload::{self, verify_archive};

/// A package file: lead, signature header, main header and the still
/// compressed payload behind them.
#[derive(Debug)]
pub struct RpmFile<T> {
    pub lead: Lead,
    pub signature: Header,
    pub header: Header,
    pub payload_offset: u64,
    pub label: String,
    pub file: T,
}

impl RpmFile<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let label = path.as_ref().display().to_string();
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| Error::structural(&label, e))?;
        Self::read(file, &label)
    }
}

impl<T: Read + Seek> RpmFile<T> {
    pub fn read(mut reader: T, label: &str) -> Result<Self> {
        let lead = Lead::read(&mut reader)
            .map_err(|e| Error::Structural(format!("{}: {}", label, e)))?;
        let signature = Header::read(&mut reader, signature_tags(), 8)
            .map_err(|e| Error::Structural(format!("{}: {}", label, e)))?;
        let header = Header::read(&mut reader, main_tags(), 1)
            .map_err(|e| Error::Structural(format!("{}: {}", label, e)))?;
        let payload_offset = reader.stream_position()?;

        Ok(RpmFile {
            lead,
            signature,
            header,
            payload_offset,
            label: label.to_string(),
            file: reader,
        })
    }

    /// A package-record view over the decoded headers.
    pub fn to_package(&self) -> Package {
        Package::new(
            self.header.clone(),
            self.signature.clone(),
            self.lead.is_source(),
        )
    }

    pub fn into_package(self) -> Package {
        Package::new(self.header, self.signature, self.lead.is_source())
    }

    /// The decompressed cpio size announced by the headers: the signature
    /// `payloadsize`, cross-checked against the legacy `archivesize`.
    fn announced_payload_size(&self) -> Option<u64> {
        let cpiosize = self.signature.get_u32("payloadsize");
        let archivesize = self.header.get_u32("archivesize");
        if let (Some(c), Some(a)) = (cpiosize, archivesize) {
            if c != a {
                log::warn!("{}: wrong archive size", self.label);
            }
        }
        cpiosize.or(archivesize).map(u64::from)
    }

    /// Compressed payload length derived from `size_in_sig`, which spans
    /// the main header plus the payload.
    fn compressed_budget(&self) -> Option<u64> {
        let size_in_sig = u64::from(self.signature.get_u32("size_in_sig")?);
        let hdr_len = self.header.raw()?.total_len as u64;
        Some(size_in_sig.saturating_sub(hdr_len))
    }

    /// Position the stream and wrap it in the payload decompressor.
    pub fn payload_reader(&mut self) -> Result<Box<dyn Read + '_>> {
        payload::check_payload_format(self.header.get_str("payloadformat").as_deref())?;
        let expected = self.announced_payload_size();
        let budget = self.compressed_budget();
        let compressor = self.header.get_str("payloadcompressor");
        self.file.seek(SeekFrom::Start(self.payload_offset))?;
        payload::decompressor(
            compressor.as_deref(),
            &mut self.file,
            &self.label,
            expected,
            budget,
        )
    }

    /// Check the two signature digests: sha1 over the main header bytes
    /// and md5 over header plus compressed payload.
    pub fn verify_digests(&mut self) -> Result<()> {
        let raw = self
            .header
            .raw()
            .ok_or_else(|| Error::structural(&self.label, "header bytes not retained"))?;
        if let Some(expected) = self.signature.get_str("sha1header") {
            let actual = digest::header_sha1(raw);
            if actual != expected {
                return Err(Error::integrity(
                    &self.label,
                    format!("wrong sha1: {} / {}", expected, actual),
                ));
            }
        }
        if let Some(expected) = self.signature.get_bin("md5") {
            let expected = expected.to_vec();
            self.file.seek(SeekFrom::Start(self.payload_offset))?;
            let actual = digest::package_md5(raw, &mut self.file)?;
            if actual[..] != expected[..] {
                return Err(Error::integrity(
                    &self.label,
                    format!(
                        "wrong md5: {} / {}",
                        hex::encode(&expected),
                        hex::encode(actual)
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Check the announced package size against the actual file length.
    pub fn verify_size(&mut self) -> Result<Vec<String>> {
        let mut diags = Vec::new();
        if let (Some(size_in_sig), Some(sig_raw)) =
            (self.signature.get_u32("size_in_sig"), self.signature.raw())
        {
            let expected = 96 + sig_raw.total_len as u64 + u64::from(size_in_sig);
            let actual = self.file.seek(SeekFrom::End(0))?;
            if actual != expected {
                diags.push(format!(
                    "{}: wrong size in rpm package ({} != {})",
                    self.label, actual, expected
                ));
            }
        }
        Ok(diags)
    }

    /// Full verification pass: header consistency, announced size, both
    /// digests and the payload walk against the file table.
    pub fn verify(&mut self, nodigest: bool) -> Result<Vec<String>> {
        let pkg = self.to_package();
        let mut diags = pkg.validate(main_tags(), signature_tags())?;
        diags.extend(self.verify_size()?);
        if !nodigest {
            self.verify_digests()?;
        }
        let files = pkg.file_infos()?;
        let expected = self.announced_payload_size();
        let is_source = self.lead.is_source();
        let label = self.label.clone();
        let mut reader = self.payload_reader()?;
        diags.extend(verify_archive(
            &mut reader,
            &label,
            &files,
            is_source,
            expected,
        )?);
        Ok(diags)
    }

    /// Extract the payload under `options.dest`.
    #[cfg(unix)]
    pub fn extract(&mut self, options: &ExtractOptions) -> Result<Vec<String>> {
        let pkg = self.to_package();
        let files = pkg.file_infos()?;
        let is_source = self.lead.is_source();
        let label = self.label.clone();
        let mut reader = self.payload_reader()?;
        payload::extract::extract_archive(&mut reader, &label, &files, is_source, options)
    }
}
