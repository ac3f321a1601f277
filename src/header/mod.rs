mod index;
mod tags;
mod value;

pub use index::*;
pub use tags::*;
pub use value::*;

use std::collections::{HashMap, HashSet};
use std::io::Read;

use log::warn;

use crate::error::{Error, Result};
use crate::utils::align_n_bytes;

pub const HEADER_MAGIC: [u8; 8] = [0x8e, 0xad, 0xe8, 0x01, 0x00, 0x00, 0x00, 0x00];

/// The raw bytes of one header as read from disk, kept alongside the
/// decoded tags: digests are computed over these bytes and the immutable
/// region is recovered from them.
#[derive(Debug, Clone)]
pub struct RawHeader {
    pub index_no: usize,
    pub store_size: usize,
    /// 8-byte magic plus the two big-endian counts.
    pub intro: [u8; 16],
    pub index_bytes: Vec<u8>,
    pub store_bytes: Vec<u8>,
    /// Bytes consumed from the file, including trailing padding.
    pub total_len: usize,
}

/// Result of encoding a header: the two counts plus the serialized index
/// and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHeader {
    pub index_no: u32,
    pub store_size: u32,
    pub index_bytes: Vec<u8>,
    pub store_bytes: Vec<u8>,
}

impl EncodedHeader {
    /// The 16-byte intro as stored in a package file.
    pub fn intro(&self) -> [u8; 16] {
        let mut out = [0_u8; 16];
        out[0..8].copy_from_slice(&HEADER_MAGIC);
        out[8..12].copy_from_slice(&self.index_no.to_be_bytes());
        out[12..16].copy_from_slice(&self.store_size.to_be_bytes());
        out
    }

    /// Serialization used by the installed database: counts without the
    /// magic, then index and store.
    pub fn db_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.index_bytes.len() + self.store_bytes.len());
        out.extend_from_slice(&self.index_no.to_be_bytes());
        out.extend_from_slice(&self.store_size.to_be_bytes());
        out.extend_from_slice(&self.index_bytes);
        out.extend_from_slice(&self.store_bytes);
        out
    }

    /// Full file serialization: magic intro, index, store.
    pub fn file_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.index_bytes.len() + self.store_bytes.len());
        out.extend_from_slice(&self.intro());
        out.extend_from_slice(&self.index_bytes);
        out.extend_from_slice(&self.store_bytes);
        out
    }
}

/// A decoded header: a mapping from registry tag names to typed values,
/// plus the raw bytes it was read from (when it was read rather than
/// built).
#[derive(Debug, Default, Clone)]
pub struct Header {
    tags: HashMap<&'static str, Value>,
    raw: Option<RawHeader>,
}

impl Header {
    pub fn new() -> Self {
        Header::default()
    }

    /// Read one header from `fh`: 16-byte intro, index, store, and
    /// `pad`-alignment trailing bytes (8 for the signature header, 1 for
    /// the main header).
    pub fn read<R: Read>(fh: &mut R, registry: &TagRegistry, pad: u32) -> Result<Header> {
        let mut intro = [0_u8; 16];
        fh.read_exact(&mut intro)?;
        Self::read_after_intro(fh, registry, pad, intro)
    }

    fn read_after_intro<R: Read>(
        fh: &mut R,
        registry: &TagRegistry,
        pad: u32,
        intro: [u8; 16],
    ) -> Result<Header> {
        if intro[0..8] != HEADER_MAGIC {
            return Err(Error::Structural("bad header magic".to_string()));
        }
        let index_no = u32::from_be_bytes([intro[8], intro[9], intro[10], intro[11]]) as usize;
        let store_size = u32::from_be_bytes([intro[12], intro[13], intro[14], intro[15]]) as usize;
        if index_no < 1 {
            return Err(Error::Structural("empty header index".to_string()));
        }

        let mut index_bytes = vec![0_u8; index_no * IndexEntry::SIZE];
        fh.read_exact(&mut index_bytes)?;
        let mut store_bytes = vec![0_u8; store_size];
        fh.read_exact(&mut store_bytes)?;

        let padlen = if pad > 1 {
            align_n_bytes(store_size as u32, pad) as usize
        } else {
            0
        };
        if padlen > 0 {
            let mut padbuf = vec![0_u8; padlen];
            fh.read_exact(&mut padbuf)?;
        }

        let raw = RawHeader {
            index_no,
            store_size,
            intro,
            index_bytes,
            store_bytes,
            total_len: 16 + index_no * IndexEntry::SIZE + store_size + padlen,
        };
        let tags = Self::parse_index(&raw, registry)?;
        Ok(Header {
            tags,
            raw: Some(raw),
        })
    }

    /// Parse a record of the installed database, which stores the two
    /// counts without the leading magic.
    pub fn read_db_record(data: &[u8], registry: &TagRegistry) -> Result<Header> {
        if data.len() < 8 {
            return Err(Error::Structural("short database record".to_string()));
        }
        let mut intro = [0_u8; 16];
        intro[0..8].copy_from_slice(&HEADER_MAGIC);
        intro[8..16].copy_from_slice(&data[0..8]);
        let mut cursor = &data[8..];
        Self::read_after_intro(&mut cursor, registry, 1, intro)
    }

    fn parse_index(raw: &RawHeader, registry: &TagRegistry) -> Result<HashMap<&'static str, Value>> {
        let mut tags: HashMap<&'static str, Value> = HashMap::new();
        for i in 0..raw.index_no {
            let entry = IndexEntry::parse(&raw.index_bytes[i * IndexEntry::SIZE..])?;
            let Some(info) = registry.by_id(entry.tag) else {
                // unknown tags are accepted by skipping, and never re-emitted
                continue;
            };
            let value = Self::read_value(&raw.store_bytes, &entry, info)?;
            let mut name = info.name;
            if tags.contains_key(name) {
                // A second occurrence of the three file-list tags binds to
                // its database alias; any other duplicate must be
                // byte-identical to the first.
                match ALIAS_PAIRS.iter().find(|(primary, _)| *primary == name) {
                    Some(&(_, alias)) if registry.by_name(alias).is_some() => name = alias,
                    _ => {
                        if tags[name] != value {
                            return Err(Error::Consistency(format!(
                                "duplicate tag {} with divergent values",
                                entry.tag
                            )));
                        }
                        warn!("duplicate tag {}", entry.tag);
                        continue;
                    }
                }
            }
            tags.insert(name, value);
        }
        Ok(tags)
    }

    fn read_value(store: &[u8], entry: &IndexEntry, info: &TagInfo) -> Result<Value> {
        let ttype = Type::from_wire(entry.ttype)?;
        let offset = entry.offset as usize;
        let count = entry.count as usize;
        let need = |len: usize| -> Result<()> {
            if offset + len > store.len() {
                Err(Error::Structural(format!(
                    "tag {} value exceeds store ({} + {} > {})",
                    entry.tag,
                    offset,
                    len,
                    store.len()
                )))
            } else {
                Ok(())
            }
        };
        let value = match ttype {
            Type::String => Value::Str(read_nul_string(store, offset, entry.tag)?),
            Type::StringArray => {
                Value::StrArray(read_nul_strings(store, offset, count, entry.tag)?)
            }
            Type::I18nString => Value::I18n(read_nul_strings(store, offset, count, entry.tag)?),
            Type::Char => {
                need(count)?;
                Value::Char(store[offset..offset + count].to_vec())
            }
            Type::Int8 => {
                need(count)?;
                Value::Int8(store[offset..offset + count].to_vec())
            }
            Type::Int16 => {
                need(count * 2)?;
                Value::Int16(
                    (0..count)
                        .map(|i| {
                            let p = offset + i * 2;
                            u16::from_be_bytes([store[p], store[p + 1]])
                        })
                        .collect(),
                )
            }
            Type::Int32 => {
                need(count * 4)?;
                let words = (0..count).map(|i| {
                    let p = offset + i * 4;
                    [store[p], store[p + 1], store[p + 2], store[p + 3]]
                });
                if info.flags.contains(TagFlags::SIGNED) {
                    Value::Int32(words.map(i32::from_be_bytes).collect())
                } else {
                    Value::Uint32(words.map(u32::from_be_bytes).collect())
                }
            }
            Type::Int64 => {
                need(count * 8)?;
                Value::Int64(
                    (0..count)
                        .map(|i| {
                            let p = offset + i * 8;
                            let mut b = [0_u8; 8];
                            b.copy_from_slice(&store[p..p + 8]);
                            u64::from_be_bytes(b)
                        })
                        .collect(),
                )
            }
            Type::Bin => {
                need(count)?;
                Value::Bin(store[offset..offset + count].to_vec())
            }
            Type::Null | Type::ArgString | Type::Group => {
                return Err(Error::Structural(format!(
                    "unknown tag type {} for tag {}",
                    entry.ttype, entry.tag
                )));
            }
        };
        Ok(value)
    }

    /// Emit order and serialization of `writeHeader`: normal tags sorted
    /// by id, then (when `install` is given) install-only tags sorted by
    /// id, with the region tag's index entry moved to the front of the
    /// index array while its store bytes stay between the two groups.
    pub fn encode(
        &self,
        registry: &TagRegistry,
        region: &str,
        skip: &HashSet<&'static str>,
        install: Option<&HashSet<&'static str>>,
    ) -> Result<EncodedHeader> {
        let mut normal: Vec<(u32, &'static str)> = Vec::new();
        let mut install_group: Vec<(u32, &'static str)> = Vec::new();
        let mut region_group: Vec<(u32, &'static str)> = Vec::new();
        for name in self.tags.keys() {
            let info = registry
                .by_name(name)
                .ok_or_else(|| Error::Structural(format!("tag {} not in registry", name)))?;
            if *name == region {
                region_group.push((info.id, info.name));
            } else if skip.contains(name) {
                continue;
            } else if install.is_some_and(|keys| keys.contains(name)) {
                install_group.push((info.id, info.name));
            } else {
                normal.push((info.id, info.name));
            }
        }
        normal.sort_unstable();
        install_group.sort_unstable();
        normal.extend(region_group.iter().copied());
        normal.extend(install_group);

        let mut offset: u32 = 0;
        let mut store: Vec<u8> = Vec::new();
        let mut index: Vec<[u8; IndexEntry::SIZE]> = Vec::new();
        for (id, name) in &normal {
            let value = &self.tags[name];
            let pad = value.padding(offset);
            if pad > 0 {
                store.extend(std::iter::repeat_n(0_u8, pad as usize));
                offset += pad;
            }
            let data = value.store_bytes();
            let entry = IndexEntry {
                tag: *id,
                ttype: value.wire_type() as u32,
                offset,
                count: value.count() as u32,
            };
            store.extend_from_slice(&data);
            offset += data.len() as u32;
            if *name == region {
                index.insert(0, entry.to_bytes());
            } else {
                index.push(entry.to_bytes());
            }
        }
        Ok(EncodedHeader {
            index_no: index.len() as u32,
            store_size: store.len() as u32,
            index_bytes: index.concat(),
            store_bytes: store,
        })
    }

    /// Recover the original, unmodified header bytes of a database record
    /// from its region marker. The database appends signature data and
    /// install bookkeeping after the region, so the covered prefix of the
    /// index and store is exactly the header as it was once written to the
    /// package file.
    pub fn immutable_region(&self) -> Option<EncodedHeader> {
        let raw = self.raw.as_ref()?;
        let (marker, legacy) = if self.tags.contains_key("immutable1") {
            (61_u32, true)
        } else if self.tags.contains_key("immutable") {
            (63_u32, false)
        } else {
            return None;
        };

        let first = IndexEntry::parse(&raw.index_bytes).ok()?;
        if first.tag != marker || first.ttype != Type::Bin as u32 || first.count != 16 {
            return None;
        }
        let store_size = if legacy {
            first.offset as usize
        } else {
            first.offset as usize + 16
        };
        if first.offset as usize + 16 > raw.store_bytes.len() {
            return None;
        }
        let synth = IndexEntry::parse(&raw.store_bytes[first.offset as usize..]).ok()?;
        let back = -(synth.offset as i32);
        if synth.tag != marker
            || synth.ttype != Type::Bin as u32
            || synth.count != 16
            || back <= 0
            || back % 16 != 0
        {
            return None;
        }
        let (index_no, index_bytes) = if legacy {
            let n = (back as usize - 16) / 16;
            (n, raw.index_bytes.get(16..(n + 1) * 16)?.to_vec())
        } else {
            let n = back as usize / 16;
            (n, raw.index_bytes.get(..n * 16)?.to_vec())
        };
        Some(EncodedHeader {
            index_no: index_no as u32,
            store_size: store_size as u32,
            index_bytes,
            store_bytes: raw.store_bytes.get(..store_size)?.to_vec(),
        })
    }

    /// Diagnostics for the region entry of a freshly read header: it must
    /// sit at slot 0 of the index and cover the whole store.
    pub fn region_diagnostics(&self, registry: &TagRegistry) -> Vec<String> {
        let mut out = Vec::new();
        let region = registry.region();
        let Some(value) = self.tags.get(region) else {
            return out;
        };
        let Some(raw) = self.raw.as_ref() else {
            return out;
        };
        let info = registry.by_name(region).expect("region tag registered");
        let first = match IndexEntry::parse(&raw.index_bytes) {
            Ok(e) => e,
            Err(_) => return out,
        };
        if first.tag != info.id || first.ttype != Type::Bin as u32 || first.count != 16 {
            out.push("region tag not at the beginning of the header".to_string());
        } else if region == "immutable" && first.offset as usize + 16 != raw.store_size {
            out.push("region does not cover the whole store".to_string());
        }
        if let Some(data) = value.as_bin() {
            if data.len() != 16 {
                out.push("region marker has wrong length".to_string());
                return out;
            }
            let synth = IndexEntry::parse(data).expect("16 bytes");
            let back = -(synth.offset as i32);
            if synth.tag != info.id || synth.ttype != Type::Bin as u32 || synth.count != 16 {
                out.push("region has wrong tag/type/count".to_string());
            }
            if back <= 0 || back % 16 != 0 {
                out.push("region has wrong offset".to_string());
            } else if region == "immutable" && back as usize / 16 != raw.index_no {
                out.push(format!(
                    "region only covers a partial header: {} of {} entries",
                    back / 16,
                    raw.index_no
                ));
            }
        }
        out
    }

    /// Verify the count constraints and src/bin flags of every recognized
    /// index entry, as a list of diagnostics.
    pub fn entry_diagnostics(&self, registry: &TagRegistry, is_source: bool) -> Vec<String> {
        let mut out = Vec::new();
        let Some(raw) = self.raw.as_ref() else {
            return out;
        };
        for i in 0..raw.index_no {
            let Ok(entry) = IndexEntry::parse(&raw.index_bytes[i * IndexEntry::SIZE..]) else {
                continue;
            };
            let Some(info) = registry.by_id(entry.tag) else {
                continue;
            };
            if let Some(expected) = info.count {
                if expected != entry.count {
                    out.push(format!(
                        "tag {} has wrong count {}",
                        entry.tag, entry.count
                    ));
                }
            }
            if is_source {
                if info.flags.contains(TagFlags::BIN_ONLY) {
                    out.push(format!("tag {} should be for binary rpms", entry.tag));
                }
            } else if info.flags.contains(TagFlags::SRC_ONLY) {
                out.push(format!("tag {} should be for src rpms", entry.tag));
            }
        }
        out
    }

    pub fn raw(&self) -> Option<&RawHeader> {
        self.raw.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.tags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn insert(&mut self, name: &'static str, value: Value) -> Option<Value> {
        self.tags.insert(name, value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.tags.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tags.keys().copied()
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.tags.get(name).and_then(Value::as_str)
    }

    pub fn get_str_array(&self, name: &str) -> Option<Vec<String>> {
        self.tags.get(name).and_then(Value::as_str_array)
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.tags.get(name).and_then(Value::as_u32)
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.tags.get(name).and_then(Value::as_u64)
    }

    pub fn get_i32_array(&self, name: &str) -> Option<&[i32]> {
        self.tags.get(name).and_then(Value::as_i32_array)
    }

    pub fn get_u32_array(&self, name: &str) -> Option<Vec<u32>> {
        self.tags.get(name).and_then(Value::as_u32_array)
    }

    pub fn get_u16_array(&self, name: &str) -> Option<&[u16]> {
        self.tags.get(name).and_then(Value::as_u16_array)
    }

    pub fn get_bin(&self, name: &str) -> Option<&[u8]> {
        self.tags.get(name).and_then(Value::as_bin)
    }
}

fn read_nul_string(store: &[u8], offset: usize, tag: u32) -> Result<Vec<u8>> {
    if offset > store.len() {
        return Err(Error::Structural(format!(
            "tag {} value exceeds store",
            tag
        )));
    }
    match store[offset..].iter().position(|b| *b == 0) {
        Some(end) => Ok(store[offset..offset + end].to_vec()),
        None => Err(Error::Structural(format!(
            "unterminated string for tag {}",
            tag
        ))),
    }
}

fn read_nul_strings(store: &[u8], offset: usize, count: usize, tag: u32) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::with_capacity(count);
    let mut pos = offset;
    for _ in 0..count {
        let s = read_nul_string(store, pos, tag)?;
        pos += s.len() + 1;
        out.push(s);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        let mut hdr = Header::new();
        hdr.insert("name", Value::Str(b"coreutils".to_vec()));
        hdr.insert("version", Value::Str(b"5.2.1".to_vec()));
        hdr.insert("release", Value::Str(b"31".to_vec()));
        hdr.insert("arch", Value::Str(b"i386".to_vec()));
        hdr.insert("rpmversion", Value::Str(b"4.3.3".to_vec()));
        hdr.insert("epoch", Value::Uint32(vec![1]));
        hdr.insert("filemtimes", Value::Int32(vec![1111276799, 1111276800]));
        hdr.insert("filemodes", Value::Int16(vec![0o100755, 0o100644]));
        hdr.insert(
            "dirnames",
            Value::StrArray(vec![b"/usr/bin/".to_vec(), b"/etc/".to_vec()]),
        );
        hdr
    }

    fn encode_decode(hdr: &Header) -> (EncodedHeader, Header) {
        let encoded = hdr
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();
        let bytes = encoded.file_bytes();
        let decoded = Header::read(&mut bytes.as_slice(), main_tags(), 1).unwrap();
        (encoded, decoded)
    }

    #[test]
    fn test_roundtrip_identity() {
        let hdr = sample_header();
        let (encoded, decoded) = encode_decode(&hdr);
        let encoded2 = decoded
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();
        assert_eq!(encoded, encoded2);
        // tag content also survives
        assert_eq!(decoded.get_str("name").unwrap(), "coreutils");
        assert_eq!(decoded.get_u32("epoch").unwrap(), 1);
        assert_eq!(
            decoded.get_i32_array("filemtimes").unwrap(),
            &[1111276799, 1111276800]
        );
        assert_eq!(
            decoded.get_u16_array("filemodes").unwrap(),
            &[0o100755, 0o100644]
        );
    }

    #[test]
    fn test_index_sorted_by_id_with_alignment() {
        let hdr = sample_header();
        let (encoded, _) = encode_decode(&hdr);
        let mut last = 0;
        for i in 0..encoded.index_no as usize {
            let entry = IndexEntry::parse(&encoded.index_bytes[i * 16..]).unwrap();
            assert!(entry.tag > last, "index not sorted by tag id");
            last = entry.tag;
            let ttype = Type::from_wire(entry.ttype).unwrap();
            assert_eq!(
                entry.offset % ttype.alignment(),
                0,
                "value of tag {} not aligned",
                entry.tag
            );
        }
    }

    #[test]
    fn test_signed_int32_survives() {
        let mut hdr = Header::new();
        hdr.insert("filemtimes", Value::Int32(vec![-1]));
        hdr.insert("filesizes", Value::Uint32(vec![0xffff_ffff]));
        let (_, decoded) = encode_decode(&hdr);
        assert_eq!(decoded.get_i32_array("filemtimes").unwrap(), &[-1]);
        assert_eq!(decoded.get_u32_array("filesizes").unwrap(), vec![0xffff_ffff]);
    }

    #[test]
    fn test_reject_empty_index() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&HEADER_MAGIC);
        bytes.extend_from_slice(&0_u32.to_be_bytes());
        bytes.extend_from_slice(&0_u32.to_be_bytes());
        let err = Header::read(&mut bytes.as_slice(), main_tags(), 1);
        assert!(matches!(err, Err(Error::Structural(_))));
    }

    #[test]
    fn test_reject_bad_magic() {
        let mut bytes = vec![0_u8; 16];
        bytes[8..12].copy_from_slice(&1_u32.to_be_bytes());
        let err = Header::read(&mut bytes.as_slice(), main_tags(), 1);
        assert!(matches!(err, Err(Error::Structural(_))));
    }

    #[test]
    fn test_store_overflow_rejected() {
        let mut hdr = Header::new();
        hdr.insert("name", Value::Str(b"x".to_vec()));
        let encoded = hdr
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();
        let mut bytes = encoded.file_bytes();
        // corrupt the offset of the single entry
        bytes[16 + 8..16 + 12].copy_from_slice(&100_u32.to_be_bytes());
        let err = Header::read(&mut bytes.as_slice(), main_tags(), 1);
        assert!(matches!(err, Err(Error::Structural(_))));
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let mut hdr = Header::new();
        hdr.insert("name", Value::Str(b"x".to_vec()));
        let encoded = hdr
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();
        // append a fake entry with an unregistered id pointing at offset 0
        let fake = IndexEntry {
            tag: 60000,
            ttype: Type::Bin as u32,
            offset: 0,
            count: 1,
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&HEADER_MAGIC);
        bytes.extend_from_slice(&2_u32.to_be_bytes());
        bytes.extend_from_slice(&encoded.store_size.to_be_bytes());
        bytes.extend_from_slice(&encoded.index_bytes);
        bytes.extend_from_slice(&fake.to_bytes());
        bytes.extend_from_slice(&encoded.store_bytes);
        let decoded = Header::read(&mut bytes.as_slice(), main_tags(), 1).unwrap();
        assert_eq!(decoded.get_str("name").unwrap(), "x");
        assert_eq!(decoded.names().count(), 1);
    }

    #[test]
    fn test_region_encode_and_recover() {
        // Build a header, encode it, then wrap it the way the installed
        // database does: region marker entry at slot 0, marker bytes at
        // the end of the covered store.
        let mut hdr = sample_header();
        let plain = hdr
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();

        // region value: synthetic entry with negative offset covering all
        // entries incl. the region itself
        let covered = plain.index_no + 1;
        let synth = IndexEntry {
            tag: 63,
            ttype: Type::Bin as u32,
            offset: (-(covered as i32 * 16)) as u32,
            count: 16,
        };
        hdr.insert("immutable", Value::Bin(synth.to_bytes().to_vec()));
        let regioned = hdr
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();

        let first = IndexEntry::parse(&regioned.index_bytes).unwrap();
        assert_eq!(first.tag, 63);
        assert_eq!(first.offset as usize + 16, regioned.store_size as usize);

        let decoded =
            Header::read(&mut regioned.file_bytes().as_slice(), database_tags(), 1).unwrap();
        let recovered = decoded.immutable_region().unwrap();
        assert_eq!(recovered.index_no, regioned.index_no);
        assert_eq!(recovered.store_size, regioned.store_size);
        assert_eq!(recovered.index_bytes, regioned.index_bytes);
        assert_eq!(recovered.store_bytes, regioned.store_bytes);
        assert!(decoded.region_diagnostics(database_tags()).is_empty());
    }

    #[test]
    fn test_db_alias_duplicate_binding() {
        // two "dirnames" occurrences in one record: the second binds to
        // dirnames2 under the database registry
        let mut hdr = Header::new();
        hdr.insert("name", Value::Str(b"x".to_vec()));
        hdr.insert("dirnames", Value::StrArray(vec![b"/usr/".to_vec()]));
        let encoded = hdr
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();

        let dup = Value::StrArray(vec![b"/opt/".to_vec()]);
        let dup_bytes = dup.store_bytes();
        let entry = IndexEntry {
            tag: 1118,
            ttype: Type::StringArray as u32,
            offset: encoded.store_size,
            count: 1,
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(encoded.index_no + 1).to_be_bytes());
        bytes.extend_from_slice(&(encoded.store_size + dup_bytes.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&encoded.index_bytes);
        bytes.extend_from_slice(&entry.to_bytes());
        bytes.extend_from_slice(&encoded.store_bytes);
        bytes.extend_from_slice(&dup_bytes);

        let decoded = Header::read_db_record(&bytes, database_tags()).unwrap();
        assert_eq!(decoded.get_str_array("dirnames").unwrap(), vec!["/usr/"]);
        assert_eq!(decoded.get_str_array("dirnames2").unwrap(), vec!["/opt/"]);
    }

    #[test]
    fn test_divergent_duplicate_rejected() {
        let mut hdr = Header::new();
        hdr.insert("name", Value::Str(b"x".to_vec()));
        let encoded = hdr
            .encode(main_tags(), "immutable", &HashSet::new(), None)
            .unwrap();
        let dup = Value::Str(b"y".to_vec());
        let dup_bytes = dup.store_bytes();
        let entry = IndexEntry {
            tag: 1000,
            ttype: Type::String as u32,
            offset: encoded.store_size,
            count: 1,
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&HEADER_MAGIC);
        bytes.extend_from_slice(&(encoded.index_no + 1).to_be_bytes());
        bytes.extend_from_slice(&(encoded.store_size + dup_bytes.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&encoded.index_bytes);
        bytes.extend_from_slice(&entry.to_bytes());
        bytes.extend_from_slice(&encoded.store_bytes);
        bytes.extend_from_slice(&dup_bytes);
        let err = Header::read(&mut bytes.as_slice(), main_tags(), 1);
        assert!(matches!(err, Err(Error::Consistency(_))));
    }

    #[test]
    fn test_install_group_ordering() {
        let mut hdr = sample_header();
        hdr.insert("installtid", Value::Uint32(vec![42]));
        hdr.insert("installtime", Value::Int32(vec![1_100_000_000]));
        let keys = database_tags().install_keys();
        let encoded = hdr
            .encode(database_tags(), "immutable", &HashSet::new(), Some(&keys))
            .unwrap();
        // install-only tags must come after every normal tag even though
        // their ids (1008, 1128) sort below some normal ids
        let mut ids = Vec::new();
        for i in 0..encoded.index_no as usize {
            ids.push(IndexEntry::parse(&encoded.index_bytes[i * 16..]).unwrap().tag);
        }
        let tid_pos = ids.iter().position(|t| *t == 1128).unwrap();
        let time_pos = ids.iter().position(|t| *t == 1008).unwrap();
        let name_pos = ids.iter().position(|t| *t == 1000).unwrap();
        assert!(tid_pos > name_pos);
        assert!(time_pos > name_pos);
        assert!(time_pos < tid_pos);
    }
}
