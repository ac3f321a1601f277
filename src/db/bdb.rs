use log::warn;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub const HASH_MAGIC: u32 = 0x0006_1561;
pub const BTREE_MAGIC: u32 = 0x0005_3162;

const PAGE_HEADER: usize = 26;

// page types
const P_HASH_UNSORTED: u8 = 2;
const P_LBTREE: u8 = 5;
const P_OVERFLOW: u8 = 7;
const P_HASH: u8 = 13;

// hash item types
const H_KEYDATA: u8 = 1;
const H_DUPLICATE: u8 = 2;
const H_OFFPAGE: u8 = 3;

// btree item types
const B_KEYDATA: u8 = 1;
const B_OVERFLOW: u8 = 3;

/// Byte order of the database file, detected from the meta-page magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Default for Endian {
    fn default() -> Self {
        Endian::native()
    }
}

impl Endian {
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::native()
    }

    pub fn u16(self, b: &[u8]) -> u16 {
        let b = [b[0], b[1]];
        match self {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }

    pub fn u32(self, b: &[u8]) -> u32 {
        let b = [b[0], b[1], b[2], b[3]];
        match self {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Hash,
    Btree,
}

/// Read-only view of one Berkeley DB file, covering exactly the page
/// kinds the package database uses: hash and btree leaf pages with
/// overflow chains. No cursors, no writes, no duplicate sets.
pub struct BdbFile {
    data: Vec<u8>,
    pub endian: Endian,
    pub kind: DbKind,
    pagesize: usize,
    label: String,
}

impl BdbFile {
    pub fn open(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .map_err(|e| Error::structural(path.display(), e))?;
        Self::from_bytes(data, &path.display().to_string())
    }

    /// The endianness sentinel lives in bytes 12..16 of the meta page:
    /// the magic read in native order means no swapping is needed.
    pub fn from_bytes(data: Vec<u8>, label: &str) -> Result<Self> {
        if data.len() < 512 {
            return Err(Error::structural(label, "database file too short"));
        }
        let raw_magic = &data[12..16];
        let (endian, kind) = if Endian::Little.u32(raw_magic) == HASH_MAGIC {
            (Endian::Little, DbKind::Hash)
        } else if Endian::Big.u32(raw_magic) == HASH_MAGIC {
            (Endian::Big, DbKind::Hash)
        } else if Endian::Little.u32(raw_magic) == BTREE_MAGIC {
            (Endian::Little, DbKind::Btree)
        } else if Endian::Big.u32(raw_magic) == BTREE_MAGIC {
            (Endian::Big, DbKind::Btree)
        } else {
            return Err(Error::structural(label, "bad database magic"));
        };
        let pagesize = endian.u32(&data[20..24]) as usize;
        if pagesize < 512 || pagesize > 64 * 1024 || !pagesize.is_power_of_two() {
            return Err(Error::structural(label, "bad database page size"));
        }
        Ok(BdbFile {
            data,
            endian,
            kind,
            pagesize,
            label: label.to_string(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn page(&self, pgno: u32) -> Option<&[u8]> {
        let start = pgno as usize * self.pagesize;
        let end = start + self.pagesize;
        if end > self.data.len() {
            return None;
        }
        Some(&self.data[start..end])
    }

    fn page_count(&self) -> u32 {
        (self.data.len() / self.pagesize) as u32
    }

    /// Follow an overflow chain starting at `pgno`, collecting `tlen`
    /// bytes of item data.
    fn read_overflow(&self, mut pgno: u32, tlen: u32) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(tlen as usize);
        while pgno != 0 && out.len() < tlen as usize {
            let page = self
                .page(pgno)
                .ok_or_else(|| Error::structural(&self.label, "overflow page out of range"))?;
            if page[25] != P_OVERFLOW {
                return Err(Error::structural(&self.label, "bad overflow page type"));
            }
            let len = self.endian.u16(&page[22..24]) as usize;
            if PAGE_HEADER + len > page.len() {
                return Err(Error::structural(&self.label, "overflow page overrun"));
            }
            out.extend_from_slice(&page[PAGE_HEADER..PAGE_HEADER + len]);
            pgno = self.endian.u32(&page[16..20]);
        }
        out.truncate(tlen as usize);
        Ok(out)
    }

    fn hash_item(&self, page: &[u8], offsets: &[usize], i: usize) -> Result<Option<Vec<u8>>> {
        let off = offsets[i];
        let prev = if i == 0 { self.pagesize } else { offsets[i - 1] };
        if off >= prev || prev > self.pagesize {
            return Err(Error::structural(&self.label, "bad hash item offset"));
        }
        match page[off] {
            H_KEYDATA => Ok(Some(page[off + 1..prev].to_vec())),
            H_OFFPAGE => {
                let pgno = self.endian.u32(&page[off + 4..off + 8]);
                let tlen = self.endian.u32(&page[off + 8..off + 12]);
                Ok(Some(self.read_overflow(pgno, tlen)?))
            }
            H_DUPLICATE => {
                warn!("{}: skipping duplicate hash item", self.label);
                Ok(None)
            }
            other => Err(Error::structural(
                &self.label,
                format!("unknown hash item type {}", other),
            )),
        }
    }

    fn btree_item(&self, page: &[u8], off: usize) -> Result<Option<Vec<u8>>> {
        if off + 3 > page.len() {
            return Err(Error::structural(&self.label, "bad btree item offset"));
        }
        let len = self.endian.u16(&page[off..off + 2]) as usize;
        match page[off + 2] & 0x7f {
            B_KEYDATA => {
                if off + 3 + len > page.len() {
                    return Err(Error::structural(&self.label, "btree item overrun"));
                }
                Ok(Some(page[off + 3..off + 3 + len].to_vec()))
            }
            B_OVERFLOW => {
                let pgno = self.endian.u32(&page[off + 4..off + 8]);
                let tlen = self.endian.u32(&page[off + 8..off + 12]);
                Ok(Some(self.read_overflow(pgno, tlen)?))
            }
            other => {
                warn!("{}: skipping btree item type {}", self.label, other);
                Ok(None)
            }
        }
    }

    /// All key/data pairs in page order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for pgno in 1..self.page_count() {
            let Some(page) = self.page(pgno) else {
                break;
            };
            let ptype = page[25];
            let is_hash = ptype == P_HASH || ptype == P_HASH_UNSORTED;
            let is_btree = ptype == P_LBTREE;
            if !is_hash && !is_btree {
                continue;
            }
            let entries = self.endian.u16(&page[20..22]) as usize;
            if entries % 2 != 0 {
                return Err(Error::structural(&self.label, "odd entry count on page"));
            }
            let mut offsets = Vec::with_capacity(entries);
            for i in 0..entries {
                let p = PAGE_HEADER + i * 2;
                if p + 2 > page.len() {
                    return Err(Error::structural(&self.label, "entry index overrun"));
                }
                offsets.push(self.endian.u16(&page[p..p + 2]) as usize);
            }
            for pair in 0..entries / 2 {
                let (key, data) = if is_hash {
                    (
                        self.hash_item(page, &offsets, pair * 2)?,
                        self.hash_item(page, &offsets, pair * 2 + 1)?,
                    )
                } else {
                    (
                        self.btree_item(page, offsets[pair * 2])?,
                        self.btree_item(page, offsets[pair * 2 + 1])?,
                    )
                };
                if let (Some(key), Some(data)) = (key, data) {
                    out.push((key, data));
                }
            }
        }
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_hash_roundtrip_both_endians() {
        for endian in [Endian::Little, Endian::Big] {
            let data = build_hash_db(
                &[(b"alpha", b"one"), (b"beta", b"two")],
                endian,
            );
            let db = BdbFile::from_bytes(data, "Packages").unwrap();
            assert_eq!(db.endian, endian);
            assert_eq!(db.kind, DbKind::Hash);
            let entries = db.entries().unwrap();
            assert_eq!(
                entries,
                vec![
                    (b"alpha".to_vec(), b"one".to_vec()),
                    (b"beta".to_vec(), b"two".to_vec()),
                ]
            );
        }
    }

    #[test]
    fn test_btree_roundtrip() {
        let data = build_btree_db(&[(b"/usr/bin/", b"\x01\x00\x00\x00")], Endian::Little);
        let db = BdbFile::from_bytes(data, "Dirnames").unwrap();
        assert_eq!(db.kind, DbKind::Btree);
        let entries = db.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, b"/usr/bin/");
    }

    #[test]
    fn test_overflow_items() {
        let big = vec![0xab_u8; 1200];
        let data = build_hash_db(&[(b"key", &big)], Endian::Little);
        let db = BdbFile::from_bytes(data, "Packages").unwrap();
        let entries = db.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, big);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let data = vec![0_u8; 1024];
        assert!(BdbFile::from_bytes(data, "Packages").is_err());
    }
}
