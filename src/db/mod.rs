mod bdb;

pub use bdb::{BdbFile, DbKind, Endian};

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::deps::SenseFlags;
use crate::digest;
use crate::error::{Error, Result};
use crate::header::{Header, Value, database_tags};
use crate::payload::is_reg;
use crate::rpm::Package;

/// Secondary index content: term keys grouped as tid => index => key.
pub type SecondaryIndex = BTreeMap<u32, BTreeMap<u32, Vec<u8>>>;

/// The secondary files next to `Packages`, with their access method and
/// whether their keys are integers in database byte order.
pub static SECONDARY_FILES: &[(&str, DbKind, bool, &str, bool)] = &[
    // (file, kind, int keys, checked tag, per-index check)
    ("Basenames", DbKind::Hash, false, "basenames", true),
    ("Conflictname", DbKind::Hash, false, "conflictname", true),
    ("Dirnames", DbKind::Btree, false, "dirnames", true),
    ("Filemd5s", DbKind::Hash, false, "filemd5s", true),
    ("Group", DbKind::Hash, false, "group", true),
    ("Installtid", DbKind::Btree, true, "installtid", true),
    ("Name", DbKind::Hash, false, "name", false),
    ("Providename", DbKind::Hash, false, "providename", true),
    ("Provideversion", DbKind::Btree, false, "provideversion", true),
    ("Requirename", DbKind::Hash, false, "requirename", true),
    ("Requireversion", DbKind::Btree, false, "requireversion", true),
    ("Sha1header", DbKind::Hash, false, "install_sha1header", false),
    ("Sigmd5", DbKind::Hash, false, "install_md5", false),
    ("Triggername", DbKind::Hash, false, "triggername", true),
];

/// One record of the primary package store, with its raw bytes kept for
/// the re-emission identity check.
#[derive(Debug)]
pub struct DbRecord {
    pub package: Package,
    pub raw: Vec<u8>,
}

/// The primary package store: records by transaction id plus the
/// next-tid cursor kept under tid 0.
#[derive(Debug, Default)]
pub struct PackagesDb {
    pub records: BTreeMap<u32, DbRecord>,
    pub next_tid: u32,
    pub endian: Endian,
}

impl PackagesDb {
    /// Read `Packages` from a database directory.
    pub fn read(dbpath: &Path) -> Result<Self> {
        let file = BdbFile::open(&dbpath.join("Packages"))?;
        Self::from_bdb(&file)
    }

    pub fn from_bdb(file: &BdbFile) -> Result<Self> {
        let mut db = PackagesDb {
            endian: file.endian,
            ..Default::default()
        };
        for (key, data) in file.entries()? {
            if key.len() != 4 {
                return Err(Error::Structural(
                    "Packages: bad record key length".to_string(),
                ));
            }
            let tid = file.endian.u32(&key);
            if tid == 0 {
                if data.len() >= 4 {
                    db.next_tid = file.endian.u32(&data);
                }
                continue;
            }
            let header = Header::read_db_record(&data, database_tags())
                .map_err(|e| Error::Structural(format!("Packages: record {}: {}", tid, e)))?;
            let mut package = Package::new(header, Header::new(), false);
            package.sig_from_db_tags();
            db.records.insert(tid, DbRecord { package, raw: data });
        }
        Ok(db)
    }
}

/// Read one secondary index file. Values are concatenated
/// `(tid, index)` pairs in database byte order; a single NUL key stands
/// for the empty term.
pub fn read_index(path: &Path, int_keys: bool) -> Result<SecondaryIndex> {
    let file = BdbFile::open(path)?;
    index_from_bdb(&file, int_keys)
}

pub fn index_from_bdb(file: &BdbFile, int_keys: bool) -> Result<SecondaryIndex> {
    let mut out: SecondaryIndex = BTreeMap::new();
    for (mut key, data) in file.entries()? {
        if int_keys {
            if key.len() != 4 {
                return Err(Error::structural(file.label(), "bad integer key length"));
            }
            // normalize integer keys to big-endian for comparisons
            key = file.endian.u32(&key).to_be_bytes().to_vec();
        } else if key == [0] {
            key = Vec::new();
        }
        if data.len() % 8 != 0 {
            return Err(Error::structural(file.label(), "bad value length"));
        }
        for pair in data.chunks(8) {
            let tid = file.endian.u32(&pair[0..4]);
            let idx = file.endian.u32(&pair[4..8]);
            let entry = out.entry(tid).or_default();
            if entry.contains_key(&idx) {
                log::warn!("ignoring duplicate idx: {} {}", tid, idx);
                continue;
            }
            entry.insert(idx, key.clone());
        }
    }
    Ok(out)
}

/// The tag value element a secondary key must equal, as raw bytes.
/// Numeric elements are normalized to big-endian.
fn tag_element_bytes(header: &Header, tag: &str, idx: usize) -> Option<Vec<u8>> {
    match header.get(tag)? {
        Value::Str(s) => Some(s.clone()),
        Value::Bin(b) => Some(b.clone()),
        Value::StrArray(a) | Value::I18n(a) => a.get(idx).cloned(),
        Value::Uint32(v) => v.get(idx).map(|x| x.to_be_bytes().to_vec()),
        Value::Int32(v) => v.get(idx).map(|x| x.to_be_bytes().to_vec()),
        _ => None,
    }
}

fn element_count(header: &Header, tag: &str) -> usize {
    match header.get(tag) {
        Some(Value::StrArray(a)) | Some(Value::I18n(a)) => a.len(),
        Some(Value::Uint32(v)) => v.len(),
        Some(Value::Int32(v)) => v.len(),
        Some(Value::Str(_)) | Some(Value::Bin(_)) => 1,
        _ => 0,
    }
}

/// Resolve the `*2` alias of the three file-list tags when the record
/// carries a second occurrence.
fn alias_tag<'a>(header: &Header, tag: &'a str) -> &'a str {
    match tag {
        "dirindexes" if header.contains("dirindexes2") => "dirindexes2",
        "dirnames" if header.contains("dirnames2") => "dirnames2",
        "basenames" if header.contains("basenames2") => "basenames2",
        _ => tag,
    }
}

/// Cross-validate one secondary index against the primary records: every
/// index entry must match the record's tag data, and every eligible tag
/// element must appear in the index. The two files are two witnesses of
/// the same data.
pub fn verify_structure(
    packages: &BTreeMap<u32, DbRecord>,
    index: &SecondaryIndex,
    tag: &str,
    useidx: bool,
) -> Vec<String> {
    let mut diags = Vec::new();

    for (tid, entries) in index {
        let Some(record) = packages.get(tid) else {
            diags.push(format!("{}: package id {} doesn't exist", tag, tid));
            continue;
        };
        let header = &record.package.header;
        let real_tag = alias_tag(header, tag);
        for (idx, key) in entries {
            let value = if useidx {
                tag_element_bytes(header, real_tag, *idx as usize)
            } else {
                if *idx != 0 {
                    diags.push(format!("{}: index {} out of range", tag, idx));
                }
                tag_element_bytes(header, real_tag, 0)
            };
            match value {
                None => diags.push(format!("{}: index {} is not in package {}", tag, idx, tid)),
                Some(value) => {
                    if value != *key {
                        diags.push(format!(
                            "{}: {:?} != {:?} in package {}",
                            tag,
                            String::from_utf8_lossy(key),
                            String::from_utf8_lossy(&value),
                            record.package.filename()
                        ));
                    }
                }
            }
        }
    }

    for (tid, record) in packages {
        let header = &record.package.header;
        let real_tag = alias_tag(header, tag);
        let count = element_count(header, real_tag);
        if count == 0 {
            continue;
        }
        let entries = index.get(tid);
        if !useidx {
            let expected = tag_element_bytes(header, real_tag, 0);
            match entries.and_then(|e| e.get(&0)) {
                None => diags.push(format!(
                    "no data in packages for {} {} {}",
                    record.package.name(),
                    tid,
                    tag
                )),
                Some(key) => {
                    if expected.as_deref() != Some(key.as_slice()) {
                        diags.push(format!(
                            "wrong data in packages for {} {} {}",
                            record.package.name(),
                            tid,
                            tag
                        ));
                    }
                }
            }
            continue;
        }
        let mut seen_triggers: HashSet<Vec<u8>> = HashSet::new();
        for idx in 0..count {
            let Some(key) = tag_element_bytes(header, real_tag, idx) else {
                continue;
            };
            // only the first group entry is copied to the index
            if tag == "group" && idx > 0 {
                continue;
            }
            // install-scriptlet requirements are not indexed
            if tag == "requirename" {
                let flags = header
                    .get_u32_array("requireflags")
                    .and_then(|f| f.get(idx).copied())
                    .unwrap_or(0);
                if SenseFlags::from_bits_retain(flags).is_install_prereq() {
                    continue;
                }
            }
            // only regular files with content carry an md5 key
            if tag == "filemd5s" {
                let mode = header
                    .get_u16_array("filemodes")
                    .and_then(|m| m.get(idx).copied())
                    .unwrap_or(0);
                let size = header
                    .get_u32_array("filesizes")
                    .and_then(|s| s.get(idx).copied())
                    .unwrap_or(0);
                if !is_reg(mode) || (key.is_empty() && size == 0) {
                    continue;
                }
            }
            // trigger names are stored once per package
            if tag == "triggername" && !seen_triggers.insert(key.clone()) {
                continue;
            }
            match entries.and_then(|e| e.get(&(idx as u32))) {
                None => diags.push(format!("{}: index {} is not in package {}", tag, idx, tid)),
                Some(indexed) => {
                    if *indexed != key {
                        diags.push(format!(
                            "wrong data in {} index {} for package {}",
                            tag, idx, tid
                        ));
                    }
                }
            }
        }
    }
    diags
}

/// Install-only emit keys for one record, adjusted for the emitting rpm
/// version and the legacy region variant the way the original producers
/// behaved.
fn emit_install_keys(header: &Header) -> (&'static str, HashSet<&'static str>) {
    let mut keys = database_tags().install_keys();
    let rpmversion = header.get_str("rpmversion").unwrap_or_default();
    let old_rpm = ["4.0", "3.0", "2.2"]
        .iter()
        .any(|v| rpmversion.starts_with(v));
    if !old_rpm {
        keys.insert("archivesize");
    }
    let mut region = "immutable";
    if header.contains("immutable1") {
        region = "immutable1";
        for t in [
            "providename",
            "provideflags",
            "provideversion",
            "dirindexes",
            "dirnames",
            "basenames",
        ] {
            keys.insert(t);
        }
    }
    (region, keys)
}

/// Re-encode every record with install-only tags enabled and compare
/// byte-for-byte with the stored blob; then recover the covered header
/// and check the stored sha1. Divergence means the producer used tags
/// outside the registry or a non-canonical ordering.
pub fn verify_reencode(db: &PackagesDb) -> Vec<String> {
    let mut diags = Vec::new();
    for (tid, record) in &db.records {
        let package = &record.package;
        if package.name() == "gpg-pubkey" {
            continue;
        }
        let (region, keys) = emit_install_keys(&package.header);
        match package
            .header
            .encode(database_tags(), region, &HashSet::new(), Some(&keys))
        {
            Ok(encoded) => {
                let bytes = encoded.db_bytes();
                if bytes.len() % 4 != 0 {
                    diags.push(format!(
                        "rpmdb header of {} is not aligned to 4",
                        package.filename()
                    ));
                }
                if bytes != record.raw {
                    diags.push(format!(
                        "writeHeader() would not write the same rpmdb data for {} (rpm-{})",
                        package.name(),
                        package.header.get_str("rpmversion").unwrap_or_default()
                    ));
                }
            }
            Err(e) => diags.push(format!("record {}: {}", tid, e)),
        }

        // sha1 covers the original header: the immutable region when
        // present, a fresh emit without install tags otherwise
        let Some(sha1) = package.header.get_str("install_sha1header") else {
            diags.push(format!(
                "package {} does not have a sha1 checksum",
                package.filename()
            ));
            continue;
        };
        let encoded = match package.header.immutable_region() {
            Some(region_data) => Some(region_data),
            None => package
                .header
                .encode(database_tags(), region, &keys, None)
                .ok(),
        };
        if let Some(encoded) = encoded {
            let actual =
                digest::bytes_sha1(&encoded.intro(), &encoded.index_bytes, &encoded.store_bytes);
            if actual != sha1 {
                diags.push(format!(
                    "{} bad sha1: {} / {}",
                    package.filename(),
                    sha1,
                    actual
                ));
            }
        }
    }
    diags
}

/// Findings of a full database pass.
#[derive(Debug, Default)]
pub struct DbReport {
    pub diagnostics: Vec<String>,
}

/// Read and cross-check a whole database directory: the primary store,
/// every secondary index present, and the re-emission identity.
pub fn verify_rpmdb(dbpath: &Path) -> Result<(PackagesDb, DbReport)> {
    let db = PackagesDb::read(dbpath)?;
    let mut report = DbReport::default();

    for tid in db.records.keys() {
        if *tid > db.next_tid && db.next_tid != 0 {
            report.diagnostics.push(format!("wrong tid: {}", tid));
        }
    }

    for (file, _kind, int_keys, tag, useidx) in SECONDARY_FILES {
        let path = dbpath.join(file);
        if !path.exists() {
            report
                .diagnostics
                .push(format!("missing database file {}", file));
            continue;
        }
        let mut index = read_index(&path, *int_keys)?;
        if *tag == "filemd5s" {
            // file digests are stored binary in the index but hex in the
            // header
            for entries in index.values_mut() {
                for key in entries.values_mut() {
                    let encoded = hex::encode(key.as_slice());
                    *key = encoded.into_bytes();
                }
            }
        }
        report
            .diagnostics
            .extend(verify_structure(&db.records, &index, tag, *useidx));
    }

    report.diagnostics.extend(verify_reencode(&db));
    Ok((db, report))
}
