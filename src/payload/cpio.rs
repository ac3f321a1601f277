use log::warn;
use std::collections::HashMap;
use std::io::{self, Read};

use super::{FileInfo, is_lnk, is_reg};
use crate::deps::FileFlags;
use crate::digest::content_md5;
use crate::error::{Error, Result};
use crate::utils::{HexReader, align_n_bytes};

const MAGIC_NEW: &[u8; 6] = b"070701";
const MAGIC_CRC: &[u8; 6] = b"070702";
pub const TRAILER: &str = "TRAILER!!!";

/// Maximum allowed cpio entry name size (4 KB) - prevents OOM attacks
const MAX_NAME_SIZE: u32 = 4096;

/// One parsed 110-byte ASCII-hex cpio record.
#[derive(Debug, PartialEq, Eq)]
pub struct CpioEntry {
    pub name: String,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    pub file_size: u32,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub rdev_major: u32,
    pub rdev_minor: u32,
}

impl CpioEntry {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0_u8; 6];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC_NEW && &magic != MAGIC_CRC {
            return Err(Error::Structural(format!(
                "bad magic reading CPIO header {:x?}",
                magic
            )));
        }

        let ino = reader.read_hex_as_u32()?;
        let mode = reader.read_hex_as_u32()?;
        let uid = reader.read_hex_as_u32()?;
        let gid = reader.read_hex_as_u32()?;
        let nlink = reader.read_hex_as_u32()?;
        let mtime = reader.read_hex_as_u32()?;
        let file_size = reader.read_hex_as_u32()?;
        let dev_major = reader.read_hex_as_u32()?;
        let dev_minor = reader.read_hex_as_u32()?;
        let rdev_major = reader.read_hex_as_u32()?;
        let rdev_minor = reader.read_hex_as_u32()?;
        let name_size = reader.read_hex_as_u32()?;
        if name_size == 0 || name_size > MAX_NAME_SIZE {
            return Err(Error::Structural(format!(
                "bad CPIO name size {}",
                name_size
            )));
        }
        let mut checksum = [0_u8; 8];
        reader.read_exact(&mut checksum)?;

        // name plus padding to a 4-byte boundary counted from the start of
        // the 110-byte record
        let padded = name_size + align_n_bytes(name_size + 110, 4);
        let mut name_bytes = vec![0_u8; padded as usize];
        reader.read_exact(&mut name_bytes)?;
        let end = name_bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(name_size as usize - 1);
        let name = String::from_utf8_lossy(&name_bytes[..end]).to_string();

        Ok(CpioEntry {
            name,
            ino,
            mode,
            uid,
            gid,
            nlink,
            mtime,
            file_size,
            dev_major,
            dev_minor,
            rdev_major,
            rdev_minor,
        })
    }

    pub fn is_trailer(&self) -> bool {
        self.name == TRAILER
    }

    pub fn dev(&self) -> u32 {
        self.dev_major * 256 + self.dev_minor
    }

    pub fn rdev(&self) -> u32 {
        self.rdev_major * 256 + self.rdev_minor
    }

    /// Read this entry's data plus its trailing padding.
    pub fn read_data<R: Read>(&self, reader: &mut R) -> io::Result<Vec<u8>> {
        let total = self.file_size + align_n_bytes(self.file_size, 4);
        let mut data = vec![0_u8; total as usize];
        reader.read_exact(&mut data)?;
        data.truncate(self.file_size as usize);
        Ok(data)
    }
}

/// Archive filenames are stored in several historical spellings; bring
/// them all to the absolute form used by the header file table.
pub fn normalize_name(name: &str, is_source: bool) -> String {
    let mut name = name.to_string();
    if let Some(rest) = name.strip_prefix("./") {
        name = format!("/{}", rest);
    }
    if !is_source && !name.starts_with('/') {
        name = format!("/{}", name);
    }
    if name.len() > 1 && name.ends_with('/') {
        name.pop();
    }
    name
}

/// Key of a hardlink cluster: files sharing device, inode and content.
pub type HardlinkKey = (u32, u32, String);

/// Group file-table indices into hardlink clusters. Ghost and excluded
/// files never appear in the archive; a key with a single member is not
/// a cluster.
pub fn hardlink_clusters(files: &[FileInfo]) -> HashMap<HardlinkKey, Vec<usize>> {
    let mut clusters: HashMap<HardlinkKey, Vec<usize>> = HashMap::new();
    for (i, f) in files.iter().enumerate() {
        if f.flags.intersects(FileFlags::GHOST | FileFlags::EXCLUDE) {
            continue;
        }
        if is_reg(f.mode) {
            clusters
                .entry((f.device, f.inode, f.digest.clone()))
                .or_default()
                .push(i);
        }
    }
    clusters.retain(|_, members| members.len() > 1);
    clusters
}

/// Map from archive filename to file-table index, with ghost and
/// excluded entries left out.
pub fn filename_table(files: &[FileInfo]) -> HashMap<&str, usize> {
    files
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.flags.intersects(FileFlags::GHOST | FileFlags::EXCLUDE))
        .map(|(i, f)| (f.name.as_str(), i))
        .collect()
}

/// Check that the hardlink members of each cluster agree on mode, mtime
/// and size.
pub fn cluster_diagnostics(
    clusters: &HashMap<HardlinkKey, Vec<usize>>,
    files: &[FileInfo],
) -> Vec<String> {
    let mut out = Vec::new();
    for members in clusters.values() {
        let first = &files[members[0]];
        for j in &members[1..] {
            let f = &files[*j];
            if f.mode != first.mode {
                out.push(format!("modes differ for hardlink {}", f.name));
            }
            if f.mtime != first.mtime {
                out.push(format!("mtimes differ for hardlink {}", f.name));
            }
            if f.size != first.size {
                out.push(format!("sizes differ for hardlink {}", f.name));
            }
        }
    }
    out
}

/// `Read` wrapper that counts consumed bytes, for the archive-size
/// cross-check.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Walk the archive without touching the filesystem, cross-checking each
/// record against the header file table. Returns the collected
/// diagnostics; only structural damage aborts the walk.
pub fn verify_archive<R: Read>(
    reader: &mut R,
    label: &str,
    files: &[FileInfo],
    is_source: bool,
    expected_size: Option<u64>,
) -> Result<Vec<String>> {
    let mut diags = Vec::new();
    let mut names = filename_table(files);
    let mut clusters = hardlink_clusters(files);
    diags.extend(cluster_diagnostics(&clusters, files));

    let mut counting = CountingReader {
        inner: reader,
        count: 0,
    };
    loop {
        let entry = CpioEntry::read(&mut counting)?;
        if entry.is_trailer() {
            if let Some(expected) = expected_size {
                if counting.count != expected {
                    diags.push(format!(
                        "failed cpiosize check ({} != {})",
                        counting.count, expected
                    ));
                }
            }
            break;
        }
        let data = entry.read_data(&mut counting)?;

        let filename = normalize_name(&entry.name, is_source);
        let Some(i) = names.remove(filename.as_str()) else {
            diags.push(format!("cpio file {} not in rpm header", filename));
            continue;
        };
        let info = &files[i];
        let mode = entry.mode as u16;
        if mode != info.mode {
            diags.push(format!("wrong filemode for {}", filename));
        }
        if entry.mtime != info.mtime {
            diags.push(format!("wrong filemtimes for {}", filename));
        }

        let mut is_hardlink = false;
        if is_reg(mode) {
            let key = (info.device, info.inode, info.digest.clone());
            if let Some(members) = clusters.get_mut(&key) {
                is_hardlink = true;
                members.retain(|m| *m != i);
                if members.is_empty() {
                    if data.is_empty() {
                        diags.push(format!("must be 0-size hardlink: {}", filename));
                    }
                    clusters.remove(&key);
                } else if !data.is_empty() {
                    // producer emitted the data record before the last
                    // member; extraction still works, so only complain
                    diags.push(format!("non-zero hardlink file, but not the last: {}", filename));
                }
            }
            if !is_hardlink && entry.file_size != info.size {
                diags.push(format!("wrong filesize for {}", filename));
            }
            if entry.dev() != info.device {
                diags.push(format!("wrong filedevice for {}", filename));
            }
        }
        if is_lnk(mode) {
            let target = String::from_utf8_lossy(
                data.split(|b| *b == 0).next().unwrap_or_default(),
            )
            .to_string();
            if target != info.linkto {
                diags.push(format!("wrong filelinkto for {}", filename));
            }
        } else if is_reg(mode) && !(entry.file_size == 0 && is_hardlink) {
            let sum = content_md5(&data);
            if sum != info.digest && info.size != 0 {
                diags.push(format!(
                    "wrong filemd5s for {}: {}, {}",
                    filename, sum, info.digest
                ));
            }
        }
    }

    for filename in names.keys() {
        diags.push(format!("file not in cpio: {}", filename));
    }
    for diag in &diags {
        warn!("{}: {}", label, diag);
    }
    Ok(diags)
}
