use hex::FromHex;
use omnom::prelude::*;
use std::collections::hash_map::RandomState;
use std::fs::{File, OpenOptions};
use std::hash::{BuildHasher, Hasher};
use std::io;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Number of padding bytes needed to bring `from` up to a multiple of `n`.
pub fn align_n_bytes(from: u32, n: u32) -> u32 {
    (n - from % n) % n
}

pub fn parse_string(bytes: &[u8]) -> String {
    let position = bytes.iter().position(|&x| x == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[0..position]).to_string()
}

pub fn parse_strings(bytes: &[u8], count: usize) -> Vec<String> {
    bytes
        .split(|x| *x == 0)
        .take(count)
        .map(|b| String::from_utf8_lossy(b).to_string())
        .collect()
}

pub trait HexWriter {
    fn write_u32_as_hex(&mut self, from: u32) -> io::Result<()>;
}

impl<W> HexWriter for W
where
    W: Write,
{
    fn write_u32_as_hex(&mut self, from: u32) -> io::Result<()> {
        self.write_all(format!("{:08x}", from).as_bytes())?;
        Ok(())
    }
}

pub trait HexReader {
    fn read_hex_as_u32(&mut self) -> io::Result<u32>;
}

impl<R> HexReader for R
where
    R: Read,
{
    fn read_hex_as_u32(&mut self) -> io::Result<u32> {
        let mut raw_bytes = [0_u8; 8];
        self.read_exact(&mut raw_bytes)?;

        Vec::from_hex(raw_bytes)
            .map_err(|e| io::Error::other(format!("Error: can not parse hex {}", e)))?
            .as_slice()
            .read_be()
    }
}

/// Prefix used for every temporary name so that leftovers from killed
/// processes can be found and removed.
pub const TMP_PREFIX: &str = "..rpmtx";

/// Upper bound on name collisions before a temp operation gives up.
pub const TMP_MAX: u32 = 10_000;

fn candidate_name(prefix: &str) -> String {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u32(std::process::id());
    format!("{}.{:012x}", prefix, hasher.finish() & 0xffff_ffff_ffff)
}

fn exhausted() -> io::Error {
    io::Error::new(ErrorKind::AlreadyExists, "no usable temporary name found")
}

/// Create an exclusive (`O_EXCL`) randomly-named file next to the final
/// destination. The caller writes data and renames it into place so a
/// partially written file is never visible under its real name.
pub fn tmp_file(dir: &Path) -> io::Result<(File, PathBuf)> {
    for _ in 0..TMP_MAX {
        let path = dir.join(candidate_name(TMP_PREFIX));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(exhausted())
}

/// Hardlink `target` under a random name in `dir`. Returns `Ok(None)` when
/// the filesystem refuses links (`EXDEV`, `EPERM`) so the caller can fall
/// back to copying.
pub fn tmp_link(dir: &Path, target: &Path) -> io::Result<Option<PathBuf>> {
    for _ in 0..TMP_MAX {
        let path = dir.join(candidate_name(TMP_PREFIX));
        match std::fs::hard_link(target, &path) {
            Ok(()) => return Ok(Some(path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) if e.kind() == ErrorKind::CrossesDevices => return Ok(None),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Err(exhausted())
}

/// Run `create` against random sibling names until it succeeds; used for
/// symlinks, FIFOs and device nodes which cannot be opened with `O_EXCL`.
pub fn tmp_node<F>(dir: &Path, mut create: F) -> io::Result<PathBuf>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    for _ in 0..TMP_MAX {
        let path = dir.join(candidate_name(TMP_PREFIX));
        match create(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(exhausted())
}
