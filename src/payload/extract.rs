use filetime::{FileTime, set_file_mtime};
use log::warn;
use nix::unistd::{Gid, Group, Uid, User, chown};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::{CpioEntry, FileInfo, filename_table, hardlink_clusters, is_blk, is_chr, is_dir,
    is_fifo, is_lnk, is_reg, is_sock, normalize_name};
use crate::error::{Error, Result};
use crate::utils::{tmp_file, tmp_link, tmp_node};

/// Where and how to materialize an archive.
#[derive(Debug, Default)]
pub struct ExtractOptions {
    /// Root the file tree is created under.
    pub dest: PathBuf,
    /// Apply owner/group from the file table; needs privileges.
    pub change_owner: bool,
    /// Path translations for relocated packages, old prefix to new.
    pub relocations: Vec<(String, String)>,
}

fn relocate(name: &str, relocations: &[(String, String)]) -> String {
    for (old, new) in relocations {
        if name == old {
            return new.clone();
        }
        if let Some(rest) = name.strip_prefix(old) {
            if rest.starts_with('/') {
                return format!("{}{}", new, rest);
            }
        }
    }
    name.to_string()
}

struct OwnerCache {
    users: HashMap<String, Option<Uid>>,
    groups: HashMap<String, Option<Gid>>,
}

impl OwnerCache {
    fn new() -> Self {
        OwnerCache {
            users: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    fn resolve(&mut self, info: &FileInfo) -> (Option<Uid>, Option<Gid>) {
        let uid = self
            .users
            .entry(info.user.clone())
            .or_insert_with(|| match User::from_name(&info.user) {
                Ok(Some(u)) => Some(u.uid),
                _ => {
                    warn!("unknown file owner {}", info.user);
                    None
                }
            });
        let uid = *uid;
        let gid = self
            .groups
            .entry(info.group.clone())
            .or_insert_with(|| match Group::from_name(&info.group) {
                Ok(Some(g)) => Some(g.gid),
                _ => {
                    warn!("unknown file group {}", info.group);
                    None
                }
            });
        (uid, *gid)
    }
}

fn set_perms(
    path: &Path,
    uid: Option<Uid>,
    gid: Option<Gid>,
    mode: Option<u16>,
    mtime: Option<u32>,
) -> Result<()> {
    if uid.is_some() || gid.is_some() {
        chown(path, uid, gid).map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "can not change owner of {}: {}",
                path.display(),
                e
            )))
        })?;
    }
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(u32::from(mode) & 0o7777))?;
    }
    if let Some(mtime) = mtime {
        set_file_mtime(path, FileTime::from_unix_time(i64::from(mtime), 0))?;
    }
    Ok(())
}

fn write_regular(
    path: &Path,
    data: &[u8],
    uid: Option<Uid>,
    gid: Option<Gid>,
    info: &FileInfo,
) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let (mut file, tmp) = tmp_file(dir)?;
    file.write_all(data)?;
    drop(file);
    set_perms(&tmp, uid, gid, Some(info.mode), Some(info.mtime))?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Hardlink `target` as `path`, falling back to a copy of `data` when the
/// filesystem refuses the link.
fn link_or_copy(
    path: &Path,
    target: &Path,
    data: &[u8],
    uid: Option<Uid>,
    gid: Option<Gid>,
    info: &FileInfo,
) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    match tmp_link(dir, target)? {
        Some(tmp) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        None => write_regular(path, data, uid, gid, info),
    }
}

/// Materialize the archive under `opts.dest`. Every entry is created
/// under a random sibling name first and renamed into place, so a
/// partially written file is never visible. Returns diagnostics for
/// archive/header disagreements.
pub fn extract_archive<R: Read>(
    reader: &mut R,
    label: &str,
    files: &[FileInfo],
    is_source: bool,
    opts: &ExtractOptions,
) -> Result<Vec<String>> {
    let mut diags = Vec::new();
    let mut names = filename_table(files);
    let mut clusters = hardlink_clusters(files);
    let mut realized: std::collections::HashSet<super::HardlinkKey> =
        std::collections::HashSet::new();
    let mut owners = OwnerCache::new();

    let target_path = |name: &str| -> PathBuf {
        let relocated = relocate(name, &opts.relocations);
        opts.dest.join(relocated.trim_start_matches('/'))
    };

    loop {
        let entry = CpioEntry::read(reader)?;
        if entry.is_trailer() {
            break;
        }
        let data = entry.read_data(reader)?;
        let filename = normalize_name(&entry.name, is_source);
        let Some(i) = names.remove(filename.as_str()) else {
            diags.push(format!("cpio file {} not in rpm header", filename));
            continue;
        };
        let info = &files[i];
        let path = target_path(&filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let (uid, gid) = if opts.change_owner {
            owners.resolve(info)
        } else {
            (None, None)
        };

        let mode = info.mode;
        if is_reg(mode) {
            let key = (info.device, info.inode, info.digest.clone());
            match clusters.get(&key) {
                Some(_) if data.is_empty() => {
                    // a later record carries the content; the carrier
                    // realizes this path by linking
                }
                Some(members) => {
                    let members = members.clone();
                    write_regular(&path, &data, uid, gid, info)?;
                    for j in members {
                        if j == i {
                            continue;
                        }
                        let other = target_path(&files[j].name);
                        link_or_copy(&other, &path, &data, uid, gid, &files[j])?;
                    }
                    clusters.remove(&key);
                    realized.insert(key);
                }
                None => {
                    // a realized cluster's trailing zero-length records
                    // must not clobber the links already in place
                    if !realized.contains(&key) {
                        write_regular(&path, &data, uid, gid, info)?;
                    }
                }
            }
        } else if is_dir(mode) {
            fs::create_dir_all(&path)?;
            set_perms(&path, uid, gid, Some(mode), None)?;
        } else if is_lnk(mode) {
            let dir = path.parent().unwrap_or(Path::new("."));
            let tmp = tmp_node(dir, |p| std::os::unix::fs::symlink(&info.linkto, p))?;
            if let (Some(uid), Some(gid)) = (uid, gid) {
                std::os::unix::fs::lchown(&tmp, Some(uid.as_raw()), Some(gid.as_raw()))?;
            }
            fs::rename(&tmp, &path)?;
        } else if is_fifo(mode) {
            let dir = path.parent().unwrap_or(Path::new("."));
            let tmp = tmp_node(dir, |p| {
                nix::unistd::mkfifo(p, nix::sys::stat::Mode::from_bits_truncate(0o600))
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
            })?;
            set_perms(&tmp, uid, gid, Some(mode), Some(info.mtime))?;
            fs::rename(&tmp, &path)?;
        } else if is_chr(mode) || is_blk(mode) {
            // device nodes need privileges; silently skipped otherwise
            if opts.change_owner {
                let rdev = nix::sys::stat::makedev(
                    u64::from(info.rdev >> 8),
                    u64::from(info.rdev & 0xff),
                );
                let dir = path.parent().unwrap_or(Path::new("."));
                let tmp = tmp_node(dir, |p| {
                    nix::sys::stat::mknod(
                        p,
                        nix::sys::stat::SFlag::from_bits_truncate(u32::from(mode)),
                        nix::sys::stat::Mode::from_bits_truncate(u32::from(mode) & 0o7777),
                        rdev,
                    )
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
                })?;
                set_perms(&tmp, uid, gid, Some(mode), Some(info.mtime))?;
                fs::rename(&tmp, &path)?;
            }
        } else if is_sock(mode) {
            return Err(Error::Consistency(format!(
                "{}: UNIX domain sockets can't be packaged: {}",
                label, filename
            )));
        } else {
            return Err(Error::Consistency(format!(
                "{}: {} is not a valid filetype ({:o})",
                label, filename, mode
            )));
        }
    }

    for filename in names.keys() {
        diags.push(format!("file not in cpio: {}", filename));
    }
    if !clusters.is_empty() {
        diags.push("hardlinked files remain from cpio".to_string());
    }
    for diag in &diags {
        warn!("{}: {}", label, diag);
    }
    Ok(diags)
}
