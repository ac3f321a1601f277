use std::collections::HashMap;

use crate::rpm::Package;

/// Split an absolute path into `(dirname-with-slash, basename)`.
fn split_path(name: &str) -> (String, String) {
    match name.rfind('/') {
        Some(i) => (name[..i + 1].to_string(), name[i + 1..].to_string()),
        None => ("/".to_string(), name.to_string()),
    }
}

/// Split a legacy flat file list into the (basenames, dirindexes,
/// dirnames) triple, preserving file order and reusing directory slots.
pub fn gen_basenames(filenames: &[String]) -> (Vec<String>, Vec<u32>, Vec<String>) {
    let mut basenames = Vec::with_capacity(filenames.len());
    let mut dirindexes = Vec::with_capacity(filenames.len());
    let mut dirnames: Vec<String> = Vec::new();
    let mut last: Option<(String, u32)> = None;
    for filename in filenames {
        let (dirname, basename) = split_path(filename);
        let index = match &last {
            Some((d, i)) if *d == dirname => *i,
            _ => {
                let i = match dirnames.iter().position(|d| *d == dirname) {
                    Some(i) => i as u32,
                    None => {
                        dirnames.push(dirname.clone());
                        dirnames.len() as u32 - 1
                    }
                };
                last = Some((dirname, i));
                i
            }
        };
        basenames.push(basename);
        dirindexes.push(index);
    }
    (basenames, dirindexes, dirnames)
}

/// Per-(dirname, basename) owner entries. Indexed owners carry the file
/// index so conflict analysis can reach the per-file metadata; the plain
/// form is enough for provides lookups.
#[derive(Debug, Clone)]
pub enum Owners {
    Indexed(Vec<(usize, usize)>),
    Plain(Vec<usize>),
}

impl Owners {
    fn new(indexed: bool) -> Self {
        if indexed {
            Owners::Indexed(Vec::new())
        } else {
            Owners::Plain(Vec::new())
        }
    }

    fn push(&mut self, owner: usize, index: usize) {
        match self {
            Owners::Indexed(v) => v.push((owner, index)),
            Owners::Plain(v) => v.push(owner),
        }
    }

    fn remove(&mut self, owner: usize, index: usize) {
        match self {
            Owners::Indexed(v) => {
                if let Some(pos) = v.iter().position(|(o, i)| *o == owner && *i == index) {
                    v.remove(pos);
                }
            }
            Owners::Plain(v) => {
                if let Some(pos) = v.iter().position(|o| *o == owner) {
                    v.remove(pos);
                }
            }
        }
    }

    pub fn owners(&self) -> Vec<usize> {
        match self {
            Owners::Indexed(v) => v.iter().map(|(o, _)| *o).collect(),
            Owners::Plain(v) => v.clone(),
        }
    }

    pub fn indexed(&self) -> Option<&[(usize, usize)]> {
        match self {
            Owners::Indexed(v) => Some(v),
            Owners::Plain(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Owners::Indexed(v) => v.len(),
            Owners::Plain(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mapping from filenames to owning packages, keyed by package ids
/// assigned by the resolver.
#[derive(Debug, Default)]
pub struct FilenamesList {
    check_file_conflicts: bool,
    path: HashMap<String, HashMap<String, Owners>>,
}

impl FilenamesList {
    pub fn new(check_file_conflicts: bool) -> Self {
        FilenamesList {
            check_file_conflicts,
            path: HashMap::new(),
        }
    }

    fn pkg_entries(pkg: &Package) -> Vec<(String, String)> {
        if let Some(basenames) = pkg.header.get_str_array("basenames") {
            let dirnames = pkg.header.get_str_array("dirnames").unwrap_or_default();
            let dirindexes = pkg.header.get_u32_array("dirindexes").unwrap_or_default();
            basenames
                .into_iter()
                .zip(dirindexes)
                .map(|(base, di)| {
                    (
                        dirnames.get(di as usize).cloned().unwrap_or_default(),
                        base,
                    )
                })
                .collect()
        } else if let Some(old) = pkg.header.get_str_array("oldfilenames") {
            old.iter().map(|f| split_path(f)).collect()
        } else {
            Vec::new()
        }
    }

    pub fn add_package(&mut self, id: usize, pkg: &Package) {
        if let Some(dirnames) = pkg.header.get_str_array("dirnames") {
            for dirname in dirnames {
                self.path.entry(dirname).or_default();
            }
        }
        let indexed = self.check_file_conflicts;
        for (i, (dirname, basename)) in Self::pkg_entries(pkg).into_iter().enumerate() {
            self.path
                .entry(dirname)
                .or_default()
                .entry(basename)
                .or_insert_with(|| Owners::new(indexed))
                .push(id, i);
        }
    }

    pub fn remove_package(&mut self, id: usize, pkg: &Package) {
        for (i, (dirname, basename)) in Self::pkg_entries(pkg).into_iter().enumerate() {
            if let Some(dir) = self.path.get_mut(&dirname) {
                if let Some(entry) = dir.get_mut(&basename) {
                    entry.remove(id, i);
                }
            }
        }
    }

    /// Packages owning the file `name`.
    pub fn search(&self, name: &str) -> Vec<usize> {
        let (dirname, basename) = split_path(name);
        self.path
            .get(&dirname)
            .and_then(|d| d.get(&basename))
            .map(|e| e.owners())
            .unwrap_or_default()
    }

    /// Iterate all `(dirname, basename, owners)` entries in sorted order,
    /// for deterministic conflict reports.
    pub fn sorted_entries(&self) -> Vec<(&str, &str, &Owners)> {
        let mut dirs: Vec<_> = self.path.iter().collect();
        dirs.sort_by_key(|(d, _)| d.as_str());
        let mut out = Vec::new();
        for (dirname, basenames) in dirs {
            let mut files: Vec<_> = basenames.iter().collect();
            files.sort_by_key(|(b, _)| b.as_str());
            for (basename, owners) in files {
                out.push((dirname.as_str(), basename.as_str(), owners));
            }
        }
        out
    }
}

/// Whether the `i1`-th file of `pkg1` collides with the `i2`-th file of
/// `pkg2` at the same path. Matching digest, mode, owner and group is
/// never a conflict, and neither are multilib pairs whose non-zero file
/// colors differ.
pub fn files_conflict(pkg1: &Package, i1: usize, pkg2: &Package, i2: usize) -> bool {
    let md5_1 = index_str(pkg1, "filemd5s", i1);
    let md5_2 = index_str(pkg2, "filemd5s", i2);
    let mode1 = index_u16(pkg1, "filemodes", i1);
    let mode2 = index_u16(pkg2, "filemodes", i2);
    if md5_1 == md5_2
        && mode1 == mode2
        && index_str(pkg1, "fileusername", i1) == index_str(pkg2, "fileusername", i2)
        && index_str(pkg1, "filegroupname", i1) == index_str(pkg2, "filegroupname", i2)
    {
        return false;
    }
    let color1 = index_u32(pkg1, "filecolors", i1);
    let color2 = index_u32(pkg2, "filecolors", i2);
    if color1 != 0 && color2 != 0 && color1 != color2 {
        return false;
    }
    true
}

fn index_str(pkg: &Package, tag: &str, i: usize) -> String {
    pkg.header
        .get_str_array(tag)
        .and_then(|v| v.get(i).cloned())
        .unwrap_or_default()
}

fn index_u16(pkg: &Package, tag: &str, i: usize) -> u16 {
    pkg.header
        .get_u16_array(tag)
        .and_then(|v| v.get(i).copied())
        .unwrap_or_default()
}

fn index_u32(pkg: &Package, tag: &str, i: usize) -> u32 {
    pkg.header
        .get_u32_array(tag)
        .and_then(|v| v.get(i).copied())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Value;
    use crate::rpm::test_support::minimal_package;

    fn pkg_with_files(name: &str, dirs: &[&str], indexes: &[u32], bases: &[&str]) -> Package {
        let mut pkg = minimal_package(name, "1", "1");
        pkg.header.insert(
            "dirnames",
            Value::StrArray(dirs.iter().map(|s| s.as_bytes().to_vec()).collect()),
        );
        pkg.header
            .insert("dirindexes", Value::Uint32(indexes.to_vec()));
        pkg.header.insert(
            "basenames",
            Value::StrArray(bases.iter().map(|s| s.as_bytes().to_vec()).collect()),
        );
        pkg
    }

    #[test]
    fn test_gen_basenames_roundtrip() {
        let files: Vec<String> = ["/usr/bin/ls", "/usr/bin/cat", "/etc/motd", "/usr/bin/rm"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (basenames, dirindexes, dirnames) = gen_basenames(&files);
        assert_eq!(basenames, vec!["ls", "cat", "motd", "rm"]);
        assert_eq!(dirindexes, vec![0, 0, 1, 0]);
        assert_eq!(dirnames, vec!["/usr/bin/", "/etc/"]);
        // no path is reordered by the split
        let reassembled: Vec<String> = basenames
            .iter()
            .zip(&dirindexes)
            .map(|(b, di)| format!("{}{}", dirnames[*di as usize], b))
            .collect();
        assert_eq!(reassembled, files);
    }

    #[test]
    fn test_search_by_path() {
        let pkg = pkg_with_files("demo", &["/usr/bin/", "/etc/"], &[0, 1], &["ls", "motd"]);
        let mut list = FilenamesList::new(false);
        list.add_package(0, &pkg);
        assert_eq!(list.search("/usr/bin/ls"), vec![0]);
        assert_eq!(list.search("/etc/motd"), vec![0]);
        assert!(list.search("/usr/bin/cat").is_empty());

        list.remove_package(0, &pkg);
        assert!(list.search("/usr/bin/ls").is_empty());
    }

    #[test]
    fn test_oldfilenames_packages() {
        let mut pkg = minimal_package("legacy", "1", "1");
        pkg.header.insert(
            "oldfilenames",
            Value::StrArray(vec![b"/sbin/init".to_vec()]),
        );
        let mut list = FilenamesList::new(true);
        list.add_package(3, &pkg);
        assert_eq!(list.search("/sbin/init"), vec![3]);
    }

    #[test]
    fn test_indexed_entries() {
        let pkg = pkg_with_files("demo", &["/usr/bin/"], &[0, 0], &["a", "b"]);
        let mut list = FilenamesList::new(true);
        list.add_package(1, &pkg);
        let entries = list.sorted_entries();
        let owners: Vec<_> = entries
            .iter()
            .filter(|(_, _, o)| !o.is_empty())
            .collect();
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].2.indexed().unwrap(), &[(1, 0)]);
        assert_eq!(owners[1].2.indexed().unwrap(), &[(1, 1)]);
    }

    fn pkg_with_meta(name: &str, md5: &str, mode: u16, user: &str, color: u32) -> Package {
        let mut pkg = pkg_with_files(name, &["/usr/lib/"], &[0], &["libx.so"]);
        pkg.header.insert(
            "filemd5s",
            Value::StrArray(vec![md5.as_bytes().to_vec()]),
        );
        pkg.header.insert("filemodes", Value::Int16(vec![mode]));
        pkg.header.insert(
            "fileusername",
            Value::StrArray(vec![user.as_bytes().to_vec()]),
        );
        pkg.header.insert(
            "filegroupname",
            Value::StrArray(vec![b"root".to_vec()]),
        );
        pkg.header
            .insert("filecolors", Value::Uint32(vec![color]));
        pkg
    }

    #[test]
    fn test_file_conflict_rule() {
        let a = pkg_with_meta("a", "aaaa", 0o100644, "root", 0);
        let same = pkg_with_meta("b", "aaaa", 0o100644, "root", 0);
        assert!(!files_conflict(&a, 0, &same, 0));

        let differs = pkg_with_meta("c", "bbbb", 0o100644, "root", 0);
        assert!(files_conflict(&a, 0, &differs, 0));

        // multilib: both colored, different colors
        let elf32 = pkg_with_meta("d", "cccc", 0o100755, "root", 1);
        let elf64 = pkg_with_meta("e", "dddd", 0o100755, "root", 2);
        assert!(!files_conflict(&elf32, 0, &elf64, 0));

        // one color zero: still a conflict
        let plain = pkg_with_meta("f", "eeee", 0o100755, "root", 0);
        assert!(files_conflict(&elf32, 0, &plain, 0));
    }
}
