use std::collections::HashMap;

use super::filenames::{FilenamesList, files_conflict};
use super::sense::SenseFlags;
use crate::rpm::{Dependency, Package};
use crate::version::{Evr, range_intersect};

/// Three-valued result of membership queries against the package set.
pub const OK: i32 = 1;
pub const ALREADY_INSTALLED: i32 = -1;
pub const NOT_INSTALLED: i32 = -3;

/// Key of the requires/obsoletes/conflicts indexes.
pub type DepKey = (String, SenseFlags, String);

/// Findings of a whole-set dependency check, one line per offending
/// (name, flags, version) tuple.
#[derive(Debug, Default)]
pub struct DependencyReport {
    pub unresolved: Vec<String>,
    pub conflicts: Vec<String>,
    pub obsoleted: Vec<String>,
    pub file_conflicts: Vec<String>,
}

impl DependencyReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.conflicts.is_empty() && self.file_conflicts.is_empty()
    }
}

/// Typed index over the provides, requires, conflicts and obsoletes of a
/// package set, with file-provides answered by the filename index.
/// Packages are addressed by the id assigned at insertion.
#[derive(Debug, Default)]
pub struct Resolver {
    packages: Vec<Package>,
    active: Vec<bool>,
    pub provides: HashMap<String, Vec<(SenseFlags, String, usize)>>,
    pub requires: HashMap<DepKey, Vec<usize>>,
    pub obsoletes: HashMap<DepKey, Vec<usize>>,
    pub conflicts: HashMap<DepKey, Vec<usize>>,
    pub filenames: FilenamesList,
}

impl Resolver {
    /// Index a package set. Source packages and public-key pseudo
    /// packages carry no installable files and stay out of the indexes.
    pub fn new<I: IntoIterator<Item = Package>>(packages: I, check_file_conflicts: bool) -> Self {
        let mut resolver = Resolver {
            filenames: FilenamesList::new(check_file_conflicts),
            ..Default::default()
        };
        for pkg in packages {
            resolver.add_package(pkg);
        }
        resolver
    }

    pub fn add_package(&mut self, pkg: Package) -> usize {
        let id = self.packages.len();
        let index = !pkg.is_source && pkg.name() != "gpg-pubkey";
        if index {
            self.filenames.add_package(id, &pkg);
            for dep in pkg.provides() {
                self.provides
                    .entry(dep.name)
                    .or_default()
                    .push((dep.flags, dep.version, id));
            }
            Self::index_deps(&mut self.requires, pkg.requires(), id);
            Self::index_deps(&mut self.obsoletes, pkg.obsoletes(), id);
            Self::index_deps(&mut self.conflicts, pkg.conflicts(), id);
        }
        self.packages.push(pkg);
        self.active.push(index);
        id
    }

    fn index_deps(map: &mut HashMap<DepKey, Vec<usize>>, deps: Vec<Dependency>, id: usize) {
        for dep in deps {
            map.entry((dep.name, dep.flags, dep.version))
                .or_default()
                .push(id);
        }
    }

    pub fn remove_package(&mut self, id: usize) {
        if !self.active[id] {
            return;
        }
        self.active[id] = false;
        let pkg = &self.packages[id];
        self.filenames.remove_package(id, pkg);
        for dep in pkg.provides() {
            if let Some(list) = self.provides.get_mut(&dep.name) {
                list.retain(|(f, v, o)| !(*o == id && *f == dep.flags && *v == dep.version));
                if list.is_empty() {
                    self.provides.remove(&dep.name);
                }
            }
        }
        for (map, deps) in [
            (&mut self.requires, pkg.requires()),
            (&mut self.obsoletes, pkg.obsoletes()),
            (&mut self.conflicts, pkg.conflicts()),
        ] {
            for dep in deps {
                let key = (dep.name, dep.flags, dep.version);
                if let Some(list) = map.get_mut(&key) {
                    list.retain(|o| *o != id);
                    if list.is_empty() {
                        map.remove(&key);
                    }
                }
            }
        }
    }

    pub fn package(&self, id: usize) -> &Package {
        &self.packages[id]
    }

    pub fn is_active(&self, id: usize) -> bool {
        self.active[id]
    }

    pub fn ids(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.packages.len()).filter(|i| self.active[*i])
    }

    pub fn len(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All active packages satisfying `(name, flags, version)`. An empty
    /// version matches any provide of that name; otherwise the provide
    /// and requirement ranges must intersect. A requirement naming an
    /// absolute path (leading `/`, no version) is also answered from the
    /// filename index.
    pub fn search_provides(&self, name: &str, flags: SenseFlags, version: &str) -> Vec<usize> {
        let mut found = Vec::new();
        let evr = Evr::parse(version);
        if let Some(candidates) = self.provides.get(name) {
            for (cflags, cversion, owner) in candidates {
                if found.contains(owner) || !self.active[*owner] {
                    continue;
                }
                if version.is_empty()
                    || range_intersect(flags, &evr, *cflags, &Evr::parse(cversion))
                {
                    found.push(*owner);
                } else if cversion.is_empty() {
                    // unversioned provide against a versioned requirement
                    found.push(*owner);
                }
            }
        }
        if name.starts_with('/') && version.is_empty() {
            for owner in self.filenames.search(name) {
                if self.active[owner] && !found.contains(&owner) {
                    found.push(owner);
                }
            }
        }
        found
    }

    /// OK when `pkg` is absent from the set, ALREADY_INSTALLED when the
    /// same NEVRA is already present.
    pub fn install_state(&self, pkg: &Package) -> i32 {
        let nevra = pkg.nevra();
        if self.ids().any(|id| self.packages[id].nevra() == nevra) {
            ALREADY_INSTALLED
        } else {
            OK
        }
    }

    /// OK when `pkg` is present, NOT_INSTALLED otherwise.
    pub fn erase_state(&self, pkg: &Package) -> i32 {
        let nevra = pkg.nevra();
        if self.ids().any(|id| self.packages[id].nevra() == nevra) {
            OK
        } else {
            NOT_INSTALLED
        }
    }

    fn sorted_keys(map: &HashMap<DepKey, Vec<usize>>) -> Vec<DepKey> {
        let mut keys: Vec<DepKey> = map.keys().cloned().collect();
        keys.sort_by(|a, b| {
            (a.0.as_str(), a.1.bits(), a.2.as_str()).cmp(&(b.0.as_str(), b.1.bits(), b.2.as_str()))
        });
        keys
    }

    /// Drop packages obsoleted by other members of the set, reporting
    /// each removal.
    pub fn process_obsoletes(&mut self) -> Vec<String> {
        let mut report = Vec::new();
        for (name, flags, version) in Self::sorted_keys(&self.obsoletes.clone()) {
            let owners = self
                .obsoletes
                .get(&(name.clone(), flags, version.clone()))
                .cloned()
                .unwrap_or_default();
            for target in self.search_provides(&name, flags, &version) {
                for owner in &owners {
                    if !self.active[target] {
                        continue;
                    }
                    let obsoleter = &self.packages[*owner];
                    let obsoleted = &self.packages[target];
                    // a package never obsoletes itself, and obsoleting the
                    // own name is the normal rename/update shape
                    if obsoleter.nevra() == obsoleted.nevra() || obsoleter.name() == name {
                        continue;
                    }
                    report.push(format!(
                        "{} is obsoleted by {}",
                        obsoleted.filename(),
                        obsoleter.filename()
                    ));
                    self.remove_package(target);
                }
            }
        }
        report
    }

    /// Check every requirement, conflict and file pairing of the set.
    pub fn check_dependencies(&self, check_file_conflicts: bool) -> DependencyReport {
        let mut report = DependencyReport::default();

        for (name, flags, version) in Self::sorted_keys(&self.conflicts) {
            let owners = &self.conflicts[&(name.clone(), flags, version.clone())];
            for target in self.search_provides(&name, flags, &version) {
                for owner in owners {
                    let confl = &self.packages[*owner];
                    let hit = &self.packages[target];
                    if confl.nevra() == hit.nevra() {
                        continue;
                    }
                    report.conflicts.push(format!(
                        "{} contains a conflict with {}",
                        confl.filename(),
                        hit.filename()
                    ));
                }
            }
        }

        for (name, flags, version) in Self::sorted_keys(&self.requires) {
            if name.starts_with("rpmlib(") || name.starts_with("config(") {
                continue;
            }
            if self.search_provides(&name, flags, &version).is_empty() {
                let dep = Dependency::new(name.clone(), flags, version.clone());
                for owner in &self.requires[&(name.clone(), flags, version.clone())] {
                    report.unresolved.push(format!(
                        "{} did not find a package for: {}",
                        self.packages[*owner].filename(),
                        dep
                    ));
                }
            }
        }

        if check_file_conflicts {
            report.file_conflicts = self.check_file_conflicts();
        }
        report
    }

    fn check_file_conflicts(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (dirname, basename, owners) in self.filenames.sorted_entries() {
            let Some(entries) = owners.indexed() else {
                continue;
            };
            if entries.len() < 2 {
                continue;
            }
            for j in 0..entries.len() - 1 {
                let (o1, i1) = entries[j];
                for (o2, i2) in &entries[j + 1..] {
                    if files_conflict(&self.packages[o1], i1, &self.packages[*o2], *i2) {
                        out.push(format!(
                            "fileconflict for {}{} in {} and {}",
                            dirname,
                            basename,
                            self.packages[o1].filename(),
                            self.packages[*o2].filename()
                        ));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Value;
    use crate::rpm::test_support::{minimal_package, with_requires};

    fn provider(name: &str, version: &str, provides: &[(&str, SenseFlags, &str)]) -> Package {
        let mut pkg = minimal_package(name, version, "1");
        pkg.header.insert(
            "providename",
            Value::StrArray(provides.iter().map(|p| p.0.as_bytes().to_vec()).collect()),
        );
        pkg.header.insert(
            "provideflags",
            Value::Uint32(provides.iter().map(|p| p.1.bits()).collect()),
        );
        pkg.header.insert(
            "provideversion",
            Value::StrArray(provides.iter().map(|p| p.2.as_bytes().to_vec()).collect()),
        );
        pkg
    }

    #[test]
    fn test_self_provide_lookup() {
        let resolver = Resolver::new([minimal_package("bash", "3.0", "31")], false);
        assert_eq!(
            resolver.search_provides("bash", SenseFlags::empty(), ""),
            vec![0]
        );
        assert_eq!(
            resolver.search_provides(
                "bash",
                SenseFlags::GREATER | SenseFlags::EQUAL,
                "2.0"
            ),
            vec![0]
        );
        assert!(
            resolver
                .search_provides("bash", SenseFlags::GREATER, "3.0-31")
                .is_empty()
        );
        assert!(
            resolver
                .search_provides("zsh", SenseFlags::empty(), "")
                .is_empty()
        );
    }

    #[test]
    fn test_versioned_provide_range() {
        let pkg = provider(
            "libfoo",
            "2.1",
            &[("libfoo.so.2", SenseFlags::EQUAL, "2.1")],
        );
        let resolver = Resolver::new([pkg], false);
        assert_eq!(
            resolver.search_provides(
                "libfoo.so.2",
                SenseFlags::GREATER | SenseFlags::EQUAL,
                "2.0"
            ),
            vec![0]
        );
        assert!(
            resolver
                .search_provides("libfoo.so.2", SenseFlags::GREATER, "2.1")
                .is_empty()
        );
    }

    #[test]
    fn test_file_provides() {
        let mut pkg = minimal_package("bash", "3.0", "31");
        pkg.header
            .insert("dirnames", Value::StrArray(vec![b"/bin/".to_vec()]));
        pkg.header.insert("dirindexes", Value::Uint32(vec![0]));
        pkg.header
            .insert("basenames", Value::StrArray(vec![b"sh".to_vec()]));
        let resolver = Resolver::new([pkg], false);
        assert_eq!(
            resolver.search_provides("/bin/sh", SenseFlags::empty(), ""),
            vec![0]
        );
        // versioned file requirement is not answered from the index
        assert!(
            resolver
                .search_provides("/bin/sh", SenseFlags::EQUAL, "1")
                .is_empty()
        );
    }

    #[test]
    fn test_source_packages_not_indexed() {
        let mut pkg = minimal_package("bash", "3.0", "31");
        pkg.is_source = true;
        let resolver = Resolver::new([pkg], false);
        assert!(
            resolver
                .search_provides("bash", SenseFlags::empty(), "")
                .is_empty()
        );
        assert_eq!(resolver.len(), 0);
    }

    #[test]
    fn test_unresolved_requires_reported() {
        let pkg = with_requires(
            minimal_package("app", "1", "1"),
            &[
                ("libmissing.so.1", SenseFlags::empty(), ""),
                ("rpmlib(PayloadFilesHavePrefix)", SenseFlags::empty(), ""),
            ],
        );
        let resolver = Resolver::new([pkg], false);
        let report = resolver.check_dependencies(false);
        assert_eq!(report.unresolved.len(), 1);
        assert!(report.unresolved[0].contains("libmissing.so.1"));
    }

    #[test]
    fn test_conflict_reported() {
        let a = provider("a", "1", &[]);
        let mut b = minimal_package("b", "1", "1");
        b.header
            .insert("conflictname", Value::StrArray(vec![b"a".to_vec()]));
        b.header.insert("conflictflags", Value::Uint32(vec![0]));
        b.header
            .insert("conflictversion", Value::StrArray(vec![b"".to_vec()]));
        let resolver = Resolver::new([a, b], false);
        let report = resolver.check_dependencies(false);
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.conflicts[0].contains("b-1-1"));
    }

    #[test]
    fn test_obsoletes_removal() {
        let mut new = minimal_package("renamed", "2", "1");
        new.header
            .insert("obsoletename", Value::StrArray(vec![b"oldname".to_vec()]));
        new.header.insert("obsoleteflags", Value::Uint32(vec![0]));
        new.header
            .insert("obsoleteversion", Value::StrArray(vec![b"".to_vec()]));
        let old = minimal_package("oldname", "1", "1");
        let mut resolver = Resolver::new([new, old], false);
        let report = resolver.process_obsoletes();
        assert_eq!(report.len(), 1);
        assert!(report[0].contains("oldname-1-1"));
        assert!(!resolver.is_active(1));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_install_erase_state() {
        let resolver = Resolver::new([minimal_package("bash", "3.0", "31")], false);
        let same = minimal_package("bash", "3.0", "31");
        let newer = minimal_package("bash", "3.1", "1");
        assert_eq!(resolver.install_state(&same), ALREADY_INSTALLED);
        assert_eq!(resolver.install_state(&newer), OK);
        assert_eq!(resolver.erase_state(&same), OK);
        assert_eq!(resolver.erase_state(&newer), NOT_INSTALLED);
    }

    #[test]
    fn test_file_conflict_detection() {
        let mk = |name: &str, md5: &str| {
            let mut pkg = minimal_package(name, "1", "1");
            pkg.header
                .insert("dirnames", Value::StrArray(vec![b"/usr/lib/".to_vec()]));
            pkg.header.insert("dirindexes", Value::Uint32(vec![0]));
            pkg.header
                .insert("basenames", Value::StrArray(vec![b"libz.so".to_vec()]));
            pkg.header
                .insert("filemd5s", Value::StrArray(vec![md5.as_bytes().to_vec()]));
            pkg.header.insert("filemodes", Value::Int16(vec![0o100644]));
            pkg.header
                .insert("fileusername", Value::StrArray(vec![b"root".to_vec()]));
            pkg.header
                .insert("filegroupname", Value::StrArray(vec![b"root".to_vec()]));
            pkg
        };
        let resolver = Resolver::new([mk("a", "x1"), mk("b", "x2")], true);
        let report = resolver.check_dependencies(true);
        assert_eq!(report.file_conflicts.len(), 1);
        assert!(report.file_conflicts[0].contains("/usr/lib/libz.so"));

        let resolver = Resolver::new([mk("a", "x1"), mk("b", "x1")], true);
        let report = resolver.check_dependencies(true);
        assert!(report.file_conflicts.is_empty());
    }
}
