use chrono::DateTime;
use itertools::multizip;
use std::fmt;
use std::path::PathBuf;

use crate::deps::{FileFlags, SenseFlags};
use crate::error::{Error, Result};
use crate::header::{HEADER_MATCH, Header, MAIN_REQUIRED, SIG_REQUIRED, TagRegistry};
use crate::payload::{FileInfo, is_reg};
use crate::version::Evr;

/// One provides/requires/obsoletes/conflicts entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: String,
    pub flags: SenseFlags,
    pub version: String,
}

impl Dependency {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, flags: SenseFlags, version: V) -> Self {
        Dependency {
            name: name.into(),
            flags,
            version: version.into(),
        }
    }

    pub fn evr(&self) -> Evr {
        Evr::parse(&self.version)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "({} {} {})", self.name, self.flags.sense_str(), self.version)
        }
    }
}

/// One flattened trigger: dependency triple plus interpreter and script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    pub flags: SenseFlags,
    pub version: String,
    pub prog: String,
    pub script: String,
}

/// Location data attached once a repository or directory scan has seen
/// the package on disk.
#[derive(Debug, Clone, Default)]
pub struct PackageSource {
    pub path: PathBuf,
    pub size: u64,
    pub digest: String,
}

/// Whether a source package builds on a given architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOn {
    No,
    Normal,
    Noarch,
}

/// A decoded package: main and signature headers plus the derived state
/// the planner needs. Read-only after decode, except for attaching the
/// on-disk source and the signature/database tag transfer.
#[derive(Debug, Default)]
pub struct Package {
    pub header: Header,
    pub signature: Header,
    pub is_source: bool,
    pub buildroot: Option<String>,
    pub relocations: Vec<(String, String)>,
    pub source: Option<PackageSource>,
}

impl Package {
    pub fn new(header: Header, signature: Header, is_source: bool) -> Self {
        Package {
            header,
            signature,
            is_source,
            ..Default::default()
        }
    }

    /// Attach the repository-local path, stat size and content digest.
    pub fn attach_source(&mut self, path: PathBuf, size: u64, digest: String) {
        self.source = Some(PackageSource { path, size, digest });
    }

    pub fn name(&self) -> String {
        self.header.get_str("name").unwrap_or_default()
    }

    pub fn version(&self) -> String {
        self.header.get_str("version").unwrap_or_default()
    }

    pub fn release(&self) -> String {
        self.header.get_str("release").unwrap_or_default()
    }

    pub fn epoch(&self) -> String {
        match self.header.get_u32("epoch") {
            Some(e) => e.to_string(),
            None => "0".to_string(),
        }
    }

    pub fn arch(&self) -> String {
        if self.is_source {
            return "src".to_string();
        }
        self.header.get_str("arch").unwrap_or_default()
    }

    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name(), self.version(), self.release())
    }

    pub fn nvra(&self) -> String {
        format!("{}.{}", self.nvr(), self.arch())
    }

    /// `[epoch:]version-release`, with the epoch only when the tag is
    /// present.
    pub fn evr(&self) -> String {
        match self.header.get_u32("epoch") {
            Some(e) => format!("{}:{}-{}", e, self.version(), self.release()),
            None => format!("{}-{}", self.version(), self.release()),
        }
    }

    pub fn nevra(&self) -> String {
        format!("{}-{}.{}", self.name(), self.evr(), self.arch())
    }

    pub fn evr_triple(&self) -> Evr {
        Evr::new(self.epoch(), self.version(), self.release())
    }

    /// Default on-disk filename.
    pub fn filename(&self) -> String {
        format!("{}.rpm", self.nvra())
    }

    /// Label used in diagnostics: the attached path when known, the
    /// canonical filename otherwise.
    pub fn label(&self) -> String {
        match &self.source {
            Some(s) => s.path.display().to_string(),
            None => self.filename(),
        }
    }

    /// The absolute file list, from `oldfilenames` on legacy packages or
    /// assembled from the dirnames/dirindexes/basenames triple.
    pub fn filenames(&self) -> Vec<String> {
        if let Some(old) = self.header.get_str_array("oldfilenames") {
            return old;
        }
        let Some(basenames) = self.header.get_str_array("basenames") else {
            return Vec::new();
        };
        let dirnames = self.header.get_str_array("dirnames").unwrap_or_default();
        let dirindexes = self.header.get_u32_array("dirindexes").unwrap_or_default();
        basenames
            .iter()
            .zip(dirindexes.iter())
            .map(|(base, di)| {
                let dir = dirnames.get(*di as usize).cloned().unwrap_or_default();
                format!("{}{}", dir, base)
            })
            .collect()
    }

    /// The per-file view the payload reader works against. Lengths of the
    /// parallel file tags must agree.
    pub fn file_infos(&self) -> Result<Vec<FileInfo>> {
        let filenames = self.filenames();
        if filenames.is_empty() {
            return Ok(Vec::new());
        }
        let n = filenames.len();
        let users = self.required_file_tag_str("fileusername", n)?;
        let groups = self.required_file_tag_str("filegroupname", n)?;
        let digests = self.required_file_tag_str("filemd5s", n)?;
        let linktos = self.required_file_tag_str("filelinktos", n)?;
        let modes = self
            .header
            .get_u16_array("filemodes")
            .ok_or_else(|| self.missing_file_tag("filemodes"))?
            .to_vec();
        let rdevs = self
            .header
            .get_u16_array("filerdevs")
            .ok_or_else(|| self.missing_file_tag("filerdevs"))?
            .to_vec();
        let mtimes = self
            .header
            .get_i32_array("filemtimes")
            .ok_or_else(|| self.missing_file_tag("filemtimes"))?
            .to_vec();
        let sizes = self.required_file_tag_u32("filesizes", n)?;
        let devices = self.required_file_tag_u32("filedevices", n)?;
        let inodes = self.required_file_tag_u32("fileinodes", n)?;
        let flags = self.required_file_tag_u32("fileflags", n)?;
        if modes.len() != n || rdevs.len() != n || mtimes.len() != n {
            return Err(Error::consistency(self.label(), "wrong length for file tag"));
        }

        let files = multizip((filenames, users, groups, digests, linktos))
            .enumerate()
            .map(|(i, (name, user, group, digest, linkto))| FileInfo {
                name,
                size: sizes[i],
                user,
                group,
                flags: FileFlags::from_bits_retain(flags[i]),
                mtime: mtimes[i] as u32,
                digest,
                mode: modes[i],
                linkto,
                device: devices[i],
                inode: inodes[i],
                rdev: rdevs[i],
            })
            .collect();
        Ok(files)
    }

    fn missing_file_tag(&self, tag: &str) -> Error {
        Error::consistency(self.label(), format!("missing file tag {}", tag))
    }

    fn required_file_tag_str(&self, tag: &str, n: usize) -> Result<Vec<String>> {
        let v = self
            .header
            .get_str_array(tag)
            .ok_or_else(|| self.missing_file_tag(tag))?;
        if v.len() != n {
            return Err(Error::consistency(
                self.label(),
                format!("wrong length for tag {}", tag),
            ));
        }
        Ok(v)
    }

    fn required_file_tag_u32(&self, tag: &str, n: usize) -> Result<Vec<u32>> {
        let v = self
            .header
            .get_u32_array(tag)
            .ok_or_else(|| self.missing_file_tag(tag))?;
        if v.len() != n {
            return Err(Error::consistency(
                self.label(),
                format!("wrong length for tag {}", tag),
            ));
        }
        Ok(v)
    }

    fn deps(&self, name_tag: &str, flag_tag: &str, version_tag: &str) -> Vec<Dependency> {
        let Some(names) = self.header.get_str_array(name_tag) else {
            return Vec::new();
        };
        let flags = self.header.get_u32_array(flag_tag).unwrap_or_default();
        let versions = self.header.get_str_array(version_tag).unwrap_or_default();
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Dependency {
                name,
                flags: SenseFlags::from_bits_retain(flags.get(i).copied().unwrap_or(0)),
                version: versions.get(i).cloned().unwrap_or_default(),
            })
            .collect()
    }

    /// All provides, including the implicit self-provide of binary
    /// packages.
    pub fn provides(&self) -> Vec<Dependency> {
        let mut provs = self.deps("providename", "provideflags", "provideversion");
        if !self.is_source {
            provs.push(Dependency::new(self.name(), SenseFlags::EQUAL, self.evr()));
        }
        provs
    }

    pub fn requires(&self) -> Vec<Dependency> {
        self.deps("requirename", "requireflags", "requireversion")
    }

    pub fn obsoletes(&self) -> Vec<Dependency> {
        self.deps("obsoletename", "obsoleteflags", "obsoleteversion")
    }

    pub fn conflicts(&self) -> Vec<Dependency> {
        self.deps("conflictname", "conflictflags", "conflictversion")
    }

    /// Triggers as flat 5-tuples. When `triggerindex` is present the
    /// scripts and interpreters are indirected through it.
    pub fn triggers(&self) -> Vec<Trigger> {
        let deps = self.deps("triggername", "triggerflags", "triggerversion");
        if deps.is_empty() {
            return Vec::new();
        }
        let scripts = self.header.get_str_array("triggerscripts").unwrap_or_default();
        let progs = self
            .header
            .get_str_array("triggerscriptprog")
            .unwrap_or_default();
        let index = self.header.get_u32_array("triggerindex");
        deps.into_iter()
            .enumerate()
            .map(|(k, dep)| {
                let slot = match &index {
                    Some(idx) => idx.get(k).map(|i| *i as usize).unwrap_or(k),
                    None => k,
                };
                Trigger {
                    name: dep.name,
                    flags: dep.flags,
                    version: dep.version,
                    prog: progs.get(slot).cloned().unwrap_or_default(),
                    script: scripts.get(slot).cloned().unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Render up to `num` changelog entries, stopping at entries not
    /// newer than `newer`.
    pub fn changelog(&self, num: Option<usize>, newer: Option<i64>) -> String {
        let Some(texts) = self.header.get_str_array("changelogtext") else {
            return String::new();
        };
        let names = self.header.get_str_array("changelogname").unwrap_or_default();
        let times = self
            .header
            .get_i32_array("changelogtime")
            .unwrap_or(&[])
            .to_vec();
        let num = num.unwrap_or(texts.len()).min(texts.len());
        let mut out = String::new();
        for i in 0..num {
            let time = times.get(i).copied().unwrap_or(0) as i64;
            if let Some(newer) = newer {
                if time <= newer {
                    break;
                }
            }
            let stamp = DateTime::from_timestamp(time, 0)
                .map(|t| t.format("%a %b %d %Y").to_string())
                .unwrap_or_default();
            let name = names.get(i).cloned().unwrap_or_default();
            out.push_str(&format!("* {} {}\n{}\n\n", stamp, name, texts[i]));
        }
        out
    }

    /// Whether this source package builds on `arch`, honouring the
    /// exclude and exclusive lists and noarch-only builds.
    pub fn build_on_arch(&self, arch: &str) -> BuildOn {
        if let Some(exclude) = self.header.get_str_array("excludearch") {
            if exclude.iter().any(|a| a == arch) {
                return BuildOn::No;
            }
        }
        if let Some(exclusive) = self.header.get_str_array("exclusivearch") {
            if !exclusive.iter().any(|a| a == arch) {
                return BuildOn::No;
            }
        }
        if self.header.get_str_array("buildarchs").as_deref() == Some(&["noarch".to_string()]) {
            return BuildOn::Noarch;
        }
        BuildOn::Normal
    }

    /// Copy signature data into the main-header install tags, the way
    /// records are written to the installed database.
    pub fn db_tags_from_sig(&mut self) {
        for (sig, hdr) in HEADER_MATCH {
            if self.header.get(hdr).is_none() {
                if let (Some(value), Some(info)) = (
                    self.signature.get(sig).cloned(),
                    crate::header::database_tags().by_name(hdr),
                ) {
                    self.header.insert(info.name, value);
                }
            }
        }
    }

    /// Rebuild signature tags from a database record's install tags.
    pub fn sig_from_db_tags(&mut self) {
        for (sig, hdr) in HEADER_MATCH {
            if self.signature.get(sig).is_none() {
                if let Some(value) = self.header.get(hdr) {
                    let value = value.clone();
                    if let Some(info) = crate::header::signature_tags().by_name(sig) {
                        self.signature.insert(info.name, value);
                    }
                }
            }
        }
    }

    /// Consistency checks over the decoded headers. Missing required tags
    /// abort with an error; everything else is reported as diagnostics.
    pub fn validate(&self, main_registry: &TagRegistry, sig_registry: &TagRegistry) -> Result<Vec<String>> {
        let label = self.label();
        for tag in MAIN_REQUIRED {
            if !self.header.contains(tag) {
                return Err(Error::consistency(&label, format!("hdr is missing: {}", tag)));
            }
        }
        if self.signature.raw().is_some() {
            for tag in SIG_REQUIRED {
                if !self.signature.contains(tag) {
                    return Err(Error::consistency(
                        &label,
                        format!("sig header is missing: {}", tag),
                    ));
                }
            }
        }

        let mut diags = Vec::new();
        diags.extend(self.header.region_diagnostics(main_registry));
        diags.extend(self.signature.region_diagnostics(sig_registry));
        diags.extend(self.header.entry_diagnostics(main_registry, self.is_source));
        diags.extend(self.signature.entry_diagnostics(sig_registry, self.is_source));

        // one of the two file list encodings, never both
        let has_old = self.header.contains("oldfilenames");
        let has_new = self.header.contains("basenames")
            || self.header.contains("dirnames")
            || self.header.contains("dirindexes");
        if has_old && has_new {
            diags.push("new filetag still present".to_string());
        }
        if let (Some(dirindexes), Some(dirnames)) = (
            self.header.get_u32_array("dirindexes"),
            self.header.get_str_array("dirnames"),
        ) {
            if dirindexes.iter().any(|di| *di as usize >= dirnames.len()) {
                diags.push("dirindexes out of range".to_string());
            }
        }

        // parallel file tags agree in length
        match self.file_infos() {
            Ok(files) => {
                for (i, f) in files.iter().enumerate() {
                    if f.flags.contains(FileFlags::EXCLUDE) {
                        diags.push("exclude flag set in rpm".to_string());
                    }
                    if f.flags.intersects(FileFlags::GHOST | FileFlags::EXCLUDE) {
                        continue;
                    }
                    if is_reg(f.mode) {
                        if f.digest.is_empty() && f.size != 0 {
                            diags.push(format!("missing filemd5sum, {}, {}", i, f.name));
                        }
                    } else if !f.digest.is_empty() {
                        diags.push(format!("non-regular file has filemd5sum: {}", f.name));
                    }
                }
            }
            Err(e) => diags.push(e.to_string()),
        }

        // dependency triple lengths
        for (n, f, v) in [
            ("providename", "provideflags", "provideversion"),
            ("requirename", "requireflags", "requireversion"),
            ("obsoletename", "obsoleteflags", "obsoleteversion"),
            ("conflictname", "conflictflags", "conflictversion"),
            ("triggername", "triggerflags", "triggerversion"),
        ] {
            diags.extend(self.dep_diagnostics(n, f, v));
        }

        // trigger scripts and interpreters pair up
        if let Some(scripts) = self.header.get_str_array("triggerscripts") {
            let progs = self
                .header
                .get_str_array("triggerscriptprog")
                .unwrap_or_default();
            if scripts.len() != progs.len() {
                diags.push("wrong trigger lengths".to_string());
            }
        }

        if self.is_source {
            if self.header.contains("sourcerpm") {
                diags.push("source rpm contains a sourcerpm tag".to_string());
            }
            if self.specfile_index().is_none() {
                diags.push("no specfile found in src.rpm".to_string());
            }
        } else if !self.header.contains("sourcerpm") {
            diags.push("binary rpm does not contain a sourcerpm tag".to_string());
        }

        let compressor = self.header.get_str("payloadcompressor");
        if !matches!(
            compressor.as_deref(),
            None | Some("gzip") | Some("bzip2") | Some("zstd") | Some("xz") | Some("lzma")
        ) {
            diags.push(format!(
                "no known compressor: {}",
                compressor.unwrap_or_default()
            ));
        }
        let format = self.header.get_str("payloadformat");
        if !matches!(format.as_deref(), None | Some("cpio") | Some("drpm")) {
            diags.push(format!(
                "wrong payload format {}",
                format.unwrap_or_default()
            ));
        }

        Ok(diags)
    }

    fn dep_diagnostics(&self, name_tag: &str, flag_tag: &str, version_tag: &str) -> Vec<String> {
        let mut out = Vec::new();
        let names = self.header.get_str_array(name_tag);
        let flags = self.header.get_u32_array(flag_tag);
        let versions = self.header.get_str_array(version_tag);
        match names {
            None => {
                if flags.is_some() || versions.is_some() {
                    out.push(format!("wrong dep data for {}", name_tag));
                }
            }
            Some(names) => {
                if flags.is_some() != versions.is_some() {
                    out.push(format!("wrong dep data for {}", name_tag));
                }
                let lf = flags.map(|f| f.len()).unwrap_or(names.len());
                let lv = versions.map(|v| v.len()).unwrap_or(names.len());
                if names.len() != lf || lf != lv {
                    out.push(format!("wrong length of deps for {}", name_tag));
                }
            }
        }
        out
    }

    /// Index of the specfile in a source package's file list.
    pub fn specfile_index(&self) -> Option<usize> {
        if let Some(flags) = self.header.get_u32_array("fileflags") {
            if let Some(i) = flags
                .iter()
                .position(|f| FileFlags::from_bits_retain(*f).contains(FileFlags::SPECFILE))
            {
                return Some(i);
            }
        }
        self.filenames().iter().position(|f| f.ends_with(".spec"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Value;

    pub(crate) fn minimal_package(name: &str, version: &str, release: &str) -> Package {
        let mut hdr = Header::new();
        hdr.insert("name", Value::Str(name.as_bytes().to_vec()));
        hdr.insert("version", Value::Str(version.as_bytes().to_vec()));
        hdr.insert("release", Value::Str(release.as_bytes().to_vec()));
        hdr.insert("arch", Value::Str(b"i386".to_vec()));
        hdr.insert("rpmversion", Value::Str(b"4.3.3".to_vec()));
        hdr.insert("sourcerpm", Value::Str(b"x.src.rpm".to_vec()));
        Package::new(hdr, Header::new(), false)
    }

    #[test]
    fn test_identity_strings() {
        let mut pkg = minimal_package("bash", "3.0", "31");
        assert_eq!(pkg.nvr(), "bash-3.0-31");
        assert_eq!(pkg.nvra(), "bash-3.0-31.i386");
        assert_eq!(pkg.epoch(), "0");
        assert_eq!(pkg.evr(), "3.0-31");
        assert_eq!(pkg.nevra(), "bash-3.0-31.i386");

        pkg.header.insert("epoch", Value::Uint32(vec![2]));
        assert_eq!(pkg.epoch(), "2");
        assert_eq!(pkg.evr(), "2:3.0-31");
        assert_eq!(pkg.nevra(), "bash-2:3.0-31.i386");
    }

    #[test]
    fn test_source_arch() {
        let mut pkg = minimal_package("bash", "3.0", "31");
        pkg.is_source = true;
        assert_eq!(pkg.arch(), "src");
    }

    #[test]
    fn test_file_assembly() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.header.insert(
            "dirnames",
            Value::StrArray(vec![b"/usr/bin/".to_vec(), b"/etc/".to_vec()]),
        );
        pkg.header
            .insert("dirindexes", Value::Uint32(vec![0, 0, 1]));
        pkg.header.insert(
            "basenames",
            Value::StrArray(vec![b"ls".to_vec(), b"cat".to_vec(), b"motd".to_vec()]),
        );
        assert_eq!(
            pkg.filenames(),
            vec!["/usr/bin/ls", "/usr/bin/cat", "/etc/motd"]
        );
    }

    #[test]
    fn test_oldfilenames_win() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.header.insert(
            "oldfilenames",
            Value::StrArray(vec![b"/sbin/init".to_vec()]),
        );
        assert_eq!(pkg.filenames(), vec!["/sbin/init"]);
    }

    #[test]
    fn test_self_provide() {
        let mut pkg = minimal_package("bash", "3.0", "31");
        pkg.header.insert(
            "providename",
            Value::StrArray(vec![b"/bin/sh".to_vec()]),
        );
        pkg.header.insert("provideflags", Value::Uint32(vec![0]));
        pkg.header
            .insert("provideversion", Value::StrArray(vec![b"".to_vec()]));
        let provs = pkg.provides();
        assert_eq!(provs.len(), 2);
        assert_eq!(provs[0], Dependency::new("/bin/sh", SenseFlags::empty(), ""));
        assert_eq!(
            provs[1],
            Dependency::new("bash", SenseFlags::EQUAL, "3.0-31")
        );

        pkg.is_source = true;
        assert_eq!(pkg.provides().len(), 1);
    }

    #[test]
    fn test_triggers_with_index() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.header.insert(
            "triggername",
            Value::StrArray(vec![b"a".to_vec(), b"b".to_vec()]),
        );
        pkg.header.insert(
            "triggerflags",
            Value::Uint32(vec![
                (SenseFlags::TRIGGER_IN | SenseFlags::EQUAL).bits(),
                SenseFlags::TRIGGER_UN.bits(),
            ]),
        );
        pkg.header.insert(
            "triggerversion",
            Value::StrArray(vec![b"1.0".to_vec(), b"".to_vec()]),
        );
        pkg.header.insert(
            "triggerscripts",
            Value::StrArray(vec![b"echo shared".to_vec()]),
        );
        pkg.header.insert(
            "triggerscriptprog",
            Value::StrArray(vec![b"/bin/sh".to_vec()]),
        );
        pkg.header.insert("triggerindex", Value::Uint32(vec![0, 0]));
        let triggers = pkg.triggers();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].name, "a");
        assert_eq!(triggers[0].script, "echo shared");
        assert_eq!(triggers[1].name, "b");
        assert_eq!(triggers[1].script, "echo shared");
        assert!(triggers[0].flags.contains(SenseFlags::TRIGGER_IN));
    }

    #[test]
    fn test_build_on_arch() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.header.insert(
            "excludearch",
            Value::StrArray(vec![b"ppc".to_vec()]),
        );
        assert_eq!(pkg.build_on_arch("ppc"), BuildOn::No);
        assert_eq!(pkg.build_on_arch("i386"), BuildOn::Normal);

        pkg.header.insert(
            "exclusivearch",
            Value::StrArray(vec![b"i386".to_vec(), b"x86_64".to_vec()]),
        );
        assert_eq!(pkg.build_on_arch("x86_64"), BuildOn::Normal);
        assert_eq!(pkg.build_on_arch("s390"), BuildOn::No);

        pkg.header
            .insert("buildarchs", Value::StrArray(vec![b"noarch".to_vec()]));
        assert_eq!(pkg.build_on_arch("i386"), BuildOn::Noarch);
    }

    #[test]
    fn test_changelog_rendering() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.header.insert(
            "changelogtime",
            Value::Int32(vec![1_100_000_000, 1_000_000_000]),
        );
        pkg.header.insert(
            "changelogname",
            Value::StrArray(vec![b"A <a@x> - 2".to_vec(), b"B <b@x> - 1".to_vec()]),
        );
        pkg.header.insert(
            "changelogtext",
            Value::StrArray(vec![b"- newer".to_vec(), b"- older".to_vec()]),
        );
        let full = pkg.changelog(None, None);
        assert!(full.contains("- newer"));
        assert!(full.contains("- older"));
        assert!(full.starts_with("* "));

        let only_first = pkg.changelog(Some(1), None);
        assert!(only_first.contains("- newer"));
        assert!(!only_first.contains("- older"));

        let since = pkg.changelog(None, Some(1_050_000_000));
        assert!(since.contains("- newer"));
        assert!(!since.contains("- older"));
    }

    #[test]
    fn test_file_infos_rejects_short_tags() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.header
            .insert("dirnames", Value::StrArray(vec![b"/usr/bin/".to_vec()]));
        pkg.header
            .insert("dirindexes", Value::Uint32(vec![0, 0]));
        pkg.header.insert(
            "basenames",
            Value::StrArray(vec![b"ls".to_vec(), b"cat".to_vec()]),
        );
        // one entry short
        pkg.header
            .insert("fileusername", Value::StrArray(vec![b"root".to_vec()]));
        let err = pkg.file_infos();
        assert!(matches!(err, Err(Error::Consistency(_))));
    }

    #[test]
    fn test_validate_requires_name() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.header.remove("name");
        let err = pkg.validate(crate::header::main_tags(), crate::header::signature_tags());
        assert!(matches!(err, Err(Error::Consistency(_))));
    }

    #[test]
    fn test_validate_dep_lengths() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.header.insert(
            "requirename",
            Value::StrArray(vec![b"a".to_vec(), b"b".to_vec()]),
        );
        pkg.header.insert("requireflags", Value::Uint32(vec![0]));
        pkg.header
            .insert("requireversion", Value::StrArray(vec![b"".to_vec()]));
        let diags = pkg
            .validate(crate::header::main_tags(), crate::header::signature_tags())
            .unwrap();
        assert!(diags.iter().any(|d| d.contains("wrong length of deps")));
    }

    #[test]
    fn test_sig_transfer_roundtrip() {
        let mut pkg = minimal_package("demo", "1", "1");
        pkg.signature
            .insert("md5", Value::Bin(vec![7_u8; 16]));
        pkg.signature
            .insert("sha1header", Value::Str(b"abcd".to_vec()));
        pkg.db_tags_from_sig();
        assert_eq!(pkg.header.get_bin("install_md5").unwrap(), &[7_u8; 16]);
        assert_eq!(pkg.header.get_str("install_sha1header").unwrap(), "abcd");

        let mut restored = Package::new(Header::new(), Header::new(), false);
        std::mem::swap(&mut restored.header, &mut pkg.header);
        restored.sig_from_db_tags();
        assert_eq!(restored.signature.get_bin("md5").unwrap(), &[7_u8; 16]);
        assert_eq!(
            restored.signature.get_str("sha1header").unwrap(),
            "abcd"
        );
    }
}
