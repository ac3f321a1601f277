use bitflags::bitflags;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::index::Type;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TagFlags: u8 {
        /// Not emitted by current rpm versions anymore.
        const LEGACY   = 1;
        /// Only valid in source packages.
        const SRC_ONLY = 2;
        /// Only valid in binary packages.
        const BIN_ONLY = 4;
        /// RPM_INT32 data decodes as signed integers.
        const SIGNED   = 8;
        /// Database-only second occurrence of another tag id.
        const ALIAS    = 16;
    }
}

/// One recognized tag: numeric id, registry type, count constraint and
/// flag bits. The registry type may be the synthetic `ArgString` or
/// `Group`, which resolve to a concrete wire type per stored value.
#[derive(Debug, Clone, Copy)]
pub struct TagInfo {
    pub name: &'static str,
    pub id: u32,
    pub ttype: Type,
    pub count: Option<u32>,
    pub flags: TagFlags,
}

const fn tag(
    name: &'static str,
    id: u32,
    ttype: Type,
    count: Option<u32>,
    flags: TagFlags,
) -> TagInfo {
    TagInfo {
        name,
        id,
        ttype,
        count,
        flags,
    }
}

const NONE: TagFlags = TagFlags::empty();
const LEGACY: TagFlags = TagFlags::LEGACY;
const SRC: TagFlags = TagFlags::SRC_ONLY;
const BIN: TagFlags = TagFlags::BIN_ONLY;
const SIGNED: TagFlags = TagFlags::SIGNED;
const LEGACY_BIN: TagFlags = TagFlags::LEGACY.union(TagFlags::BIN_ONLY);
const ALIAS: TagFlags = TagFlags::ALIAS;

/// Tags of the main header.
static MAIN_TAGS: &[TagInfo] = &[
    // basic info
    tag("name", 1000, Type::String, None, NONE),
    tag("epoch", 1003, Type::Int32, Some(1), NONE),
    tag("version", 1001, Type::String, None, NONE),
    tag("release", 1002, Type::String, None, NONE),
    tag("arch", 1022, Type::String, None, NONE),
    // dependencies: provides, requires, obsoletes, conflicts
    tag("providename", 1047, Type::StringArray, None, NONE),
    tag("provideflags", 1112, Type::Int32, None, NONE),
    tag("provideversion", 1113, Type::StringArray, None, NONE),
    tag("requirename", 1049, Type::StringArray, None, NONE),
    tag("requireflags", 1048, Type::Int32, None, NONE),
    tag("requireversion", 1050, Type::StringArray, None, NONE),
    tag("obsoletename", 1090, Type::StringArray, None, BIN),
    tag("obsoleteflags", 1114, Type::Int32, None, BIN),
    tag("obsoleteversion", 1115, Type::StringArray, None, BIN),
    tag("conflictname", 1054, Type::StringArray, None, NONE),
    tag("conflictflags", 1053, Type::Int32, None, NONE),
    tag("conflictversion", 1055, Type::StringArray, None, NONE),
    // triggers
    tag("triggername", 1066, Type::StringArray, None, BIN),
    tag("triggerflags", 1068, Type::Int32, None, BIN),
    tag("triggerversion", 1067, Type::StringArray, None, BIN),
    tag("triggerscripts", 1065, Type::StringArray, None, BIN),
    tag("triggerscriptprog", 1092, Type::StringArray, None, BIN),
    tag("triggerindex", 1069, Type::Int32, None, BIN),
    // scripts
    tag("prein", 1023, Type::String, None, BIN),
    tag("preinprog", 1085, Type::ArgString, None, BIN),
    tag("postin", 1024, Type::String, None, BIN),
    tag("postinprog", 1086, Type::ArgString, None, BIN),
    tag("preun", 1025, Type::String, None, BIN),
    tag("preunprog", 1087, Type::ArgString, None, BIN),
    tag("postun", 1026, Type::String, None, BIN),
    tag("postunprog", 1088, Type::ArgString, None, BIN),
    tag("verifyscript", 1079, Type::String, None, BIN),
    tag("verifyscriptprog", 1091, Type::ArgString, None, BIN),
    // addon information
    tag("rpmversion", 1064, Type::String, None, NONE),
    tag("payloadformat", 1124, Type::String, None, NONE),
    tag("payloadcompressor", 1125, Type::String, None, NONE),
    tag("i18ntable", 100, Type::StringArray, None, NONE),
    tag("summary", 1004, Type::I18nString, None, NONE),
    tag("description", 1005, Type::I18nString, None, NONE),
    tag("url", 1020, Type::String, None, NONE),
    tag("license", 1014, Type::String, None, NONE),
    tag("sourcerpm", 1044, Type::String, None, BIN),
    tag("changelogtime", 1080, Type::Int32, None, SIGNED),
    tag("changelogname", 1081, Type::StringArray, None, NONE),
    tag("changelogtext", 1082, Type::StringArray, None, NONE),
    tag("prefixes", 1098, Type::StringArray, None, BIN),
    tag("optflags", 1122, Type::String, None, BIN),
    tag("pubkeys", 266, Type::StringArray, None, BIN),
    tag("sourcepkgid", 1146, Type::Bin, Some(16), BIN),
    tag("immutable", 63, Type::Bin, Some(16), NONE),
    // less important information
    tag("buildtime", 1006, Type::Int32, Some(1), SIGNED),
    tag("buildhost", 1007, Type::String, None, NONE),
    tag("cookie", 1094, Type::String, None, NONE),
    tag("group", 1016, Type::Group, None, NONE),
    tag("size", 1009, Type::Int32, Some(1), NONE),
    tag("distribution", 1010, Type::String, None, NONE),
    tag("vendor", 1011, Type::String, None, NONE),
    tag("packager", 1015, Type::String, None, NONE),
    tag("os", 1021, Type::String, None, NONE),
    tag("payloadflags", 1126, Type::String, None, NONE),
    tag("rhnplatform", 1131, Type::String, None, BIN),
    tag("platform", 1132, Type::String, None, NONE),
    // source packages
    tag("source", 1018, Type::StringArray, None, SRC),
    tag("patch", 1019, Type::StringArray, None, SRC),
    tag("buildarchs", 1089, Type::StringArray, None, SRC),
    tag("excludearch", 1059, Type::StringArray, None, SRC),
    tag("exclusivearch", 1061, Type::StringArray, None, SRC),
    tag("exclusiveos", 1062, Type::StringArray, None, SRC),
    // information about files
    tag("dirindexes", 1116, Type::Int32, None, NONE),
    tag("dirnames", 1118, Type::StringArray, None, NONE),
    tag("basenames", 1117, Type::StringArray, None, NONE),
    tag("fileusername", 1039, Type::StringArray, None, NONE),
    tag("filegroupname", 1040, Type::StringArray, None, NONE),
    tag("filemodes", 1030, Type::Int16, None, NONE),
    tag("filemtimes", 1034, Type::Int32, None, SIGNED),
    tag("filedevices", 1095, Type::Int32, None, NONE),
    tag("fileinodes", 1096, Type::Int32, None, NONE),
    tag("filesizes", 1028, Type::Int32, None, NONE),
    tag("filemd5s", 1035, Type::StringArray, None, NONE),
    tag("filerdevs", 1033, Type::Int16, None, NONE),
    tag("filelinktos", 1036, Type::StringArray, None, NONE),
    tag("fileflags", 1037, Type::Int32, None, NONE),
    tag("fileverifyflags", 1045, Type::Int32, None, NONE),
    tag("filelangs", 1097, Type::StringArray, None, NONE),
    tag("filecolors", 1140, Type::Int32, None, NONE),
    tag("fileclass", 1141, Type::Int32, None, NONE),
    tag("filedependsx", 1143, Type::Int32, None, NONE),
    tag("filedependsn", 1144, Type::Int32, None, NONE),
    tag("classdict", 1142, Type::StringArray, None, NONE),
    tag("dependsdict", 1145, Type::Int32, None, NONE),
    tag("policies", 1150, Type::StringArray, None, NONE),
    tag("filecontexts", 1147, Type::StringArray, None, NONE),
    // tags not in current distribution trees anymore
    tag("capability", 1105, Type::Int32, None, LEGACY),
    tag("xpm", 1013, Type::Bin, None, LEGACY),
    tag("gif", 1012, Type::Bin, None, LEGACY),
    tag("verifyscript2", 15, Type::String, None, LEGACY),
    tag("nosource", 1051, Type::Int32, None, LEGACY),
    tag("nopatch", 1052, Type::Int32, None, LEGACY),
    tag("disturl", 1123, Type::String, None, LEGACY),
    tag("oldfilenames", 1027, Type::StringArray, None, LEGACY),
    tag("triggerin", 1100, Type::String, None, LEGACY_BIN),
    tag("triggerun", 1101, Type::String, None, LEGACY_BIN),
    tag("triggerpostun", 1102, Type::String, None, LEGACY_BIN),
    tag("archivesize", 1046, Type::Int32, Some(1), LEGACY),
];

/// Additional tags found only in the installed-package database. Several
/// carry data copied over from the signature header, which the database
/// does not store separately.
static DB_EXTRA_TAGS: &[TagInfo] = &[
    tag("origdirindexes", 1119, Type::Int32, None, LEGACY),
    tag("origdirnames", 1121, Type::StringArray, None, LEGACY),
    tag("origbasenames", 1120, Type::StringArray, None, LEGACY),
    tag("install_size_in_sig", 257, Type::Int32, Some(1), NONE),
    tag("install_md5", 261, Type::Bin, Some(16), NONE),
    tag("install_gpg", 262, Type::Bin, None, NONE),
    tag("install_dsaheader", 267, Type::Bin, Some(16), NONE),
    tag("install_sha1header", 269, Type::String, None, NONE),
    tag("installtime", 1008, Type::Int32, Some(1), SIGNED),
    tag("filestates", 1029, Type::Char, None, NONE),
    tag("instprefixes", 1099, Type::StringArray, None, NONE),
    tag("installcolor", 1127, Type::Int32, None, NONE),
    tag("installtid", 1128, Type::Int32, None, NONE),
    tag("install_badsha1_1", 264, Type::String, None, LEGACY),
    tag("install_badsha1_2", 265, Type::String, None, LEGACY),
    tag("immutable1", 61, Type::Bin, Some(16), LEGACY),
    // second occurrences written for relocated or multilib-compat packages
    tag("dirindexes2", 1116, Type::Int32, None, ALIAS),
    tag("dirnames2", 1118, Type::StringArray, None, ALIAS),
    tag("basenames2", 1117, Type::StringArray, None, ALIAS),
];

/// Tags of the signature header.
static SIG_TAGS: &[TagInfo] = &[
    tag("dsaheader", 267, Type::Bin, None, NONE),
    tag("gpg", 1005, Type::Bin, None, NONE),
    tag("header_signatures", 62, Type::Bin, Some(16), NONE),
    tag("payloadsize", 1007, Type::Int32, Some(1), NONE),
    tag("size_in_sig", 1000, Type::Int32, Some(1), NONE),
    tag("sha1header", 269, Type::String, None, NONE),
    tag("md5", 1004, Type::Bin, Some(16), NONE),
    // legacy entries in older packages
    tag("pgp", 1002, Type::Bin, None, LEGACY),
    tag("badsha1_1", 264, Type::String, None, LEGACY),
    tag("badsha1_2", 265, Type::String, None, LEGACY),
];

/// Alias pairs used by the installed-database duplicate-tag policy: a
/// second occurrence of the left name binds to the right name.
pub static ALIAS_PAIRS: &[(&str, &str)] = &[
    ("dirindexes", "dirindexes2"),
    ("dirnames", "dirnames2"),
    ("basenames", "basenames2"),
];

/// How signature-header data maps onto main-header tags when a package is
/// imported into or exported from the installed database.
pub static HEADER_MATCH: &[(&str, &str)] = &[
    ("dsaheader", "install_dsaheader"),
    ("md5", "install_md5"),
    ("gpg", "install_gpg"),
    ("sha1header", "install_sha1header"),
    ("size_in_sig", "install_size_in_sig"),
    ("badsha1_1", "install_badsha1_1"),
    ("badsha1_2", "install_badsha1_2"),
    ("payloadsize", "archivesize"),
];

pub static MAIN_REQUIRED: &[&str] = &["name", "version", "release", "arch", "rpmversion"];
pub static SIG_REQUIRED: &[&str] = &["md5"];

/// A resolved registry: lookup by id and by name, the set of install-only
/// tags, and the region-marker tag for this header kind.
pub struct TagRegistry {
    by_id: HashMap<u32, &'static TagInfo>,
    by_name: HashMap<&'static str, &'static TagInfo>,
    install_only: HashSet<&'static str>,
    region: &'static str,
    required: &'static [&'static str],
}

impl TagRegistry {
    fn build(
        tables: &[&'static [TagInfo]],
        install_only: &[&'static [TagInfo]],
        region: &'static str,
        required: &'static [&'static str],
    ) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for table in tables {
            for info in table.iter() {
                // alias entries share their id with the primary tag
                if !info.flags.contains(TagFlags::ALIAS) {
                    by_id.insert(info.id, info);
                }
                by_name.insert(info.name, info);
            }
        }
        let install_only = install_only
            .iter()
            .flat_map(|t| t.iter().map(|i| i.name))
            .collect();
        TagRegistry {
            by_id,
            by_name,
            install_only,
            region,
            required,
        }
    }

    pub fn by_id(&self, id: u32) -> Option<&'static TagInfo> {
        self.by_id.get(&id).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&'static TagInfo> {
        self.by_name.get(name).copied()
    }

    pub fn is_install_only(&self, name: &str) -> bool {
        self.install_only.contains(name)
    }

    /// Base set of install-only tag names; callers may extend a copy for
    /// version-specific emit quirks.
    pub fn install_keys(&self) -> HashSet<&'static str> {
        self.install_only.clone()
    }

    pub fn region(&self) -> &'static str {
        self.region
    }

    pub fn required(&self) -> &'static [&'static str] {
        self.required
    }
}

/// Registry for main headers of package files.
pub fn main_tags() -> &'static TagRegistry {
    static REG: OnceLock<TagRegistry> = OnceLock::new();
    REG.get_or_init(|| TagRegistry::build(&[MAIN_TAGS], &[], "immutable", MAIN_REQUIRED))
}

/// Registry for signature headers.
pub fn signature_tags() -> &'static TagRegistry {
    static REG: OnceLock<TagRegistry> = OnceLock::new();
    REG.get_or_init(|| TagRegistry::build(&[SIG_TAGS], &[], "header_signatures", SIG_REQUIRED))
}

/// Registry for records of the installed-package database: all main tags
/// plus the install-only tags and the duplicate aliases.
pub fn database_tags() -> &'static TagRegistry {
    static REG: OnceLock<TagRegistry> = OnceLock::new();
    REG.get_or_init(|| {
        TagRegistry::build(
            &[MAIN_TAGS, DB_EXTRA_TAGS],
            &[DB_EXTRA_TAGS],
            "immutable",
            MAIN_REQUIRED,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_lookup() {
        let reg = main_tags();
        let name = reg.by_id(1000).unwrap();
        assert_eq!(name.name, "name");
        assert_eq!(name.ttype, Type::String);
        let epoch = reg.by_name("epoch").unwrap();
        assert_eq!(epoch.id, 1003);
        assert_eq!(epoch.count, Some(1));
        assert!(reg.by_id(9999).is_none());
    }

    #[test]
    fn test_signed_flag() {
        let reg = main_tags();
        assert!(reg.by_name("filemtimes").unwrap().flags.contains(TagFlags::SIGNED));
        assert!(reg.by_name("buildtime").unwrap().flags.contains(TagFlags::SIGNED));
        assert!(!reg.by_name("filesizes").unwrap().flags.contains(TagFlags::SIGNED));
    }

    #[test]
    fn test_database_aliases() {
        let reg = database_tags();
        // id lookup resolves to the primary tag, never the alias
        assert_eq!(reg.by_id(1116).unwrap().name, "dirindexes");
        assert!(reg.by_name("dirindexes2").is_some());
        assert!(reg.is_install_only("installtid"));
        assert!(reg.is_install_only("basenames2"));
        assert!(!reg.is_install_only("basenames"));
    }

    #[test]
    fn test_signature_registry() {
        let reg = signature_tags();
        assert_eq!(reg.by_id(1004).unwrap().name, "md5");
        assert_eq!(reg.by_id(269).unwrap().name, "sha1header");
        assert_eq!(reg.region(), "header_signatures");
    }
}
