use std::collections::HashMap;

/// Compatible architectures per machine, best match first.
static ARCH_COMPATS: &[(&str, &[&str])] = &[
    ("athlon", &["i686", "i586", "i486", "i386"]),
    ("i686", &["i586", "i486", "i386"]),
    ("i586", &["i486", "i386"]),
    ("i486", &["i386"]),
    ("x86_64", &["amd64", "athlon", "i686", "i586", "i486", "i386"]),
    ("amd64", &["x86_64", "athlon", "i686", "i586", "i486", "i386"]),
    ("ia32e", &["x86_64", "athlon", "i686", "i586", "i486", "i386"]),
    ("ia64", &["i686", "i586", "i486", "i386"]),
    (
        "alphaev67",
        &["alphaev6", "alphapca56", "alphaev56", "alphaev5", "alpha", "axp"],
    ),
    (
        "alphaev6",
        &["alphapca56", "alphaev56", "alphaev5", "alpha", "axp"],
    ),
    ("alphapca56", &["alphaev56", "alphaev5", "alpha", "axp"]),
    ("alphaev56", &["alphaev5", "alpha", "axp"]),
    ("alphaev5", &["alpha", "axp"]),
    ("alpha", &["axp"]),
    ("osfmach3_ppc", &["ppc", "rs6000"]),
    ("powerpc", &["ppc", "rs6000"]),
    ("powerppc", &["ppc", "rs6000"]),
    ("ppc8260", &["ppc", "rs6000"]),
    ("ppc8560", &["ppc", "rs6000"]),
    ("ppc32dy4", &["ppc", "rs6000"]),
    ("ppciseries", &["ppc", "rs6000"]),
    ("ppcpseries", &["ppc", "rs6000"]),
    ("ppc64", &["ppc", "rs6000"]),
    ("ppc", &["rs6000"]),
    ("ppc64pseries", &["ppc64", "ppc", "rs6000"]),
    ("ppc64iseries", &["ppc64", "ppc", "rs6000"]),
    ("sun4c", &["sparc"]),
    ("sun4d", &["sparc"]),
    ("sun4m", &["sparc"]),
    ("sun4u", &["sparc64", "sparcv9", "sparc"]),
    ("sparc64", &["sparcv9", "sparc"]),
    ("sparcv9", &["sparc"]),
    ("sparcv8", &["sparc"]),
    ("hppa2.0", &["hppa1.2", "hppa1.1", "hppa1.0", "parisc"]),
    ("hppa1.2", &["hppa1.1", "hppa1.0", "parisc"]),
    ("hppa1.1", &["hppa1.0", "parisc"]),
    ("hppa1.0", &["parisc"]),
    ("armv4l", &["armv3l"]),
    ("atarist", &["m68kmint"]),
    ("atariste", &["m68kmint"]),
    ("ataritt", &["m68kmint"]),
    ("falcon", &["m68kmint"]),
    ("atariclone", &["m68kmint"]),
    ("milan", &["m68kmint"]),
    ("hades", &["m68kmint"]),
    ("s390x", &["s390"]),
];

/// Multilib build-target translations.
static BUILD_ARCH_TRANSLATE: &[(&str, &str)] = &[
    ("osfmach3_i686", "i386"),
    ("osfmach3_i586", "i386"),
    ("osfmach3_i486", "i386"),
    ("osfmach3_i386", "i386"),
    ("athlon", "i386"),
    ("pentium4", "i386"),
    ("pentium3", "i386"),
    ("i686", "i386"),
    ("i586", "i386"),
    ("i486", "i386"),
    ("alphaev5", "alpha"),
    ("alphaev56", "alpha"),
    ("alphapca56", "alpha"),
    ("alphaev6", "alpha"),
    ("alphaev67", "alpha"),
    ("sun4c", "sparc"),
    ("sun4d", "sparc"),
    ("sun4m", "sparc"),
    ("sparcv8", "sparc"),
    ("sparcv9", "sparc"),
    ("sun4u", "sparc64"),
    ("osfmach3_ppc", "ppc"),
    ("powerpc", "ppc"),
    ("powerppc", "ppc"),
    ("ppc8260", "ppc"),
    ("ppc8560", "ppc"),
    ("ppc32dy4", "ppc"),
    ("ppciseries", "ppc"),
    ("ppcpseries", "ppc"),
    ("ppc64pseries", "ppc64"),
    ("ppc64iseries", "ppc64"),
    ("atarist", "m68kmint"),
    ("atariste", "m68kmint"),
    ("ataritt", "m68kmint"),
    ("falcon", "m68kmint"),
    ("atariclone", "m68kmint"),
    ("milan", "m68kmint"),
    ("hades", "m68kmint"),
    ("amd64", "x86_64"),
    ("ia32e", "x86_64"),
];

pub const INCOMPATIBLE: u32 = 999;

fn compats(arch: &str) -> &'static [&'static str] {
    ARCH_COMPATS
        .iter()
        .find(|(a, _)| *a == arch)
        .map(|(_, c)| *c)
        .unwrap_or(&[])
}

pub fn build_arch_translate(arch: &str) -> &str {
    BUILD_ARCH_TRANSLATE
        .iter()
        .find(|(a, _)| *a == arch)
        .map(|(_, t)| *t)
        .unwrap_or(arch)
}

/// Distance between a package arch and the machine arch: 0 for noarch,
/// 1 for an exact match, position in the compatibility list plus 2
/// otherwise, and a very large value for incompatible pairs.
pub fn machine_distance(package_arch: &str, machine: &str) -> u32 {
    if package_arch == "noarch" {
        return 0;
    }
    if package_arch == machine {
        return 1;
    }
    match compats(machine).iter().position(|a| *a == package_arch) {
        Some(i) => i as u32 + 2,
        None => INCOMPATIBLE,
    }
}

/// Precomputed distances for every arch compatible with `machine`.
pub fn machine_distances(machine: &str) -> HashMap<&'static str, u32> {
    let mut out = HashMap::new();
    for a in compats(machine) {
        out.insert(*a, machine_distance(a, machine));
    }
    out.insert("noarch", 0);
    if let Some((a, _)) = ARCH_COMPATS.iter().find(|(a, _)| *a == machine) {
        out.insert(*a, 1);
    }
    out
}
