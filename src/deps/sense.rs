use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Flag word attached to every provide/require/obsolete/conflict and
    /// trigger entry. The low nibble carries the comparison sense, the
    /// rest marks which scriptlet or generator the dependency belongs to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SenseFlags: u32 {
        const SERIAL         = 1 << 0;
        const LESS           = 1 << 1;
        const GREATER        = 1 << 2;
        const EQUAL          = 1 << 3;
        const PREREQ         = 1 << 6;
        const INTERP         = 1 << 8;
        const SCRIPT_PRE     = (1 << 9) | Self::PREREQ.bits();
        const SCRIPT_POST    = (1 << 10) | Self::PREREQ.bits();
        const SCRIPT_PREUN   = (1 << 11) | Self::PREREQ.bits();
        const SCRIPT_POSTUN  = (1 << 12) | Self::PREREQ.bits();
        const SCRIPT_VERIFY  = 1 << 13;
        const FIND_REQUIRES  = 1 << 14;
        const FIND_PROVIDES  = 1 << 15;
        const TRIGGER_IN     = 1 << 16;
        const TRIGGER_UN     = 1 << 17;
        const TRIGGER_POSTUN = 1 << 18;
        const MISSINGOK      = 1 << 19;
        const RPMLIB         = (1 << 24) | Self::PREREQ.bits();
        const TRIGGER_PREIN  = 1 << 25;
        const KEYRING        = 1 << 26;
        const _ = !0;
    }
}

bitflags! {
    /// Per-file attribute bits from the `fileflags` tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileFlags: u32 {
        const CONFIG    = 1 << 0;
        const DOC       = 1 << 1;
        const ICON      = 1 << 2;
        const MISSINGOK = 1 << 3;
        const NOREPLACE = 1 << 4;
        const SPECFILE  = 1 << 5;
        const GHOST     = 1 << 6;
        const LICENSE   = 1 << 7;
        const README    = 1 << 8;
        const EXCLUDE   = 1 << 9;
        const PUBKEY    = 1 << 11;
        const POLICY    = 1 << 12;
        const _ = !0;
    }
}

impl SenseFlags {
    pub const SENSEMASK: SenseFlags = SenseFlags::SERIAL
        .union(SenseFlags::LESS)
        .union(SenseFlags::GREATER)
        .union(SenseFlags::EQUAL);

    const ALL_REQUIRES_MASK: SenseFlags = SenseFlags::INTERP
        .union(SenseFlags::SCRIPT_PRE)
        .union(SenseFlags::SCRIPT_POST)
        .union(SenseFlags::SCRIPT_PREUN)
        .union(SenseFlags::SCRIPT_POSTUN)
        .union(SenseFlags::SCRIPT_VERIFY)
        .union(SenseFlags::FIND_REQUIRES)
        .union(SenseFlags::RPMLIB)
        .union(SenseFlags::KEYRING);

    /// Scriptlet bits that force ordering during install: %pre, %post,
    /// rpmlib() and keyring dependencies, with the bare PREREQ bit masked
    /// out.
    const INSTALL_ONLY_MASK: SenseFlags = SenseFlags::SCRIPT_PRE
        .union(SenseFlags::SCRIPT_POST)
        .union(SenseFlags::RPMLIB)
        .union(SenseFlags::KEYRING)
        .difference(SenseFlags::PREREQ);

    /// Scriptlet bits that force ordering during erase: %preun, %postun,
    /// with the bare PREREQ bit masked out.
    const ERASE_ONLY_MASK: SenseFlags = SenseFlags::SCRIPT_PREUN
        .union(SenseFlags::SCRIPT_POSTUN)
        .difference(SenseFlags::PREREQ);

    /// Only the legacy PREREQ bit and no other requires-mask bit.
    pub fn is_legacy_prereq(self) -> bool {
        self.intersection(Self::ALL_REQUIRES_MASK) == SenseFlags::PREREQ
    }

    pub fn is_install_prereq(self) -> bool {
        self.intersects(Self::INSTALL_ONLY_MASK)
    }

    pub fn is_erase_prereq(self) -> bool {
        self.intersects(Self::ERASE_ONLY_MASK)
    }

    /// Render the comparison operator the way dependency diagnostics do.
    pub fn sense_str(self) -> &'static str {
        let l = self.contains(SenseFlags::LESS);
        let g = self.contains(SenseFlags::GREATER);
        let e = self.contains(SenseFlags::EQUAL);
        match (l, g, e) {
            (true, false, true) => "<=",
            (false, true, true) => ">=",
            (true, false, false) => "<",
            (false, true, false) => ">",
            (false, false, true) => "=",
            _ => "",
        }
    }
}

/// Operation kind carried through ordering and execution planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Install,
    Update,
    Erase,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Install => write!(f, "install"),
            Op::Update => write!(f, "update"),
            Op::Erase => write!(f, "erase"),
        }
    }
}

bitflags! {
    /// Hardness of one arc in the ordering graph. An empty value is a
    /// soft arc that may be dropped to break a loop; HARD arcs are only
    /// dropped as a last resort; VIRTUAL marks synthetic arcs added to
    /// preserve transitive order when a real arc was removed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ArcFlags: u8 {
        const HARD    = 1;
        const VIRTUAL = 2;
    }
}

/// Translate a requirement flag word into the hardness of its ordering
/// arc for the given operation.
pub fn operation_flag(flags: SenseFlags, op: Op) -> ArcFlags {
    let erase = op == Op::Erase;
    if flags.is_legacy_prereq()
        || (erase && flags.is_erase_prereq())
        || (!erase && flags.is_install_prereq())
    {
        ArcFlags::HARD
    } else {
        ArcFlags::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_match_wire_layout() {
        assert_eq!(SenseFlags::SCRIPT_PRE.bits(), (1 << 9) | (1 << 6));
        assert_eq!(SenseFlags::RPMLIB.bits(), (1 << 24) | (1 << 6));
        assert_eq!(
            SenseFlags::INSTALL_ONLY_MASK.bits(),
            (1 << 9) | (1 << 10) | (1 << 24) | (1 << 26)
        );
        assert_eq!(SenseFlags::ERASE_ONLY_MASK.bits(), (1 << 11) | (1 << 12));
    }

    #[test]
    fn test_legacy_prereq() {
        assert!(SenseFlags::PREREQ.is_legacy_prereq());
        assert!(!SenseFlags::SCRIPT_PRE.is_legacy_prereq());
        assert!(!(SenseFlags::PREREQ | SenseFlags::SCRIPT_POST).is_legacy_prereq());
        assert!(!SenseFlags::empty().is_legacy_prereq());
    }

    #[test]
    fn test_hardness_selection() {
        // %pre scriptlet dependency: hard on install, soft on erase
        let pre = SenseFlags::SCRIPT_PRE;
        assert_eq!(operation_flag(pre, Op::Install), ArcFlags::HARD);
        assert_eq!(operation_flag(pre, Op::Erase), ArcFlags::empty());
        // bare legacy prereq: hard both ways
        let prereq = SenseFlags::PREREQ;
        assert_eq!(operation_flag(prereq, Op::Install), ArcFlags::HARD);
        assert_eq!(operation_flag(prereq, Op::Erase), ArcFlags::HARD);
        // %postun dependency: soft on install, hard on erase
        let postun = SenseFlags::SCRIPT_POSTUN;
        assert_eq!(operation_flag(postun, Op::Install), ArcFlags::empty());
        assert_eq!(operation_flag(postun, Op::Erase), ArcFlags::HARD);
        // plain versioned require: always soft
        let plain = SenseFlags::GREATER | SenseFlags::EQUAL;
        assert_eq!(operation_flag(plain, Op::Install), ArcFlags::empty());
        assert_eq!(operation_flag(plain, Op::Erase), ArcFlags::empty());
    }
}
