use std::fmt::Display;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds raised while decoding, verifying or planning packages.
///
/// Structural and integrity errors abort the current package; callers that
/// batch many packages report them with the package path and continue.
/// Resolution findings are accumulated per dependency tuple before being
/// returned in one error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed on-disk data: bad magic, bad lead, broken index entry,
    /// store overflow, unknown tag type.
    #[error("{0}")]
    Structural(String),

    /// Well-formed data that violates a header invariant: missing required
    /// tag, mismatched parallel arrays, divergent duplicate tag.
    #[error("{0}")]
    Consistency(String),

    /// Digest or checksum mismatch.
    #[error("{0}")]
    Integrity(String),

    /// Data we recognize but refuse: unknown payload compressor or format,
    /// incompatible architecture.
    #[error("{0}")]
    Compat(String),

    /// Unresolved requires, conflicts or file collisions, one line per
    /// (name, flags, version) tuple.
    #[error("{}", .0.join("\n"))]
    Resolution(Vec<String>),

    /// A dependency cycle survived soft- and hard-arc removal.
    #[error("{0}")]
    Ordering(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn structural<P: Display, M: Display>(path: P, msg: M) -> Self {
        Error::Structural(format!("{}: {}", path, msg))
    }

    pub fn consistency<P: Display, M: Display>(path: P, msg: M) -> Self {
        Error::Consistency(format!("{}: {}", path, msg))
    }

    pub fn integrity<P: Display, M: Display>(path: P, msg: M) -> Self {
        Error::Integrity(format!("{}: {}", path, msg))
    }

    pub fn compat<P: Display, M: Display>(path: P, msg: M) -> Self {
        Error::Compat(format!("{}: {}", path, msg))
    }
}
