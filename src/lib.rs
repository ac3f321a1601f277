pub mod db;
pub mod deps;
pub mod digest;
mod error;
pub mod header;
pub mod lead;
pub mod payload;
pub mod rpm;
pub mod utils;
pub mod version;

pub use deps::{ArcFlags, DependencyReport, Op, Orderer, Resolver, SenseFlags};
pub use error::{Error, Result};
pub use header::{Header, Value};
pub use lead::Lead;
pub use rpm::{Dependency, Package, RpmFile};
pub use version::{Evr, evr_compare, range_intersect, rpm_vercmp};
