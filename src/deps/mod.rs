mod filenames;
mod orderer;
mod resolver;
mod sense;

pub use filenames::*;
pub use orderer::*;
pub use resolver::*;
pub use sense::*;
