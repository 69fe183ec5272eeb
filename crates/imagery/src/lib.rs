pub mod collections;
pub mod descriptor;
pub mod signature;

pub use collections::*;
pub use descriptor::*;
pub use signature::*;
