pub mod bounds;
pub mod latlng;

// Foundation crate: small, well-tested geographic primitives only.
pub use bounds::*;
pub use latlng::*;
