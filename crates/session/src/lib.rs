pub mod analysis;
pub mod machine;
pub mod router;
pub mod screenshot;

pub use analysis::*;
pub use machine::*;
pub use router::*;
pub use screenshot::*;
