pub mod coordinator;
pub mod provider;
pub mod surface;

pub use coordinator::*;
pub use provider::*;
pub use surface::*;
