pub mod interpret;
pub mod payload;
pub mod resolver;

pub use interpret::*;
pub use payload::*;
pub use resolver::*;
