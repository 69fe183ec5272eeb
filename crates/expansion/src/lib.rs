pub mod engine;
pub mod search;

pub use engine::*;
pub use search::*;
