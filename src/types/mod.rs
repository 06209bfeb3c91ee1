mod chunk;
mod error;
mod page;

pub use chunk::*;
pub use error::*;
pub use page::*;
