mod bits;
mod parts;

pub use bits::*;
pub use parts::*;
