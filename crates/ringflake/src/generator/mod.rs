mod interface;
mod sequence;
#[cfg(test)]
mod tests;

pub use interface::*;
pub use sequence::*;
