mod executor;
mod pool;

pub use executor::*;
