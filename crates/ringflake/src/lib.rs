//! Cached, Snowflake-style 64-bit UID generation.
//!
//! Ids pack a second-resolution timestamp, a worker id and a per-second
//! sequence behind a reserved sign bit (see [`BitLayout`]). A
//! [`CachedUidGenerator`] pre-generates whole seconds of ids into a lock-free
//! [`RingBuffer`] and keeps it topped up from a [`PaddingExecutor`], so handing
//! out an id is a single pop.
//!
//! ```
//! use ringflake::{CachedUidGenerator, StaticWorkerIdAssigner, SystemClock, UidConfig};
//!
//! let generator = CachedUidGenerator::new(
//!     &UidConfig::default(),
//!     &StaticWorkerIdAssigner(42),
//!     SystemClock,
//! )
//! .unwrap();
//!
//! let uid = generator.get_uid().unwrap();
//! println!("{}", generator.parse_uid(uid));
//! ```

mod buffer;
mod cached;
mod config;
mod error;
mod generator;
mod layout;
mod padding;
mod time;
mod worker;

pub use crate::buffer::*;
pub use crate::cached::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::layout::*;
pub use crate::padding::*;
pub use crate::time::*;
pub use crate::worker::*;
