//! Tracing setup shared by the Uppe binaries.

mod tracing;

pub use self::tracing::{init, init_with_level, parse_level};
