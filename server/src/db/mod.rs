//! Database connection management.

mod pool;

pub use pool::*;
