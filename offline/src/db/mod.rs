//! Durable store on SQLite.

mod pool;
mod records;

pub use pool::*;
