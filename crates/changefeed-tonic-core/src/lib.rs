#![doc = include_str!("../README.md")]

pub mod common;
pub use common::*;
// Public re-export so downstream crates can access `changefeed` via
// `changefeed_tonic_core::changefeed`
pub use changefeed;
