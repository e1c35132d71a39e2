#![doc = include_str!("../README.md")]

mod error;
pub mod frontend;
pub mod grants;
pub mod health;
pub mod ingest;
pub mod pipeline;
pub mod resource;
pub mod store;
pub mod stream;
pub mod topology;
pub mod worker;

pub use crate::error::*;
pub use crate::pipeline::Pipeline;
pub use crate::topology::{Assembly, AssemblyParams, Topology, TopologyAssembler};
