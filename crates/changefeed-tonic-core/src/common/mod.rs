//! Shared protocol types and error definitions.
//!
//! ## Submodules
//!
//! - [`error`] - Service error type and its mapping to `tonic::Status`.
//! - [`message`] - Typed constructors for `SubscribeResponse` messages.
//! - [`proto`] - Generated `ChangeFeed` bindings and the reflection
//!   descriptor set.

pub mod error;
pub mod message;

pub use error::{Error, Result};

pub mod proto {
    tonic::include_proto!("changefeed");
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("changefeed_descriptor");
}
