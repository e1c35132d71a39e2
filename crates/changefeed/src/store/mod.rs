//! In-process record store with change capture.

mod item;
mod memory;

pub use item::{AttributeValue, Item};
pub use memory::{RecordStore, StoreDescription, StoreHandle};
