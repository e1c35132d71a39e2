//! In-process change stream.
//!
//! A [`ChangeStream`] is an ordered log split into shards. The record store
//! it is attached to appends one [`ChangeRecord`] per mutation; readers go
//! through a grant-checked [`StreamReader`] and track their own
//! [`ShardIterator`]s, usually via a [`StreamConsumer`]. Records older than
//! the retention window are dropped by [`ChangeStream::trim`], measured on the
//! stream's [`ArrivalClock`].

mod clock;
mod consumer;
mod memory;
mod record;

pub use clock::{ArrivalClock, SystemClock, TokioClock};
pub use consumer::StreamConsumer;
pub use memory::{
    ChangeStream, GetRecordsOutput, IteratorPosition, ShardIterator, StreamDescription,
    StreamReader,
};
pub use record::{ChangeRecord, EventName, StreamImage, StreamRecord};
