//! davsync-core: config schema, error type, and the data model shared by the
//! codec, transport, and transfer crates.

pub mod config;
pub mod error;
pub mod types;

pub use error::{DavsyncError, DavsyncResult};
pub use types::{BlockRange, Depth, RemoteItem, SizeRange, TransportCapability};
