//! davsync-storage: the WebDAV side of davsync
//!
//! - `backend`: the `DavBackend` seam (PROPFIND, ranged GET, PUT, DELETE, MKCOL)
//! - `http`: reqwest implementation with Basic/Digest auth
//! - `memory`: in-process implementation for tests and dry runs
//! - `transport`: base-dir mapping and one-shot depth capability negotiation
//! - `listing`: full-tree enumeration (recursive PROPFIND or breadth-first walk)

pub mod backend;
pub mod digest;
pub mod health;
pub mod http;
pub mod listing;
pub mod memory;
pub mod multistatus;
pub mod settings;
pub mod transport;

pub use backend::{DavBackend, DavEntry};
pub use health::{check_connectivity, check_health};
pub use http::HttpBackend;
pub use listing::list_remote;
pub use memory::MemoryBackend;
pub use settings::{MemorySettingsStore, SettingsStore, TomlSettingsStore};
pub use transport::{negotiate_capability, Negotiation, WebdavTransport};
