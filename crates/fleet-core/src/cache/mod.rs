//! Checksum caches.
//!
//! Two tiers: a plain-text checksum file inside each function's output
//! directory, authoritative for this machine, and a shared map behind a
//! pluggable [`RemoteCacheStore`] so fresh machines and CI runners can skip
//! unchanged functions too. Neither tier is ever required for correctness.

pub mod file_store;
pub mod http_store;
pub mod local;
pub mod memory;
pub mod remote;

pub use file_store::FileRemoteStore;
pub use http_store::HttpRemoteStore;
pub use local::{CHECKSUM_FILE_NAME, LocalChecksumStore};
pub use memory::InMemoryRemoteStore;
pub use remote::{RemoteCacheStore, RemoteCacheSync, RemoteFetch};
