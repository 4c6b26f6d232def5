//! cinder-core: the storage engine.
//!
//! Owns the keyspace, the container data types, expiration, memory
//! accounting, and eviction. The engine is synchronous and designed to
//! sit behind a single reader/writer lock owned by the server layer:
//! accessors that can observe an expired key take `&mut self` so lazy
//! deletion never happens under a shared borrow.

pub mod eviction;
pub mod memory;
pub mod object;
pub mod store;
pub mod time;
pub mod types;

pub use eviction::{EvictionConfig, EvictionPolicy};
pub use object::{Encoding, Object, ObjectKind, Payload};
pub use store::{KeyModifiedCallback, SetResult, Store, StoreError, StoreSnapshot};
pub use types::quicklist::Quicklist;
pub use types::sorted_set::SortedSet;
