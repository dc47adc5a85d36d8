//! Process-local identity and validity cache.
//!
//! [`IdentityCache`] maps `(type name, primary key)` to one canonical entity
//! instance and a validity flag. Invalidation marks an entry stale without
//! removing it and never cascades to referencing entities: the next reader
//! that reaches a stale instance reloads and revalidates it.

pub mod cache;
pub mod error;

pub use cache::{CacheLookup, CacheStats, IdentityCache};
pub use error::{CacheError, CacheResult};
