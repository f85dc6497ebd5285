//! Local cache store for intercepted responses.
//!
//! Responses are filed into two logical buckets:
//! - a versioned static bucket holding the app shell
//! - an unversioned dynamic bucket holding data responses
//!
//! A new manifest version makes the previous static bucket invisible, and
//! activation deletes it.

mod layer;
mod storage;
mod traits;

pub use layer::CacheStore;
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{AssetManifest, BucketKind, CachedAsset};
