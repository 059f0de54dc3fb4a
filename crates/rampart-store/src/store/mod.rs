//! Key-value store abstraction.
//!
//! The cache layer, the remote filter and the lock only talk to the shared
//! store through [`KeyValueStore`].

mod traits;

use std::sync::Arc;

pub use traits::KeyValueStore;

/// A store shared between the components of one cache instance.
pub type SharedStore = Arc<dyn KeyValueStore>;
