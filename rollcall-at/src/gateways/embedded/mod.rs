//! In-process gateway implementations
//!
//! Each structure lives behind a tokio `RwLock`, so queries run
//! concurrently and a failed call never leaves another key half-written.

mod gallery;
mod ordered;
mod prefix;

pub use gallery::EmbeddedGallery;
pub use ordered::EmbeddedOrderedIndex;
pub use prefix::EmbeddedPrefixIndex;
