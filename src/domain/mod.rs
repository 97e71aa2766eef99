//! Domain layer types and invariants.

pub mod entry;
pub mod error;
pub mod selector;

pub use entry::CachedEntry;
pub use error::{DecodeError, SelectorError};
pub use selector::{CacheKey, Selector, is_directory_candidate};
