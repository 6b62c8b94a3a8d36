//! The resolved-icon cache and its entry and error types.

mod icon_error;
mod store;

pub use icon_error::{CacheEntry, IconError};
pub use store::IconStore;
