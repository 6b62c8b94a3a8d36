//! Throttled, de-duplicating icon loading for the NuGetSearch clients.
//!
//! The [`IconManager`] accepts batches of icon URLs, answers already resolved
//! ones synchronously and hands the rest to a background dispatch loop. Every
//! URL is fetched through an injected [`IconSource`] at most a bounded number
//! of times in parallel, and its outcome is cached for the lifetime of the
//! manager.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod manager;
pub mod utils;

pub use caching::{CacheEntry, IconError, IconStore};
pub use fetch::{IconSource, source_fn};
pub use manager::{IconManager, LoadCallback};
