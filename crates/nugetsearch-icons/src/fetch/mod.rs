//! The strategies used to turn an icon URL into an icon.
//!
//! The [`IconManager`](crate::IconManager) is agnostic of how icons are transported and
//! decoded. It drives an [`IconSource`], which is either one of the implementations in this
//! module, like [`HttpIconSource`](http::HttpIconSource), or a closure wrapped with
//! [`source_fn`].

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::caching::CacheEntry;

pub mod decode;
pub mod http;

pub use decode::{Icon, IconDecoder, ImageDecoder, ImageFormat, RawDecoder};
pub use http::HttpIconSource;

/// Fetches and decodes the icon behind a URL.
///
/// Implementations may fail in any way, including panicking. The manager records every
/// failure as a resolved, unusable entry and never retries it.
pub trait IconSource: Send + Sync + 'static {
    /// The decoded, platform specific icon.
    type Icon: Clone + Send + Sync + 'static;

    /// Fetches and decodes the icon at `url`.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, CacheEntry<Self::Icon>>;
}

/// An [`IconSource`] backed by a closure, see [`source_fn`].
pub struct FnSource<F> {
    f: F,
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

impl<F, Fut, T> IconSource for FnSource<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CacheEntry<T>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Icon = T;

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, CacheEntry<T>> {
        (self.f)(url.to_owned()).boxed()
    }
}

/// Creates an [`IconSource`] from an async closure taking the icon URL.
///
/// ```
/// use nugetsearch_icons::{IconError, source_fn};
///
/// let source = source_fn(|url: String| async move {
///     match url.strip_prefix("mem://") {
///         Some(name) => Ok(name.len()),
///         None => Err(IconError::NotFound),
///     }
/// });
/// # let _ = source;
/// ```
pub fn source_fn<F, Fut, T>(f: F) -> FnSource<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CacheEntry<T>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    FnSource { f }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IconError;

    #[tokio::test]
    async fn test_source_fn() {
        let source = source_fn(|url: String| async move {
            if url.ends_with(".png") {
                Ok(url.len())
            } else {
                Err(IconError::Malformed(url))
            }
        });

        assert_eq!(source.fetch("a.png").await, Ok(5));
        assert_eq!(
            source.fetch("a.txt").await,
            Err(IconError::Malformed("a.txt".into()))
        );
    }
}
