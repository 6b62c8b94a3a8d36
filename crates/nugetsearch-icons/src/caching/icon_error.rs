use std::error::Error;
use std::time::Duration;

use thiserror::Error;

/// The reason an icon could not be loaded.
///
/// An `IconError` stored in the [`IconStore`](super::IconStore) is the failure marker for its URL:
/// the URL counts as resolved and will not be fetched again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IconError {
    /// The icon was not found at the remote location.
    #[error("not found")]
    NotFound,
    /// The icon could not be fetched due to missing permissions.
    ///
    /// The attached string contains the server's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The icon could not be fetched due to a timeout.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The icon could not be fetched due to another problem, like connection loss,
    /// DNS resolution, or a 5xx server response.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The payload was fetched successfully, but could not be decoded into an icon.
    #[error("malformed: {0}")]
    Malformed(String),
    /// An unexpected error while loading, for instance a panicking icon source.
    #[error("internal error")]
    InternalError,
}

impl IconError {
    /// Builds a [`DownloadError`](Self::DownloadError) from the innermost cause of `error`.
    pub fn download_error(mut error: &dyn Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        // Special-case a few error strings
        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        if error_string.contains("SSL routines") {
            error_string = "SSL error".to_string();
        }

        Self::DownloadError(error_string)
    }

    /// Logs `e` and turns it into an [`InternalError`](Self::InternalError).
    #[track_caller]
    pub fn from_std_error<E: Error + 'static>(e: E) -> Self {
        let dynerr: &dyn Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }

    /// A short, stable name for this kind of error, used to tag metrics.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            Self::NotFound => "notfound",
            Self::PermissionDenied(_) => "permissiondenied",
            Self::Timeout(_) => "timeout",
            Self::DownloadError(_) => "downloaderror",
            Self::Malformed(_) => "malformed",
            Self::InternalError => "internalerror",
        }
    }
}

impl From<tokio::task::JoinError> for IconError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> Self {
        Self::from_std_error(err)
    }
}

/// The outcome of loading one icon: either the icon, or the reason it is unusable.
pub type CacheEntry<T> = Result<T, IconError>;
