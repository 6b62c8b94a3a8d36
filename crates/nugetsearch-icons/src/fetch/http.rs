//! Support to download icons from HTTP servers.

use std::fmt;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode, header};

use crate::caching::{CacheEntry, IconError};
use crate::config::HttpConfig;

use super::{IconDecoder, IconSource};

impl From<reqwest::Error> for IconError {
    fn from(error: reqwest::Error) -> Self {
        Self::download_error(&error)
    }
}

/// Creates a [`reqwest::Client`] with the timeouts and user agent from `config`.
pub fn create_client(config: &HttpConfig) -> reqwest::Result<Client> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .user_agent(config.user_agent.as_str())
        .build()
}

/// An [`IconSource`] that downloads icons over HTTP and decodes them with `D`.
///
/// Decoding is CPU and memory heavy on small devices. All decodes of one source are therefore
/// serialized, while downloads still run concurrently up to the manager's throttle.
pub struct HttpIconSource<D> {
    client: Client,
    config: HttpConfig,
    decoder: Arc<D>,
    decode_lock: Arc<Mutex<()>>,
}

impl<D> fmt::Debug for HttpIconSource<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpIconSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<D: IconDecoder> HttpIconSource<D> {
    pub fn new(config: &HttpConfig, decoder: D) -> reqwest::Result<Self> {
        let client = create_client(config)?;
        Ok(Self::with_client(client, config, decoder))
    }

    /// Creates a source that reuses an existing HTTP client.
    pub fn with_client(client: Client, config: &HttpConfig, decoder: D) -> Self {
        Self {
            client,
            config: config.clone(),
            decoder: Arc::new(decoder),
            decode_lock: Default::default(),
        }
    }

    /// Downloads the raw payload of `url`.
    async fn download(&self, url: &str) -> CacheEntry<bytes::Bytes> {
        tracing::debug!("Fetching icon from `{}`", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.map_error(err))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url, %status, "Icon download failed");
            return Err(match status {
                StatusCode::NOT_FOUND => IconError::NotFound,
                StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                    let details = response
                        .headers()
                        .get(header::WWW_AUTHENTICATE)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_else(|| status.canonical_reason().unwrap_or("denied"))
                        .to_owned();
                    IconError::PermissionDenied(details)
                }
                _ => IconError::DownloadError(status.to_string()),
            });
        }

        let data = response.bytes().await.map_err(|err| self.map_error(err))?;
        metric!(time_raw("icons.download.size") = data.len() as u64);
        Ok(data)
    }

    fn map_error(&self, error: reqwest::Error) -> IconError {
        if error.is_timeout() {
            IconError::Timeout(self.config.timeout)
        } else {
            error.into()
        }
    }

    /// Decodes `data` on the blocking pool, one decode at a time.
    async fn decode(&self, url: &str, data: bytes::Bytes) -> CacheEntry<D::Icon> {
        let decoder = Arc::clone(&self.decoder);
        let decode_lock = Arc::clone(&self.decode_lock);
        let url = url.to_owned();

        tokio::task::spawn_blocking(move || {
            // a panicking decoder must not wedge all further decodes
            let _guard = decode_lock.lock().unwrap_or_else(|e| e.into_inner());
            decoder.decode(&url, data)
        })
        .await?
    }
}

impl<D: IconDecoder> IconSource for HttpIconSource<D> {
    type Icon = D::Icon;

    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, CacheEntry<D::Icon>> {
        async move {
            let data = self.download(url).await?;
            self.decode(url, data).await
        }
        .boxed()
    }
}
