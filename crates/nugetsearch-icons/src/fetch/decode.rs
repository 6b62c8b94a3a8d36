//! Turning downloaded bytes into icons.

use std::fmt;

use bytes::Bytes;

use crate::caching::{CacheEntry, IconError};

/// Decodes the raw payload of an icon download.
///
/// Decoding runs on the blocking thread pool and never concurrently with another decode of
/// the same [`HttpIconSource`](super::HttpIconSource).
pub trait IconDecoder: Send + Sync + 'static {
    type Icon: Clone + Send + Sync + 'static;

    fn decode(&self, url: &str, data: Bytes) -> CacheEntry<Self::Icon>;
}

/// A decoder that keeps the downloaded bytes as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawDecoder;

impl IconDecoder for RawDecoder {
    type Icon = Bytes;

    fn decode(&self, _url: &str, data: Bytes) -> CacheEntry<Bytes> {
        Ok(data)
    }
}

/// The image container formats that NuGet package icons come in.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Ico,
    WebP,
}

impl ImageFormat {
    /// Detects the format from the leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'B', b'M', ..] => Some(Self::Bmp),
            [0x00, 0x00, 0x01, 0x00, ..] => Some(Self::Ico),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Ico => "ico",
            Self::WebP => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloaded icon whose container format is known.
///
/// Turning it into pixels is left to the platform.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Icon {
    pub format: ImageFormat,
    pub data: Bytes,
}

/// A decoder that only accepts payloads in one of the known [`ImageFormat`]s.
///
/// Servers frequently answer broken icon URLs with an HTML page and a `200` status. Those
/// payloads are rejected as [`IconError::Malformed`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageDecoder;

impl IconDecoder for ImageDecoder {
    type Icon = Icon;

    fn decode(&self, url: &str, data: Bytes) -> CacheEntry<Icon> {
        if data.is_empty() {
            return Err(IconError::Malformed("empty response".into()));
        }
        match ImageFormat::sniff(&data) {
            Some(format) => Ok(Icon { format, data }),
            None => {
                tracing::debug!(url, len = data.len(), "Icon has an unknown image format");
                Err(IconError::Malformed("unknown image format".into()))
            }
        }
    }
}
