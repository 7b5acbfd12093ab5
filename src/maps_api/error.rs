use std::path::PathBuf;

use thiserror::Error;

use crate::map::overlay::DatasetKind;

/// Why an overlay tier could not produce a result. None of these are fatal:
/// each one moves the caller on to the next tier or to its own fallback.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("static {} unavailable: {reason}", path.display())]
    LocalFetchFailed { path: PathBuf, reason: String },

    #[error("static {kind} matched nothing for the requested filter")]
    LocalResultEmpty { kind: DatasetKind },

    #[error("remote layers are disabled")]
    RemoteDisabled,

    #[error("remote request failed: {0}")]
    RemoteFetchFailed(String),
}

/// Failures while fetching a single tile or feature response.
#[derive(Error, Debug)]
pub enum TileError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("invalid URL {url}: {reason}")]
    Url { url: String, reason: String },

    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("malformed JSONP response: {0}")]
    Jsonp(String),

    #[error("invalid feature response: {0}")]
    Features(#[from] crate::map::features::FeatureParseError),

    #[error("basemap {0:?} needs a Mapbox token")]
    MissingToken(String),
}

pub type Result<T> = std::result::Result<T, LoadError>;
