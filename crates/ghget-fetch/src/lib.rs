//! Release API client and asset downloader.
//!
//! # Architecture
//!
//! - [`HttpClient`] - the transport seam; [`ReqwestClient`] in production,
//!   in-process fakes in tests
//! - [`EtagCache`] - URL-keyed conditional-request cache, owned by the caller
//! - [`GitHubClient`] - typed release/search queries on top of both
//! - [`Downloader`] - streams an asset to disk and moves it into place
//!
//! "No data" (404, 304, empty lists) is always `Ok`, never an error. Rate
//! limiting is reported as [`FetchError::RateLimited`] so callers can match
//! on it.

mod cache;
mod client;
mod download;
mod error;
mod http;
mod rate;
mod wire;

pub use cache::{CacheError, EtagCache, MemoryCache, NoCache};
pub use client::{
    ClientOptions, DEFAULT_API_BASE_URL, DEFAULT_USER_AGENT, GitHubClient, PRERELEASE_WINDOW,
    ReleaseSource,
};
pub use download::Downloader;
pub use error::{FetchError, Result};
pub use http::{BoxStream, HttpClient, HttpResponse, StreamResponse};
pub use rate::{DEFAULT_RATE_LIMIT_MESSAGE, RateLimitError};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
