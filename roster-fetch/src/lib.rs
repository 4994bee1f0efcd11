//! ROSTER Fetch - HTTP with retry budget and response validation.
//!
//! [`RetryingFetcher`] turns a [`RequestDescriptor`] into a validated,
//! secret-free payload plus the bearer token returned with it. HTTP is
//! behind [`HttpTransport`] so hosts and tests can swap the client.
//!
//! [`RequestDescriptor`]: roster_core::RequestDescriptor

pub mod decode;
pub mod fetcher;
pub mod retry;
pub mod transport;

pub use decode::{decode_body, DecodedBody};
pub use fetcher::{FetchResponse, RetryingFetcher};
pub use retry::RetryPolicy;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
