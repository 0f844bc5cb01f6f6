//! Ingress transports. Both route into the same dispatcher; either can
//! be disabled by configuration.

pub mod http;
pub mod unix;

pub use http::HttpTransport;
pub use unix::UnixTransport;
