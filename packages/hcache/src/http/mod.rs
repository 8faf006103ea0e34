//! Origin transport and HTTP header interpretation

pub mod cache_control;
pub mod hyper_transport;
pub mod transport;

pub use cache_control::CacheControl;
pub use hyper_transport::HyperTransport;
pub use transport::{HttpTransport, Trailers};
