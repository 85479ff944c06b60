//! HTTP transfer engine.
//!
//! [`Driver::http_request`](crate::driver::Driver::http_request) shapes the
//! request from [`HttpOptions`], sends it through the driver's
//! [`HttpTransport`] and reports progress to the URL's
//! [`ProgressListener`].

pub mod engine;
pub mod options;
pub mod progress;
pub mod transport;

pub use engine::{HttpBody, HttpResponse};
pub use options::HttpOptions;
pub use progress::ProgressListener;
pub use transport::{HttpTransport, ReqwestTransport};
