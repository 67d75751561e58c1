//! Transport to the recognition backend.
//!
//! `HttpBackend` implements both `RecognitionClient` (still upload) and
//! `ReportSource` (report download) over a shared `ureq` agent.

mod http;
mod multipart;

pub use http::HttpBackend;
pub use multipart::MultipartFile;
