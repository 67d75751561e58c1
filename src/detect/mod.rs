mod backend;
mod backends;
mod registry;
mod result;

pub use backend::FaceDetector;
pub use backends::ScriptedDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractFaceDetector;
pub use registry::{DetectorRegistry, DetectorSettings};
pub use result::{DetectionResult, FaceBox};
