mod backend;
mod backends;
mod engine;
mod result;

pub use backend::{Candidate, DetectorBackend};
#[cfg(test)]
pub(crate) use backend::testing::ScriptedBackend;
pub use backends::SsdBackend;
pub use engine::{DetectionEngine, ModelConfig};
pub use result::{BoundingBox, Detection, DetectionResult};
