mod adapter;
mod backend;
pub mod backends;
mod filter;
mod result;

pub use adapter::{clamp_threshold, DetectorAdapter};
pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractYoloBackend;
pub use filter::{resolve, ClassSelection, ALL_CLASSES};
pub use result::{AllowedClasses, BoundingBox, ClassNameMap, Detection, RawDetection};
