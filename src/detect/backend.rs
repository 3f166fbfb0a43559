use anyhow::Result;

use crate::detect::result::{AllowedClasses, ClassNameMap, RawDetection};
use crate::frame::Frame;

/// Object detection model capability.
///
/// Any model that can score a frame against a confidence threshold and an
/// optional class allow-list, and that exposes its class names, can drive
/// the pipeline. Backends are free to apply the threshold and class filter
/// inside the model; the adapter re-checks both.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names, fixed for the lifetime of the loaded model.
    fn class_names(&self) -> &ClassNameMap;

    /// Run detection on an RGB frame.
    ///
    /// Detections are returned in the model's native order.
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        allowed: Option<&AllowedClasses>,
    ) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn class_names(&self) -> &ClassNameMap {
        (**self).class_names()
    }

    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        allowed: Option<&AllowedClasses>,
    ) -> Result<Vec<RawDetection>> {
        (**self).detect(frame, confidence_threshold, allowed)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
