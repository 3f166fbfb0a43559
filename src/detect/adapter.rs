use std::sync::Arc;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{AllowedClasses, ClassNameMap, Detection, RawDetection};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

/// Wraps a model backend behind the pipeline's detection contract.
///
/// - thresholds are clamped into `[0, 1]`
/// - malformed frames are rejected before they reach the model
/// - every returned detection meets the threshold, the class allow-list and
///   carries a name from the model's class map
/// - the model's ordering is kept
pub struct DetectorAdapter {
    backend: Box<dyn DetectorBackend>,
    names: Arc<ClassNameMap>,
}

impl DetectorAdapter {
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Self {
        let names = Arc::new(backend.class_names().clone());
        Self {
            backend: Box::new(backend),
            names,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Class map of the wrapped model. Shared, read-only.
    pub fn class_names(&self) -> Arc<ClassNameMap> {
        Arc::clone(&self.names)
    }

    pub fn warm_up(&mut self) -> anyhow::Result<()> {
        self.backend.warm_up()
    }

    pub fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        allowed: Option<&AllowedClasses>,
    ) -> PipelineResult<Vec<Detection>> {
        validate_frame(frame)?;
        let threshold = clamp_threshold(confidence_threshold);

        let raw = self
            .backend
            .detect(frame, threshold, allowed)
            .map_err(|err| PipelineError::model_invocation(frame.shape(), format!("{:#}", err)))?;

        let detections: Vec<Detection> = raw
            .into_iter()
            .filter_map(|det| self.accept(det, threshold, allowed))
            .collect();
        log::debug!(
            "{}: {} detections on {} (threshold {:.2})",
            self.backend.name(),
            detections.len(),
            frame.shape(),
            threshold
        );
        Ok(detections)
    }

    fn accept(
        &self,
        det: RawDetection,
        threshold: f32,
        allowed: Option<&AllowedClasses>,
    ) -> Option<Detection> {
        if !(det.confidence >= threshold && det.confidence <= 1.0) {
            return None;
        }
        if allowed.is_some_and(|ids| !ids.contains(&det.class_id)) {
            return None;
        }
        if !det.bbox.is_valid() {
            log::debug!("dropping detection with degenerate box {:?}", det.bbox);
            return None;
        }
        let Some(class_name) = self.names.name(det.class_id) else {
            log::debug!("dropping detection with unknown class id {}", det.class_id);
            return None;
        };
        Some(Detection {
            class_id: det.class_id,
            class_name: class_name.to_string(),
            confidence: det.confidence,
            bbox: det.bbox,
        })
    }
}

/// Clamp into `[0, 1]`; NaN becomes 0.
pub fn clamp_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        0.0
    } else {
        threshold.clamp(0.0, 1.0)
    }
}

fn validate_frame(frame: &Frame) -> PipelineResult<()> {
    let shape = frame.shape();
    if shape.is_empty() {
        return Err(PipelineError::model_invocation(shape, "frame has zero size"));
    }
    if !frame.is_rgb() {
        return Err(PipelineError::model_invocation(
            shape,
            format!("expected 3 channels, got {}", shape.channels),
        ));
    }
    Ok(())
}
