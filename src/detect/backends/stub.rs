use anyhow::{anyhow, Result};
use std::collections::BTreeSet;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{AllowedClasses, BoundingBox, ClassNameMap, RawDetection};
use crate::frame::Frame;

/// Deterministic backend for tests and `stub://` runs.
///
/// Returns the same scripted detections for every frame. Like a real model
/// it applies the threshold and class filter itself unless built with
/// [`StubBackend::unfiltered`]. Selected calls can be made to fail.
pub struct StubBackend {
    names: ClassNameMap,
    detections: Vec<RawDetection>,
    normalized: bool,
    filter_in_model: bool,
    fail_on: BTreeSet<u64>,
    calls: u64,
}

impl StubBackend {
    pub fn new(names: ClassNameMap, detections: Vec<RawDetection>) -> Self {
        Self {
            names,
            detections,
            normalized: false,
            filter_in_model: true,
            fail_on: BTreeSet::new(),
            calls: 0,
        }
    }

    /// COCO classes with one centered "person" and one "car" per frame.
    /// Boxes scale with the frame.
    pub fn synthetic() -> Self {
        let detections = vec![
            RawDetection {
                class_id: 0,
                confidence: 0.91,
                bbox: BoundingBox::new(0.30, 0.20, 0.55, 0.90),
            },
            RawDetection {
                class_id: 2,
                confidence: 0.63,
                bbox: BoundingBox::new(0.60, 0.55, 0.95, 0.85),
            },
        ];
        Self {
            normalized: true,
            ..Self::new(ClassNameMap::coco(), detections)
        }
    }

    /// Return detections without applying threshold or class filter.
    pub fn unfiltered(mut self) -> Self {
        self.filter_in_model = false;
        self
    }

    /// Fail the given zero-based calls.
    pub fn fail_on_calls<I: IntoIterator<Item = u64>>(mut self, calls: I) -> Self {
        self.fail_on.extend(calls);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn place(&self, bbox: BoundingBox, frame: &Frame) -> BoundingBox {
        if !self.normalized {
            return bbox;
        }
        let w = frame.width() as f32;
        let h = frame.height() as f32;
        BoundingBox::new(bbox.left * w, bbox.top * h, bbox.right * w, bbox.bottom * h)
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &ClassNameMap {
        &self.names
    }

    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        allowed: Option<&AllowedClasses>,
    ) -> Result<Vec<RawDetection>> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on.contains(&call) {
            return Err(anyhow!("stub backend: scripted failure on call {}", call));
        }

        Ok(self
            .detections
            .iter()
            .filter(|det| {
                !self.filter_in_model
                    || (det.confidence >= confidence_threshold
                        && allowed.map_or(true, |ids| ids.contains(&det.class_id)))
            })
            .map(|det| RawDetection {
                bbox: self.place(det.bbox, frame),
                ..det.clone()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_fails_only_on_scripted_calls() {
        let mut backend = StubBackend::synthetic().fail_on_calls([1]);
        let frame = Frame::filled(100, 50, [0, 0, 0]);

        let first = backend.detect(&frame, 0.5, None).unwrap();
        assert_eq!(first.len(), 2);
        let placed = first[0].bbox;
        for (got, want) in [
            (placed.left, 30.0),
            (placed.top, 10.0),
            (placed.right, 55.0),
            (placed.bottom, 45.0),
        ] {
            assert!((got - want).abs() < 1e-3, "{} != {}", got, want);
        }

        assert!(backend.detect(&frame, 0.5, None).is_err());
        assert!(backend.detect(&frame, 0.7, None).unwrap().len() == 1);
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn stub_backend_filters_like_a_model() {
        let mut backend = StubBackend::synthetic();
        let frame = Frame::filled(10, 10, [0, 0, 0]);
        let cars: AllowedClasses = [2].into_iter().collect();
        let out = backend.detect(&frame, 0.0, Some(&cars)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 2);
    }
}
