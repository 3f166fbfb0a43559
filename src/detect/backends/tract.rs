#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{AllowedClasses, BoundingBox, ClassNameMap, RawDetection};
use crate::frame::Frame;

const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_DETECTIONS: usize = 300;

/// YOLOv8 detection model executed with tract.
///
/// Expects the stock export layout: one input `[1, 3, S, S]` (RGB, 0..1)
/// and one output `[1, 4 + classes, candidates]` with center-size boxes in
/// input pixels followed by per-class scores.
pub struct TractYoloBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    names: ClassNameMap,
    iou_threshold: f32,
    max_detections: usize,
}

impl TractYoloBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, names: ClassNameMap) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractYoloBackend: loaded {} ({} classes, input {}x{})",
            model_path.display(),
            names.len(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            names,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        })
    }

    /// Override the IoU threshold used for non-maximum suppression.
    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_rgb_image()?;
        let size = self.input_size;
        let resized = image::imageops::resize(&image, size, size, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame: &Frame,
        confidence_threshold: f32,
        allowed: Option<&AllowedClasses>,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let attributes = shape[1];
        let candidates = shape[2];

        let sx = frame.width() as f32 / self.input_size as f32;
        let sy = frame.height() as f32 / self.input_size as f32;

        let mut detections = Vec::new();
        for i in 0..candidates {
            let mut best: Option<(u32, f32)> = None;
            for attr in 4..attributes {
                let score = view[[0, attr, i]];
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some(((attr - 4) as u32, score));
                }
            }
            let Some((class_id, score)) = best else {
                continue;
            };
            if score < confidence_threshold {
                continue;
            }
            if allowed.is_some_and(|ids| !ids.contains(&class_id)) {
                continue;
            }
            let bbox = BoundingBox::from_center(
                view[[0, 0, i]] * sx,
                view[[0, 1, i]] * sy,
                view[[0, 2, i]] * sx,
                view[[0, 3, i]] * sy,
            );
            detections.push(RawDetection {
                class_id,
                confidence: score,
                bbox,
            });
        }

        non_max_suppression(&mut detections, self.iou_threshold);
        detections.truncate(self.max_detections);
        Ok(detections)
    }
}

impl DetectorBackend for TractYoloBackend {
    fn name(&self) -> &'static str {
        "tract-yolov8"
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
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, confidence_threshold, allowed)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.input_size, self.input_size, [114, 114, 114]);
        self.detect(&blank, 1.0, None).map(|_| ())
    }
}

/// Class-aware NMS. Leaves detections sorted by descending confidence.
fn non_max_suppression(detections: &mut Vec<RawDetection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..detections.len() {
        let suppressed = (0..kept).any(|prev| {
            detections[prev].class_id == detections[index].class_id
                && detections[prev].bbox.iou(&detections[index].bbox) > iou_threshold
        });
        if !suppressed {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, confidence: f32, left: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::new(left, 0.0, left + 10.0, 10.0),
        }
    }

    #[test]
    fn nms_keeps_best_box_per_overlapping_cluster() {
        let mut dets = vec![det(0, 0.6, 1.0), det(0, 0.9, 0.0), det(1, 0.5, 0.0), det(0, 0.8, 50.0)];
        non_max_suppression(&mut dets, 0.45);
        let kept: Vec<(u32, f32)> = dets.iter().map(|d| (d.class_id, d.confidence)).collect();
        assert_eq!(kept, vec![(0, 0.9), (0, 0.8), (1, 0.5)]);
    }
}
