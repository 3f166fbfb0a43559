//! Deterministic rendering of detections onto frames.
//!
//! Colors come from a fixed palette indexed by class id and labels use a
//! built-in 5x7 bitmap font, so identical inputs always produce identical
//! pixels regardless of platform fonts.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, ClassNameMap, Detection};
use crate::frame::Frame;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

const PALETTE: [[u8; 3]; 20] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
    [52, 69, 147],
    [100, 115, 255],
    [0, 24, 236],
    [132, 56, 255],
    [82, 0, 133],
    [203, 56, 255],
    [255, 149, 200],
    [255, 55, 199],
];

/// Box and label renderer.
#[derive(Clone, Debug)]
pub struct Annotator {
    line_thickness: u32,
    font_scale: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            line_thickness: 2,
            font_scale: 2,
        }
    }
}

impl Annotator {
    pub fn new(line_thickness: u32, font_scale: u32) -> Self {
        Self {
            line_thickness: line_thickness.max(1),
            font_scale: font_scale.max(1),
        }
    }

    /// Palette color for a class id.
    pub fn class_color(class_id: u32) -> Rgb<u8> {
        Rgb(PALETTE[class_id as usize % PALETTE.len()])
    }

    /// Label text for a detection: class name and confidence to two decimals.
    pub fn label(detection: &Detection, names: &ClassNameMap) -> String {
        let name = names
            .name(detection.class_id)
            .unwrap_or(&detection.class_name);
        format!("{} {:.2}", name, detection.confidence)
    }

    /// Draw `detections` on a copy of `frame`.
    ///
    /// Boxes are clipped to the frame; boxes entirely outside are skipped.
    /// Non-RGB frames are returned unchanged.
    pub fn render(&self, frame: &Frame, detections: &[Detection], names: &ClassNameMap) -> Frame {
        if detections.is_empty() {
            return frame.clone();
        }
        let mut canvas = match frame.to_rgb_image() {
            Ok(canvas) => canvas,
            Err(err) => {
                log::debug!("annotator: leaving frame untouched: {:#}", err);
                return frame.clone();
            }
        };

        for detection in detections {
            let Some(rect) = clip(&detection.bbox, canvas.width(), canvas.height()) else {
                continue;
            };
            let color = Self::class_color(detection.class_id);
            self.draw_box(&mut canvas, rect, color);
            self.draw_label(&mut canvas, rect, &Self::label(detection, names), color);
        }

        Frame::from_rgb_image(canvas)
    }

    fn draw_box(&self, canvas: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
        // Thicken inwards so the outline never leaves the clipped area.
        for inset in 0..self.line_thickness {
            let (w, h) = (rect.width(), rect.height());
            if w <= inset * 2 || h <= inset * 2 {
                break;
            }
            let inner = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32)
                .of_size(w - inset * 2, h - inset * 2);
            draw_hollow_rect_mut(canvas, inner, color);
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, anchor: Rect, text: &str, color: Rgb<u8>) {
        let scale = self.font_scale;
        let advance = (GLYPH_WIDTH + 1) * scale;
        let label_w = advance * text.chars().count() as u32 + scale;
        let label_h = (GLYPH_HEIGHT + 2) * scale;

        // Above the box when there is room, otherwise just inside its top edge.
        let top = if anchor.top() >= label_h as i32 {
            anchor.top() - label_h as i32
        } else {
            anchor.top()
        };
        let left = anchor.left();
        draw_filled_rect_mut(canvas, Rect::at(left, top).of_size(label_w, label_h), color);

        let ink = text_color(color);
        for (i, ch) in text.chars().enumerate() {
            let x = left + (scale + i as u32 * advance) as i32;
            let y = top + scale as i32;
            draw_glyph(canvas, ch, x, y, scale, ink);
        }
    }
}

/// Integer pixel rectangle of `bbox` intersected with the frame.
fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    if !bbox.is_valid() || width == 0 || height == 0 {
        return None;
    }
    let x0 = bbox.left.max(0.0).floor();
    let y0 = bbox.top.max(0.0).floor();
    let x1 = bbox.right.min(width as f32).ceil();
    let y1 = bbox.bottom.min(height as f32).ceil();
    if x1 <= x0 || y1 <= y0 || x0 >= width as f32 || y0 >= height as f32 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

fn text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
    if luma > 150_000 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

fn draw_glyph(canvas: &mut RgbImage, ch: char, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    for (row, bits) in glyph(ch).iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x + (col * scale + dx) as i32;
                    let py = y + (row as u32 * scale + dy) as i32;
                    if px >= 0 && py >= 0 && px < width && py < height {
                        canvas.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

/// 5x7 glyph rows, most significant of the low five bits is the left column.
/// Lowercase letters render as uppercase.
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '%' => [0x19, 0x1A, 0x02, 0x04, 0x08, 0x0B, 0x13],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        ' ' => [0x00; 7],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class_id: u32, bbox: BoundingBox) -> Detection {
        Detection {
            class_id,
            class_name: format!("class{}", class_id),
            confidence: 0.87,
            bbox,
        }
    }

    fn names() -> ClassNameMap {
        ClassNameMap::from_names(["person", "car"])
    }

    #[test]
    fn rendering_is_deterministic() {
        let frame = Frame::filled(64, 48, [20, 20, 20]);
        let dets = vec![
            detection(0, BoundingBox::new(10.0, 20.0, 40.0, 45.0)),
            detection(1, BoundingBox::new(30.0, 2.0, 60.0, 30.0)),
        ];
        let annotator = Annotator::default();
        let a = annotator.render(&frame, &dets, &names());
        let b = annotator.render(&frame, &dets, &names());
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), frame.as_bytes());
    }

    #[test]
    fn no_detections_leaves_pixels_untouched() {
        let frame = Frame::filled(16, 16, [1, 2, 3]);
        let out = Annotator::default().render(&frame, &[], &names());
        assert_eq!(out, frame);
    }

    #[test]
    fn input_frame_is_not_modified() {
        let frame = Frame::filled(32, 32, [0, 0, 0]);
        let before = frame.clone();
        let dets = vec![detection(0, BoundingBox::new(4.0, 4.0, 20.0, 20.0))];
        let _ = Annotator::default().render(&frame, &dets, &names());
        assert_eq!(frame, before);
    }

    #[test]
    fn box_edges_use_class_color() {
        let frame = Frame::filled(50, 50, [0, 0, 0]);
        let dets = vec![detection(1, BoundingBox::new(10.0, 30.0, 40.0, 45.0))];
        let out = Annotator::new(1, 1)
            .render(&frame, &dets, &names())
            .to_rgb_image()
            .unwrap();
        let color = Annotator::class_color(1);
        assert_eq!(*out.get_pixel(10, 44), color);
        assert_eq!(*out.get_pixel(39, 44), color);
        assert_eq!(*out.get_pixel(25, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped_or_skipped() {
        let frame = Frame::filled(20, 20, [0, 0, 0]);
        let partial = vec![detection(0, BoundingBox::new(-15.0, -5.0, 10.0, 50.0))];
        let out = Annotator::default().render(&frame, &partial, &names());
        assert_eq!(out.shape(), frame.shape());
        assert_ne!(out, frame);

        let outside = vec![detection(0, BoundingBox::new(25.0, 25.0, 40.0, 40.0))];
        assert_eq!(Annotator::default().render(&frame, &outside, &names()), frame);
    }

    #[test]
    fn label_uses_map_name_and_two_decimals() {
        let det = detection(0, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(Annotator::label(&det, &names()), "person 0.87");
        let unknown = detection(7, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(Annotator::label(&unknown, &names()), "class7 0.87");
    }
}
