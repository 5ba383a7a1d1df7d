use crate::{config::AnnotationConfig, detection::Detection, labels::ClassLabels};
use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};

const DEFAULT_COLOR: [u8; 3] = [0, 255, 0];
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub struct Annotator {
    font: Option<FontArc>,
    font_scale: PxScale,
    line_thickness: u32,
}

impl Annotator {
    /// Boxes are always drawn; captions only when a font could be loaded.
    pub fn new(annotation_cfg: &AnnotationConfig) -> Self {
        let font = annotation_cfg.font_path.as_ref().and_then(|path| {
            match std::fs::read(path)
                .map_err(|e| e.to_string())
                .and_then(|data| FontArc::try_from_vec(data).map_err(|e| e.to_string()))
            {
                Ok(font) => Some(font),
                Err(e) => {
                    tracing::warn!("Failed to load font {:?}, drawing boxes only: {}", path, e);
                    None
                }
            }
        });
        if annotation_cfg.font_path.is_none() {
            tracing::warn!("No annotation font configured, drawing boxes only");
        }

        Self {
            font,
            font_scale: PxScale::from(annotation_cfg.font_size),
            line_thickness: annotation_cfg.line_thickness.max(1),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(
        &self,
        image: &DynamicImage,
        detections: &[Detection],
        labels: &ClassLabels,
    ) -> RgbImage {
        let mut canvas = image.to_rgb8();
        for detection in detections {
            let color = Rgb(labels.color(detection.class_id).unwrap_or(DEFAULT_COLOR));
            self.draw_box(&mut canvas, detection, color);
            if let Some(font) = &self.font {
                self.draw_caption(&mut canvas, font, detection, color);
            }
        }
        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let [x1, y1, x2, y2] = detection.bbox.to_pixels();
        for offset in 0..self.line_thickness {
            let width = (x2 - x1).saturating_sub(2 * offset);
            let height = (y2 - y1).saturating_sub(2 * offset);
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at((x1 + offset) as i32, (y1 + offset) as i32).of_size(width, height);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }

    fn draw_caption(
        &self,
        canvas: &mut RgbImage,
        font: &FontArc,
        detection: &Detection,
        color: Rgb<u8>,
    ) {
        let label = format!("{}: {:.2}", detection.class_name, detection.confidence);
        let (text_w, text_h) = text_size(self.font_scale, font, &label);
        if text_w == 0 || text_h == 0 {
            return;
        }

        let [x1, y1, _, _] = detection.bbox.to_pixels();
        let pad = 2;
        let box_h = text_h + 2 * pad;
        let x = x1 as i32;
        let y = if y1 >= box_h {
            (y1 - box_h) as i32
        } else {
            y1 as i32
        };

        draw_filled_rect_mut(
            canvas,
            Rect::at(x, y).of_size(text_w + 2 * pad, box_h),
            color,
        );
        draw_text_mut(
            canvas,
            TEXT_COLOR,
            x + pad as i32,
            y + pad as i32,
            self.font_scale,
            font,
            &label,
        );
    }
}
