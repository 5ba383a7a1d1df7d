use crate::labels::ClassLabels;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn from_center(xc: f32, yc: f32, w: f32, h: f32) -> Self {
        Self {
            x1: xc - w / 2.,
            y1: yc - h / 2.,
            x2: xc + w / 2.,
            y2: yc + h / 2.,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.) * self.height().max(0.)
    }

    /// Clamps the box into `[0, width] x [0, height]`, reordering corners if
    /// needed. Returns `None` for non-finite coordinates or a zero-area result.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let (w, h) = (width as f32, height as f32);
        let clamped = Self {
            x1: self.x1.min(self.x2).clamp(0., w),
            y1: self.y1.min(self.y2).clamp(0., h),
            x2: self.x1.max(self.x2).clamp(0., w),
            y2: self.y1.max(self.y2).clamp(0., h),
        };
        (clamped.area() > 0.).then_some(clamped)
    }

    /// Integer pixel corners as shown in the detections table.
    pub fn to_pixels(&self) -> [u32; 4] {
        [
            self.x1.floor() as u32,
            self.y1.floor() as u32,
            self.x2.floor() as u32,
            self.y2.floor() as u32,
        ]
    }
}

pub fn intersection(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let w = box1.x2.min(box2.x2) - box1.x1.max(box2.x1);
    let h = box1.y2.min(box2.y2) - box1.y1.max(box2.y1);
    w.max(0.) * h.max(0.)
}

pub fn union(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    box1.area() + box2.area() - intersection(box1, box2)
}

pub fn iou(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let u = union(box1, box2);
    if u <= 0. {
        return 0.;
    }
    intersection(box1, box2) / u
}

/// Detector output before the class id is resolved to a name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Default)]
pub struct InferenceResult {
    pub detections: Vec<Detection>,
    pub width: u32,
    pub height: u32,
}

/// Greedy class-agnostic suppression, highest confidence first.
pub fn non_max_suppression(
    mut boxes: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));
    let mut result = Vec::new();

    while !boxes.is_empty() && result.len() < max_detections {
        let best = boxes.remove(0);
        boxes.retain(|other| iou(&best.bbox, &other.bbox) < iou_threshold);
        result.push(best);
    }

    result
}

impl InferenceResult {
    /// Resolves class names and drops detections that break the output
    /// contract: unknown class, confidence outside `[0, 1]`, or a box that
    /// is empty once clamped to the image.
    pub fn resolve(raw: Vec<RawDetection>, labels: &ClassLabels, width: u32, height: u32) -> Self {
        let detections = raw
            .into_iter()
            .filter_map(|det| {
                if !det.confidence.is_finite() || !(0.0..=1.0).contains(&det.confidence) {
                    tracing::warn!(
                        "Dropping detection with confidence out of range: {}",
                        det.confidence
                    );
                    return None;
                }
                let Some(class_name) = labels.name(det.class_id) else {
                    tracing::warn!("Dropping detection with unknown class id {}", det.class_id);
                    return None;
                };
                let Some(bbox) = det.bbox.clamp_to(width, height) else {
                    tracing::warn!("Dropping detection with empty box {:?}", det.bbox);
                    return None;
                };
                Some(Detection {
                    class_id: det.class_id,
                    class_name: class_name.to_string(),
                    confidence: det.confidence,
                    bbox,
                })
            })
            .collect();

        Self {
            detections,
            width,
            height,
        }
    }
}
