use crate::{
    config::{ModelConfig, Validatable},
    detection::{non_max_suppression, BoundingBox, RawDetection},
    model_service::{ModelError, ModelService},
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, ArrayD, Axis, Ix3, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&ModelConfig> for DecodeParams {
    fn from(cfg: &ModelConfig) -> Self {
        Self {
            input_size: cfg.input_size,
            conf_threshold: cfg.conf_threshold,
            iou_threshold: cfg.iou_threshold,
            max_detections: cfg.max_detections,
        }
    }
}

fn transform_image(image: &DynamicImage, input_size: u32) -> Array<f32, Ix4> {
    let size = input_size as usize;
    let img = image.resize_exact(input_size, input_size, FilterType::CatmullRom);

    let mut input = Array::zeros((1, 3, size, size));
    for pixel in img.pixels() {
        let x = pixel.0 as _;
        let y = pixel.1 as _;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

/// Decodes a `[1, 4 + classes, anchors]` YOLOv8 head into boxes in original
/// image coordinates, then applies NMS.
pub fn decode_predictions(
    output: &ArrayD<f32>,
    params: &DecodeParams,
    img_width: u32,
    img_height: u32,
) -> Result<Vec<RawDetection>, ModelError> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(ModelError::UnexpectedOutputShape(shape));
    }
    let output = output.view().into_dimensionality::<Ix3>()?;
    let output = output.index_axis(Axis(0), 0);

    let scale_x = img_width as f32 / params.input_size as f32;
    let scale_y = img_height as f32 / params.input_size as f32;

    let mut boxes = Vec::new();
    for anchor in output.axis_iter(Axis(1)) {
        let Some((class_id, prob)) = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        else {
            continue;
        };

        if prob < params.conf_threshold {
            continue;
        }

        boxes.push(RawDetection {
            class_id,
            confidence: prob,
            bbox: BoundingBox::from_center(
                anchor[0] * scale_x,
                anchor[1] * scale_y,
                anchor[2] * scale_x,
                anchor[3] * scale_y,
            ),
        });
    }

    Ok(non_max_suppression(
        boxes,
        params.iou_threshold,
        params.max_detections,
    ))
}

pub struct OrtModelService {
    sessions: Arc<Vec<Mutex<Session>>>,
    counter: AtomicUsize,
    params: DecodeParams,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: AtomicUsize::new(0),
            params: DecodeParams::from(model_config),
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index].lock();

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;
        let (shape, data) = outputs["output0"].try_extract_tensor::<f32>()?;

        let array = ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())?;
        Ok(array)
    }
}

impl ModelService for OrtModelService {
    fn predict(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, ModelError> {
        let (img_width, img_height) = image.dimensions();
        let input = transform_image(image, self.params.input_size);
        let outputs = self.run_inference(&input)?;

        decode_predictions(&outputs, &self.params, img_width, img_height)
    }
}
