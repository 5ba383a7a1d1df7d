use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use std::{io::Cursor, path::Path, sync::Arc};
use tower::util::ServiceExt;
use yolo_upload::{
    build_router,
    config::{AnnotationConfig, StorageConfig},
    detection::{BoundingBox, RawDetection},
    labels::{ClassLabels, ColorLabel},
    model_service::{ModelError, ModelService},
    Annotator, DetectionPipeline, Metrics, OutputMaterializer, SharedState, UploadReceiver,
};

const BOUNDARY: &str = "yolo-upload-test-boundary";
const IMAGE_WIDTH: u32 = 64;
const IMAGE_HEIGHT: u32 = 48;

struct MockModelService {
    detections: Vec<RawDetection>,
}

impl ModelService for MockModelService {
    fn predict(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>, ModelError> {
        Ok(self.detections.clone())
    }
}

fn two_detections() -> Vec<RawDetection> {
    vec![
        RawDetection {
            class_id: 0,
            confidence: 0.91,
            bbox: BoundingBox {
                x1: 5.,
                y1: 5.,
                x2: 100.,
                y2: 40.,
            },
        },
        RawDetection {
            class_id: 1,
            confidence: 0.42,
            bbox: BoundingBox {
                x1: 30.5,
                y1: 10.2,
                x2: 50.7,
                y2: 30.9,
            },
        },
    ]
}

fn setup_app(dir: &Path, detections: Vec<RawDetection>) -> Router {
    let storage = StorageConfig {
        upload_dir: dir.join("uploads"),
        output_dir: dir.join("outputs"),
        retention_secs: 0,
        purge_interval_secs: 1,
    };
    std::fs::create_dir_all(&storage.upload_dir).unwrap();
    std::fs::create_dir_all(&storage.output_dir).unwrap();

    let labels = ClassLabels::new(vec![
        ColorLabel {
            label: "person".into(),
            color: [255, 0, 0],
        },
        ColorLabel {
            label: "dog".into(),
            color: [0, 0, 255],
        },
    ]);
    let pipeline = DetectionPipeline::new(
        MockModelService { detections },
        labels,
        Annotator::new(&AnnotationConfig::default()),
        OutputMaterializer::new(&storage.output_dir),
    );
    let state = SharedState {
        pipeline,
        receiver: UploadReceiver::new(&storage.upload_dir, 1024 * 1024),
        metrics: Arc::new(Metrics::new().unwrap()),
    };

    build_router(state, &storage, 1024 * 1024)
}

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(IMAGE_WIDTH, IMAGE_HEIGHT, Rgb([20, 20, 20]));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file_name, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn file_names(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn assert_redirect_to_index(response: &axum::response::Response) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn test_index_serves_upload_form() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), vec![]);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response.into_body()).await;
    assert!(html.contains(r#"enctype="multipart/form-data""#));
    assert!(html.contains(r#"name="file""#));
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), vec![]);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response.into_body()).await["status"], "Available");
}

#[tokio::test]
async fn test_predict_without_file_field_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());

    let request = multipart_request("/predict", &[("comment", None, b"hello".as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_redirect_to_index(&response);
    assert!(file_names(&dir.path().join("uploads")).is_empty());
    assert!(file_names(&dir.path().join("outputs")).is_empty());
}

#[tokio::test]
async fn test_predict_with_empty_filename_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());
    let png = png_bytes();

    let request = multipart_request("/predict", &[("file", Some(""), png.as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_redirect_to_index(&response);
    assert!(file_names(&dir.path().join("uploads")).is_empty());
}

#[tokio::test]
async fn test_predict_without_multipart_body_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_redirect_to_index(&response);
}

#[tokio::test]
async fn test_predict_renders_both_images_and_table() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());
    let png = png_bytes();

    let request = multipart_request("/predict", &[("file", Some("street.png"), png.as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response.into_body()).await;

    let uploads = file_names(&dir.path().join("uploads"));
    let outputs = file_names(&dir.path().join("outputs"));
    assert_eq!(uploads.len(), 1);
    assert_eq!(outputs.len(), 1);
    assert!(uploads[0].ends_with(".png"));
    assert!(html.contains(&format!("/static/uploads/{}", uploads[0])));
    assert!(html.contains(&format!("/static/outputs/{}", outputs[0])));
    assert_eq!(
        std::fs::read(dir.path().join("uploads").join(&uploads[0])).unwrap(),
        png
    );

    assert!(html.contains("<td>person</td><td>0.91</td><td>5</td><td>5</td><td>64</td><td>40</td>"));
    assert!(html.contains("<td>dog</td><td>0.42</td><td>30</td><td>10</td><td>50</td><td>30</td>"));
}

#[tokio::test]
async fn test_predict_accepts_image_field_name() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), vec![]);
    let png = png_bytes();

    let request = multipart_request("/predict", &[("image", Some("photo.gif"), png.as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let uploads = file_names(&dir.path().join("uploads"));
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].ends_with(".jpg"));
}

#[tokio::test]
async fn test_predict_with_no_detections_still_renders_annotated_image() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), vec![]);
    let png = png_bytes();

    let request = multipart_request("/predict", &[("file", Some("empty.png"), png.as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response.into_body()).await;
    assert!(html.contains("No objects detected."));

    let outputs = file_names(&dir.path().join("outputs"));
    assert_eq!(outputs.len(), 1);
    let annotated = image::open(dir.path().join("outputs").join(&outputs[0])).unwrap();
    assert_eq!(annotated.to_rgb8(), image::load_from_memory(&png).unwrap().to_rgb8());
}

#[tokio::test]
async fn test_predict_rejects_non_image_payload() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());

    let request = multipart_request("/predict", &[("file", Some("notes.jpg"), b"plain text".as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(file_names(&dir.path().join("uploads")).is_empty());
}

#[tokio::test]
async fn test_predict_rejects_oversized_upload() {
    let dir = tempfile::tempdir().unwrap();

    for size in [1024 * 1024 + 10, 3 * 1024 * 1024] {
        let app = setup_app(dir.path(), two_detections());
        let mut payload = png_bytes();
        payload.resize(size, 0);

        let request = multipart_request("/predict", &[("file", Some("big.png"), payload.as_slice())]);
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(file_names(&dir.path().join("uploads")).is_empty());
    }
}

#[tokio::test]
async fn test_predict_reports_undecodable_image() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());
    let mut truncated = png_bytes();
    truncated.truncate(20);

    let request = multipart_request("/predict", &[("file", Some("broken.png"), truncated.as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_string(response.into_body()).await;
    assert!(html.contains("Failed to decode uploaded image"));
    assert!(file_names(&dir.path().join("outputs")).is_empty());
}

#[tokio::test]
async fn test_api_predict_returns_detections_within_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());
    let png = png_bytes();

    let request = multipart_request("/api/predict", &[("file", Some("street.png"), png.as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    let detections = body["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 2);
    for detection in detections {
        let confidence = detection["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert!(!detection["class_name"].as_str().unwrap().is_empty());

        let bbox: Vec<u64> = detection["box"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_u64().unwrap())
            .collect();
        assert!(bbox[0] <= bbox[2] && bbox[2] <= IMAGE_WIDTH as u64);
        assert!(bbox[1] <= bbox[3] && bbox[3] <= IMAGE_HEIGHT as u64);
    }

    let id = body["id"].as_str().unwrap();
    assert_eq!(body["uploaded_image"], format!("/static/uploads/{}.png", id));
    assert_eq!(body["predicted_image"], format!("/static/outputs/{}.png", id));
}

#[tokio::test]
async fn test_api_predict_without_file_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), vec![]);

    let request = multipart_request("/api/predict", &[("comment", None, b"hi".as_slice())]);
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response.into_body()).await["error"].is_string());
}

#[tokio::test]
async fn test_concurrent_uploads_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());
    let png = png_bytes();

    let first = app
        .clone()
        .oneshot(multipart_request("/api/predict", &[("file", Some("a.png"), png.as_slice())]));
    let second = app
        .clone()
        .oneshot(multipart_request("/api/predict", &[("file", Some("b.png"), png.as_slice())]));
    let (first, second) = tokio::join!(first, second);

    let first = body_json(first.unwrap().into_body()).await;
    let second = body_json(second.unwrap().into_body()).await;
    assert_ne!(first["id"], second["id"]);
    assert_eq!(file_names(&dir.path().join("uploads")).len(), 2);
    assert_eq!(file_names(&dir.path().join("outputs")).len(), 2);
}

#[tokio::test]
async fn test_annotated_image_is_served() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), two_detections());
    let png = png_bytes();

    let response = app
        .clone()
        .oneshot(multipart_request("/api/predict", &[("file", Some("a.png"), png.as_slice())]))
        .await
        .unwrap();
    let body = body_json(response.into_body()).await;
    let predicted = body["predicted_image"].as_str().unwrap();

    let request = Request::builder().uri(predicted).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let served = image::load_from_memory(&bytes).unwrap();
    assert_eq!((served.width(), served.height()), (IMAGE_WIDTH, IMAGE_HEIGHT));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = setup_app(dir.path(), vec![]);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
