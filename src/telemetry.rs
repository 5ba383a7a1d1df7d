use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    upload_counter: Counter<u64>,
    detection_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("yolo_upload");
        global::set_meter_provider(provider);

        let upload_counter = meter
            .u64_counter("uploads_total")
            .with_description("Total number of uploads by outcome")
            .build();

        let detection_counter = meter
            .u64_counter("detections_total")
            .with_description("Total number of detections rendered, by class")
            .build();

        let boundaries = generate_boundaries((10, 50, 100, 500, 3000));

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of detection pipeline runs in milliseconds")
            .build();

        Ok(Metrics {
            upload_counter,
            detection_counter,
            prediction_duration,
            registry,
        })
    }

    pub fn record_upload(&self, outcome: &str) {
        let attributes = [KeyValue::new("outcome", outcome.to_string())];
        self.upload_counter.add(1, &attributes);
    }

    pub fn record_detection(&self, class_name: &str) {
        let attributes = [KeyValue::new("class", class_name.to_string())];
        self.detection_counter.add(1, &attributes);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &str) {
        let attributes = [KeyValue::new("route", route.to_string())];
        self.prediction_duration.record(duration_ms, &attributes);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 100;
    let tail_step: usize = 500;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
