use crate::config::{LabelsConfig, Validatable};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read labels file: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },
    #[error("Labels file contains no classes")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorLabel {
    pub label: String,
    pub color: [u8; 3],
}

/// Class id to name/color mapping; the class id is the position in the file.
#[derive(Debug, Clone)]
pub struct ClassLabels {
    class_labels: Vec<ColorLabel>,
}

impl ClassLabels {
    pub fn new(class_labels: Vec<ColorLabel>) -> Self {
        Self { class_labels }
    }

    pub fn from_config(labels_cfg: &LabelsConfig) -> Result<Self, LabelsError> {
        let class_labels = load_yolov8_labels(&labels_cfg.get_path())?;
        tracing::info!("Loaded {} class labels", class_labels.len());
        Ok(Self { class_labels })
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.class_labels.get(class_id).map(|l| l.label.as_str())
    }

    pub fn color(&self, class_id: usize) -> Option<[u8; 3]> {
        self.class_labels.get(class_id).map(|l| l.color)
    }

    pub fn len(&self) -> usize {
        self.class_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_labels.is_empty()
    }
}

fn parse_component(value: &str, name: &str, line: usize) -> Result<u8, LabelsError> {
    value.trim().parse().map_err(|_| LabelsError::InvalidLine {
        line,
        reason: format!("invalid {} value `{}`", name, value.trim()),
    })
}

pub fn load_yolov8_labels(filepath: &Path) -> Result<Vec<ColorLabel>, LabelsError> {
    let file = File::open(filepath)?;
    parse_labels(io::BufReader::new(file))
}

pub fn parse_labels(reader: impl BufRead) -> Result<Vec<ColorLabel>, LabelsError> {
    let mut color_labels = Vec::new();

    for (index, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != 4 {
            return Err(LabelsError::InvalidLine {
                line: line_no,
                reason: format!("expected `name,red,green,blue`, got `{}`", line),
            });
        }

        let label = parts[0].trim().to_string();
        if label.is_empty() {
            return Err(LabelsError::InvalidLine {
                line: line_no,
                reason: "empty class name".to_string(),
            });
        }

        let color = [
            parse_component(parts[1], "red", line_no)?,
            parse_component(parts[2], "green", line_no)?,
            parse_component(parts[3], "blue", line_no)?,
        ];

        color_labels.push(ColorLabel { label, color });
    }

    if color_labels.is_empty() {
        return Err(LabelsError::Empty);
    }

    Ok(color_labels)
}
