#![cfg(feature = "backend-tract")]

use anyhow::{anyhow, Context, Result};
use image::{imageops, imageops::FilterType, RgbaImage};
use tract_onnx::prelude::*;

use crate::config::{ModelVariant, PipelineConfig};
use crate::detect::backend::{DetectorBackend, RunningMode};
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Values per output row: x0, y0, x1, y1 (normalized), score, class index.
const ROW_LEN: usize = 6;

/// Tract-based backend for ONNX object detection.
///
/// Loads `<model_dir>/<variant>.onnx`, resizes each frame to the model input
/// and decodes `[1, N, 6]` rows into pixel-space detections.
pub struct TractBackend {
    model: Option<SimplePlan<TypedFact, Box<dyn TypedOp>>>,
    input_size: u32,
    labels: Vec<String>,
}

impl TractBackend {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let input_size = match config.model_variant {
            ModelVariant::EfficientDetLite0 => 320,
            ModelVariant::EfficientDetLite2 => 448,
        };
        let model_path = config.model_path("onnx");
        let model = tract_onnx::onnx()
            .model_for_path(&model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let labels_path = config.model_path("labels");
        let labels = std::fs::read_to_string(&labels_path)
            .map(|raw| raw.lines().map(|l| l.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            model: Some(model),
            input_size,
            labels,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbaImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = imageops::resize(
            &image,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn label_for(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, _mode: RunningMode) -> bool {
        true
    }

    fn detect(
        &mut self,
        frame: &Frame,
        _mode: RunningMode,
        _timestamp_ms: u64,
    ) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract model already released"))?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let rows = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let values: Vec<f32> = rows.iter().copied().collect();
        if values.len() % ROW_LEN != 0 {
            return Err(anyhow!(
                "model output has {} values, not a multiple of {}",
                values.len(),
                ROW_LEN
            ));
        }

        let width = frame.width() as f32;
        let height = frame.height() as f32;
        let detections = values
            .chunks_exact(ROW_LEN)
            .filter(|row| row[4].is_finite() && row[4] > 0.0)
            .map(|row| {
                let x0 = row[0].clamp(0.0, 1.0) * width;
                let y0 = row[1].clamp(0.0, 1.0) * height;
                let x1 = row[2].clamp(0.0, 1.0) * width;
                let y1 = row[3].clamp(0.0, 1.0) * height;
                Detection::new(
                    self.label_for(row[5].max(0.0) as usize),
                    row[4],
                    BoundingBox::new(x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs()),
                )
            })
            .collect();
        Ok(detections)
    }

    fn release(&mut self) {
        self.model = None;
    }
}
