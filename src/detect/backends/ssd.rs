use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{Candidate, DetectorBackend};
use crate::frame::Frame;

/// Pixel scale factor applied after mean subtraction (1 / 127.5).
const INPUT_SCALE: f32 = 0.007843;
/// Mean subtracted from every channel before scaling.
const INPUT_MEAN: f32 = 127.5;
/// Values per output row: `[image_id, class_id, confidence, x1, y1, x2, y2]`.
const OUTPUT_ROW_LEN: usize = 7;

/// MobileNet-SSD backend running on tract.
///
/// Loads two artifacts: the ONNX graph and a labels file (one class name per
/// line, indexed by the model's raw class id). Inference resizes the frame to
/// the fixed model input size and normalizes pixels with the SSD constants.
pub struct SsdBackend {
    model: TypedSimplePlan<TypedModel>,
    classes: Vec<String>,
    input_size: u32,
}

impl SsdBackend {
    /// Load the model graph and class labels from disk and prepare the plan.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        graph_path: P,
        labels_path: Q,
        input_size: u32,
    ) -> Result<Self> {
        let graph_path = graph_path.as_ref();
        let labels_path = labels_path.as_ref();

        let classes = read_labels(labels_path)?;

        let model = tract_onnx::onnx()
            .model_for_path(graph_path)
            .with_context(|| format!("load ONNX model from {}", graph_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("set model input fact")?
            .into_optimized()
            .context("optimize ONNX model")?
            .into_runnable()
            .context("build runnable ONNX model")?;

        Ok(Self {
            model,
            classes,
            input_size,
        })
    }

    /// Resize to the model input square and build the normalized NCHW tensor.
    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let size = self.input_size;
        let rgb = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| {
                let pixel = resized.get_pixel(x as u32, y as u32)[channel] as f32;
                (pixel - INPUT_MEAN) * INPUT_SCALE
            },
        );

        Ok(input.into_tensor())
    }

    /// Flatten the detection output tensor into candidate rows.
    fn extract_candidates(&self, outputs: TVec<TValue>) -> Result<Vec<Candidate>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let values: Vec<f32> = view.iter().copied().collect();
        if !values.len().is_multiple_of(OUTPUT_ROW_LEN) {
            return Err(anyhow!(
                "model output length {} is not a multiple of {}",
                values.len(),
                OUTPUT_ROW_LEN
            ));
        }

        let mut candidates = Vec::with_capacity(values.len() / OUTPUT_ROW_LEN);
        for row in values.chunks_exact(OUTPUT_ROW_LEN) {
            let class_raw = row[1];
            let class_id = if class_raw.is_finite() && class_raw >= 0.0 {
                class_raw as usize
            } else {
                continue;
            };
            candidates.push(Candidate {
                class_id,
                confidence: row[2],
                bbox: [row[3], row[4], row[5], row[6]],
            });
        }
        Ok(candidates)
    }
}

impl DetectorBackend for SsdBackend {
    fn name(&self) -> &'static str {
        "mobilenet-ssd"
    }

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.classes.get(class_id).map(String::as_str)
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Candidate>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_candidates(outputs)
    }
}

fn read_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read class labels from {}", path.display()))?;
    let classes: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if classes.is_empty() {
        return Err(anyhow!("labels file {} contains no classes", path.display()));
    }
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn labels_are_read_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "background\n\nperson\n  car  ").unwrap();
        let classes = read_labels(file.path()).unwrap();
        assert_eq!(classes, vec!["background", "person", "car"]);
    }

    #[test]
    fn empty_labels_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(read_labels(file.path()).is_err());
    }

    #[test]
    fn missing_graph_fails_to_load() {
        let mut labels = tempfile::NamedTempFile::new().unwrap();
        writeln!(labels, "background\nperson").unwrap();
        let result = SsdBackend::load("/nonexistent/model.onnx", labels.path(), 300);
        assert!(result.is_err());
    }
}
