//! Recognition model interface.
//!
//! The engine treats classification and object detection as a black box
//! behind [`Recognizer`]; it never trains or calibrates the model. An ONNX
//! Runtime implementation is available behind the `onnx` feature flag.

use crate::error::Result;
use crate::models::BBox;

/// Classification + detection capability consumed by the pipeline.
pub trait Recognizer {
    /// Classify an encoded image into a label.
    fn classify(&mut self, image: &[u8]) -> Result<String>;

    /// Detect salient-shape bounding boxes in an encoded image.
    fn detect(&mut self, image: &[u8]) -> Result<Vec<BBox>>;
}

/// Parse a classifier charset from the JSON array the model tooling
/// exports alongside the weights.
pub fn charset_from_json(bytes: &[u8]) -> Result<Vec<String>> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxRecognizer;

#[cfg(feature = "onnx")]
mod onnx {
    use super::Recognizer;
    use crate::error::{Result, TuringError};
    use crate::models::BBox;
    use ndarray::Array4;
    use ort::session::{builder::GraphOptimizationLevel, Session};

    /// Classifier input height; width scales with aspect ratio.
    const CLS_INPUT_HEIGHT: u32 = 64;
    /// Detector letterbox size.
    const DET_INPUT: u32 = 416;
    /// Detector objectness·class score floor.
    const DET_SCORE_THRESHOLD: f32 = 0.1;
    /// Detector-internal NMS threshold (the pipeline applies its own
    /// area-ranked NMS afterwards).
    const DET_NMS_THRESHOLD: f32 = 0.45;
    /// Decode strides of the detection head.
    const DET_STRIDES: [u32; 3] = [8, 16, 32];

    fn onnx_err(context: &str) -> impl Fn(ort::Error) -> TuringError + '_ {
        move |e| TuringError::Recognition(format!("{}: {}", context, e))
    }

    /// ONNX Runtime implementation of [`Recognizer`]: a grayscale sequence
    /// classifier plus a YOLOX-style single-class detector.
    pub struct OnnxRecognizer {
        classifier: Session,
        detector: Session,
        charset: Vec<String>,
    }

    impl OnnxRecognizer {
        /// Build from in-memory model bytes and the classifier charset.
        pub fn from_memory(
            classifier_model: &[u8],
            detector_model: &[u8],
            charset: Vec<String>,
        ) -> Result<Self> {
            Ok(Self {
                classifier: load_session(classifier_model)?,
                detector: load_session(detector_model)?,
                charset,
            })
        }

        /// Build from model files on disk.
        pub fn from_files(
            classifier_model: impl AsRef<std::path::Path>,
            detector_model: impl AsRef<std::path::Path>,
            charset: Vec<String>,
        ) -> Result<Self> {
            let classifier = std::fs::read(classifier_model)?;
            let detector = std::fs::read(detector_model)?;
            Self::from_memory(&classifier, &detector, charset)
        }
    }

    fn load_session(model: &[u8]) -> Result<Session> {
        Session::builder()
            .map_err(onnx_err("failed to create session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(onnx_err("failed to set optimization level"))?
            .commit_from_memory(model)
            .map_err(onnx_err("failed to load model"))
    }

    impl Recognizer for OnnxRecognizer {
        fn classify(&mut self, image: &[u8]) -> Result<String> {
            let img = image::load_from_memory(image)
                .map_err(|e| TuringError::ImageProcessing(format!("classify input: {}", e)))?;
            let gray = img.to_luma8();
            let (w, h) = gray.dimensions();
            if h == 0 {
                return Err(TuringError::ImageProcessing("empty classify input".into()));
            }

            let scale = CLS_INPUT_HEIGHT as f64 / h as f64;
            let new_w = ((w as f64 * scale).round() as u32).max(1);
            let resized = image::imageops::resize(
                &gray,
                new_w,
                CLS_INPUT_HEIGHT,
                image::imageops::FilterType::Lanczos3,
            );

            let (rw, rh) = resized.dimensions();
            let mut input = Array4::<f32>::zeros((1, 1, rh as usize, rw as usize));
            for (x, y, p) in resized.enumerate_pixels() {
                input[[0, 0, y as usize, x as usize]] = p[0] as f32 / 255.0;
            }

            let value = ort::value::Value::from_array(input)
                .map_err(onnx_err("failed to create classify tensor"))?;
            let outputs = self
                .classifier
                .run(ort::inputs![value])
                .map_err(onnx_err("classify inference failed"))?;
            let (_, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(onnx_err("failed to extract classify output"))?;

            let mut best = 0usize;
            let mut best_val = f32::NEG_INFINITY;
            for (i, &v) in data.iter().enumerate() {
                if v > best_val {
                    best_val = v;
                    best = i;
                }
            }
            self.charset
                .get(best)
                .cloned()
                .ok_or_else(|| {
                    TuringError::Recognition(format!("class index {} outside charset", best))
                })
        }

        fn detect(&mut self, image: &[u8]) -> Result<Vec<BBox>> {
            let original = image::load_from_memory(image)
                .map_err(|e| TuringError::ImageProcessing(format!("detect input: {}", e)))?;
            let (orig_w, orig_h) = (original.width(), original.height());
            if orig_w == 0 || orig_h == 0 {
                return Ok(Vec::new());
            }

            // Letterbox onto a gray canvas, keeping aspect ratio.
            let gain = (DET_INPUT as f32 / orig_w as f32).min(DET_INPUT as f32 / orig_h as f32);
            let resize_w = ((orig_w as f32 * gain) as u32).max(1);
            let resize_h = ((orig_h as f32 * gain) as u32).max(1);
            let resized = original
                .resize_exact(resize_w, resize_h, image::imageops::FilterType::Triangle)
                .to_rgb8();
            let mut canvas =
                image::RgbImage::from_pixel(DET_INPUT, DET_INPUT, image::Rgb([114, 114, 114]));
            image::imageops::overlay(&mut canvas, &resized, 0, 0);

            let mut input =
                Array4::<f32>::zeros((1, 3, DET_INPUT as usize, DET_INPUT as usize));
            for (x, y, p) in canvas.enumerate_pixels() {
                input[[0, 0, y as usize, x as usize]] = p[0] as f32;
                input[[0, 1, y as usize, x as usize]] = p[1] as f32;
                input[[0, 2, y as usize, x as usize]] = p[2] as f32;
            }

            let value = ort::value::Value::from_array(input)
                .map_err(onnx_err("failed to create detect tensor"))?;
            let outputs = self
                .detector
                .run(ort::inputs![value])
                .map_err(onnx_err("detect inference failed"))?;
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(onnx_err("failed to extract detect output"))?;
            let shape: Vec<usize> = shape.iter().map(|&v| v as usize).collect();
            let output = ndarray::ArrayView::from_shape(shape, data)
                .map_err(|e| TuringError::Recognition(format!("detect output shape: {}", e)))?;

            // Decode each anchor against its grid cell and stride.
            let (grids, strides) = build_grids();
            let num = output.len() / 6;
            #[derive(Clone, Copy)]
            struct Scored {
                score: f32,
                x1: f32,
                y1: f32,
                x2: f32,
                y2: f32,
            }
            let mut boxes: Vec<Scored> = Vec::new();
            for i in 0..num.min(grids.len()) {
                let score = output[[0, i, 4]] * output[[0, i, 5]];
                if score < DET_SCORE_THRESHOLD {
                    continue;
                }
                let stride = strides[i] as f32;
                let cx = (output[[0, i, 0]] + grids[i].0 as f32) * stride;
                let cy = (output[[0, i, 1]] + grids[i].1 as f32) * stride;
                let bw = output[[0, i, 2]].exp() * stride;
                let bh = output[[0, i, 3]].exp() * stride;
                boxes.push(Scored {
                    score,
                    x1: (cx - bw / 2.0) / gain,
                    y1: (cy - bh / 2.0) / gain,
                    x2: (cx + bw / 2.0) / gain,
                    y2: (cy + bh / 2.0) / gain,
                });
            }

            // Score-ranked NMS inside the decoder.
            boxes.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut kept: Vec<Scored> = Vec::new();
            while let Some(current) = boxes.first().copied() {
                boxes.remove(0);
                kept.push(current);
                boxes.retain(|b| {
                    let xx1 = current.x1.max(b.x1);
                    let yy1 = current.y1.max(b.y1);
                    let xx2 = current.x2.min(b.x2);
                    let yy2 = current.y2.min(b.y2);
                    let inter = (xx2 - xx1).max(0.0) * (yy2 - yy1).max(0.0);
                    let area_a = (current.x2 - current.x1) * (current.y2 - current.y1);
                    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
                    let union = area_a + area_b - inter;
                    union <= 0.0 || inter / union <= DET_NMS_THRESHOLD
                });
            }

            Ok(kept
                .into_iter()
                .map(|b| BBox {
                    x1: b.x1.max(0.0).min((orig_w - 1) as f32) as u32,
                    y1: b.y1.max(0.0).min((orig_h - 1) as f32) as u32,
                    x2: b.x2.max(0.0).min((orig_w - 1) as f32) as u32,
                    y2: b.y2.max(0.0).min((orig_h - 1) as f32) as u32,
                })
                .collect())
        }
    }

    /// Grid cell and stride per anchor, matching the detection head layout.
    fn build_grids() -> (Vec<(u32, u32)>, Vec<u32>) {
        let mut grids = Vec::new();
        let mut strides = Vec::new();
        for &stride in &DET_STRIDES {
            let size = DET_INPUT / stride;
            for y in 0..size {
                for x in 0..size {
                    grids.push((x, y));
                    strides.push(stride);
                }
            }
        }
        (grids, strides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_parses_json_array() {
        let charset = charset_from_json(br#"["a", "b", "0", "1"]"#).unwrap();
        assert_eq!(charset, vec!["a", "b", "0", "1"]);
    }

    #[test]
    fn charset_rejects_malformed_json() {
        assert!(charset_from_json(b"not json").is_err());
    }
}
