use std::path::Path;

use opencv::{core::Mat, imgproc, prelude::*};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use crate::error::{GuardianError, Result};
use crate::face::{Blendshapes, FaceResult, Landmark};

/// Turns a BGR frame into at most one face.
pub trait LandmarkSource {
    fn detect(&mut self, frame: &Mat) -> Result<Option<FaceResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Nchw,
    Nhwc,
}

/// Face mesh + blendshape model run through ONNX Runtime.
///
/// Expects one image input and three outputs: `landmarks` (flattened
/// `x, y, z` triples in input pixels), `presence` (a logit) and
/// `blendshapes` (52 scores). Outputs are matched by name, falling back to
/// position.
pub struct FaceLandmarker {
    session: Session,
    input_name: String,
    landmarks_output: String,
    presence_output: String,
    blendshapes_output: String,
    input_width: i32,
    input_height: i32,
    layout: Layout,
    min_presence: f32,
}

impl FaceLandmarker {
    pub fn load(model_path: impl AsRef<Path>, min_presence: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(GuardianError::Model(format!(
                "{} does not exist",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| GuardianError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| GuardianError::Model(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| GuardianError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| GuardianError::Model(e.to_string()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| GuardianError::Model("model has no inputs".to_string()))?;
        let input_name = input.name.clone();
        let dims: Vec<i64> = input
            .input_type
            .tensor_shape()
            .map(|shape| shape.iter().copied().collect())
            .unwrap_or_default();
        let (layout, input_width, input_height) = Self::input_geometry(&dims);

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let pick = |wanted: &str, position: usize| -> Result<String> {
            output_names
                .iter()
                .find(|name| name.as_str() == wanted)
                .or_else(|| output_names.get(position))
                .cloned()
                .ok_or_else(|| GuardianError::Model(format!("model has no `{wanted}` output")))
        };
        let landmarks_output = pick("landmarks", 0)?;
        let presence_output = pick("presence", 1)?;
        let blendshapes_output = pick("blendshapes", 2)?;

        debug!(
            path = %model_path.display(),
            input_width,
            input_height,
            ?layout,
            "landmark model loaded"
        );

        Ok(Self {
            session,
            input_name,
            landmarks_output,
            presence_output,
            blendshapes_output,
            input_width,
            input_height,
            layout,
            min_presence,
        })
    }

    /// Layout and spatial size from an image input shape, 256x256 NCHW if unknown.
    fn input_geometry(dims: &[i64]) -> (Layout, i32, i32) {
        match dims {
            [_, h, w, 3] if *h > 0 && *w > 0 => (Layout::Nhwc, *w as i32, *h as i32),
            [_, _, h, w] if *h > 0 && *w > 0 => (Layout::Nchw, *w as i32, *h as i32),
            _ => (Layout::Nchw, 256, 256),
        }
    }

    fn preprocess(&self, frame: &Mat) -> Result<Tensor<f32>> {
        let mut rgb = Mat::default();
        imgproc::cvt_color_def(frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;

        let mut resized = Mat::default();
        imgproc::resize(
            &rgb,
            &mut resized,
            opencv::core::Size::new(self.input_width, self.input_height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let h = self.input_height as usize;
        let w = self.input_width as usize;
        let pixels = resized.data_bytes()?;
        let data = to_tensor_data(pixels, h, w, self.layout);

        let shape = match self.layout {
            Layout::Nhwc => [1, h as i64, w as i64, 3],
            Layout::Nchw => [1, 3, h as i64, w as i64],
        };
        Tensor::from_array((shape, data)).map_err(|e| GuardianError::Inference(e.to_string()))
    }
}

impl LandmarkSource for FaceLandmarker {
    fn detect(&mut self, frame: &Mat) -> Result<Option<FaceResult>> {
        let input = self.preprocess(frame)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| GuardianError::Inference(e.to_string()))?;

        let extract = |name: &str| -> Result<Vec<f32>> {
            let value = outputs
                .get(name)
                .ok_or_else(|| GuardianError::Inference(format!("missing `{name}` output")))?;
            let (_shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| GuardianError::Inference(e.to_string()))?;
            Ok(data.to_vec())
        };

        let presence = extract(&self.presence_output)?
            .first()
            .copied()
            .map(sigmoid)
            .unwrap_or(0.0);
        if presence < self.min_presence {
            return Ok(None);
        }

        let landmarks = normalize_landmarks(
            &extract(&self.landmarks_output)?,
            self.input_width as f32,
            self.input_height as f32,
        );
        let blendshapes = Blendshapes::from_scores(&extract(&self.blendshapes_output)?);

        Ok(Some(FaceResult {
            landmarks,
            blendshapes,
        }))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Interleaved RGB bytes to `[0, 1]` floats in the model's layout.
fn to_tensor_data(pixels: &[u8], h: usize, w: usize, layout: Layout) -> Vec<f32> {
    match layout {
        Layout::Nhwc => pixels.iter().map(|&p| f32::from(p) / 255.0).collect(),
        Layout::Nchw => {
            let mut data = vec![0.0f32; 3 * h * w];
            for (idx, rgb) in pixels.chunks_exact(3).enumerate() {
                for (channel, &value) in rgb.iter().enumerate() {
                    data[channel * h * w + idx] = f32::from(value) / 255.0;
                }
            }
            data
        }
    }
}

/// Pixel-space `x, y, z` triples to frame-normalized landmarks.
fn normalize_landmarks(raw: &[f32], width: f32, height: f32) -> Vec<Landmark> {
    raw.chunks_exact(3)
        .map(|p| Landmark {
            x: p[0] / width,
            y: p[1] / height,
            z: p[2] / width,
        })
        .collect()
}
