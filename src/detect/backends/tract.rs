#![cfg(feature = "landmarks-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::blink::{FaceLandmarks, LandmarkBackend, FACE_MESH_POINTS};

/// Square input edge of the face-mesh model.
pub const MESH_INPUT: u32 = 192;

/// Tract-based face-mesh landmark backend.
///
/// Loads a local ONNX face-mesh model (NHWC float input in [0, 1], first output
/// holding 468 x/y/z triples in input pixels). The whole frame is treated as the
/// face crop. No network I/O, nothing written to disk.
pub struct TractFaceMesh {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    presence_threshold: f32,
}

impl TractFaceMesh {
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = MESH_INPUT as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, side, side, 3)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            presence_threshold: 0.5,
        })
    }

    pub fn with_presence_threshold(mut self, threshold: f32) -> Self {
        self.presence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let resized = imageops::resize(frame, MESH_INPUT, MESH_INPUT, FilterType::Triangle);
        let side = MESH_INPUT as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
            resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    /// Face-presence score from the second output, if the model has one.
    fn presence(&self, outputs: &TVec<TValue>) -> Result<Option<f32>> {
        let Some(output) = outputs.get(1) else {
            return Ok(None);
        };
        let view = output
            .to_array_view::<f32>()
            .context("presence tensor was not f32")?;
        let logit = view.iter().copied().next().unwrap_or(f32::NEG_INFINITY);
        Ok(Some(1.0 / (1.0 + (-logit).exp())))
    }
}

impl LandmarkBackend for TractFaceMesh {
    fn name(&self) -> &'static str {
        "tract-face-mesh"
    }

    fn landmarks(&mut self, frame: &RgbImage) -> Result<Option<FaceLandmarks>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;

        if let Some(score) = self.presence(&outputs)? {
            if score < self.presence_threshold {
                return Ok(None);
            }
        }

        let mesh = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?
            .to_array_view::<f32>()
            .context("landmark tensor was not f32")?;
        let values: Vec<f32> = mesh.iter().copied().collect();
        if values.len() < FACE_MESH_POINTS * 3 {
            return Err(anyhow!(
                "expected {} landmark values, received {}",
                FACE_MESH_POINTS * 3,
                values.len()
            ));
        }

        let scale_x = frame.width() as f32 / MESH_INPUT as f32;
        let scale_y = frame.height() as f32 / MESH_INPUT as f32;
        let points = values
            .chunks_exact(3)
            .take(FACE_MESH_POINTS)
            .map(|p| (p[0] * scale_x, p[1] * scale_y))
            .collect();
        Ok(Some(FaceLandmarks::new(points)))
    }
}
