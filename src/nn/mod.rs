//! Neural network inference.
//!
//! Networks are loaded from ONNX files and run on the CPU with [`tract_onnx`]. Image networks are
//! wrapped in a [`Cnn`], which takes care of sampling an [`ImageView`] into the input tensor the
//! network expects.

pub mod tensor;

use std::{
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use anyhow::{bail, Context};
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::image::{AsImageView, AspectRatio, Color, ImageView, Resolution};
use tensor::Tensor;

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// An image network taking a single `[1, 3, H, W]` RGB tensor.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    input_aspect: AspectRatio,
    color_mapper: Arc<ColorMapper>,
}

impl Cnn {
    /// Wraps `nn`, which must have exactly one input of shape `[1, 3, H, W]`.
    pub fn new(nn: NeuralNetwork, color_mapper: ColorMapper) -> anyhow::Result<Self> {
        let input_res = match nn.input_shapes() {
            [shape] => match shape[..] {
                [1, 3, h, w] => Resolution::new(w.try_into()?, h.try_into()?),
                _ => bail!("expected CNN input of shape [1, 3, H, W], got {shape:?}"),
            },
            shapes => bail!("CNN has to take exactly 1 input, this one takes {}", shapes.len()),
        };
        let input_aspect = input_res
            .aspect_ratio()
            .with_context(|| format!("CNN has empty input resolution {input_res}"))?;

        Ok(Self {
            nn,
            input_res,
            input_aspect,
            color_mapper: Arc::new(color_mapper),
        })
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Returns the aspect ratio of the expected input image.
    #[inline]
    pub fn input_aspect_ratio(&self) -> AspectRatio {
        self.input_aspect
    }

    /// Runs the network on an input image.
    ///
    /// The image is resampled (nearest neighbor) to the input resolution of the network, and
    /// stretched if its aspect ratio differs.
    pub fn estimate<V: AsImageView>(&self, image: &V) -> anyhow::Result<Outputs> {
        let tensor = self.input_tensor(image.as_view());
        self.nn.estimate(&tensor)
    }

    fn input_tensor(&self, view: ImageView<'_>) -> Tensor {
        let (w, h) = (self.input_res.width(), self.input_res.height());
        let x_scale = view.width() as f32 / w as f32;
        let y_scale = view.height() as f32 / h as f32;
        let max_x = view.width().saturating_sub(1);
        let max_y = view.height().saturating_sub(1);
        Tensor::from_fn([1, 3, h as usize, w as usize], |[_, c, y, x]| {
            let src_x = ((x as f32 * x_scale) as u32).min(max_x);
            let src_y = ((y as f32 * y_scale) as u32).min(max_y);
            self.color_mapper.map(view.get(src_x, src_y))[c]
        })
    }
}

/// Maps sRGB pixel colors to the value range a network was trained on.
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// Note that this operates on *non-linear* sRGB colors, but maps them linearly to the target
    /// range, which is what the MediaPipe networks expect.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());
        Self { target_range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        [color.r(), color.g(), color.b()].map(|col| col as f32 * adjust_range + start)
    }
}

/// An ONNX network, optimized for the shapes it declares.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    plan: Model,
    input_shapes: Vec<Vec<usize>>,
}

impl NeuralNetwork {
    /// Reads and optimizes a pre-trained model from an `.onnx` file.
    ///
    /// Fails if the file cannot be read, if the model is malformed or uses unsupported
    /// operations, or if any of its inputs has a symbolic shape.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        if path.extension().map_or(true, |ext| ext != "onnx") {
            bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            );
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read network from '{}'", path.display()))?;
        let plan = tract_onnx::onnx()
            .model_for_read(&mut &*model_data)?
            .into_optimized()?
            .into_runnable()?;

        let graph = plan.model();
        let input_shapes = (0..graph.inputs.len())
            .map(|id| -> anyhow::Result<Vec<usize>> {
                let fact = graph.input_fact(id)?;
                let shape = fact.shape.as_concrete().with_context(|| {
                    format!("input #{id} of '{}' has a symbolic shape", path.display())
                })?;
                Ok(shape.to_vec())
            })
            .collect::<anyhow::Result<_>>()?;

        Ok(Self(Arc::new(NeuralNetworkImpl { plan, input_shapes })))
    }

    /// Returns the shape of every network input, in order.
    pub fn input_shapes(&self) -> &[Vec<usize>] {
        &self.0.input_shapes
    }

    /// Runs the network on a single input tensor.
    pub fn estimate(&self, input: &Tensor) -> anyhow::Result<Outputs> {
        let input = TValue::from_const(Arc::new(input.to_tract()?));
        let outputs = self.0.plan.run(tvec![input])?;
        outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect()
    }
}

/// The tensors computed by a network, in the order of its outputs.
#[derive(Debug)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

impl FromIterator<Tensor> for Outputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_mapper() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [-1.0, -1.0, -1.0]);
        assert_eq!(mapper.map(Color::WHITE), [1.0, 1.0, 1.0]);

        let mapper = ColorMapper::linear(0.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [0.0, 0.0, 0.0]);
        assert_eq!(mapper.map(Color::RED), [1.0, 0.0, 0.0]);
        assert_eq!(mapper.map(Color::WHITE), [1.0, 1.0, 1.0]);
    }

    #[test]
    #[should_panic]
    fn color_mapper_rejects_empty_range() {
        ColorMapper::linear(1.0..=1.0);
    }

    #[test]
    fn rejects_non_onnx_paths() {
        let err = NeuralNetwork::load("model.tflite").err().unwrap();
        assert!(err.to_string().contains(".onnx"), "{err}");
    }

    #[test]
    fn missing_model_file() {
        let err = NeuralNetwork::load("/nonexistent/palm_detection_full.onnx")
            .err()
            .unwrap();
        assert!(
            err.to_string().contains("palm_detection_full.onnx"),
            "{err}"
        );
    }
}
