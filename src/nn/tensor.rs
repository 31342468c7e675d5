//! Dense `f32` tensors exchanged with the ONNX runtime.
//!
//! The palm detector produces tensors like `[1, 2016, 18]` (one row of box data per anchor) and
//! the landmark network produces `[1, 63]` (21 landmarks with 3 coordinates each). Both are read
//! by fixing the leading dimensions with [`Tensor::index`] and reading the rest as a slice.

use std::fmt;

use tinyvec::TinyVec;

type Shape = TinyVec<[usize; 4]>;

/// A contiguous row-major tensor.
#[derive(Clone)]
pub struct Tensor {
    shape: Shape,
    data: Box<[f32]>,
}

/// A borrowed, contiguous part of a [`Tensor`].
#[derive(Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a [usize],
    data: &'a [f32],
}

impl Tensor {
    /// Creates a tensor of shape `shape`, computing each element from its index.
    ///
    /// Elements are produced in memory order, so the last index changes fastest.
    pub fn from_fn<const N: usize, F: FnMut([usize; N]) -> f32>(shape: [usize; N], mut f: F) -> Self {
        let len = shape.iter().product::<usize>();
        let data = (0..len)
            .map(|flat| {
                let mut index = [0; N];
                let mut rest = flat;
                for (i, &size) in index.iter_mut().zip(&shape).rev() {
                    *i = rest % size;
                    rest /= size;
                }
                f(index)
            })
            .collect();
        Self {
            shape: Shape::from(&shape[..]),
            data,
        }
    }

    /// Creates a tensor of shape `shape` from its elements in memory order.
    ///
    /// # Panics
    ///
    /// Panics if `iter` does not yield exactly as many elements as `shape` describes.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let data: Box<[f32]> = iter.into_iter().collect();
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "element count does not match shape {shape:?}"
        );
        Self {
            shape: Shape::from(shape),
            data,
        }
    }

    /// Converts a network output into a [`Tensor`].
    ///
    /// Fails if the tract tensor does not hold `f32` values.
    pub(super) fn from_tract(tract: &tract_onnx::prelude::Tensor) -> anyhow::Result<Self> {
        let data = tract.as_slice::<f32>()?;
        Ok(Self::from_iter(tract.shape(), data.iter().copied()))
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract_onnx::prelude::Tensor> {
        Ok(tract_onnx::prelude::Tensor::from_shape(
            &self.shape,
            &self.data,
        )?)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            data: &self.data,
        }
    }

    /// Fixes the first `N` dimensions to `indices`, returning a view of the remaining ones.
    ///
    /// # Panics
    ///
    /// Panics if the tensor has fewer than `N` dimensions or any index is out of bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'_> {
        self.view().index(indices)
    }
}

impl<const N: usize> From<[f32; N]> for Tensor {
    fn from(values: [f32; N]) -> Self {
        Self::from_iter(&[N], values)
    }
}

impl<'a> TensorView<'a> {
    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    /// Fixes the first `N` dimensions of this view to `indices`.
    ///
    /// # Panics
    ///
    /// Panics if the view has fewer than `N` dimensions or any index is out of bounds.
    #[track_caller]
    pub fn index<const N: usize>(&self, indices: [usize; N]) -> TensorView<'a> {
        assert!(
            N <= self.shape.len() && indices.iter().zip(self.shape).all(|(i, len)| i < len),
            "index {indices:?} is out of bounds for tensor of shape {:?}",
            self.shape
        );

        let mut data = self.data;
        for (depth, &index) in indices.iter().enumerate() {
            let stride = self.shape[depth + 1..].iter().product::<usize>();
            data = &data[index * stride..][..stride];
        }
        TensorView {
            shape: &self.shape[N..],
            data,
        }
    }

    /// Iterates over the entries of the outermost dimension.
    ///
    /// # Panics
    ///
    /// Panics if the view has no dimensions.
    #[track_caller]
    pub fn iter(&self) -> impl Iterator<Item = TensorView<'a>> {
        assert!(!self.shape.is_empty(), "cannot iterate over a scalar");
        let this = *self;
        (0..self.shape[0]).map(move |i| this.index([i]))
    }

    /// Returns the elements of a 1-dimensional view.
    ///
    /// # Panics
    ///
    /// Panics if the view is not 1-dimensional.
    #[track_caller]
    pub fn as_slice(&self) -> &'a [f32] {
        assert_eq!(self.shape.len(), 1, "view of shape {:?} is not 1-D", self.shape);
        self.data
    }

    /// Returns the element of a 0-dimensional view.
    ///
    /// # Panics
    ///
    /// Panics if the view still has dimensions.
    #[track_caller]
    pub fn as_singular(&self) -> f32 {
        assert!(self.shape.is_empty(), "view of shape {:?} is not a scalar", self.shape);
        self.data[0]
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor{:?}", self.shape())
    }
}

impl fmt::Debug for TensorView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TensorView{:?}", self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fn_fills_in_memory_order() {
        let mut seen = Vec::new();
        let tensor = Tensor::from_fn([1, 2, 3], |index| {
            seen.push(index);
            seen.len() as f32
        });
        assert_eq!(tensor.shape(), [1, 2, 3]);
        assert_eq!(seen[..4], [[0, 0, 0], [0, 0, 1], [0, 0, 2], [0, 1, 0]]);
        assert_eq!(tensor.index([0, 1]).as_slice(), [4.0, 5.0, 6.0]);
    }

    #[test]
    fn landmark_output_rows() {
        let tensor = Tensor::from_iter(&[1, 63], (0..63).map(|i| i as f32));
        let coords = tensor.index([0]).as_slice().chunks(3).collect::<Vec<_>>();
        assert_eq!(coords.len(), 21);
        assert_eq!(coords[0], [0.0, 1.0, 2.0]);
        assert_eq!(coords[20], [60.0, 61.0, 62.0]);
    }

    #[test]
    fn detection_output_rows() {
        let tensor = Tensor::from_fn([1, 3, 18], |[_, anchor, value]| (anchor * 100 + value) as f32);
        let rows = tensor
            .index([0])
            .iter()
            .map(|row| row.as_slice()[4])
            .collect::<Vec<_>>();
        assert_eq!(rows, [4.0, 104.0, 204.0]);
        assert_eq!(tensor.index([0, 2, 17]).as_singular(), 217.0);
        assert_eq!(tensor.index([0, 2]).index([5]).as_singular(), 205.0);
    }

    #[test]
    fn empty_dimension() {
        let tensor = Tensor::from_fn([1, 0, 18], |i| unreachable!("{i:?}"));
        assert_eq!(tensor.index([0]).iter().count(), 0);
    }

    #[test]
    fn tract_conversion() {
        let tensor = Tensor::from_iter(&[2, 2], [1.0, 2.0, 3.0, 4.0]);
        let tract = tensor.to_tract().unwrap();
        assert_eq!(tract.shape(), &[2, 2]);

        let back = Tensor::from_tract(&tract).unwrap();
        assert_eq!(back.index([1]).as_slice(), [3.0, 4.0]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn index_out_of_bounds() {
        Tensor::from([1.0, 2.0]).index([2]);
    }

    #[test]
    #[should_panic(expected = "element count")]
    fn wrong_element_count() {
        Tensor::from_iter(&[2, 2], [1.0]);
    }
}
