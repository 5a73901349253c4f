// Dense activation tensors exchanged between pipeline stages.
//
// Consumed by `edgesplit-pipeline` (stage execution, profiling) and by the
// profiling artifacts in `crate::profile`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EdgeSplitError;

/// Bytes per element on the wire. Activations are carried as `f32`.
pub const ELEMENT_BYTES: u64 = 4;

// ── Shape ─────────────────────────────────────────────────────────────────────

/// Ordered dimension sizes of a tensor, batch dimension first.
///
/// `Shape(vec![1, 3, 224, 224])` is a single NCHW image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(pub Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Number of elements that cross a boundary with this shape.
    pub fn transfer_size(&self) -> u64 {
        self.0.iter().map(|&d| d as u64).product()
    }

    /// Transfer size scaled by [`ELEMENT_BYTES`].
    pub fn transfer_bytes(&self) -> u64 {
        self.transfer_size() * ELEMENT_BYTES
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "({})", dims.join(", "))
    }
}

// ── Tensor ────────────────────────────────────────────────────────────────────

/// Row-major `f32` tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

/// First element at which two tensors disagree beyond tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementMismatch {
    pub index: usize,
    pub expected: f32,
    pub actual: f32,
}

impl Tensor {
    /// Build a tensor, checking that `data` holds exactly one value per element.
    pub fn new(shape: Shape, data: Vec<f32>) -> Result<Self, EdgeSplitError> {
        let expected = shape.transfer_size();
        if data.len() as u64 != expected {
            return Err(EdgeSplitError::Tensor(format!(
                "shape {shape} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Shape) -> Self {
        let len = shape.transfer_size() as usize;
        Self { shape, data: vec![0.0; len] }
    }

    /// Fill a tensor by calling `f` with each flat element index.
    pub fn from_fn(shape: Shape, f: impl FnMut(usize) -> f32) -> Self {
        let len = shape.transfer_size() as usize;
        let data = (0..len).map(f).collect();
        Self { shape, data }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Reinterpret the same elements under a new shape.
    pub fn reshape(self, shape: Shape) -> Result<Self, EdgeSplitError> {
        Self::new(shape, self.data)
    }

    /// Compare element-wise with `|a - e| <= abs_tol + rel_tol * |e|`.
    ///
    /// Returns the first offending element, or `None` if every element is
    /// within tolerance. Shapes are not compared here.
    pub fn first_mismatch(
        &self,
        expected: &Tensor,
        abs_tol: f32,
        rel_tol: f32,
    ) -> Option<ElementMismatch> {
        self.data
            .iter()
            .zip(expected.data.iter())
            .enumerate()
            .find(|(_, (a, e))| {
                let diff = (*a - *e).abs();
                // NaN never compares within tolerance.
                !(diff <= abs_tol + rel_tol * e.abs())
            })
            .map(|(index, (a, e))| ElementMismatch {
                index,
                expected: *e,
                actual: *a,
            })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_size_is_dim_product() {
        let s = Shape::new([1, 3, 224, 224]);
        assert_eq!(s.transfer_size(), 150_528);
        assert_eq!(s.transfer_bytes(), 602_112);
        assert_eq!(s.rank(), 4);
        assert_eq!(s.to_string(), "(1, 3, 224, 224)");
    }

    #[test]
    fn new_rejects_wrong_element_count() {
        let err = Tensor::new(Shape::new([2, 2]), vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, EdgeSplitError::Tensor(_)));
    }

    #[test]
    fn reshape_keeps_elements() {
        let t = Tensor::from_fn(Shape::new([1, 2, 2, 2]), |i| i as f32);
        let flat = t.clone().reshape(Shape::new([1, 8])).unwrap();
        assert_eq!(flat.data(), t.data());
        assert!(t.reshape(Shape::new([1, 7])).is_err());
    }

    #[test]
    fn mismatch_respects_tolerance() {
        let a = Tensor::new(Shape::new([3]), vec![1.0, 2.0, 3.0]).unwrap();
        let b = Tensor::new(Shape::new([3]), vec![1.0, 2.000_001, 3.5]).unwrap();

        let m = b.first_mismatch(&a, 1e-5, 0.0).unwrap();
        assert_eq!(m.index, 2);
        assert_eq!(m.expected, 3.0);

        assert!(b.first_mismatch(&a, 1.0, 0.0).is_none());
    }

    #[test]
    fn nan_is_always_a_mismatch() {
        let a = Tensor::new(Shape::new([1]), vec![1.0]).unwrap();
        let b = Tensor::new(Shape::new([1]), vec![f32::NAN]).unwrap();
        assert!(b.first_mismatch(&a, 10.0, 10.0).is_some());
    }

    #[test]
    fn serde_round_trip() {
        let t = Tensor::from_fn(Shape::new([1, 4]), |i| i as f32 * 0.5);
        let json = serde_json::to_string(&t).unwrap();
        let round: Tensor = serde_json::from_str(&json).unwrap();
        assert_eq!(round, t);
    }
}
